//! A user's voice profile and platform authorizations, as seen by promotion jobs.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::{get_user, list_platform_tokens_for_user, PlatformToken, User};
use crate::platform::Platform;
use crate::publish::{token_state, TokenState};

#[derive(Debug, Clone, Serialize)]
pub struct UserVoiceProfile {
    pub user_id: i64,
    pub display_name: String,
    pub email: String,
    pub bio: Option<String>,
    pub example_posts: Option<String>,
    pub slack_id: Option<String>,
    pub autonomous_mode: bool,
    pub authorizations: HashMap<Platform, TokenState>,
}

impl UserVoiceProfile {
    /// Assemble a profile from a user row and their stored tokens.
    #[must_use]
    pub fn from_parts(
        user: User,
        tokens: &[PlatformToken],
        now: DateTime<Utc>,
        skew: Duration,
    ) -> Self {
        let authorizations = tokens
            .iter()
            .filter_map(|t| {
                t.platform_enum()
                    .map(|platform| (platform, token_state(Some(t), now, skew)))
            })
            .collect();

        Self {
            user_id: user.id,
            display_name: user.name,
            email: user.email,
            bio: user.bio,
            example_posts: user.example_posts,
            slack_id: user.slack_id,
            autonomous_mode: user.autonomous_mode,
            authorizations,
        }
    }

    #[must_use]
    pub fn authorization(&self, platform: Platform) -> TokenState {
        self.authorizations
            .get(&platform)
            .copied()
            .unwrap_or(TokenState::Unauthorized)
    }

    /// Platforms with a usable (or refreshable) authorization, in a stable order.
    #[must_use]
    pub fn active_platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.authorization(*p).is_active())
            .collect()
    }

    /// Autonomous mode only counts when at least one platform is authorized.
    #[must_use]
    pub fn is_autonomous(&self) -> bool {
        self.autonomous_mode && !self.active_platforms().is_empty()
    }
}

/// Load a user's profile, or `None` if the user does not exist.
pub async fn load_voice_profile(
    pool: &SqlitePool,
    user_id: i64,
    now: DateTime<Utc>,
    skew: Duration,
) -> Result<Option<UserVoiceProfile>> {
    let Some(user) = get_user(pool, user_id).await? else {
        return Ok(None);
    };
    let tokens = list_platform_tokens_for_user(pool, user_id).await?;
    Ok(Some(UserVoiceProfile::from_parts(user, &tokens, now, skew)))
}

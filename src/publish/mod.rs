//! Platform authorization and posting.

mod client;
mod linkedin;
mod locks;
mod token;

pub use client::{PlatformClient, PlatformError, PlatformRegistry, PostReceipt, TokenGrant};
pub use linkedin::{LinkedInClient, LinkedInSettings};
pub use locks::RefreshLocks;
pub use token::{token_state, TokenState};

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{
    db_timestamp, get_platform_token, get_share, insert_share_if_absent,
    list_tokens_expiring_before, revoke_platform_token, upsert_platform_token, Database,
    NewPlatformToken, NewShare, PlatformToken, ShareRecord, ShareStatus,
};
use crate::error::PromotionError;
use crate::platform::Platform;
use crate::retry::RetryPolicy;

/// Result of a publish request that did not fail.
#[derive(Debug, Clone)]
pub enum PublishOutcome {
    Posted(ShareRecord),
    /// A successful share already existed; nothing was posted
    AlreadyShared(ShareRecord),
}

impl PublishOutcome {
    #[must_use]
    pub fn share(&self) -> &ShareRecord {
        match self {
            Self::Posted(share) | Self::AlreadyShared(share) => share,
        }
    }
}

/// Totals from a proactive token refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub revoked: usize,
    /// Transient failures; the token was left as it was
    pub failed: usize,
    /// Refreshed by someone else before this pass got to it
    pub skipped: usize,
}

/// Posts on behalf of users, keeping their platform tokens fresh.
#[derive(Clone)]
pub struct PlatformPublisher {
    db: Database,
    registry: Arc<PlatformRegistry>,
    locks: Arc<RefreshLocks>,
    retry: RetryPolicy,
    skew: Duration,
}

impl PlatformPublisher {
    #[must_use]
    pub fn new(
        db: Database,
        registry: PlatformRegistry,
        retry: RetryPolicy,
        skew: std::time::Duration,
    ) -> Self {
        Self {
            db,
            registry: Arc::new(registry),
            locks: Arc::new(RefreshLocks::new()),
            retry,
            skew: Duration::from_std(skew).unwrap_or_else(|_| Duration::zero()),
        }
    }

    #[must_use]
    pub fn supports(&self, platform: Platform) -> bool {
        self.registry.supports(platform)
    }

    /// Current authorization state of a user's platform credentials.
    pub async fn authorization_state(
        &self,
        user_id: i64,
        platform: Platform,
    ) -> Result<TokenState, PromotionError> {
        let token = get_platform_token(self.db.pool(), user_id, platform).await?;
        Ok(token_state(token.as_ref(), Utc::now(), self.skew))
    }

    /// Where to send the user to grant access on `platform`.
    pub fn authorization_url(&self, platform: Platform, state: &str) -> Result<String, PromotionError> {
        Ok(self.client(platform)?.authorization_url(state))
    }

    /// Exchange an authorization code and store the resulting token.
    pub async fn connect(
        &self,
        user_id: i64,
        platform: Platform,
        code: &str,
    ) -> Result<TokenState, PromotionError> {
        let client = self.client(platform)?;
        let grant = client
            .exchange_code(code)
            .await
            .map_err(|e| platform_failure(platform, e))?;

        let _guard = self.locks.acquire(user_id, platform).await;
        self.store_grant(user_id, platform, grant, Utc::now()).await?;
        info!(user_id, platform = platform.as_str(), "Platform connected");
        Ok(TokenState::Authorized)
    }

    /// Drop the user's credentials. Later publishes need a new `connect`.
    pub async fn disconnect(&self, user_id: i64, platform: Platform) -> Result<TokenState, PromotionError> {
        let _guard = self.locks.acquire(user_id, platform).await;
        revoke_platform_token(self.db.pool(), user_id, platform).await?;
        info!(user_id, platform = platform.as_str(), "Platform disconnected");
        Ok(TokenState::Revoked)
    }

    /// Post `text` as `user_id` and record the share.
    ///
    /// Does nothing when a successful share for the same content already
    /// exists. An expired token is refreshed once first; a failed refresh or
    /// a refused access token revokes the credentials.
    pub async fn publish(
        &self,
        user_id: i64,
        platform: Platform,
        text: &str,
        content_id: i64,
    ) -> Result<PublishOutcome, PromotionError> {
        let pool = self.db.pool();

        if let Some(share) =
            get_share(pool, user_id, content_id, platform, ShareStatus::Success).await?
        {
            debug!(user_id, content_id, platform = platform.as_str(), "Already shared");
            return Ok(PublishOutcome::AlreadyShared(share));
        }

        let token = get_platform_token(pool, user_id, platform).await?;
        let state = token_state(token.as_ref(), Utc::now(), self.skew);
        let token = match (state, token) {
            (TokenState::Authorized, Some(token)) => token,
            (TokenState::Expired, Some(_)) => {
                let client = self.client(platform)?;
                self.refresh_single_flight(user_id, platform, client.as_ref())
                    .await?
            }
            _ => return Err(PromotionError::AuthorizationRequired { platform }),
        };
        let client = self.client(platform)?;

        let access_token = token.access_token.as_deref().unwrap_or_default();
        let member_id = token.member_id.as_deref();
        let client_ref = client.as_ref();
        let receipt = self
            .retry
            .run("publish-post", move |_| {
                client_ref.create_post(access_token, member_id, text)
            })
            .await;

        let receipt = match receipt {
            Ok(receipt) => receipt,
            Err(PlatformError::Unauthorized | PlatformError::InvalidGrant(_)) => {
                warn!(user_id, platform = platform.as_str(), "Access token refused, revoking");
                revoke_platform_token(pool, user_id, platform).await?;
                return Err(PromotionError::AuthorizationRequired { platform });
            }
            Err(e) => return Err(platform_failure(platform, e)),
        };

        let new_share = NewShare {
            user_id,
            content_id,
            platform,
            status: ShareStatus::Success,
            post_content: Some(text.to_string()),
            post_url: receipt.post_url.clone(),
        };
        let inserted = insert_share_if_absent(pool, &new_share).await?;
        let share = get_share(pool, user_id, content_id, platform, ShareStatus::Success)
            .await?
            .ok_or_else(|| anyhow::anyhow!("share record missing after insert"))?;

        if inserted.is_none() {
            warn!(
                user_id,
                content_id,
                platform = platform.as_str(),
                post_id = %receipt.post_id,
                "Posted, but a concurrent publish recorded the share first"
            );
            return Ok(PublishOutcome::AlreadyShared(share));
        }

        info!(
            user_id,
            content_id,
            platform = platform.as_str(),
            post_id = %receipt.post_id,
            "Published"
        );
        Ok(PublishOutcome::Posted(share))
    }

    /// Refresh every token on a supported platform expiring within `window`.
    ///
    /// Only a refused refresh token revokes; transient failures leave the
    /// stored token for the next pass.
    pub async fn refresh_expiring(&self, window: std::time::Duration) -> Result<RefreshReport, PromotionError> {
        let now = Utc::now();
        let window = Duration::from_std(window).unwrap_or_else(|_| Duration::zero());
        let cutoff = now + window;
        let mut report = RefreshReport::default();

        for platform in Platform::ALL {
            let Some(client) = self.registry.get(platform) else {
                continue;
            };
            let expiring =
                list_tokens_expiring_before(self.db.pool(), platform, &db_timestamp(cutoff)).await?;

            for stale in expiring {
                let user_id = stale.user_id;
                let _guard = self.locks.acquire(user_id, platform).await;

                let current = get_platform_token(self.db.pool(), user_id, platform).await?;
                let Some(refresh_token) = current
                    .as_ref()
                    .filter(|t| t.revoked_at.is_none() && t.expires_at == stale.expires_at)
                    .and_then(|t| t.refresh_token.clone())
                else {
                    report.skipped += 1;
                    continue;
                };

                match client.refresh(&refresh_token).await {
                    Ok(grant) => {
                        self.store_grant(user_id, platform, grant, Utc::now()).await?;
                        report.refreshed += 1;
                    }
                    Err(PlatformError::InvalidGrant(reason)) => {
                        warn!(user_id, platform = platform.as_str(), "Refresh token refused: {reason}");
                        revoke_platform_token(self.db.pool(), user_id, platform).await?;
                        report.revoked += 1;
                    }
                    Err(e) => {
                        warn!(user_id, platform = platform.as_str(), "Token refresh failed: {e}");
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            refreshed = report.refreshed,
            revoked = report.revoked,
            failed = report.failed,
            skipped = report.skipped,
            "Token refresh pass complete"
        );
        Ok(report)
    }

    fn client(&self, platform: Platform) -> Result<Arc<dyn PlatformClient>, PromotionError> {
        self.registry
            .get(platform)
            .ok_or_else(|| PromotionError::PublishRejected {
                platform,
                message: format!("{} is not supported", platform.display_name()),
            })
    }

    /// Bring an expired token back to life, once per (user, platform).
    ///
    /// Waiters on the lock re-read the stored token and use whatever the
    /// first caller left behind.
    async fn refresh_single_flight(
        &self,
        user_id: i64,
        platform: Platform,
        client: &dyn PlatformClient,
    ) -> Result<PlatformToken, PromotionError> {
        let pool = self.db.pool();
        let _guard = self.locks.acquire(user_id, platform).await;

        let token = get_platform_token(pool, user_id, platform).await?;
        match (token_state(token.as_ref(), Utc::now(), self.skew), token) {
            (TokenState::Authorized, Some(token)) => return Ok(token),
            (TokenState::Expired, Some(token)) => {
                let refreshed = match token.refresh_token.as_deref() {
                    Some(refresh_token) => client.refresh(refresh_token).await,
                    None => Err(PlatformError::InvalidGrant("no refresh token stored".to_string())),
                };
                match refreshed {
                    Ok(grant) => {
                        self.store_grant(user_id, platform, grant, Utc::now()).await?;
                        info!(user_id, platform = platform.as_str(), "Access token refreshed");
                    }
                    Err(e) => {
                        warn!(user_id, platform = platform.as_str(), "Refresh failed, revoking: {e}");
                        revoke_platform_token(pool, user_id, platform).await?;
                        return Err(PromotionError::AuthorizationRequired { platform });
                    }
                }
            }
            _ => return Err(PromotionError::AuthorizationRequired { platform }),
        }

        get_platform_token(pool, user_id, platform)
            .await?
            .filter(|t| t.access_token.is_some())
            .ok_or(PromotionError::AuthorizationRequired { platform })
    }

    async fn store_grant(
        &self,
        user_id: i64,
        platform: Platform,
        grant: TokenGrant,
        now: DateTime<Utc>,
    ) -> Result<(), PromotionError> {
        let expires_at = grant
            .expires_in
            .and_then(Duration::try_seconds)
            .map(|lifetime| now + lifetime);
        upsert_platform_token(
            self.db.pool(),
            &NewPlatformToken {
                user_id,
                platform,
                access_token: grant.access_token,
                refresh_token: grant.refresh_token,
                expires_at,
                member_id: grant.member_id,
            },
        )
        .await?;
        Ok(())
    }
}

fn platform_failure(platform: Platform, error: PlatformError) -> PromotionError {
    match error {
        PlatformError::Transient(message) => PromotionError::TransientUpstream(message),
        PlatformError::InvalidGrant(_) | PlatformError::Unauthorized => {
            PromotionError::AuthorizationRequired { platform }
        }
        PlatformError::Rejected { message, .. } => PromotionError::PublishRejected { platform, message },
    }
}

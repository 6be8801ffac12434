//! Authorization state of a (user, platform) pair.
//!
//! ```text
//! Unauthorized --connect--> Authorized --time--> Expired --refresh ok--> Authorized
//!                               |                   |
//!                               +---disconnect/401--+--refresh failed--> Revoked
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::PlatformToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenState {
    /// Never connected
    Unauthorized,
    /// Usable access token
    Authorized,
    /// Access token expired (or about to); a refresh may recover it
    Expired,
    /// Disconnected or refused by the platform; the user must reconnect
    Revoked,
}

impl TokenState {
    /// Whether posting can proceed, possibly after a refresh.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Authorized | Self::Expired)
    }
}

/// Derive the state of a stored token at `now`.
///
/// A token counts as expired `skew` before its recorded expiry so that a
/// request never starts with a token that dies mid-flight.
#[must_use]
pub fn token_state(token: Option<&PlatformToken>, now: DateTime<Utc>, skew: Duration) -> TokenState {
    let Some(token) = token else {
        return TokenState::Unauthorized;
    };
    if token.revoked_at.is_some() {
        return TokenState::Revoked;
    }
    if token.access_token.is_none() {
        return if token.refresh_token.is_some() {
            TokenState::Expired
        } else {
            TokenState::Unauthorized
        };
    }

    match token.expires_at_utc() {
        Some(expires_at) if expires_at - skew <= now => TokenState::Expired,
        _ => TokenState::Authorized,
    }
}

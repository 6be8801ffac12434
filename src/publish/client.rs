use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::platform::Platform;
use crate::retry::Retryable;

/// Credentials returned by a code exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// `None` when the platform did not rotate the refresh token
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    pub expires_in: Option<i64>,
    pub member_id: Option<String>,
}

/// A published post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostReceipt {
    pub post_id: String,
    pub post_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum PlatformError {
    /// Network failure, throttling, or a 5xx; may succeed later
    #[error("platform temporarily unavailable: {0}")]
    Transient(String),
    /// The refresh token or authorization code was refused
    #[error("grant refused: {0}")]
    InvalidGrant(String),
    /// The access token was refused
    #[error("access token refused")]
    Unauthorized,
    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl Retryable for PlatformError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// OAuth and posting operations for one social platform.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn platform(&self) -> Platform;

    /// URL the user visits to grant access. `state` is echoed back on redirect.
    fn authorization_url(&self, state: &str) -> String;

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, PlatformError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, PlatformError>;

    async fn create_post(
        &self,
        access_token: &str,
        member_id: Option<&str>,
        text: &str,
    ) -> Result<PostReceipt, PlatformError>;
}

/// Platform clients available to the publisher.
#[derive(Default, Clone)]
pub struct PlatformRegistry {
    clients: HashMap<Platform, Arc<dyn PlatformClient>>,
}

impl PlatformRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client, replacing any earlier one for the same platform.
    pub fn register(&mut self, client: Arc<dyn PlatformClient>) {
        self.clients.insert(client.platform(), client);
    }

    #[must_use]
    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformClient>> {
        self.clients.get(&platform).cloned()
    }

    #[must_use]
    pub fn supports(&self, platform: Platform) -> bool {
        self.clients.contains_key(&platform)
    }
}

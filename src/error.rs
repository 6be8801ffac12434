//! Domain errors surfaced by promotion jobs.

use thiserror::Error;

use crate::platform::Platform;

/// Failure of a pipeline operation.
///
/// Every variant maps to a stable [`code`](PromotionError::code) and a message
/// that is safe to show to the user who submitted the job. Internal detail
/// stays in the logs.
#[derive(Debug, Error)]
pub enum PromotionError {
    #[error("feed unavailable: {feed_url}: {reason}")]
    FeedUnavailable { feed_url: String, reason: String },

    #[error("copy generation failed: {0}")]
    GenerationFailed(String),

    #[error("{platform} authorization required")]
    AuthorizationRequired { platform: Platform },

    #[error("{platform} rejected the post: {message}")]
    PublishRejected { platform: Platform, message: String },

    #[error("upstream service unavailable: {0}")]
    TransientUpstream(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PromotionError {
    /// Stable machine-readable code stored with failed jobs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::FeedUnavailable { .. } => "feed_unavailable",
            Self::GenerationFailed(_) => "generation_failed",
            Self::AuthorizationRequired { .. } => "authorization_required",
            Self::PublishRejected { .. } => "publish_rejected",
            Self::TransientUpstream(_) => "transient_upstream",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal",
        }
    }

    /// Message suitable for an end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthorizationRequired { platform } => {
                format!("Please reconnect your {platform} account and try again")
            }
            Self::GenerationFailed(_) => {
                "We couldn't generate a post right now. Please try again later".to_string()
            }
            Self::TransientUpstream(_) => {
                "The service is temporarily unavailable. Please try again later".to_string()
            }
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::FeedUnavailable { .. } | Self::PublishRejected { .. } | Self::NotFound(_) => {
                self.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let err = PromotionError::AuthorizationRequired {
            platform: Platform::Linkedin,
        };
        assert_eq!(err.code(), "authorization_required");
        assert_eq!(err.to_string(), "LinkedIn authorization required");
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err = PromotionError::Internal(anyhow::anyhow!("database is locked at /var/x"));
        assert_eq!(err.user_message(), "An internal error occurred");
        assert!(err.to_string().contains("database is locked"));
    }

    #[test]
    fn test_rejection_message_passes_through() {
        let err = PromotionError::PublishRejected {
            platform: Platform::Linkedin,
            message: "Content is a duplicate".to_string(),
        };
        assert!(err.user_message().contains("Content is a duplicate"));
    }
}

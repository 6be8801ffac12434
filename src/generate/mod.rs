//! Platform-specific post copy for a content item.

mod prompt;
mod text_service;
mod utm;

pub use prompt::{build_prompt, time_context, Prompt};
pub use text_service::{CompletionRequest, GeminiClient, TextService, TextServiceError};
pub use utm::{apply_utms, desired_utms};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Utc;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::constants::URL_CHAR_ALLOWANCE;
use crate::db::ContentItem;
use crate::error::PromotionError;
use crate::platform::Platform;
use crate::profile::UserVoiceProfile;
use crate::retry::RetryPolicy;
use crate::text::{char_len, truncate_chars};

const TEMPERATURE: f32 = 0.7;

/// Where the post text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CopySource {
    /// Admin-supplied copy on the content item
    Fixed,
    /// Written by the text service
    Generated,
}

/// Finished post text, link included, within the platform's budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedCopy {
    pub text: String,
    pub source: CopySource,
    /// Text service calls made (0 for fixed copy)
    pub attempts: u32,
}

/// Builds post copy, calling the text service when no fixed copy exists.
#[derive(Clone)]
pub struct CopyGenerator {
    service: Arc<dyn TextService>,
    retry: RetryPolicy,
    utm_params: String,
}

impl CopyGenerator {
    #[must_use]
    pub fn new(service: Arc<dyn TextService>, retry: RetryPolicy, utm_params: &str) -> Self {
        Self {
            service,
            retry,
            utm_params: utm_params.to_string(),
        }
    }

    /// Content URL with the configured and per-content UTM parameters.
    #[must_use]
    pub fn promoted_link(&self, content: &ContentItem) -> String {
        let desired = desired_utms(&self.utm_params, content.utm_campaign.as_deref());
        apply_utms(&content.url, &desired)
    }

    /// Produce post text for `platform`.
    ///
    /// Never returns empty text. Fails with `GenerationFailed` when the text
    /// service keeps failing or the link alone does not fit the platform.
    pub async fn generate(
        &self,
        content: &ContentItem,
        profile: &UserVoiceProfile,
        platform: Platform,
    ) -> Result<GeneratedCopy, PromotionError> {
        let link = self.promoted_link(content);

        if let Some(fixed) = content.fixed_copy.as_deref().filter(|c| !c.trim().is_empty()) {
            info!(content_id = content.id, platform = platform.as_str(), "Using fixed copy");
            return Ok(GeneratedCopy {
                text: compose_post(fixed, &content.url, &link, platform)?,
                source: CopySource::Fixed,
                attempts: 0,
            });
        }

        let prompt = build_prompt(content, profile, platform, &link, Utc::now());
        let request = CompletionRequest {
            system: prompt.system,
            prompt: prompt.user,
            max_output_tokens: platform.max_output_tokens(),
            temperature: TEMPERATURE,
        };

        let attempts = AtomicU32::new(0);
        let body = self
            .retry
            .run("generate-copy", |attempt| {
                attempts.store(attempt, Ordering::Relaxed);
                let service = Arc::clone(&self.service);
                let request = &request;
                async move { service.complete(request).await }
            })
            .await
            .map_err(|e| {
                warn!(
                    content_id = content.id,
                    user_id = profile.user_id,
                    platform = platform.as_str(),
                    "Copy generation failed: {e}"
                );
                PromotionError::GenerationFailed(e.to_string())
            })?;

        let text = compose_post(&body, &content.url, &link, platform)?;
        info!(
            content_id = content.id,
            user_id = profile.user_id,
            platform = platform.as_str(),
            length = char_len(&text),
            "Generated copy"
        );

        Ok(GeneratedCopy {
            text,
            source: CopySource::Generated,
            attempts: attempts.load(Ordering::Relaxed),
        })
    }
}

/// Combine post text with the promoted link under the platform budget.
///
/// A link is charged `max(len, 30)` characters. When `body` already mentions
/// the content URL, the mentions are rewritten to `link` if that fits;
/// otherwise the mentions are removed, the text is shortened, and `link` is
/// appended after a single space. The link itself is never shortened.
pub fn compose_post(
    body: &str,
    content_url: &str,
    link: &str,
    platform: Platform,
) -> Result<String, PromotionError> {
    let budget = platform.max_length();
    let link_cost = char_len(link).max(URL_CHAR_ALLOWANCE);
    if link_cost > budget {
        return Err(PromotionError::GenerationFailed(format!(
            "link is too long for {platform} ({} characters, limit {budget})",
            char_len(link)
        )));
    }

    let body = body.trim();
    let mention = mention_pattern(content_url);

    if let Some(pattern) = &mention {
        let mentions = pattern.find_iter(body).count();
        if mentions > 0 {
            let rewritten = pattern
                .replace_all(body, |caps: &Captures<'_>| format!("{link}{}", &caps["end"]))
                .into_owned();
            let cost = char_len(&rewritten) - mentions * char_len(link) + mentions * link_cost;
            if cost <= budget {
                return Ok(rewritten);
            }
        }
    }

    let stripped = match &mention {
        Some(pattern) => collapse_spaces(&pattern.replace_all(body, "$end")),
        None => body.to_string(),
    };

    let available = budget - link_cost;
    // One character goes to the separating space
    let text = truncate_chars(&stripped, available.saturating_sub(1));
    if text.is_empty() {
        return Ok(link.to_string());
    }
    Ok(format!("{text} {link}"))
}

/// Regex matching the content URL inside post text.
///
/// Only the same path matches, with an optional trailing slash and any query
/// or fragment. The character that ends the URL is captured as `end` so
/// replacements can put it back.
fn mention_pattern(content_url: &str) -> Option<Regex> {
    let parsed = Url::parse(content_url).ok()?;
    let host = parsed.host_str()?;
    let path = parsed.path().trim_end_matches('/');
    let base = format!("{host}{path}");
    Regex::new(&format!(
        r#"https?://(?:www\.)?{}/?(?:[?#][^\s"'<>]*[^\s"'<>.,;:!?)])?(?P<end>$|[\s"'<>]|[.,;:!?)]+(?:$|[\s"'<>]))"#,
        regex::escape(base.trim_start_matches("www."))
    ))
    .ok()
}

fn collapse_spaces(s: &str) -> String {
    s.lines()
        .map(|line| line.split(' ').filter(|w| !w.is_empty()).collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT_URL: &str = "https://blog.example.com/zero-trust";
    const LINK: &str = "https://blog.example.com/zero-trust?utm_source=li";

    #[test]
    fn test_appends_link_when_absent() {
        let post = compose_post("Great read on zero trust.", CONTENT_URL, LINK, Platform::Linkedin)
            .unwrap();
        assert_eq!(post, format!("Great read on zero trust. {LINK}"));
    }

    #[test]
    fn test_rewrites_link_in_place() {
        let body = "Read https://blog.example.com/zero-trust/ and tell me what you think!";
        let post = compose_post(body, CONTENT_URL, LINK, Platform::Linkedin).unwrap();
        assert_eq!(post, format!("Read {LINK} and tell me what you think!"));
        assert_eq!(post.matches("https://").count(), 1);
    }

    #[test]
    fn test_other_pages_on_same_site_are_left_alone() {
        let body = "See also https://blog.example.com/zero-trust-archive and \
                    https://blog.example.com/zero-trust/part-2 for more.";
        let post = compose_post(body, CONTENT_URL, LINK, Platform::Linkedin).unwrap();
        assert_eq!(post, format!("{body} {LINK}"));
    }

    #[test]
    fn test_rewrite_keeps_trailing_punctuation() {
        let body = "New post (https://blog.example.com/zero-trust?ref=feed). Enjoy";
        let post = compose_post(body, CONTENT_URL, LINK, Platform::Linkedin).unwrap();
        assert_eq!(post, format!("New post ({LINK}). Enjoy"));
    }

    #[test]
    fn test_truncates_to_budget_with_link() {
        let body = "Zero trust is a journey. ".repeat(40);
        let post = compose_post(&body, CONTENT_URL, LINK, Platform::X).unwrap();
        assert!(char_len(&post) <= Platform::X.max_length());
        assert!(post.ends_with(LINK));
        assert!(post.contains('…'));
    }

    #[test]
    fn test_short_link_charged_allowance() {
        let short = "https://e.co/a";
        let body = "x".repeat(300);
        let post = compose_post(&body, "https://e.co/a", short, Platform::X).unwrap();
        // Text may use at most 280 - 30 - 1 characters
        let text_part = post.strip_suffix(&format!(" {short}")).unwrap();
        assert_eq!(char_len(text_part), 249);
    }

    #[test]
    fn test_in_place_rewrite_falls_back_when_too_long() {
        let body = format!("{} {CONTENT_URL}", "word ".repeat(60));
        let post = compose_post(&body, CONTENT_URL, LINK, Platform::X).unwrap();
        assert!(char_len(&post) <= 280);
        assert!(post.ends_with(LINK));
        assert_eq!(post.matches("blog.example.com").count(), 1);
    }

    #[test]
    fn test_link_longer_than_budget_fails() {
        let link = format!("https://example.com/{}", "a".repeat(300));
        let err = compose_post("hi", "https://example.com/x", &link, Platform::X).unwrap_err();
        assert!(matches!(err, PromotionError::GenerationFailed(_)));
    }

    #[test]
    fn test_empty_body_yields_link() {
        let post = compose_post("   ", CONTENT_URL, LINK, Platform::Bluesky).unwrap();
        assert_eq!(post, LINK);
    }
}

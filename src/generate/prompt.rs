use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::constants::URL_CHAR_ALLOWANCE;
use crate::db::{ContentItem, ContentKind};
use crate::platform::Platform;
use crate::profile::UserVoiceProfile;
use crate::text::{collapse_whitespace, truncate_chars};

const MAX_PROMPT_EXCERPT_CHARS: usize = 400;
const MAX_PROMPT_CONTEXT_CHARS: usize = 2000;
const DEFAULT_BIO: &str = "a professional in this field";

/// System and user halves of a generation prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Build the prompt for one (content, user, platform) combination.
///
/// `link` is the UTM-tagged URL; the model sees it for reference but is told
/// to leave it out, since the generator appends it afterwards.
#[must_use]
pub fn build_prompt(
    content: &ContentItem,
    profile: &UserVoiceProfile,
    platform: Platform,
    link: &str,
    now: DateTime<Utc>,
) -> Prompt {
    Prompt {
        system: system_prompt(platform),
        user: user_prompt(content, profile, platform, link, now),
    }
}

fn system_prompt(platform: Platform) -> String {
    let text_budget = platform
        .max_length()
        .saturating_sub(URL_CHAR_ALLOWANCE + 1);
    format!(
        "You write social media posts for {name} on behalf of a real person, in their own voice.\n\
         Style: {style}.\n\
         Rules:\n\
         - Write in the first person as the author described by the user.\n\
         - Plain text only. No markdown, no headings, no surrounding quotes.\n\
         - Do not include the link; it is appended to your post automatically.\n\
         - The post must be at most {text_budget} characters.\n\
         - Output only the post text.",
        name = platform.display_name(),
        style = platform.style(),
    )
}

fn user_prompt(
    content: &ContentItem,
    profile: &UserVoiceProfile,
    platform: Platform,
    link: &str,
    now: DateTime<Utc>,
) -> String {
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "Write a {} post promoting this {}.",
        platform.display_name(),
        kind_noun(content.content_kind())
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Title: {}", content.title);
    let _ = writeln!(
        prompt,
        "Published: {}",
        time_context(content.published_at_utc(), now)
    );
    if let Some(excerpt) = content.excerpt.as_deref().filter(|e| !e.trim().is_empty()) {
        let _ = writeln!(
            prompt,
            "Summary: {}",
            truncate_chars(&collapse_whitespace(excerpt), MAX_PROMPT_EXCERPT_CHARS)
        );
    }
    if let Some(context) = content.context.as_deref().filter(|c| !c.trim().is_empty()) {
        let _ = writeln!(
            prompt,
            "Additional context: {}",
            truncate_chars(context.trim(), MAX_PROMPT_CONTEXT_CHARS)
        );
    }
    let _ = writeln!(prompt, "Link (for reference only): {link}");

    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Author: {}", profile.display_name);
    let bio = profile
        .bio
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or(DEFAULT_BIO);
    let _ = writeln!(prompt, "About the author: {bio}");

    if let Some(examples) = profile
        .example_posts
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
    {
        let _ = writeln!(prompt);
        let _ = writeln!(
            prompt,
            "Examples of the author's previous posts. Match their tone and structure:"
        );
        let _ = writeln!(prompt, "{examples}");
    }

    prompt
}

fn kind_noun(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Article => "article",
        ContentKind::Video => "video",
        ContentKind::Podcast => "podcast episode",
    }
}

/// Human description of how long ago something was published.
#[must_use]
pub fn time_context(published: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(published) = published else {
        return "recently".to_string();
    };

    let elapsed = now.signed_duration_since(published);
    if elapsed.num_seconds() < 0 {
        return "upcoming".to_string();
    }

    let days = elapsed.num_days();
    match days {
        0 => "today".to_string(),
        1 => "yesterday".to_string(),
        2..=6 => format!("{days} days ago"),
        7..=29 => plural(days / 7, "week"),
        30..=364 => plural(days / 30, "month"),
        _ => plural(days / 365, "year"),
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn content() -> ContentItem {
        ContentItem {
            id: 1,
            url: "https://blog.example.com/zero-trust".to_string(),
            canonical_url: "https://blog.example.com/zero-trust".to_string(),
            url_hash: "h".to_string(),
            title: "Zero Trust in Practice".to_string(),
            excerpt: Some("How we rolled out device posture checks.".to_string()),
            image_url: None,
            fixed_copy: None,
            context: Some("Written by our platform team".to_string()),
            utm_campaign: None,
            kind: "article".to_string(),
            published_at: Some("2024-06-12T08:00:00Z".to_string()),
            submitted_by: None,
            created_at: "2024-06-12T09:00:00Z".to_string(),
        }
    }

    fn profile() -> UserVoiceProfile {
        UserVoiceProfile {
            user_id: 1,
            display_name: "Dana".to_string(),
            email: "dana@example.com".to_string(),
            bio: None,
            example_posts: Some("Shipped it! Here's what we learned.".to_string()),
            slack_id: None,
            autonomous_mode: false,
            authorizations: HashMap::new(),
        }
    }

    #[test]
    fn test_time_context() {
        let now = now();
        assert_eq!(time_context(None, now), "recently");
        assert_eq!(time_context(Some(now + Duration::days(1)), now), "upcoming");
        assert_eq!(time_context(Some(now - Duration::hours(3)), now), "today");
        assert_eq!(time_context(Some(now - Duration::days(1)), now), "yesterday");
        assert_eq!(time_context(Some(now - Duration::days(3)), now), "3 days ago");
        assert_eq!(time_context(Some(now - Duration::days(7)), now), "1 week ago");
        assert_eq!(time_context(Some(now - Duration::days(20)), now), "2 weeks ago");
        assert_eq!(time_context(Some(now - Duration::days(65)), now), "2 months ago");
        assert_eq!(time_context(Some(now - Duration::days(400)), now), "1 year ago");
    }

    #[test]
    fn test_prompt_mentions_content_and_voice() {
        let prompt = build_prompt(
            &content(),
            &profile(),
            Platform::Linkedin,
            "https://blog.example.com/zero-trust?utm_source=li",
            now(),
        );
        assert!(prompt.system.contains("LinkedIn"));
        assert!(prompt.system.contains("2969 characters"));
        assert!(prompt.user.contains("Zero Trust in Practice"));
        assert!(prompt.user.contains("3 days ago"));
        assert!(prompt.user.contains("device posture"));
        assert!(prompt.user.contains("Written by our platform team"));
        assert!(prompt.user.contains(DEFAULT_BIO));
        assert!(prompt.user.contains("Shipped it!"));
        assert!(prompt.user.contains("utm_source=li"));
    }

    #[test]
    fn test_x_prompt_budget() {
        let prompt = build_prompt(&content(), &profile(), Platform::X, "https://x", now());
        assert!(prompt.system.contains("249 characters"));
        assert!(prompt.system.contains("hashtags"));
    }
}

//! Shared constants used across the application.

/// User agent sent with feed and API requests.
pub const USER_AGENT: &str = concat!("content-promoter/", env!("CARGO_PKG_VERSION"));

/// Characters a link is assumed to cost in a post, at minimum.
///
/// Platforms that shorten links still count them as a fixed-size token, so
/// short URLs are charged at least this much.
pub const URL_CHAR_ALLOWANCE: usize = 30;

/// Longest title stored for a content item, in characters.
pub const MAX_TITLE_CHARS: usize = 250;

/// Longest excerpt stored for a content item, in characters.
pub const MAX_EXCERPT_CHARS: usize = 500;

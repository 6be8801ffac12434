//! Content promoter library.
//!
//! Discovers new content from RSS/Atom feeds, writes platform-specific post
//! copy in each user's voice, publishes it on their behalf, and nudges users
//! about content they have not shared yet. Work runs as background jobs that
//! callers submit and poll.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod canonical;
pub mod config;
pub mod constants;
pub mod db;
pub mod dedup;
pub mod error;
pub mod feeds;
pub mod generate;
pub mod jobs;
pub mod notify;
pub mod platform;
pub mod profile;
pub mod publish;
pub mod retry;
pub mod scheduler;
pub mod text;
pub mod web;

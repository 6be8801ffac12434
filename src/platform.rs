//! Social platforms content can be promoted on.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A destination social platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linkedin,
    X,
    Bluesky,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Self::Linkedin, Self::X, Self::Bluesky];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linkedin => "linkedin",
            Self::X => "x",
            Self::Bluesky => "bluesky",
        }
    }

    /// Parse a platform name. `twitter` is accepted as an alias for X.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "linkedin" => Some(Self::Linkedin),
            "x" | "twitter" => Some(Self::X),
            "bluesky" | "bsky" => Some(Self::Bluesky),
            _ => None,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Linkedin => "LinkedIn",
            Self::X => "X",
            Self::Bluesky => "Bluesky",
        }
    }

    /// Hard character limit for a single post, link included.
    #[must_use]
    pub fn max_length(&self) -> usize {
        match self {
            Self::Linkedin => 3000,
            Self::X => 280,
            Self::Bluesky => 300,
        }
    }

    /// Output token cap handed to the text service.
    #[must_use]
    pub fn max_output_tokens(&self) -> u32 {
        match self {
            Self::Linkedin => 700,
            Self::X => 100,
            Self::Bluesky => 110,
        }
    }

    /// Tone guidance for generated copy.
    #[must_use]
    pub fn style(&self) -> &'static str {
        match self {
            Self::Linkedin => "Professional and informative, focusing on value and insights",
            Self::X => "Concise and engaging, with relevant hashtags",
            Self::Bluesky => "Conversational and direct, light on hashtags",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_platform() {
        assert_eq!(Platform::parse("LinkedIn"), Some(Platform::Linkedin));
        assert_eq!(Platform::parse("twitter"), Some(Platform::X));
        assert_eq!(Platform::parse(" x "), Some(Platform::X));
        assert_eq!(Platform::parse("bsky"), Some(Platform::Bluesky));
        assert_eq!(Platform::parse("myspace"), None);
    }

    #[test]
    fn test_round_trip_names() {
        for platform in Platform::ALL {
            assert_eq!(Platform::parse(platform.as_str()), Some(platform));
        }
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Platform::Linkedin).unwrap();
        assert_eq!(json, "\"linkedin\"");
        let parsed: Platform = serde_json::from_str("\"bluesky\"").unwrap();
        assert_eq!(parsed, Platform::Bluesky);
    }
}

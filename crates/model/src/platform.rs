use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// A departure track: a track number plus an optional letter phase,
/// rendered as "4" or "4a". A train may depart from several tracks at
/// once, so platform fields are ordered sequences of these.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub number: String,
    pub phase: Option<String>,
}

impl Platform {
    pub fn new<S: Into<String>>(number: S, phase: Option<String>) -> Self {
        Self {
            number: number.into(),
            phase,
        }
    }

    /// Split a compact rendering like "4a" back into number and phase.
    pub fn parse(text: &str) -> Self {
        let split = text
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(text.len());
        if split == 0 || split == text.len() {
            Self::new(text, None)
        } else {
            Self::new(&text[..split], Some(text[split..].to_owned()))
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.phase {
            Some(phase) => write!(f, "{}{}", self.number, phase),
            None => write!(f, "{}", self.number),
        }
    }
}

/// Render a platform sequence the way departure boards do: "4/5".
pub fn join_platforms(platforms: &[Platform]) -> String {
    platforms.iter().join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_number_only() {
        let platform = Platform::parse("12");
        assert_eq!(platform.number, "12");
        assert_eq!(platform.phase, None);
    }

    #[test]
    fn parse_number_with_phase() {
        let platform = Platform::parse("4a");
        assert_eq!(platform.number, "4");
        assert_eq!(platform.phase.as_deref(), Some("a"));
        assert_eq!(platform.to_string(), "4a");
    }

    #[test]
    fn join_renders_slash_separated() {
        let platforms = vec![Platform::parse("4a"), Platform::parse("5")];
        assert_eq!(join_platforms(&platforms), "4a/5");
    }
}

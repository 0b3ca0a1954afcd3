use serde::{Deserialize, Serialize};

/// A station record as the feed carries it: a short code plus three name
/// lengths. Stations are used by reference only and never mutated.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub code: String,
    pub short_name: String,
    pub medium_name: String,
    pub long_name: String,
    pub uic: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl Station {
    /// Build a station record from a code and a single display name,
    /// used when the source offers no separate name lengths.
    pub fn with_name<S: Into<String>>(code: S, name: S) -> Self {
        let name = name.into();
        Self {
            code: code.into(),
            short_name: name.clone(),
            medium_name: name.clone(),
            long_name: name,
            uic: None,
            kind: None,
        }
    }
}

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::station::Station;

/// Change-message codes as the feed emits them. The numeric values are
/// stable and externally visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ModificationKind {
    Delayed = 10,
    PlatformChanged = 20,
    PlatformAllocated = 22,
    ScheduleChanged = 30,
    AdditionalTrain = 31,
    Cancelled = 32,
    Diverted = 33,
    TerminatesAt = 34,
    ContinuesTo = 35,
    StatusChanged = 40,
    AttentionGoesTo = 41,
    NoRealtime = 50,
    ReplacementBus = 51,
}

impl ModificationKind {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            10 => Some(Self::Delayed),
            20 => Some(Self::PlatformChanged),
            22 => Some(Self::PlatformAllocated),
            30 => Some(Self::ScheduleChanged),
            31 => Some(Self::AdditionalTrain),
            32 => Some(Self::Cancelled),
            33 => Some(Self::Diverted),
            34 => Some(Self::TerminatesAt),
            35 => Some(Self::ContinuesTo),
            40 => Some(Self::StatusChanged),
            41 => Some(Self::AttentionGoesTo),
            50 => Some(Self::NoRealtime),
            51 => Some(Self::ReplacementBus),
            _ => None,
        }
    }
}

/// A typed change message attached to a train or a wing, optionally
/// carrying a cause and a station reference (for terminates-at and
/// similar kinds).
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    pub kind: ModificationKind,
    pub cause_short: Option<String>,
    pub cause_long: Option<String>,
    pub station: Option<Station>,
}

impl Modification {
    pub fn new(kind: ModificationKind) -> Self {
        Self {
            kind,
            cause_short: None,
            cause_long: None,
            station: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_round_trip() {
        for code in [10, 20, 22, 30, 31, 32, 33, 34, 35, 40, 41, 50, 51] {
            let kind = ModificationKind::from_code(code).unwrap();
            assert_eq!(kind as u8, code);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert_eq!(ModificationKind::from_code(99), None);
    }
}

use serde::{Deserialize, Serialize};

use crate::modification::Modification;
use crate::platform::Platform;
use crate::station::Station;

/// A coupled segment of a train with its own final destination, stopping
/// pattern and rolling stock. A train consists of one or more wings; split
/// trains have one wing per final destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wing {
    pub planned_destination: Station,
    pub current_destination: Station,
    pub planned_platform: Vec<Platform>,
    pub current_platform: Vec<Platform>,
    pub planned_stops: Vec<Station>,
    pub current_stops: Vec<Station>,
    pub composition: Vec<RollingStockUnit>,
    pub modifications: Vec<Modification>,
}

impl Wing {
    /// A fresh wing towards the given destination; the current destination
    /// starts out equal to the planned one.
    pub fn towards(destination: Station) -> Self {
        Self {
            planned_destination: destination.clone(),
            current_destination: destination,
            planned_platform: Vec::new(),
            current_platform: Vec::new(),
            planned_stops: Vec::new(),
            current_stops: Vec::new(),
            composition: Vec::new(),
            modifications: Vec::new(),
        }
    }
}

/// One rolling-stock part of a wing, e.g. a single VIRM set. Parts can have
/// their own destination when the train splits further down the line.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingStockUnit {
    pub kind: String,
    pub designation: Option<String>,
    pub length: Option<String>,
    pub planned_destination: Option<Station>,
    pub current_destination: Option<Station>,
    pub departure_position: Option<String>,
    pub departure_order: Option<String>,
}

impl RollingStockUnit {
    /// Compact unit-type rendering, e.g. "VIRM-6".
    pub fn unit_type(&self) -> String {
        match &self.designation {
            Some(designation) => format!("{}-{}", self.kind, designation),
            None => self.kind.clone(),
        }
    }
}

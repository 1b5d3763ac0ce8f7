//! # Tester configuration
//!
//! JSON document read at startup. Every field has a default, so `{}` is a
//! valid configuration:
//!
//! ```json
//! {
//!     "socket": "zif40",
//!     "cycles_per_poll": 4096,
//!     "bad_threshold_percent": 90,
//!     "second_pass": true,
//!     "address_order": "sequential",
//!     "refresh_margin_percent": 10,
//!     "max_reported_mismatches": 64,
//!     "families": []
//! }
//! ```
//!
//! `families` holds extra chip profiles in the same shape the compiled-in
//! ones serialize to.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classifier::ResultClassifier;
use crate::error::Result;
use crate::profile::ChipProfile;
use crate::sequencer::AddressOrder;
use crate::socket::ZifGeneration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesterConfig {
    pub socket: ZifGeneration,
    /// Bus cycles run per `poll_progress` call.
    pub cycles_per_poll: u32,
    /// Share of failing cycles above which one pass is enough for Bad.
    pub bad_threshold_percent: u8,
    pub second_pass: bool,
    pub address_order: AddressOrder,
    /// Refresh sweeps start this far ahead of the budget.
    pub refresh_margin_percent: u8,
    pub max_reported_mismatches: usize,
    pub families: Vec<ChipProfile>,
}

impl Default for TesterConfig {
    fn default() -> Self {
        TesterConfig {
            socket: ZifGeneration::Zif40,
            cycles_per_poll: 4096,
            bad_threshold_percent: 90,
            second_pass: true,
            address_order: AddressOrder::Sequential,
            refresh_margin_percent: 10,
            max_reported_mismatches: 64,
            families: Vec::new(),
        }
    }
}

impl TesterConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn classifier(&self) -> ResultClassifier {
        ResultClassifier::new(self.bad_threshold_percent, self.second_pass)
    }
}

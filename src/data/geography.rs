//! Reference list of states and their districts
//!
//! Served as-is to clients populating location dropdowns. A JSON file with
//! the same shape can replace the built-in table.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Built-in `(state, districts)` table
const BUILTIN: [(&str, &[&str]); 3] = [
    ("Andhra Pradesh", &["Guntur", "Vijayawada"]),
    ("Maharashtra", &["Baramati", "Nashik", "Pune", "Solapur"]),
    (
        "Telangana",
        &["Hyderabad", "Karimnagar", "Nizamabad", "Warangal"],
    ),
];

/// States and the districts inside each
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geography {
    #[serde(default)]
    pub states: Vec<String>,
    #[serde(default, rename = "stateDistricts")]
    pub state_districts: BTreeMap<String, Vec<String>>,
}

impl Geography {
    /// The compiled-in table covering every market with known coordinates
    pub fn builtin() -> Self {
        let state_districts: BTreeMap<String, Vec<String>> = BUILTIN
            .iter()
            .map(|(state, districts)| {
                let districts = districts.iter().map(|d| d.to_string()).collect();
                (state.to_string(), districts)
            })
            .collect();

        Self {
            states: state_districts.keys().cloned().collect(),
            state_districts,
        }
    }

    /// Loads a geography JSON file (`{ "states": [...], "stateDistricts": {...} }`)
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Geography {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Default for Geography {
    fn default() -> Self {
        Self::builtin()
    }
}

//! County/state to administrative area code resolution.
//!
//! Alert boundaries carry area codes; ground reports carry county and state
//! names. The table joining the two is deployment-supplied data, not
//! something this crate derives, so the engine depends on the trait and the
//! process loads whatever table it is given.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

pub trait AreaIndex: Send + Sync {
    /// Resolve a report's county and state to the area code alert
    /// boundaries are keyed by.
    fn area_code(&self, county: &str, state: &str) -> Option<String>;
}

/// In-memory index over county/state pairs. Lookups are case and
/// surrounding-whitespace insensitive.
#[derive(Debug, Default)]
pub struct StaticAreaIndex {
    codes: HashMap<(String, String), String>,
}

#[derive(Debug, Deserialize)]
struct AreaEntry {
    county: String,
    state: String,
    code: String,
}

impl StaticAreaIndex {
    pub fn from_pairs(pairs: &[(&str, &str, &str)]) -> Self {
        let mut index = Self::default();
        for (county, state, code) in pairs {
            index.insert(county, state, code);
        }
        index
    }

    /// Parse a JSON array of `{"county", "state", "code"}` entries.
    pub fn from_json(body: &str) -> Result<Self> {
        let entries: Vec<AreaEntry> =
            serde_json::from_str(body).context("Failed to parse area index entries")?;
        let mut index = Self::default();
        for entry in &entries {
            index.insert(&entry.county, &entry.state, &entry.code);
        }
        Ok(index)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read area index {}", path.display()))?;
        Self::from_json(&body)
            .with_context(|| format!("Failed to parse area index {}", path.display()))
    }

    pub fn insert(&mut self, county: &str, state: &str, code: &str) {
        self.codes.insert(key(county, state), code.trim().to_string());
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl AreaIndex for StaticAreaIndex {
    fn area_code(&self, county: &str, state: &str) -> Option<String> {
        self.codes.get(&key(county, state)).cloned()
    }
}

fn key(county: &str, state: &str) -> (String, String) {
    (state.trim().to_uppercase(), county.trim().to_uppercase())
}

//! Template style → BPM lookup used by the fallback path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BPM: f64 = 120.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleTable {
    /// Style name (lowercase) → tempo
    pub bpm: BTreeMap<String, f64>,
    /// Tempo for styles not in the table
    pub default_bpm: f64,
}

impl Default for StyleTable {
    fn default() -> Self {
        let bpm = [
            ("flashy", 128.0),
            ("smooth-zoom", 90.0),
            ("amv", 140.0),
            ("minimal", 100.0),
        ]
        .into_iter()
        .map(|(name, bpm)| (name.to_string(), bpm))
        .collect();

        Self {
            bpm,
            default_bpm: DEFAULT_BPM,
        }
    }
}

impl StyleTable {
    /// Tempo for a template style. Lookup ignores case and surrounding
    /// whitespace; unusable table entries fall through to the default.
    pub fn bpm_for(&self, style: &str) -> f64 {
        let key = style.trim().to_lowercase();
        match self.bpm.get(&key) {
            Some(bpm) if bpm.is_finite() && *bpm > 0.0 => *bpm,
            _ => self.fallback_bpm(),
        }
    }

    fn fallback_bpm(&self) -> f64 {
        if self.default_bpm.is_finite() && self.default_bpm > 0.0 {
            self.default_bpm
        } else {
            DEFAULT_BPM
        }
    }
}

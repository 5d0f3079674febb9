//! Beat Grid Generator
//!
//! Builds an evenly spaced beat grid from a tempo. No audio is analysed: the
//! tempo is either estimated upstream or taken from the style table.

use serde::{Deserialize, Serialize};

use crate::error::InvalidParameter;
use crate::model::round_time;

/// Every Nth beat is a hard beat (one per bar in 4/4).
pub const DEFAULT_HARD_BEAT_INTERVAL: usize = 4;

/// Spacing of representable timestamps at two decimals
const TIME_STEP: f64 = 0.01;

/// Beat timestamps for one plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatGrid {
    pub bpm: f64,
    pub beats: Vec<f64>,        // Beat timestamps in seconds
    pub hard_beats: Vec<f64>,   // Accented beats used as effect triggers
}

impl BeatGrid {
    /// Generate the grid for `total_duration` seconds.
    ///
    /// Timestamps are `index * interval` rounded to two decimals; a rounded
    /// value that repeats its predecessor is skipped so the grid stays
    /// strictly increasing at very high tempos.
    pub fn generate(
        bpm: f64,
        total_duration: f64,
        hard_beat_interval: usize,
    ) -> Result<Self, InvalidParameter> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(InvalidParameter::Bpm(bpm));
        }
        if !total_duration.is_finite() || total_duration <= 0.0 {
            return Err(InvalidParameter::Duration(total_duration));
        }
        if hard_beat_interval == 0 {
            return Err(InvalidParameter::HardBeatInterval);
        }

        let beat_interval = 60.0 / bpm;
        // Under half a step apart, every representable slot holds a beat
        let step = if beat_interval < TIME_STEP / 2.0 {
            TIME_STEP
        } else {
            beat_interval
        };
        let mut beats: Vec<f64> = Vec::new();
        let mut hard_beats = Vec::new();

        let mut index = 0usize;
        loop {
            let raw = index as f64 * step;
            if raw >= total_duration {
                break;
            }
            let time = round_time(raw);
            index += 1;

            if time >= total_duration || beats.last().is_some_and(|last| *last >= time) {
                continue;
            }
            if beats.len() % hard_beat_interval == 0 {
                hard_beats.push(time);
            }
            beats.push(time);
        }

        tracing::debug!(
            "Generated beat grid: bpm={}, beats={}, hard_beats={}",
            bpm,
            beats.len(),
            hard_beats.len()
        );

        Ok(Self {
            bpm,
            beats,
            hard_beats,
        })
    }

    /// Get the beat interval in seconds
    pub fn beat_interval(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Find the nearest beat to a given time
    pub fn nearest_beat(&self, time: f64) -> f64 {
        nearest(&self.beats, time)
    }

    /// Find the nearest hard beat to a given time
    pub fn nearest_hard_beat(&self, time: f64) -> f64 {
        nearest(&self.hard_beats, time)
    }
}

fn nearest(points: &[f64], time: f64) -> f64 {
    points
        .iter()
        .copied()
        .min_by(|a, b| (time - a).abs().total_cmp(&(time - b).abs()))
        .unwrap_or(time)
}

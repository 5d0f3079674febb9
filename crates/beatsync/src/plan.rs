//! Local plan compilation: beat grid → segments → effect timings.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::beat_grid::{BeatGrid, DEFAULT_HARD_BEAT_INTERVAL};
use crate::effect_timing::{assign_effect_timings, IntensityPolicy};
use crate::error::InvalidParameter;
use crate::model::{round_time, BeatPlan, PlanRequest};
use crate::segments::{compile_segments, SegmentConfig};

/// Plan shape settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Output length; shorter music shortens the plan.
    pub target_duration_seconds: f64,
    pub hard_beat_interval: usize,
    pub segments: SegmentConfig,
    pub intensity: IntensityPolicy,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            target_duration_seconds: 15.0,
            hard_beat_interval: DEFAULT_HARD_BEAT_INTERVAL,
            segments: SegmentConfig::default(),
            intensity: IntensityPolicy::default(),
        }
    }
}

impl PlanConfig {
    /// Output length for a track of `music_duration_seconds`.
    pub fn total_duration_for(&self, music_duration_seconds: f64) -> f64 {
        let target = self.target_duration_seconds;
        if target.is_finite() && target > 0.0 {
            round_time(target.min(music_duration_seconds))
        } else {
            round_time(music_duration_seconds)
        }
    }
}

/// Build a complete plan at a known tempo.
pub fn compile_plan<R: Rng>(
    bpm: f64,
    request: &PlanRequest,
    config: &PlanConfig,
    rng: &mut R,
) -> Result<BeatPlan, InvalidParameter> {
    request.validate()?;
    let total_duration = config.total_duration_for(request.music_duration_seconds);
    if total_duration <= 0.0 {
        return Err(InvalidParameter::Duration(request.music_duration_seconds));
    }

    let grid = BeatGrid::generate(bpm, total_duration, config.hard_beat_interval)?;
    let segments = compile_segments(
        Some(&grid.beats),
        total_duration,
        request.num_clips,
        &config.segments,
    )?;
    let effect_timings = assign_effect_timings(
        &grid.hard_beats,
        &request.selected_effects,
        &config.intensity,
        rng,
    )?;

    Ok(BeatPlan {
        bpm,
        total_duration,
        beats: grid.beats,
        hard_beats: grid.hard_beats,
        segments,
        effect_timings,
    })
}

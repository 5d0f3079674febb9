//! Plan data model
//!
//! `BeatPlan` is the single artifact the compiler produces. It is serialized
//! with camelCase keys so the JSON matches the `BeatData` record the renderer
//! and the project store already understand.

use serde::{Deserialize, Serialize};

use crate::error::InvalidParameter;

/// Decimal places kept on every timestamp.
pub const TIME_PRECISION: i32 = 2;

/// Round a timestamp to [`TIME_PRECISION`] decimals.
pub fn round_time(t: f64) -> f64 {
    let factor = 10f64.powi(TIME_PRECISION);
    (t * factor).round() / factor
}

/// A contiguous slice of the output mapped to one source clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub clip_index: usize,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Half-open containment: `start <= time < end`.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }
}

/// An effect fired at a hard beat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectTiming {
    pub time: f64,
    pub effect: String,
    pub intensity: u8,
}

/// The complete edit plan handed to the renderer (`BeatData`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatPlan {
    pub bpm: f64,
    pub total_duration: f64,
    pub beats: Vec<f64>,
    pub hard_beats: Vec<f64>,
    pub segments: Vec<Segment>,
    pub effect_timings: Vec<EffectTiming>,
}

impl BeatPlan {
    /// Segment whose `[start, end)` window holds `time`.
    pub fn segment_at(&self, time: f64) -> Option<&Segment> {
        self.segments.iter().find(|s| s.contains(time))
    }

    /// First effect timing that lands inside `segment`.
    pub fn effect_for(&self, segment: &Segment) -> Option<&EffectTiming> {
        self.effect_timings.iter().find(|e| segment.contains(e.time))
    }

    /// Number of segments assigned to each clip index.
    pub fn clip_usage(&self, num_clips: usize) -> Vec<usize> {
        let mut usage = vec![0; num_clips];
        for segment in &self.segments {
            if let Some(count) = usage.get_mut(segment.clip_index) {
                *count += 1;
            }
        }
        usage
    }
}

/// Input to plan generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub template_style: String,
    pub music_duration_seconds: f64,
    pub num_clips: usize,
    pub selected_effects: Vec<String>,
}

impl PlanRequest {
    pub fn new(
        template_style: impl Into<String>,
        music_duration_seconds: f64,
        num_clips: usize,
        selected_effects: Vec<String>,
    ) -> Self {
        Self {
            template_style: template_style.into(),
            music_duration_seconds,
            num_clips,
            selected_effects,
        }
    }

    /// Reject input that no plan could satisfy.
    ///
    /// A duration that rounds to 0 at the 2-decimal time precision is
    /// rejected along with non-finite and non-positive ones.
    pub fn validate(&self) -> Result<(), InvalidParameter> {
        if self.num_clips == 0 {
            return Err(InvalidParameter::NoSourceClips);
        }
        if self.selected_effects.is_empty() {
            return Err(InvalidParameter::NoEffectsSelected);
        }
        let duration = self.music_duration_seconds;
        if !duration.is_finite() || duration <= 0.0 || round_time(duration) <= 0.0 {
            return Err(InvalidParameter::Duration(self.music_duration_seconds));
        }
        Ok(())
    }
}

//! Segment Compiler
//!
//! Partitions the output duration into a gapless cut list. With a beat grid the
//! cuts land on beats; without one a fixed "velocity edit" step is used. Clips
//! are assigned round-robin either way.

use serde::{Deserialize, Serialize};

use crate::error::InvalidParameter;
use crate::model::{round_time, Segment};

/// Bounds of the velocity-edit step length, in seconds.
pub const VELOCITY_RANGE: (f64, f64) = (0.3, 2.0);

/// Segment compiler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Shortest beat-aligned segment; fast tempos cut every few beats instead.
    pub min_segment_seconds: f64,
    /// Step length when no beat grid is available.
    pub velocity_segment_seconds: f64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            min_segment_seconds: 0.3,
            velocity_segment_seconds: 0.5,
        }
    }
}

/// Compile the cut list.
///
/// `beats` must start at 0 and be strictly increasing when given. The final
/// segment always ends at exactly `total_duration`, absorbing any remainder.
pub fn compile_segments(
    beats: Option<&[f64]>,
    total_duration: f64,
    num_clips: usize,
    config: &SegmentConfig,
) -> Result<Vec<Segment>, InvalidParameter> {
    if num_clips == 0 {
        return Err(InvalidParameter::NoSourceClips);
    }
    if !total_duration.is_finite() || total_duration <= 0.0 {
        return Err(InvalidParameter::Duration(total_duration));
    }

    let starts = match beats {
        Some(beats) if !beats.is_empty() => {
            beat_aligned_starts(beats, total_duration, config.min_segment_seconds)
        }
        _ => velocity_starts(total_duration, config.velocity_segment_seconds),
    };

    let segments: Vec<Segment> = starts
        .iter()
        .enumerate()
        .map(|(index, start)| Segment {
            start: *start,
            end: starts.get(index + 1).copied().unwrap_or(total_duration),
            clip_index: index % num_clips,
        })
        .collect();

    tracing::debug!(
        "Compiled {} segments over {}s for {} clips",
        segments.len(),
        total_duration,
        num_clips
    );

    Ok(segments)
}

/// Cut every `k` beats so no segment is shorter than `min_segment_seconds`.
/// A tail shorter than the minimum is merged into the segment before it.
fn beat_aligned_starts(beats: &[f64], total_duration: f64, min_segment_seconds: f64) -> Vec<f64> {
    let spacing = if beats.len() > 1 {
        (beats[beats.len() - 1] - beats[0]) / (beats.len() - 1) as f64
    } else {
        f64::INFINITY
    };

    let beats_per_cut = if spacing.is_finite() && spacing > 0.0 && min_segment_seconds > spacing {
        (min_segment_seconds / spacing).ceil() as usize
    } else {
        1
    };

    let mut starts: Vec<f64> = beats.iter().copied().step_by(beats_per_cut).collect();
    // The first cut is pinned to the origin regardless of the grid
    if let Some(first) = starts.first_mut() {
        *first = 0.0;
    }
    starts.retain(|start| *start < total_duration);
    while starts.len() > 1
        && starts
            .last()
            .is_some_and(|last| total_duration - last < min_segment_seconds)
    {
        starts.pop();
    }
    starts
}

fn velocity_starts(total_duration: f64, step: f64) -> Vec<f64> {
    let step = if step.is_finite() {
        step.clamp(VELOCITY_RANGE.0, VELOCITY_RANGE.1)
    } else {
        VELOCITY_RANGE.0
    };

    // Small epsilon so 15 / 0.5 counts as 30 full steps, not 29.999...
    let count = ((total_duration / step) + 1e-9).floor().max(1.0) as usize;
    (0..count).map(|i| round_time(i as f64 * step)).collect()
}

//! Plan repair and invariant checks
//!
//! Estimated plans are repaired where the fix is unambiguous (rounding, a
//! short or slightly long final segment, clip indices out of range, intensity
//! out of range) and then checked against the same invariants every plan must
//! satisfy. Anything else is rejected and the resolver falls back.

use thiserror::Error;

use crate::effect_timing::{MAX_INTENSITY, MIN_INTENSITY};
use crate::model::{round_time, BeatPlan, EffectTiming, Segment};
use crate::parse::RawPlan;

/// How far past the total duration a final segment may end and still be clamped.
pub const OVERSHOOT_TOLERANCE: f64 = 0.05;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanViolation {
    #[error("bpm {0} is not positive and finite")]
    Bpm(f64),

    #[error("total duration {0} is not positive and finite")]
    TotalDuration(f64),

    #[error("plan has no beats")]
    NoBeats,

    #[error("first beat is at {0}, not 0")]
    FirstBeat(f64),

    #[error("beats not strictly increasing at index {0}")]
    BeatOrder(usize),

    #[error("beat {0} outside [0, total duration)")]
    BeatRange(f64),

    #[error("hard beat {0} is not a beat")]
    HardBeatNotInBeats(f64),

    #[error("plan has no segments")]
    NoSegments,

    #[error("segments do not start at 0")]
    SegmentStart,

    #[error("gap or overlap between segments {0} and {1}")]
    SegmentGap(usize, usize),

    #[error("segment {0} is empty or reversed")]
    EmptySegment(usize),

    #[error("last segment ends at {end}, expected {total}")]
    SegmentEnd { end: f64, total: f64 },

    #[error("segment {index} uses clip {clip_index} of {num_clips}")]
    ClipIndex {
        index: usize,
        clip_index: usize,
        num_clips: usize,
    },

    #[error("clip {0} is never used")]
    UnusedClip(usize),

    #[error("effect at {0} lies outside every segment")]
    EffectTime(f64),

    #[error("effect '{0}' was not selected")]
    UnknownEffect(String),

    #[error("intensity {0} outside 1..=10")]
    Intensity(u8),

    #[error("estimate covers {estimated}s but {expected}s was requested")]
    TotalDurationMismatch { estimated: f64, expected: f64 },
}

/// Reject an estimate whose own `totalDuration` disagrees with the requested
/// output length. A missing total is accepted.
pub fn check_total_duration(raw: &RawPlan, expected: f64) -> Result<(), PlanViolation> {
    let Some(estimated) = raw.total_duration else {
        return Ok(());
    };
    if !estimated.is_finite() || (estimated - expected).abs() > OVERSHOOT_TOLERANCE + EPSILON {
        return Err(PlanViolation::TotalDurationMismatch { estimated, expected });
    }
    Ok(())
}

/// Apply unambiguous fixes to an estimated plan.
///
/// `total_duration` is the requested output length; the estimator's own
/// total is never used. Missing hard beats are derived every
/// `hard_beat_interval` beats.
pub fn repair_plan(
    raw: RawPlan,
    total_duration: f64,
    num_clips: usize,
    selected_effects: &[String],
    hard_beat_interval: usize,
) -> BeatPlan {
    let beats: Vec<f64> = raw.beats.iter().copied().map(round_time).collect();
    let hard_beats = match raw.hard_beats {
        Some(hard_beats) => hard_beats.into_iter().map(round_time).collect(),
        None => beats
            .iter()
            .copied()
            .step_by(hard_beat_interval.max(1))
            .collect(),
    };

    let mut segments: Vec<Segment> = raw
        .segments
        .iter()
        .map(|s| Segment {
            start: round_time(s.start),
            end: round_time(s.end),
            clip_index: s.clip_index.rem_euclid(num_clips.max(1) as i64) as usize,
        })
        .collect();

    if let Some(last) = segments.last_mut() {
        let short = last.end < total_duration;
        let slight_overshoot =
            last.end > total_duration && last.end - total_duration <= OVERSHOOT_TOLERANCE + EPSILON;
        if short || slight_overshoot {
            tracing::debug!("Repairing last segment end {} -> {}", last.end, total_duration);
            last.end = total_duration;
        }
    }

    let effect_timings = raw
        .effect_timings
        .into_iter()
        .map(|e| EffectTiming {
            time: round_time(e.time),
            // Match the user's spelling so downstream lookups are exact
            effect: selected_effects
                .iter()
                .find(|s| s.eq_ignore_ascii_case(e.effect.trim()))
                .cloned()
                .unwrap_or(e.effect),
            intensity: repair_intensity(e.intensity),
        })
        .collect();

    BeatPlan {
        bpm: raw.bpm,
        total_duration,
        beats,
        hard_beats,
        segments,
        effect_timings,
    }
}

fn repair_intensity(value: f64) -> u8 {
    if value.is_nan() {
        return MIN_INTENSITY;
    }
    value
        .round()
        .clamp(MIN_INTENSITY as f64, MAX_INTENSITY as f64) as u8
}

/// Check every plan invariant: beat order, hard beats, segment tiling, clip
/// coverage and effect placement.
pub fn validate_plan(
    plan: &BeatPlan,
    num_clips: usize,
    selected_effects: &[String],
) -> Result<(), PlanViolation> {
    let total = plan.total_duration;
    if !plan.bpm.is_finite() || plan.bpm <= 0.0 {
        return Err(PlanViolation::Bpm(plan.bpm));
    }
    if !total.is_finite() || total <= 0.0 {
        return Err(PlanViolation::TotalDuration(total));
    }

    // Beats
    let first = *plan.beats.first().ok_or(PlanViolation::NoBeats)?;
    if first.abs() > EPSILON {
        return Err(PlanViolation::FirstBeat(first));
    }
    for (index, pair) in plan.beats.windows(2).enumerate() {
        if pair[1] <= pair[0] {
            return Err(PlanViolation::BeatOrder(index + 1));
        }
    }
    if let Some(beat) = plan.beats.iter().find(|b| **b < 0.0 || **b >= total) {
        return Err(PlanViolation::BeatRange(*beat));
    }
    if let Some(hard) = plan
        .hard_beats
        .iter()
        .find(|h| !plan.beats.iter().any(|b| (*b - **h).abs() < EPSILON))
    {
        return Err(PlanViolation::HardBeatNotInBeats(*hard));
    }

    // Segments
    let first_segment = plan.segments.first().ok_or(PlanViolation::NoSegments)?;
    if first_segment.start.abs() > EPSILON {
        return Err(PlanViolation::SegmentStart);
    }
    for (index, segment) in plan.segments.iter().enumerate() {
        if segment.end <= segment.start {
            return Err(PlanViolation::EmptySegment(index));
        }
        if segment.clip_index >= num_clips {
            return Err(PlanViolation::ClipIndex {
                index,
                clip_index: segment.clip_index,
                num_clips,
            });
        }
    }
    for (index, pair) in plan.segments.windows(2).enumerate() {
        if (pair[0].end - pair[1].start).abs() > EPSILON {
            return Err(PlanViolation::SegmentGap(index, index + 1));
        }
    }
    if let Some(last) = plan.segments.last() {
        if (last.end - total).abs() > EPSILON {
            return Err(PlanViolation::SegmentEnd {
                end: last.end,
                total,
            });
        }
    }
    if plan.segments.len() >= num_clips {
        let usage = plan.clip_usage(num_clips);
        if let Some(unused) = usage.iter().position(|count| *count == 0) {
            return Err(PlanViolation::UnusedClip(unused));
        }
    }

    // Effects
    for timing in &plan.effect_timings {
        if plan.segment_at(timing.time).is_none() {
            return Err(PlanViolation::EffectTime(timing.time));
        }
        if !selected_effects.contains(&timing.effect) {
            return Err(PlanViolation::UnknownEffect(timing.effect.clone()));
        }
        if !(MIN_INTENSITY..=MAX_INTENSITY).contains(&timing.intensity) {
            return Err(PlanViolation::Intensity(timing.intensity));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{RawEffectTiming, RawSegment};

    fn effects() -> Vec<String> {
        vec!["zoom".to_string(), "shake".to_string()]
    }

    fn raw_plan() -> RawPlan {
        RawPlan {
            bpm: 120.0,
            total_duration: None,
            beats: (0..8).map(|i| i as f64 * 0.5).collect(),
            hard_beats: None,
            segments: vec![
                RawSegment { start: 0.0, end: 1.0, clip_index: 0 },
                RawSegment { start: 1.0, end: 2.0, clip_index: 1 },
                RawSegment { start: 2.0, end: 3.0, clip_index: 2 },
                RawSegment { start: 3.0, end: 3.9, clip_index: 3 },
            ],
            effect_timings: vec![
                RawEffectTiming { time: 0.0, effect: "Zoom".to_string(), intensity: 12.4 },
                RawEffectTiming { time: 2.004, effect: "shake".to_string(), intensity: 6.6 },
            ],
        }
    }

    #[test]
    fn test_repair_fixes_recoverable_problems() {
        let plan = repair_plan(raw_plan(), 4.0, 3, &effects(), 4);

        // Short tail extended, clip 3 wrapped to 0
        assert_eq!(plan.segments.last().unwrap().end, 4.0);
        assert_eq!(plan.segments[3].clip_index, 0);
        // Hard beats derived every 4 beats
        assert_eq!(plan.hard_beats, vec![0.0, 2.0]);
        // Rounded and clamped
        assert_eq!(plan.effect_timings[0].intensity, 10);
        assert_eq!(plan.effect_timings[0].effect, "zoom");
        assert_eq!(plan.effect_timings[1].time, 2.0);
        assert_eq!(plan.effect_timings[1].intensity, 7);

        assert_eq!(validate_plan(&plan, 3, &effects()), Ok(()));
    }

    #[test]
    fn test_slight_overshoot_is_clamped() {
        let mut raw = raw_plan();
        raw.segments[3].end = 4.04;
        let plan = repair_plan(raw, 4.0, 3, &effects(), 4);
        assert_eq!(plan.segments[3].end, 4.0);
    }

    #[test]
    fn test_large_overshoot_is_rejected() {
        let mut raw = raw_plan();
        raw.segments[3].end = 4.5;
        let plan = repair_plan(raw, 4.0, 3, &effects(), 4);
        assert!(matches!(
            validate_plan(&plan, 3, &effects()),
            Err(PlanViolation::SegmentEnd { .. })
        ));
    }

    #[test]
    fn test_gap_is_rejected() {
        let mut raw = raw_plan();
        raw.segments[1].end = 1.8;
        let plan = repair_plan(raw, 4.0, 3, &effects(), 4);
        assert_eq!(
            validate_plan(&plan, 3, &effects()),
            Err(PlanViolation::SegmentGap(1, 2))
        );
    }

    #[test]
    fn test_beats_must_start_at_zero_and_increase() {
        let mut raw = raw_plan();
        raw.beats = vec![0.2, 0.7];
        let plan = repair_plan(raw, 4.0, 3, &effects(), 4);
        assert_eq!(
            validate_plan(&plan, 3, &effects()),
            Err(PlanViolation::FirstBeat(0.2))
        );

        let mut raw = raw_plan();
        raw.beats = vec![0.0, 1.0, 1.0];
        let plan = repair_plan(raw, 4.0, 3, &effects(), 4);
        assert_eq!(
            validate_plan(&plan, 3, &effects()),
            Err(PlanViolation::BeatOrder(2))
        );
    }

    #[test]
    fn test_hard_beats_must_be_beats() {
        let mut raw = raw_plan();
        raw.hard_beats = Some(vec![0.0, 2.25]);
        let plan = repair_plan(raw, 4.0, 3, &effects(), 4);
        assert_eq!(
            validate_plan(&plan, 3, &effects()),
            Err(PlanViolation::HardBeatNotInBeats(2.25))
        );
    }

    #[test]
    fn test_unselected_effect_is_rejected() {
        let mut raw = raw_plan();
        raw.effect_timings[1].effect = "glitch".to_string();
        let plan = repair_plan(raw, 4.0, 3, &effects(), 4);
        assert_eq!(
            validate_plan(&plan, 3, &effects()),
            Err(PlanViolation::UnknownEffect("glitch".to_string()))
        );
    }

    #[test]
    fn test_effect_past_end_is_rejected() {
        let mut raw = raw_plan();
        raw.effect_timings[1].time = 4.0;
        let plan = repair_plan(raw, 4.0, 3, &effects(), 4);
        assert_eq!(
            validate_plan(&plan, 3, &effects()),
            Err(PlanViolation::EffectTime(4.0))
        );
    }

    #[test]
    fn test_unused_clip_is_rejected() {
        let mut raw = raw_plan();
        for segment in &mut raw.segments {
            segment.clip_index = 0;
        }
        let plan = repair_plan(raw, 4.0, 3, &effects(), 4);
        assert_eq!(
            validate_plan(&plan, 3, &effects()),
            Err(PlanViolation::UnusedClip(1))
        );
    }

    #[test]
    fn test_negative_clip_index_wraps() {
        let mut raw = raw_plan();
        raw.segments[0].clip_index = -1;
        let plan = repair_plan(raw, 4.0, 3, &effects(), 4);
        assert_eq!(plan.segments[0].clip_index, 2);
    }

    #[test]
    fn test_estimated_total_never_replaces_requested() {
        let mut raw = raw_plan();
        raw.total_duration = Some(40.0);
        assert_eq!(
            check_total_duration(&raw, 4.0),
            Err(PlanViolation::TotalDurationMismatch { estimated: 40.0, expected: 4.0 })
        );

        let plan = repair_plan(raw, 4.0, 3, &effects(), 4);
        assert_eq!(plan.total_duration, 4.0);
        assert_eq!(plan.segments.last().unwrap().end, 4.0);
    }

    #[test]
    fn test_estimated_total_within_tolerance() {
        let mut raw = raw_plan();
        assert_eq!(check_total_duration(&raw, 4.0), Ok(()));

        raw.total_duration = Some(4.03);
        assert_eq!(check_total_duration(&raw, 4.0), Ok(()));

        raw.total_duration = Some(f64::NAN);
        assert!(check_total_duration(&raw, 4.0).is_err());
    }
}

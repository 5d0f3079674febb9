//! Effect Timing Assigner
//!
//! Binds one effect to each hard beat, cycling through the user's selection.
//! The opening hard beats are the "drop" and fire at full intensity; the rest
//! draw a bounded intensity from an injected RNG so plans stay reproducible.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::InvalidParameter;
use crate::model::EffectTiming;

pub const MIN_INTENSITY: u8 = 1;
pub const MAX_INTENSITY: u8 = 10;

/// How intensities are chosen for hard beats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntensityPolicy {
    /// Leading `drop_beats` hard beats get `drop_intensity`, the rest a
    /// random value in `min..=max`.
    DropThenRandom {
        drop_beats: usize,
        drop_intensity: u8,
        min: u8,
        max: u8,
    },
    /// Every hard beat gets the same intensity.
    Fixed { intensity: u8 },
}

impl Default for IntensityPolicy {
    fn default() -> Self {
        IntensityPolicy::DropThenRandom {
            drop_beats: 1,
            drop_intensity: MAX_INTENSITY,
            min: 7,
            max: 9,
        }
    }
}

impl IntensityPolicy {
    fn intensity_for<R: Rng>(&self, index: usize, rng: &mut R) -> u8 {
        match *self {
            IntensityPolicy::DropThenRandom {
                drop_beats,
                drop_intensity,
                min,
                max,
            } => {
                if index < drop_beats {
                    clamp_intensity(drop_intensity)
                } else {
                    let low = clamp_intensity(min.min(max));
                    let high = clamp_intensity(min.max(max));
                    rng.gen_range(low..=high)
                }
            }
            IntensityPolicy::Fixed { intensity } => clamp_intensity(intensity),
        }
    }
}

pub fn clamp_intensity(intensity: u8) -> u8 {
    intensity.clamp(MIN_INTENSITY, MAX_INTENSITY)
}

/// Assign `selected_effects[i % len]` to the i-th hard beat.
pub fn assign_effect_timings<R: Rng>(
    hard_beats: &[f64],
    selected_effects: &[String],
    policy: &IntensityPolicy,
    rng: &mut R,
) -> Result<Vec<EffectTiming>, InvalidParameter> {
    if selected_effects.is_empty() {
        return Err(InvalidParameter::NoEffectsSelected);
    }

    Ok(hard_beats
        .iter()
        .enumerate()
        .map(|(index, time)| EffectTiming {
            time: *time,
            effect: selected_effects[index % selected_effects.len()].clone(),
            intensity: policy.intensity_for(index, rng),
        })
        .collect())
}

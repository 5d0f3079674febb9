//! Effect Filter Synthesizer
//!
//! Turns `(effect name, intensity, segment duration)` into a parametric effect
//! description and the ffmpeg filter expression the renderer runs for it:
//! - Zoom / smooth zoom (`zoompan`, centered, capped magnification)
//! - Shake (crop-and-recenter with distinct X/Y frequencies)
//! - Flash (`eq` brightness that decays right after the cut)
//! - Blur, glitch and reverse
//!
//! Unknown names degrade to a barely visible constant zoom, so synthesis is
//! total over its input domain.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::effect_timing::clamp_intensity;

/// Magnification used for effect names we don't recognise.
pub const SUBTLE_ZOOM_SCALE: f64 = 1.02;
/// How long a flash takes to fade out, in seconds.
pub const FLASH_DECAY_SECONDS: f64 = 0.15;
/// Shake frequencies in rad/s. Different on each axis so the motion is not a diagonal line.
pub const SHAKE_FREQ_X: f64 = 20.0;
pub const SHAKE_FREQ_Y: f64 = 25.0;

/// Output frame geometry the filters are built for
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for OutputFormat {
    /// 9:16 vertical at 30 fps
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
        }
    }
}

impl OutputFormat {
    /// Scale-and-crop that forces every segment into the output frame.
    pub fn normalize_filter(&self) -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}",
            w = self.width,
            h = self.height
        )
    }

    fn frame_seconds(&self) -> f64 {
        1.0 / self.fps.max(1) as f64
    }
}

/// Recognised effect vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectKind {
    Zoom,
    SmoothZoom,
    Shake,
    ShakeLight,
    ShakeHeavy,
    Flash,
    Blur,
    Glitch,
    Reverse,
    Unknown,
}

impl EffectKind {
    /// Case-insensitive; `_` and spaces count as `-`.
    pub fn parse(name: &str) -> Self {
        let normalized = name.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "zoom" | "zoom-in" => EffectKind::Zoom,
            "smooth-zoom" => EffectKind::SmoothZoom,
            "shake" => EffectKind::Shake,
            "shake-light" => EffectKind::ShakeLight,
            "shake-heavy" => EffectKind::ShakeHeavy,
            "flash" => EffectKind::Flash,
            "blur" => EffectKind::Blur,
            "glitch" => EffectKind::Glitch,
            "reverse" => EffectKind::Reverse,
            _ => EffectKind::Unknown,
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EffectKind::Zoom => "zoom",
            EffectKind::SmoothZoom => "smooth-zoom",
            EffectKind::Shake => "shake",
            EffectKind::ShakeLight => "shake-light",
            EffectKind::ShakeHeavy => "shake-heavy",
            EffectKind::Flash => "flash",
            EffectKind::Blur => "blur",
            EffectKind::Glitch => "glitch",
            EffectKind::Reverse => "reverse",
            EffectKind::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Concrete effect parameters for one segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectFilter {
    /// Magnification ramps from 1.0 to `max_scale` over `ramp_seconds`, then
    /// holds. A zero ramp means a constant `max_scale`.
    Zoom { max_scale: f64, ramp_seconds: f64 },

    /// Periodic displacement of up to `amplitude_px` on each axis.
    Shake {
        amplitude_px: u32,
        freq_x: f64,
        freq_y: f64,
    },

    /// Brightness boost of `peak_brightness` at t=0, linear to zero by `decay_seconds`.
    Flash {
        peak_brightness: f64,
        decay_seconds: f64,
    },

    Blur { radius: u32 },

    Glitch { shift_px: u32 },

    Reverse,
}

impl EffectFilter {
    /// Build the filter for one effect trigger.
    ///
    /// Intensity is clamped into 1..=10 and a non-positive or non-finite
    /// duration is treated as a single frame; this never fails.
    pub fn synthesize(effect: &str, intensity: u8, duration: f64, format: &OutputFormat) -> Self {
        let intensity = clamp_intensity(intensity);
        let normalized = intensity as f64 / 10.0;
        let duration = if duration.is_finite() && duration > 0.0 {
            duration
        } else {
            format.frame_seconds()
        };

        match EffectKind::parse(effect) {
            EffectKind::Zoom => EffectFilter::Zoom {
                max_scale: 1.0 + 0.5 * normalized,
                // Higher intensity reaches the cap sooner
                ramp_seconds: duration * (11.0 - intensity as f64) / 10.0,
            },
            EffectKind::SmoothZoom => EffectFilter::Zoom {
                max_scale: 1.0 + 0.5 * normalized,
                ramp_seconds: duration,
            },
            kind @ (EffectKind::Shake | EffectKind::ShakeLight | EffectKind::ShakeHeavy) => {
                let multiplier = match kind {
                    EffectKind::ShakeLight => 0.4,
                    EffectKind::ShakeHeavy => 2.0,
                    _ => 1.0,
                };
                EffectFilter::Shake {
                    amplitude_px: ((2.0 * intensity as f64 * multiplier).round() as u32).max(1),
                    freq_x: SHAKE_FREQ_X,
                    freq_y: SHAKE_FREQ_Y,
                }
            }
            EffectKind::Flash => EffectFilter::Flash {
                peak_brightness: 0.3 * normalized,
                decay_seconds: FLASH_DECAY_SECONDS.min(duration),
            },
            EffectKind::Blur => EffectFilter::Blur {
                radius: (intensity as u32 / 5).max(1),
            },
            EffectKind::Glitch => EffectFilter::Glitch {
                shift_px: intensity as u32,
            },
            EffectKind::Reverse => EffectFilter::Reverse,
            EffectKind::Unknown => {
                tracing::debug!("Unknown effect '{}', using subtle zoom", effect);
                EffectFilter::Zoom {
                    max_scale: SUBTLE_ZOOM_SCALE,
                    ramp_seconds: 0.0,
                }
            }
        }
    }

    /// Magnification at `t` seconds into the segment (1.0 for non-zoom effects).
    pub fn zoom_at(&self, t: f64) -> f64 {
        match self {
            EffectFilter::Zoom {
                max_scale,
                ramp_seconds,
            } => {
                if *ramp_seconds <= 0.0 {
                    *max_scale
                } else {
                    (1.0 + (max_scale - 1.0) * t.max(0.0) / ramp_seconds).min(*max_scale)
                }
            }
            _ => 1.0,
        }
    }

    /// Crop offset from the centered position at `t`.
    pub fn shake_offset_at(&self, t: f64) -> (f64, f64) {
        match self {
            EffectFilter::Shake {
                amplitude_px,
                freq_x,
                freq_y,
            } => {
                let a = *amplitude_px as f64;
                (a * (t * freq_x).sin(), a * (t * freq_y).cos())
            }
            _ => (0.0, 0.0),
        }
    }

    /// Brightness added at `t`.
    pub fn brightness_at(&self, t: f64) -> f64 {
        match self {
            EffectFilter::Flash {
                peak_brightness,
                decay_seconds,
            } => peak_brightness * (1.0 - t.max(0.0) / decay_seconds).max(0.0),
            _ => 0.0,
        }
    }

    /// ffmpeg filter expression. Expressions containing commas are quoted so
    /// the result can be dropped into a filter graph as is.
    pub fn to_ffmpeg(&self, format: &OutputFormat) -> String {
        match self {
            EffectFilter::Zoom {
                max_scale,
                ramp_seconds,
            } => {
                let z = if *ramp_seconds <= 0.0 {
                    format!("{:.3}", max_scale)
                } else {
                    let rate = (max_scale - 1.0) / ramp_seconds;
                    format!("min(1+{:.4}*on/{},{:.3})", rate, format.fps, max_scale)
                };
                format!(
                    "zoompan=z='{}':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d=1:s={}x{}:fps={}",
                    z, format.width, format.height, format.fps
                )
            }
            EffectFilter::Shake {
                amplitude_px,
                freq_x,
                freq_y,
            } => {
                let a = amplitude_px;
                format!(
                    "crop=iw-{d}:ih-{d}:x='{a}+{a}*sin(t*{fx})':y='{a}+{a}*cos(t*{fy})',scale={w}:{h}",
                    d = a * 2,
                    a = a,
                    fx = freq_x,
                    fy = freq_y,
                    w = format.width,
                    h = format.height
                )
            }
            EffectFilter::Flash {
                peak_brightness,
                decay_seconds,
            } => format!(
                "eq=brightness='{:.3}*max(0,1-t/{:.3})':eval=frame",
                peak_brightness, decay_seconds
            ),
            EffectFilter::Blur { radius } => format!("boxblur={}:1", radius),
            EffectFilter::Glitch { shift_px } => {
                format!("rgbashift=rh=-{}:bh={}", shift_px, shift_px)
            }
            EffectFilter::Reverse => "reverse".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effect_kind_parse() {
        assert_eq!(EffectKind::parse("zoom"), EffectKind::Zoom);
        assert_eq!(EffectKind::parse("Smooth Zoom"), EffectKind::SmoothZoom);
        assert_eq!(EffectKind::parse("smooth_zoom"), EffectKind::SmoothZoom);
        assert_eq!(EffectKind::parse("SHAKE-heavy"), EffectKind::ShakeHeavy);
        assert_eq!(EffectKind::parse("sparkles"), EffectKind::Unknown);
        assert_eq!(EffectKind::Shake.to_string(), "shake");
    }

    #[test]
    fn test_zoom_caps_by_intensity() {
        let format = OutputFormat::default();
        let full = EffectFilter::synthesize("zoom", 10, 1.0, &format);
        let light = EffectFilter::synthesize("zoom", 2, 1.0, &format);

        assert!((full.zoom_at(10.0) - 1.5).abs() < 1e-9);
        assert!((light.zoom_at(10.0) - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_is_monotonic_and_higher_intensity_peaks_sooner() {
        let format = OutputFormat::default();
        let hard = EffectFilter::synthesize("zoom", 10, 1.0, &format);
        let soft = EffectFilter::synthesize("zoom", 3, 1.0, &format);

        let samples: Vec<f64> = (0..=20).map(|i| hard.zoom_at(i as f64 * 0.05)).collect();
        assert!(samples.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(hard.zoom_at(0.0), 1.0);

        // Intensity 10 caps after 0.1s, intensity 3 only after 0.8s
        assert!((hard.zoom_at(0.1) - 1.5).abs() < 1e-9);
        assert!(soft.zoom_at(0.1) < 1.15);
    }

    #[test]
    fn test_smooth_zoom_ramps_over_whole_segment() {
        let format = OutputFormat::default();
        let filter = EffectFilter::synthesize("smooth-zoom", 10, 2.0, &format);
        assert!((filter.zoom_at(1.0) - 1.25).abs() < 1e-9);
        assert!((filter.zoom_at(2.0) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_shake_uses_distinct_frequencies() {
        let format = OutputFormat::default();
        let filter = EffectFilter::synthesize("shake", 5, 0.5, &format);
        assert_eq!(
            filter,
            EffectFilter::Shake {
                amplitude_px: 10,
                freq_x: 20.0,
                freq_y: 25.0
            }
        );

        let expr = filter.to_ffmpeg(&format);
        assert!(expr.starts_with("crop=iw-20:ih-20:"));
        assert!(expr.contains("sin(t*20)"));
        assert!(expr.contains("cos(t*25)"));
        assert!(expr.ends_with("scale=1080:1920"));
    }

    #[test]
    fn test_shake_variants_scale_amplitude() {
        let format = OutputFormat::default();
        let amplitude = |name| match EffectFilter::synthesize(name, 10, 1.0, &format) {
            EffectFilter::Shake { amplitude_px, .. } => amplitude_px,
            other => panic!("expected shake, got {:?}", other),
        };
        assert_eq!(amplitude("shake-light"), 8);
        assert_eq!(amplitude("shake"), 20);
        assert_eq!(amplitude("shake-heavy"), 40);
    }

    #[test]
    fn test_flash_decays_within_window() {
        let format = OutputFormat::default();
        let filter = EffectFilter::synthesize("flash", 10, 0.5, &format);

        assert!((filter.brightness_at(0.0) - 0.3).abs() < 1e-9);
        assert!(filter.brightness_at(0.075) > 0.0);
        assert_eq!(filter.brightness_at(0.15), 0.0);
        assert_eq!(filter.brightness_at(0.4), 0.0);
        assert!(filter.to_ffmpeg(&format).contains("eval=frame"));
    }

    #[test]
    fn test_unknown_effect_degrades_to_subtle_zoom() {
        let format = OutputFormat::default();
        let filter = EffectFilter::synthesize("vortex", 9, 1.0, &format);
        assert_eq!(filter.zoom_at(0.0), SUBTLE_ZOOM_SCALE);
        assert_eq!(filter.zoom_at(1.0), SUBTLE_ZOOM_SCALE);
        assert!(filter.to_ffmpeg(&format).starts_with("zoompan=z='1.020'"));
    }

    #[test]
    fn test_synthesis_is_total() {
        let format = OutputFormat::default();
        let names = [
            "zoom", "smooth-zoom", "shake", "shake-light", "shake-heavy", "flash", "blur",
            "glitch", "reverse", "", "??", "Zoom In",
        ];
        for name in names {
            for intensity in 0..=12u8 {
                for duration in [0.0, -1.0, f64::NAN, 0.01, 0.5, 15.0] {
                    let filter = EffectFilter::synthesize(name, intensity, duration, &format);
                    assert!(!filter.to_ffmpeg(&format).is_empty());
                    assert!(filter.zoom_at(0.5).is_finite());
                }
            }
        }
    }

    #[test]
    fn test_supplementary_filters() {
        let format = OutputFormat::default();
        assert_eq!(
            EffectFilter::synthesize("blur", 10, 1.0, &format).to_ffmpeg(&format),
            "boxblur=2:1"
        );
        assert_eq!(
            EffectFilter::synthesize("glitch", 6, 1.0, &format).to_ffmpeg(&format),
            "rgbashift=rh=-6:bh=6"
        );
        assert_eq!(
            EffectFilter::synthesize("reverse", 6, 1.0, &format).to_ffmpeg(&format),
            "reverse"
        );
    }

    #[test]
    fn test_normalize_filter() {
        assert_eq!(
            OutputFormat::default().normalize_filter(),
            "scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920"
        );
    }
}

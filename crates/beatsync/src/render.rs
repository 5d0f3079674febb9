//! Render Spec Builder
//!
//! Turns a plan and the uploaded clip URLs into the job the encoding backend
//! runs: one filter chain per segment plus the concat filter graph.

use serde::{Deserialize, Serialize};

use crate::error::InvalidParameter;
use crate::filters::{EffectFilter, OutputFormat};
use crate::model::{round_time, BeatPlan, EffectTiming};

/// One segment of the output as the renderer sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSegment {
    pub index: usize,
    pub clip_index: usize,
    pub clip_url: String,
    pub start: f64,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<EffectTiming>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect_filter: Option<EffectFilter>,
    /// Complete ffmpeg chain for this segment, normalization included
    pub filters: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration: f64,
    pub clip_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music_url: Option<String>,
    pub segments: Vec<RenderSegment>,
    pub filter_complex: String,
}

impl RenderSpec {
    /// ffmpeg arguments for rendering this spec into `output`.
    pub fn ffmpeg_args(&self, output: &str) -> Vec<String> {
        let mut args = Vec::new();
        for url in &self.clip_urls {
            args.push("-i".to_string());
            args.push(url.clone());
        }
        if let Some(music) = &self.music_url {
            args.push("-i".to_string());
            args.push(music.clone());
        }

        args.push("-filter_complex".to_string());
        args.push(self.filter_complex.clone());
        args.push("-map".to_string());
        args.push("[outv]".to_string());
        if self.music_url.is_some() {
            args.push("-map".to_string());
            args.push(format!("{}:a", self.clip_urls.len()));
            args.push("-shortest".to_string());
        }
        args.extend([
            "-t".to_string(),
            self.duration.to_string(),
            "-r".to_string(),
            self.fps.to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-y".to_string(),
            output.to_string(),
        ]);
        args
    }
}

/// Build the render job for `plan`.
///
/// A segment's effect is the first effect timing inside its `[start, end)`
/// window whose effect is among `selected_effects` (any effect when the
/// selection is empty). Clip indices wrap over `clip_urls`.
pub fn build_render_spec(
    plan: &BeatPlan,
    clip_urls: &[String],
    music_url: Option<&str>,
    selected_effects: &[String],
    format: &OutputFormat,
) -> Result<RenderSpec, InvalidParameter> {
    if clip_urls.is_empty() {
        return Err(InvalidParameter::NoSourceClips);
    }

    let normalize = format.normalize_filter();
    let segments: Vec<RenderSegment> = plan
        .segments
        .iter()
        .enumerate()
        .map(|(index, segment)| {
            let clip_index = segment.clip_index % clip_urls.len();
            let duration = round_time(segment.duration());
            let effect = plan
                .effect_timings
                .iter()
                .find(|e| {
                    segment.contains(e.time)
                        && (selected_effects.is_empty() || selected_effects.contains(&e.effect))
                })
                .cloned();
            let effect_filter = effect
                .as_ref()
                .map(|e| EffectFilter::synthesize(&e.effect, e.intensity, duration, format));

            let filters = match &effect_filter {
                Some(filter) => format!("{},{}", filter.to_ffmpeg(format), normalize),
                None => normalize.clone(),
            };

            RenderSegment {
                index,
                clip_index,
                clip_url: clip_urls[clip_index].clone(),
                start: segment.start,
                duration,
                effect,
                effect_filter,
                filters,
            }
        })
        .collect();

    let filter_complex = build_filter_complex(&segments);

    tracing::debug!(
        "Built render spec: {} segments over {} clips",
        segments.len(),
        clip_urls.len()
    );

    Ok(RenderSpec {
        width: format.width,
        height: format.height,
        fps: format.fps,
        duration: plan.total_duration,
        clip_urls: clip_urls.to_vec(),
        music_url: music_url.map(str::to_string),
        segments,
        filter_complex,
    })
}

fn build_filter_complex(segments: &[RenderSegment]) -> String {
    let mut chains: Vec<String> = segments
        .iter()
        .map(|s| {
            format!(
                "[{}:v]trim=start=0:duration={},setpts=PTS-STARTPTS,{}[v{}]",
                s.clip_index, s.duration, s.filters, s.index
            )
        })
        .collect();

    let inputs: String = segments.iter().map(|s| format!("[v{}]", s.index)).collect();
    chains.push(format!(
        "{}concat=n={}:v=1:a=0[outv]",
        inputs,
        segments.len()
    ));
    chains.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Segment;

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://cdn.example.com/clip{}.mp4", i)).collect()
    }

    fn plan() -> BeatPlan {
        BeatPlan {
            bpm: 120.0,
            total_duration: 2.0,
            beats: vec![0.0, 0.5, 1.0, 1.5],
            hard_beats: vec![0.0, 1.0],
            segments: vec![
                Segment { start: 0.0, end: 0.5, clip_index: 0 },
                Segment { start: 0.5, end: 1.0, clip_index: 1 },
                Segment { start: 1.0, end: 2.0, clip_index: 2 },
            ],
            effect_timings: vec![
                EffectTiming { time: 0.0, effect: "zoom".to_string(), intensity: 10 },
                EffectTiming { time: 1.0, effect: "shake".to_string(), intensity: 5 },
            ],
        }
    }

    #[test]
    fn test_render_spec_segments() {
        let effects = vec!["zoom".to_string(), "shake".to_string()];
        let spec = build_render_spec(
            &plan(),
            &urls(2),
            Some("https://cdn.example.com/song.mp3"),
            &effects,
            &OutputFormat::default(),
        )
        .unwrap();

        assert_eq!(spec.segments.len(), 3);
        // Clip 2 wraps onto the first of two URLs
        assert_eq!(spec.segments[2].clip_index, 0);
        assert_eq!(spec.segments[2].clip_url, urls(2)[0]);

        assert!(spec.segments[0].filters.starts_with("zoompan="));
        assert!(spec.segments[1].effect.is_none());
        assert!(spec.segments[2].filters.starts_with("crop=iw-20:ih-20"));

        let normalize = OutputFormat::default().normalize_filter();
        assert!(spec.segments.iter().all(|s| s.filters.ends_with(&normalize)));
    }

    #[test]
    fn test_filter_complex_concat() {
        let spec = build_render_spec(&plan(), &urls(3), None, &[], &OutputFormat::default())
            .unwrap();

        assert!(spec
            .filter_complex
            .starts_with("[0:v]trim=start=0:duration=0.5,setpts=PTS-STARTPTS,zoompan="));
        assert!(spec.filter_complex.contains("[2:v]trim=start=0:duration=1,"));
        assert!(spec
            .filter_complex
            .ends_with("[v0][v1][v2]concat=n=3:v=1:a=0[outv]"));
    }

    #[test]
    fn test_unselected_effect_is_skipped() {
        let effects = vec!["zoom".to_string()];
        let spec =
            build_render_spec(&plan(), &urls(3), None, &effects, &OutputFormat::default()).unwrap();
        assert!(spec.segments[2].effect.is_none());
        assert_eq!(spec.segments[2].filters, OutputFormat::default().normalize_filter());
    }

    #[test]
    fn test_no_clips() {
        assert_eq!(
            build_render_spec(&plan(), &[], None, &[], &OutputFormat::default()),
            Err(InvalidParameter::NoSourceClips)
        );
    }

    #[test]
    fn test_ffmpeg_args_map_music() {
        let spec = build_render_spec(
            &plan(),
            &urls(2),
            Some("song.mp3"),
            &[],
            &OutputFormat::default(),
        )
        .unwrap();
        let args = spec.ffmpeg_args("out.mp4");

        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 3);
        let music_map = args.iter().position(|a| a == "2:a");
        assert!(music_map.is_some());
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }
}

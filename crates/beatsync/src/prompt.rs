//! Estimator prompt construction

use crate::model::PlanRequest;

pub const SYSTEM_PROMPT: &str = "You are a video editing AI that analyzes audio beats and suggests cut points. Always respond with valid JSON.";

/// User message asking the estimator for a beat plan covering `total_duration` seconds.
pub fn build_plan_prompt(request: &PlanRequest, total_duration: f64) -> String {
    format!(
        r#"You are an AI video editing assistant. Estimate the beat timing for this edit.

Project Details:
- Template Style: {style}
- Effects to apply: {effects}
- Output duration: {duration} seconds
- Number of clips: {clips}

Respond with a single JSON object and nothing else:
{{
  "bpm": 120,
  "totalDuration": {duration},
  "beats": [0, 0.5, 1.0, ...],
  "hardBeats": [0, 2.0, ...],
  "segments": [
    {{"start": 0, "end": 0.5, "clipIndex": 0}},
    {{"start": 0.5, "end": 1.0, "clipIndex": 1}}
  ],
  "effectTimings": [
    {{"time": 0, "effect": "{first_effect}", "intensity": 10}}
  ]
}}

Rules:
- beats start at 0, strictly increase and stay below totalDuration
- segments cover 0 to totalDuration with no gaps, clipIndex in 0..{last_clip}
- effect is one of: {effects}; intensity is an integer from 1 to 10"#,
        style = request.template_style,
        effects = request.selected_effects.join(", "),
        first_effect = request.selected_effects.first().map(String::as_str).unwrap_or("zoom"),
        duration = total_duration,
        clips = request.num_clips,
        last_clip = request.num_clips.saturating_sub(1),
    )
}

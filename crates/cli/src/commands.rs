//! CLI subcommand handlers

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use beatsync::{
    build_render_spec, compile_plan, BeatEstimator, BeatPlan, BeatSyncConfig,
    ChatCompletionsEstimator, EffectFilter, EffectKind, PlanRequest, PlanResolver,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::output::OutputHandler;

/// Inputs for `plan`
pub struct PlanArgs {
    pub request: Option<PathBuf>,
    pub style: String,
    pub duration: f64,
    pub clips: usize,
    pub effects: Vec<String>,
    pub bpm: Option<f64>,
    pub seed: Option<u64>,
    pub offline: bool,
}

impl PlanArgs {
    fn to_request(&self) -> Result<PlanRequest> {
        match &self.request {
            Some(path) => read_json(path).context("Failed to read plan request"),
            None => Ok(PlanRequest::new(
                self.style.clone(),
                self.duration,
                self.clips,
                self.effects.clone(),
            )),
        }
    }
}

/// Resolve (or compile at a fixed tempo) a plan and print it
pub async fn plan(config: &BeatSyncConfig, args: PlanArgs, output: &OutputHandler) -> Result<()> {
    let request = args.to_request()?;
    let mut config = config.clone();
    if let Some(seed) = args.seed {
        config.resolver.fallback_seed = Some(seed);
    }

    if let Some(bpm) = args.bpm {
        let seed = args.seed.unwrap_or_default();
        let mut rng = StdRng::seed_from_u64(seed);
        let plan = compile_plan(bpm, &request, &config.plan, &mut rng)
            .context("Failed to compile plan")?;
        return output.print_json(&plan);
    }

    let estimator: Option<Arc<dyn BeatEstimator>> = if args.offline {
        None
    } else if config.api_key().is_none() {
        output.print_warning(&format!(
            "{} not set, using the fallback plan",
            config.estimator.api_key_env
        ));
        None
    } else {
        let estimator: Arc<dyn BeatEstimator> = Arc::new(
            ChatCompletionsEstimator::from_config(&config.estimator)
                .context("Failed to create estimator")?,
        );
        Some(estimator)
    };

    let resolver = PlanResolver::from_config(estimator, &config);
    let resolved = resolver
        .resolve(&request)
        .await
        .context("Invalid plan request")?;

    if resolved.is_fallback() {
        output.print_warning("Estimator unusable, plan compiled locally");
    }
    output.print_json(&resolved)
}

/// Inputs for `render-spec`
pub struct RenderArgs {
    pub plan: PathBuf,
    pub clips: Vec<String>,
    pub music: Option<String>,
    pub effects: Vec<String>,
    pub ffmpeg_output: Option<String>,
}

#[derive(Serialize)]
struct FfmpegCommand {
    program: &'static str,
    args: Vec<String>,
}

/// Build the render job for a saved plan
pub fn render_spec(config: &BeatSyncConfig, args: RenderArgs, output: &OutputHandler) -> Result<()> {
    let value: serde_json::Value = read_json(&args.plan).context("Failed to read plan")?;
    // Accept both a bare plan and the resolver's `{ plan, source, attempts }`
    let plan_value = match value.get("plan") {
        Some(inner) => inner.clone(),
        None => value,
    };
    let plan: BeatPlan = serde_json::from_value(plan_value).context("Not a beat plan")?;

    let spec = build_render_spec(
        &plan,
        &args.clips,
        args.music.as_deref(),
        &args.effects,
        &config.render,
    )
    .context("Failed to build render spec")?;

    match args.ffmpeg_output {
        Some(target) => output.print_json(&FfmpegCommand {
            program: "ffmpeg",
            args: spec.ffmpeg_args(&target),
        }),
        None => output.print_json(&spec),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FilterOutput {
    effect: String,
    kind: EffectKind,
    intensity: u8,
    duration: f64,
    filter: EffectFilter,
    ffmpeg: String,
}

/// Show the filter one effect trigger produces
pub fn filter(
    config: &BeatSyncConfig,
    effect: &str,
    intensity: u8,
    duration: f64,
    output: &OutputHandler,
) -> Result<()> {
    let filter = EffectFilter::synthesize(effect, intensity, duration, &config.render);
    output.print_json(&FilterOutput {
        effect: effect.to_string(),
        kind: EffectKind::parse(effect),
        intensity,
        duration,
        ffmpeg: filter.to_ffmpeg(&config.render),
        filter,
    })
}

/// Show current configuration
pub fn show_config(config: &BeatSyncConfig, path: &Path, output: &OutputHandler) -> Result<()> {
    output.print_header("Configuration");
    output.print_field("Path", &path.display().to_string());
    output.print_field(
        "API key",
        if config.api_key().is_some() {
            "set"
        } else {
            "not set"
        },
    );
    output.print_json(config)
}

pub fn get_config(config: &BeatSyncConfig, key: &str, output: &OutputHandler) -> Result<()> {
    match config.get(key) {
        Some(value) => println!("{}", value),
        None => output.print_error(&format!("No value for {}", key)),
    }
    Ok(())
}

/// Set a configuration value (key=value) and save it
pub fn set_config(
    config: &BeatSyncConfig,
    path: &Path,
    kv: &str,
    output: &OutputHandler,
) -> Result<()> {
    let Some((key, value)) = kv.split_once('=') else {
        output.print_error("Invalid format. Use: key=value");
        return Ok(());
    };
    let key = key.trim();
    let value = value.trim().trim_matches('"');

    let mut config = config.clone();
    match config.set(key, value) {
        Ok(()) => {
            config
                .save_to(path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            output.print_success(&format!("Set {} = \"{}\"", key, value));
        }
        Err(e) => {
            output.print_error(&format!("Failed to set config: {}", e));
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?
    };
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_config_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let output = OutputHandler::new(false);

        set_config(&BeatSyncConfig::default(), &path, "resolver.max_attempts=5", &output).unwrap();

        let saved = BeatSyncConfig::load_from(&path).unwrap();
        assert_eq!(saved.resolver.max_attempts, 5);
    }

    #[test]
    fn test_set_config_rejects_bad_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let output = OutputHandler::new(false);

        set_config(&BeatSyncConfig::default(), &path, "no-equals-sign", &output).unwrap();
        set_config(&BeatSyncConfig::default(), &path, "render.fps=fast", &output).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_render_spec_accepts_resolved_plan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        let request = PlanRequest::new("minimal", 15.0, 2, vec!["flash".to_string()]);
        let resolved = PlanResolver::offline().fallback_plan(&request).unwrap();
        let wrapped = serde_json::json!({ "plan": resolved, "attempts": 0 });
        std::fs::write(&path, wrapped.to_string()).unwrap();

        let args = RenderArgs {
            plan: path,
            clips: vec!["a.mp4".to_string(), "b.mp4".to_string()],
            music: None,
            effects: vec![],
            ffmpeg_output: None,
        };
        assert!(render_spec(&BeatSyncConfig::default(), args, &OutputHandler::new(false)).is_ok());
    }

    #[test]
    fn test_plan_request_from_flags() {
        let args = PlanArgs {
            request: None,
            style: "amv".to_string(),
            duration: 12.0,
            clips: 4,
            effects: vec!["shake".to_string()],
            bpm: None,
            seed: None,
            offline: true,
        };
        let request = args.to_request().unwrap();
        assert_eq!(request.template_style, "amv");
        assert_eq!(request.num_clips, 4);
    }
}

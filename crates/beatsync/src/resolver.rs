//! Plan Resolver / Fallback Controller
//!
//! Asks the estimator for a plan with bounded retry, validates whatever comes
//! back and falls back to a locally compiled plan when the estimator is
//! unusable. Callers only ever see an error for invalid input.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::BeatSyncConfig;
use crate::error::{BeatSyncError, BeatSyncResult, InvalidParameter};
use crate::estimator::BeatEstimator;
use crate::model::{BeatPlan, PlanRequest};
use crate::parse::parse_completion;
use crate::plan::{compile_plan, PlanConfig};
use crate::prompt::build_plan_prompt;
use crate::style::StyleTable;
use crate::validate::{check_total_duration, repair_plan, validate_plan};

/// Retry and fallback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Total estimator calls, including the first
    pub max_attempts: u32,
    /// Sleep before attempt `n + 1` is `n * backoff_step_ms`
    pub backoff_step_ms: u64,
    /// Bound on the whole estimation, retries included
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Seed for fallback intensities; derived from the request when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_seed: Option<u64>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step_ms: 2000,
            timeout_secs: None,
            fallback_seed: None,
        }
    }
}

impl ResolverConfig {
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_step_ms.saturating_mul(attempt as u64))
    }
}

/// Where a resolved plan came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanSource {
    Estimated { estimator: String },
    Fallback { reason: String },
}

/// A plan plus how it was obtained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPlan {
    pub plan: BeatPlan,
    pub source: PlanSource,
    /// Estimator calls made
    pub attempts: u32,
}

impl ResolvedPlan {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, PlanSource::Fallback { .. })
    }
}

/// Resolution progress, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolveState {
    Requesting,
    Retrying,
    ParsedValid,
    ParsedInvalid,
    UpstreamFailed,
    Resolved,
    FallbackResolved,
}

impl fmt::Display for ResolveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolveState::Requesting => "requesting",
            ResolveState::Retrying => "retrying",
            ResolveState::ParsedValid => "parsed_valid",
            ResolveState::ParsedInvalid => "parsed_invalid",
            ResolveState::UpstreamFailed => "upstream_failed",
            ResolveState::Resolved => "resolved",
            ResolveState::FallbackResolved => "fallback_resolved",
        };
        write!(f, "{}", name)
    }
}

pub struct PlanResolver {
    estimator: Option<Arc<dyn BeatEstimator>>,
    config: ResolverConfig,
    plan: PlanConfig,
    styles: StyleTable,
}

impl PlanResolver {
    pub fn new(estimator: Arc<dyn BeatEstimator>) -> Self {
        Self {
            estimator: Some(estimator),
            config: ResolverConfig::default(),
            plan: PlanConfig::default(),
            styles: StyleTable::default(),
        }
    }

    /// Resolver that never calls out and always compiles the fallback plan.
    pub fn offline() -> Self {
        Self {
            estimator: None,
            config: ResolverConfig::default(),
            plan: PlanConfig::default(),
            styles: StyleTable::default(),
        }
    }

    pub fn from_config(estimator: Option<Arc<dyn BeatEstimator>>, config: &BeatSyncConfig) -> Self {
        Self {
            estimator,
            config: config.resolver.clone(),
            plan: config.plan.clone(),
            styles: config.styles.clone(),
        }
    }

    pub fn with_resolver_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_plan_config(mut self, plan: PlanConfig) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_styles(mut self, styles: StyleTable) -> Self {
        self.styles = styles;
        self
    }

    /// Resolve a plan for `request`.
    ///
    /// Fails only with [`InvalidParameter`], before any estimator call.
    /// Upstream failures and invalid estimates end in the fallback plan.
    pub async fn resolve(&self, request: &PlanRequest) -> Result<ResolvedPlan, InvalidParameter> {
        request.validate()?;

        let Some(estimator) = self.estimator.as_deref() else {
            return self.resolve_fallback(request, "no estimator configured".to_string(), 0);
        };

        let attempts = AtomicU32::new(0);
        let estimation = self.estimate_plan(estimator, request, &attempts);
        let result = match self.config.timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), estimation)
                .await
                .unwrap_or_else(|_| {
                    Err(BeatSyncError::UpstreamUnavailable(format!(
                        "estimation timed out after {}s",
                        secs
                    )))
                }),
            None => estimation.await,
        };
        let attempts = attempts.load(Ordering::SeqCst);

        match result {
            Ok(plan) => {
                log_state(ResolveState::Resolved);
                tracing::info!(
                    "Resolved plan from {}: bpm={}, segments={}, attempts={}",
                    estimator.name(),
                    plan.bpm,
                    plan.segments.len(),
                    attempts
                );
                Ok(ResolvedPlan {
                    plan,
                    source: PlanSource::Estimated {
                        estimator: estimator.name().to_string(),
                    },
                    attempts,
                })
            }
            Err(BeatSyncError::InvalidParameter(e)) => Err(e),
            Err(e) => self.resolve_fallback(request, e.to_string(), attempts),
        }
    }

    /// Deterministic plan from the style table.
    ///
    /// Identical requests give identical bpm, beats and segments. Intensities
    /// are identical too unless the configured seed changes.
    pub fn fallback_plan(&self, request: &PlanRequest) -> Result<BeatPlan, InvalidParameter> {
        let bpm = self.styles.bpm_for(&request.template_style);
        let seed = self
            .config
            .fallback_seed
            .unwrap_or_else(|| request_seed(request));
        let mut rng = StdRng::seed_from_u64(seed);
        compile_plan(bpm, request, &self.plan, &mut rng)
    }

    fn resolve_fallback(
        &self,
        request: &PlanRequest,
        reason: String,
        attempts: u32,
    ) -> Result<ResolvedPlan, InvalidParameter> {
        tracing::warn!(
            "Using fallback plan for style '{}': {}",
            request.template_style,
            reason
        );
        let plan = self.fallback_plan(request)?;
        log_state(ResolveState::FallbackResolved);

        Ok(ResolvedPlan {
            plan,
            source: PlanSource::Fallback { reason },
            attempts,
        })
    }

    async fn estimate_plan(
        &self,
        estimator: &dyn BeatEstimator,
        request: &PlanRequest,
        attempts: &AtomicU32,
    ) -> BeatSyncResult<BeatPlan> {
        let total_duration = self.plan.total_duration_for(request.music_duration_seconds);
        let prompt = build_plan_prompt(request, total_duration);
        let text = self.request_with_retry(estimator, &prompt, attempts).await?;

        let checked = parse_completion(&text)
            .map_err(|e| BeatSyncError::PlanValidation(e.to_string()))
            .and_then(|raw| {
                check_total_duration(&raw, total_duration)
                    .map_err(|e| BeatSyncError::PlanValidation(e.to_string()))?;
                let plan = repair_plan(
                    raw,
                    total_duration,
                    request.num_clips,
                    &request.selected_effects,
                    self.plan.hard_beat_interval,
                );
                validate_plan(&plan, request.num_clips, &request.selected_effects)
                    .map_err(|e| BeatSyncError::PlanValidation(e.to_string()))?;
                Ok(plan)
            });

        match &checked {
            Ok(_) => log_state(ResolveState::ParsedValid),
            Err(e) => {
                log_state(ResolveState::ParsedInvalid);
                tracing::warn!("Estimated plan rejected: {}", e);
            }
        }
        checked
    }

    /// Call the estimator, retrying transient failures with linear backoff.
    async fn request_with_retry(
        &self,
        estimator: &dyn BeatEstimator,
        prompt: &str,
        attempts: &AtomicU32,
    ) -> BeatSyncResult<String> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            attempts.store(attempt, Ordering::SeqCst);
            log_state(if attempt == 1 {
                ResolveState::Requesting
            } else {
                ResolveState::Retrying
            });

            match estimator.estimate(prompt).await.map_err(BeatSyncError::from) {
                Ok(text) => return Ok(text),
                Err(BeatSyncError::UpstreamTransient(reason)) if attempt < max_attempts => {
                    let delay = self.config.backoff_for(attempt);
                    tracing::warn!(
                        "Estimator temporarily unavailable: {} (attempt {}/{}), retrying in {:?}",
                        reason,
                        attempt,
                        max_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(BeatSyncError::UpstreamTransient(reason)) => {
                    log_state(ResolveState::UpstreamFailed);
                    return Err(BeatSyncError::UpstreamUnavailable(format!(
                        "{} after {} attempts",
                        reason, attempt
                    )));
                }
                Err(e) => {
                    log_state(ResolveState::UpstreamFailed);
                    return Err(e);
                }
            }
        }
    }
}

fn log_state(state: ResolveState) {
    tracing::debug!(state = %state, "Plan resolution");
}

/// Stable seed from the request fields that shape the plan.
fn request_seed(request: &PlanRequest) -> u64 {
    let mut hasher = DefaultHasher::new();
    request.template_style.hash(&mut hasher);
    request.music_duration_seconds.to_bits().hash(&mut hasher);
    request.num_clips.hash(&mut hasher);
    request.selected_effects.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PlanRequest {
        PlanRequest::new("amv", 20.0, 3, vec!["zoom".to_string(), "flash".to_string()])
    }

    #[test]
    fn test_backoff_is_linear() {
        let config = ResolverConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_secs(2));
        assert_eq!(config.backoff_for(2), Duration::from_secs(4));
    }

    #[test]
    fn test_fallback_uses_style_table() {
        let resolver = PlanResolver::offline();
        let plan = resolver.fallback_plan(&request()).unwrap();
        assert_eq!(plan.bpm, 140.0);
        assert_eq!(plan.total_duration, 15.0);

        let mut unknown = request();
        unknown.template_style = "lofi".to_string();
        assert_eq!(resolver.fallback_plan(&unknown).unwrap().bpm, 120.0);
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let resolver = PlanResolver::offline();
        assert_eq!(
            resolver.fallback_plan(&request()).unwrap(),
            resolver.fallback_plan(&request()).unwrap()
        );
        assert_eq!(request_seed(&request()), request_seed(&request()));
    }

    #[test]
    fn test_configured_seed_is_used() {
        let seeded = |seed| {
            PlanResolver::offline()
                .with_resolver_config(ResolverConfig {
                    fallback_seed: Some(seed),
                    ..Default::default()
                })
                .fallback_plan(&request())
                .unwrap()
        };
        let a = seeded(1);
        let b = seeded(1);
        assert_eq!(a, b);
        assert_eq!(a.segments, seeded(2).segments);
    }

    #[tokio::test]
    async fn test_offline_resolve_falls_back() {
        let resolved = PlanResolver::offline().resolve(&request()).await.unwrap();
        assert!(resolved.is_fallback());
        assert_eq!(resolved.attempts, 0);
    }

    #[tokio::test]
    async fn test_invalid_request_fails_fast() {
        let mut bad = request();
        bad.num_clips = 0;
        assert_eq!(
            PlanResolver::offline().resolve(&bad).await,
            Err(InvalidParameter::NoSourceClips)
        );
    }

    #[test]
    fn test_resolved_plan_serialization() {
        let resolved = ResolvedPlan {
            plan: PlanResolver::offline().fallback_plan(&request()).unwrap(),
            source: PlanSource::Fallback {
                reason: "timeout".to_string(),
            },
            attempts: 2,
        };
        let json = serde_json::to_value(&resolved).unwrap();
        assert_eq!(json["source"]["type"], "fallback");
        assert_eq!(json["source"]["reason"], "timeout");
        assert_eq!(json["plan"]["bpm"], 140.0);
    }
}

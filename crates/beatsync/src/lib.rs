//! Beat-synced timeline compiler
//!
//! Turns a tempo estimate and a set of selected effects into a gapless edit
//! plan: beat grid, cut list with round-robin clip assignment, effect
//! triggers on hard beats, and the ffmpeg filter graph a renderer executes.
//!
//! The tempo comes from an untrusted [`BeatEstimator`]; [`PlanResolver`]
//! retries it, validates its output and falls back to a local plan so callers
//! always receive a plan that satisfies every invariant.

pub mod beat_grid;
pub mod config;
pub mod effect_timing;
pub mod error;
pub mod estimator;
pub mod filters;
pub mod model;
pub mod parse;
pub mod plan;
pub mod prompt;
pub mod render;
pub mod resolver;
pub mod segments;
pub mod style;
pub mod validate;

pub use beat_grid::BeatGrid;
pub use config::BeatSyncConfig;
pub use effect_timing::IntensityPolicy;
pub use error::{BeatSyncError, BeatSyncResult, InvalidParameter};
pub use estimator::{BeatEstimator, ChatCompletionsEstimator, EstimatorConfig, EstimatorError};
pub use filters::{EffectFilter, EffectKind, OutputFormat};
pub use model::{BeatPlan, EffectTiming, PlanRequest, Segment};
pub use plan::{compile_plan, PlanConfig};
pub use render::{build_render_spec, RenderSegment, RenderSpec};
pub use resolver::{PlanResolver, PlanSource, ResolvedPlan, ResolverConfig};
pub use segments::SegmentConfig;
pub use style::StyleTable;
pub use validate::{validate_plan, PlanViolation};

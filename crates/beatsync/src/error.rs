use thiserror::Error;

use crate::estimator::EstimatorError;

/// Caller-supplied input that can never produce a plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidParameter {
    #[error("bpm must be positive and finite, got {0}")]
    Bpm(f64),

    #[error("duration must be positive and finite, got {0}")]
    Duration(f64),

    #[error("hard beat interval must be at least 1")]
    HardBeatInterval,

    #[error("no source clips provided")]
    NoSourceClips,

    #[error("no effects selected")]
    NoEffectsSelected,
}

#[derive(Debug, Error)]
pub enum BeatSyncError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(#[from] InvalidParameter),

    #[error("Estimator temporarily unavailable: {0}")]
    UpstreamTransient(String),

    #[error("Estimator unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Plan validation failed: {0}")]
    PlanValidation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BeatSyncResult<T> = Result<T, BeatSyncError>;

impl BeatSyncError {
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, BeatSyncError::InvalidParameter(_))
    }
}

/// Transient estimator failures stay retryable; everything else is final.
impl From<EstimatorError> for BeatSyncError {
    fn from(e: EstimatorError) -> Self {
        if e.is_transient() {
            BeatSyncError::UpstreamTransient(e.to_string())
        } else {
            BeatSyncError::UpstreamUnavailable(e.to_string())
        }
    }
}

//! Error types shared by the engines and the trajectory writer.

use crate::rkf78::IntegrationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum NewtonianError {
    #[error("bodies collided at step {step} (t = {time:e} s): separation is exactly zero")]
    Collision { step: u64, time: f64 },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),
}

#[derive(Debug, Error)]
pub enum GeodesicError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("integration failed at t = {time:e} s (r = {r:e} m): {source}")]
    Integration {
        time: f64,
        r: f64,
        #[source]
        source: IntegrationError,
    },

    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),
}

pub type Result<T, E = TrajectoryError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid scenario: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

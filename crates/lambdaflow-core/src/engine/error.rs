use super::config::ConfigError;
use super::device::PoolError;
use crate::core::io::FileError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by the physics engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Minimisation at lambda = {lambda} failed: {reason}")]
    Minimisation { lambda: f64, reason: String },

    #[error("Minimisation at lambda = {lambda} exceeded its {timeout_secs}s timeout")]
    MinimisationTimeout { lambda: f64, timeout_secs: f64 },

    #[error("Dynamics setup failed: {0}")]
    Setup(String),

    #[error("Dynamics became unstable at t = {time} ps: {reason}")]
    Unstable { time: f64, reason: String },

    #[error("Energy sampling failed: {0}")]
    Sampling(String),
}

/// Failures of a single window. These are isolated at the scheduler boundary.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    File(#[from] FileError),

    #[error("Device pool error: {0}")]
    Device(#[from] PoolError),

    #[error("Checkpoint '{path}' belongs to lambda = {found}, expected {expected}", path = path.display())]
    CheckpointMismatch {
        path: PathBuf,
        expected: f64,
        found: f64,
    },

    #[error(
        "Window failed at lambda = {lambda} and again after minimising at lambda = {fallback}: {source}"
    )]
    RetryExhausted {
        lambda: f64,
        fallback: f64,
        #[source]
        source: Box<SessionError>,
    },

    #[error("Window panicked: {0}")]
    Panicked(String),
}

/// Failures that abort a run before any window is dispatched.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Device pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Output directory error: {0}")]
    Output(#[from] FileError),

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),
}

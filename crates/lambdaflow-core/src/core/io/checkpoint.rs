use super::{FileError, write_atomically};
use crate::core::models::state::SystemState;
use std::io::Write;
use std::path::Path;

/// Persists the full system state, replacing any previous checkpoint at `path`.
pub fn write_checkpoint(path: &Path, state: &SystemState) -> Result<(), FileError> {
    let bytes = serde_json::to_vec(state).map_err(|e| FileError::Serialization {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    write_atomically(path, |w| w.write_all(&bytes))
}

pub fn read_checkpoint(path: &Path) -> Result<SystemState, FileError> {
    let bytes = std::fs::read(path).map_err(|e| FileError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| FileError::Serialization {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

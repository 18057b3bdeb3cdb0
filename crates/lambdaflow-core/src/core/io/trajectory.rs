use super::FileError;
use super::traits::TrajectoryFile;
use crate::core::models::state::Frame;
use crate::core::models::trajectory::Trajectory;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Writes the frames of one block to its chunk file.
pub fn write_chunk<F: TrajectoryFile>(
    path: &Path,
    atom_names: &[String],
    frames: &[Frame],
) -> Result<(), FileError> {
    let chunk = Trajectory {
        atom_names: atom_names.to_vec(),
        frames: frames.to_vec(),
    };
    F::write_to_path(&chunk, path).map_err(|e| FileError::format(path, e.to_string()))
}

/// Copies a non-empty trajectory at `output` to `backup`. Returns `true` if a copy was
/// taken, `false` if there is nothing to preserve.
pub fn back_up_trajectory(output: &Path, backup: &Path) -> Result<bool, FileError> {
    let existing_len = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
    if existing_len == 0 {
        return Ok(false);
    }
    std::fs::copy(output, backup).map_err(|e| FileError::io(backup, e))?;
    debug!(backup = %backup.display(), "Backed up existing trajectory.");
    Ok(true)
}

/// Concatenates `chunks` into a single trajectory at `output` and deletes the chunks.
///
/// The frames of `prefix`, if given, are placed ahead of the chunks. The prefix file
/// itself is left in place, so merging again from the same prefix rebuilds the same
/// history. Returns the number of frames in the merged trajectory.
pub fn merge_chunks<F: TrajectoryFile>(
    chunks: &[PathBuf],
    output: &Path,
    prefix: Option<&Path>,
) -> Result<usize, FileError> {
    let sources: Vec<&Path> = prefix
        .into_iter()
        .chain(chunks.iter().map(PathBuf::as_path))
        .collect();

    let mut merged = Trajectory::default();
    for &source in &sources {
        let part = F::read_from_path(source).map_err(|e| FileError::format(source, e.to_string()))?;
        if !merged.extend_from(part) {
            return Err(FileError::format(
                source,
                "frames describe different atoms than earlier parts of the trajectory",
            ));
        }
    }

    let temp = output.with_extension(format!("{}.partial", F::EXTENSION));
    F::write_to_path(&merged, &temp).map_err(|e| FileError::format(&temp, e.to_string()))?;
    std::fs::rename(&temp, output).map_err(|e| FileError::io(output, e))?;

    for chunk in chunks {
        std::fs::remove_file(chunk).map_err(|e| FileError::io(chunk, e))?;
    }

    info!(
        output = %output.display(),
        parts = sources.len(),
        frames = merged.len(),
        "Trajectory assembled."
    );
    Ok(merged.len())
}

use super::FileError;
use crate::core::models::window::Window;
use std::path::{Path, PathBuf};

const CHECKPOINT_EXTENSION: &str = "json";
const ENERGY_EXTENSION: &str = "csv";
const CONFIG_EXTENSION: &str = "toml";

/// Lambda-qualified names of every file a window writes.
///
/// Names embed the window's lambda formatted to five decimals, so concurrently running
/// windows never touch the same file.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowFiles {
    directory: PathBuf,
    label: String,
    trajectory_extension: &'static str,
}

impl WindowFiles {
    pub fn new(directory: impl Into<PathBuf>, window: &Window, trajectory_extension: &'static str) -> Self {
        Self {
            directory: directory.into(),
            label: window.label(),
            trajectory_extension,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn checkpoint(&self) -> PathBuf {
        self.named("checkpoint", CHECKPOINT_EXTENSION)
    }

    pub fn energy_trajectory(&self) -> PathBuf {
        self.named("energy_traj", ENERGY_EXTENSION)
    }

    pub fn energy_components(&self) -> PathBuf {
        self.named("energy_components", "txt")
    }

    pub fn trajectory(&self) -> PathBuf {
        self.named("traj", self.trajectory_extension)
    }

    /// Copy of a previous run's trajectory, kept while it is merged with new chunks.
    pub fn trajectory_backup(&self) -> PathBuf {
        let mut name = self.trajectory().into_os_string();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Chunk holding the frames of block `index`.
    pub fn chunk(&self, index: u64) -> PathBuf {
        self.directory.join(format!(
            "{}{}.{}",
            self.chunk_prefix(),
            index,
            self.trajectory_extension
        ))
    }

    /// Every chunk of this window on disk, ordered by block index.
    pub fn chunks(&self) -> Result<Vec<(u64, PathBuf)>, FileError> {
        let prefix = self.chunk_prefix();
        let suffix = format!(".{}", self.trajectory_extension);
        let entries =
            std::fs::read_dir(&self.directory).map_err(|e| FileError::io(&self.directory, e))?;

        let mut chunks = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FileError::io(&self.directory, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let index = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(&suffix))
                .and_then(|index| index.parse::<u64>().ok());
            if let Some(index) = index {
                chunks.push((index, entry.path()));
            }
        }
        chunks.sort_by_key(|(index, _)| *index);
        Ok(chunks)
    }

    /// Deletes chunks at or above `first_index`, left behind by an interrupted attempt.
    /// Returns how many were removed.
    pub fn remove_chunks_from(&self, first_index: u64) -> Result<usize, FileError> {
        let mut removed = 0;
        for (index, path) in self.chunks()? {
            if index >= first_index {
                std::fs::remove_file(&path).map_err(|e| FileError::io(&path, e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// The first unused configuration snapshot name: `config_<lam>.toml`, then
    /// `config_<lam>_1.toml`, `config_<lam>_2.toml`, and so on.
    pub fn config_snapshot(&self) -> PathBuf {
        let base = self.named("config", CONFIG_EXTENSION);
        if !base.exists() {
            return base;
        }
        (1u64..)
            .map(|n| {
                self.directory.join(format!(
                    "config_{}_{}.{}",
                    self.label, n, CONFIG_EXTENSION
                ))
            })
            .find(|path| !path.exists())
            .unwrap_or(base)
    }

    fn named(&self, stem: &str, extension: &str) -> PathBuf {
        self.directory
            .join(format!("{}_{}.{}", stem, self.label, extension))
    }

    fn chunk_prefix(&self) -> String {
        format!("traj_{}_", self.label)
    }
}

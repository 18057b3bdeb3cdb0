//! Provides the on-disk formats a window produces.
//!
//! Each window owns a disjoint set of lambda-qualified files ([`files`]): a checkpoint
//! that is overwritten after every block ([`checkpoint`]), an append-only energy
//! trajectory with a metadata header ([`energy`]), per-block trajectory chunks that are
//! merged at the end of the run ([`trajectory`], [`xyz`]) and an optional table of
//! per-force energies ([`components`]). Files that are replaced rather than appended are
//! written through [`write_atomically`], so a crash never leaves a truncated file behind.

pub mod checkpoint;
pub mod components;
pub mod energy;
pub mod files;
pub mod traits;
pub mod trajectory;
pub mod xyz;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("I/O error on '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to (de)serialize '{path}': {message}", path = path.display())]
    Serialization { path: PathBuf, message: String },

    #[error("Malformed file '{path}': {message}", path = path.display())]
    Format { path: PathBuf, message: String },
}

impl FileError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        FileError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        FileError::Format {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Replaces the file at `path` with whatever `write` produces.
///
/// The content goes to a temporary file in the same directory, which is synced and then
/// renamed over `path`. Readers observe either the old content or the new one.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<(), FileError>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| FileError::io(path, e))?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        write(&mut writer).map_err(|e| FileError::io(path, e))?;
        writer.flush().map_err(|e| FileError::io(path, e))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|e| FileError::io(path, e))?;
    temp.persist(path).map_err(|e| FileError::io(path, e.error))?;
    Ok(())
}

/// Opens an existing file for appending.
pub(crate) fn open_append(path: &Path) -> Result<File, FileError> {
    std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| FileError::io(path, e))
}

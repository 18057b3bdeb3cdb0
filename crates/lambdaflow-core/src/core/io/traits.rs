use crate::core::models::trajectory::Trajectory;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Defines the interface for reading and writing trajectory file formats.
///
/// Trajectory chunks and the merged per-window trajectory are written through this
/// trait, so the codec used on disk can be swapped without touching the session logic.
pub trait TrajectoryFile {
    /// The error type for I/O operations.
    type Error: Error + From<io::Error>;

    /// File extension, without the leading dot.
    const EXTENSION: &'static str;

    /// Reads every frame from a buffered reader.
    ///
    /// # Arguments
    ///
    /// * `reader` - The buffered reader to read from.
    ///
    /// # Return
    ///
    /// Returns the parsed trajectory. An empty input yields an empty trajectory.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails, frames disagree on their atoms, or I/O
    /// operations encounter issues.
    fn read_from(reader: &mut impl BufRead) -> Result<Trajectory, Self::Error>;

    /// Writes every frame of `trajectory` to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_to(trajectory: &Trajectory, writer: &mut impl Write) -> Result<(), Self::Error>;

    /// Reads a trajectory from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsing fails.
    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Trajectory, Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    /// Writes a trajectory to a file path, truncating any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    fn write_to_path<P: AsRef<Path>>(trajectory: &Trajectory, path: P) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(trajectory, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

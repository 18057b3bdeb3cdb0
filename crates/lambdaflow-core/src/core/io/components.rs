use super::{FileError, open_append};
use crate::core::models::energy::ForceEnergy;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const SAMPLE_WIDTH: usize = 10;
const FORCE_WIDTH: usize = 25;
const SAMPLE_HEADER: &str = "# Sample";

/// Writes the per-force energy table: a header naming each force, then one fixed-width
/// row per sample.
#[derive(Debug)]
pub struct EnergyComponentsWriter {
    path: PathBuf,
    next_sample: usize,
}

impl EnergyComponentsWriter {
    /// Starts a new table; the file is truncated when the first sample is recorded.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            next_sample: 0,
        }
    }

    /// Continues an existing table, numbering new rows after the ones already present.
    pub fn resume(path: impl Into<PathBuf>) -> Result<Self, FileError> {
        let path = path.into();
        let next_sample = match File::open(&path) {
            Ok(file) => count_rows(&path, file)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(FileError::io(&path, e)),
        };
        Ok(Self { path, next_sample })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Index the next recorded sample will carry.
    pub fn next_sample(&self) -> usize {
        self.next_sample
    }

    pub fn record(&mut self, components: &[ForceEnergy]) -> Result<(), FileError> {
        let mut record = format!("{:>w$}", self.next_sample, w = SAMPLE_WIDTH);
        for component in components {
            record.push_str(&format!("{:>w$.2}", component.energy, w = FORCE_WIDTH));
        }

        let mut file = if self.next_sample == 0 {
            let mut file = File::create(&self.path).map_err(|e| FileError::io(&self.path, e))?;
            let mut header = format!("{:>w$}", SAMPLE_HEADER, w = SAMPLE_WIDTH);
            for component in components {
                header.push_str(&format!("{:>w$}", component.name, w = FORCE_WIDTH));
            }
            writeln!(file, "{}", header).map_err(|e| FileError::io(&self.path, e))?;
            file
        } else {
            open_append(&self.path)?
        };
        writeln!(file, "{}", record).map_err(|e| FileError::io(&self.path, e))?;

        self.next_sample += 1;
        Ok(())
    }
}

fn count_rows(path: &Path, file: File) -> Result<usize, FileError> {
    let mut rows = 0;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| FileError::io(path, e))?;
        if !line.trim().is_empty() && !line.trim_start().starts_with('#') {
            rows += 1;
        }
    }
    Ok(rows)
}

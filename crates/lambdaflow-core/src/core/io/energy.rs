//! Energy trajectory files.
//!
//! The format is CSV with a single leading metadata line:
//!
//! ```text
//! # {"attrs":{"temperature":300.0,"energy_unit":"kT"},"lambda":0.5,...}
//! time,0.00000,0.50000,1.00000,0.49900,0.50100
//! 0.1,12.8,11.9,11.2,11.91,11.89
//! ```
//!
//! The first write for a window creates the file with its metadata and header; every
//! later block appends only its own rows.

use super::{FileError, open_append, write_atomically};
use crate::core::models::energy::{EnergySample, EnergyTrajectory};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

const METADATA_PREFIX: &str = "# ";
const TIME_COLUMN: &str = "time";

/// Attributes describing the energy columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyAttributes {
    /// Temperature in Kelvin at which the reduced energies were evaluated.
    pub temperature: f64,
    pub energy_unit: String,
}

/// Metadata header of an energy trajectory file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyMetadata {
    pub attrs: EnergyAttributes,
    /// Lambda of the window that produced the file.
    pub lambda: f64,
    /// Lambdas at which the window sampled energies.
    pub lambda_array: Vec<f64>,
    /// Finite-difference gradient neighbors of `lambda`.
    pub lambda_grad: Vec<f64>,
    pub temperature: f64,
    /// Measured throughput in ns/day, recorded once the window has finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl EnergyMetadata {
    pub fn new(lambda: f64, lambda_array: Vec<f64>, lambda_grad: Vec<f64>, temperature: f64) -> Self {
        Self {
            attrs: EnergyAttributes {
                temperature,
                energy_unit: "kT".to_string(),
            },
            lambda,
            lambda_array,
            lambda_grad,
            temperature,
            speed: None,
        }
    }

    pub fn with_speed(mut self, speed: Option<f64>) -> Self {
        self.speed = speed;
        self
    }
}

pub struct EnergyTrajectoryFile;

impl EnergyTrajectoryFile {
    /// Writes `trajectory` to a fresh file at `path`, replacing any previous file.
    pub fn write(
        path: &Path,
        metadata: &EnergyMetadata,
        trajectory: &EnergyTrajectory,
    ) -> Result<(), FileError> {
        let header = serde_json::to_string(metadata).map_err(|e| FileError::Serialization {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        write_atomically(path, |w| {
            writeln!(w, "{}{}", METADATA_PREFIX, header)?;
            let mut writer = csv::Writer::from_writer(w);
            let mut columns = vec![TIME_COLUMN.to_string()];
            columns.extend(trajectory.lambdas().iter().map(|l| format!("{:.5}", l)));
            writer.write_record(&columns).map_err(io::Error::from)?;
            write_rows(&mut writer, trajectory.samples())?;
            writer.flush()
        })
    }

    /// Appends `rows` to an existing file. Fails if the file does not exist.
    pub fn append(path: &Path, rows: &[EnergySample]) -> Result<(), FileError> {
        let file = open_append(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        write_rows(&mut writer, rows).map_err(|e| FileError::io(path, e))?;
        writer.flush().map_err(|e| FileError::io(path, e))
    }

    /// Reads the metadata header and every row.
    pub fn read(path: &Path) -> Result<(EnergyMetadata, EnergyTrajectory), FileError> {
        let file = File::open(path).map_err(|e| FileError::io(path, e))?;
        let mut first_line = String::new();
        BufReader::new(file)
            .read_line(&mut first_line)
            .map_err(|e| FileError::io(path, e))?;
        let json = first_line
            .trim_end()
            .strip_prefix(METADATA_PREFIX)
            .ok_or_else(|| FileError::format(path, "missing metadata header"))?;
        let metadata: EnergyMetadata =
            serde_json::from_str(json).map_err(|e| FileError::Serialization {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .from_path(path)
            .map_err(|e| FileError::format(path, e.to_string()))?;

        let headers = reader
            .headers()
            .map_err(|e| FileError::format(path, e.to_string()))?
            .clone();
        if headers.get(0) != Some(TIME_COLUMN) {
            return Err(FileError::format(path, "first column must be 'time'"));
        }
        let lambdas = headers
            .iter()
            .skip(1)
            .map(|h| parse_float(path, h))
            .collect::<Result<Vec<f64>, FileError>>()?;

        let mut samples = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| FileError::format(path, e.to_string()))?;
            let mut values = record.iter().map(|v| parse_float(path, v));
            let time = values
                .next()
                .ok_or_else(|| FileError::format(path, format!("row {} is empty", row + 1)))??;
            let energies = values.collect::<Result<Vec<f64>, FileError>>()?;
            if energies.len() != lambdas.len() {
                return Err(FileError::format(
                    path,
                    format!(
                        "row {} has {} energies, expected {}",
                        row + 1,
                        energies.len(),
                        lambdas.len()
                    ),
                ));
            }
            samples.push(EnergySample { time, energies });
        }

        Ok((metadata, EnergyTrajectory::from_samples(lambdas, samples)))
    }
}

fn write_rows<W: Write>(writer: &mut csv::Writer<W>, rows: &[EnergySample]) -> io::Result<()> {
    for sample in rows {
        let mut record = Vec::with_capacity(sample.energies.len() + 1);
        record.push(sample.time.to_string());
        record.extend(sample.energies.iter().map(f64::to_string));
        writer.write_record(&record).map_err(io::Error::from)?;
    }
    Ok(())
}

fn parse_float(path: &Path, value: &str) -> Result<f64, FileError> {
    value
        .trim()
        .parse()
        .map_err(|_| FileError::format(path, format!("invalid number '{}'", value)))
}

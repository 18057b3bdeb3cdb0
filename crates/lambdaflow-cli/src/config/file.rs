use crate::error::{CliError, Result};
use crate::utils::parser::{self, ParseError};
use lambdaflow::engine::config::{Constraint, Platform};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A time given either as a number of picoseconds or as a string with a unit.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum TimeValue {
    Picoseconds(f64),
    Text(String),
}

impl TimeValue {
    pub fn to_picoseconds(&self) -> std::result::Result<f64, ParseError> {
        match self {
            TimeValue::Picoseconds(ps) => Ok(*ps),
            TimeValue::Text(text) => parser::parse_time(text),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileLambdaConfig {
    pub num_lambda: Option<usize>,
    pub lambda_energy: Option<Vec<f64>>,
    pub gradient_increment: Option<f64>,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileDynamicsConfig {
    pub runtime: Option<TimeValue>,
    pub timestep: Option<TimeValue>,
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub constraint: Option<Constraint>,
    pub perturbable_constraint: Option<Constraint>,
    pub minimise: Option<bool>,
    /// Wall-clock limit in seconds.
    pub minimisation_timeout: Option<f64>,
    pub minimisation_max_iterations: Option<usize>,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileEquilibrationConfig {
    pub time: Option<TimeValue>,
    pub timestep: Option<TimeValue>,
    pub constraints: Option<bool>,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileOutputConfig {
    pub directory: Option<PathBuf>,
    pub checkpoint_frequency: Option<TimeValue>,
    pub energy_frequency: Option<TimeValue>,
    pub frame_frequency: Option<TimeValue>,
    pub save_trajectories: Option<bool>,
    pub save_velocities: Option<bool>,
    pub save_energy_components: Option<bool>,
    pub write_config: Option<bool>,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileResourceConfig {
    pub platform: Option<Platform>,
    pub max_threads: Option<usize>,
    pub max_gpus: Option<usize>,
    pub run_parallel: Option<bool>,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    pub restart: Option<bool>,
    pub lambda: Option<FileLambdaConfig>,
    pub dynamics: Option<FileDynamicsConfig>,
    pub equilibration: Option<FileEquilibrationConfig>,
    pub output: Option<FileOutputConfig>,
    pub resources: Option<FileResourceConfig>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}

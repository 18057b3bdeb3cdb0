use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },

    #[error("Single-state runs are not supported: 'num_lambda' must be at least 2")]
    SingleState,

    #[error("Gradient increment {increment} is too large for lambda = {lambda}")]
    GradientIncrementTooLarge { lambda: f64, increment: f64 },

    #[error("Lambda value {0} lies outside [0, 1]")]
    LambdaOutOfRange(f64),

    #[error("Lambda value {0} is not part of the lambda grid")]
    LambdaNotInGrid(f64),

    #[error("The system contains no perturbable atoms")]
    NoPerturbableAtoms,

    #[error("Device platform requested but '{variable}' is not set")]
    MissingDeviceList { variable: &'static str },

    #[error("Unknown {kind}: '{value}'")]
    UnknownVariant { kind: &'static str, value: String },
}

/// Compute platform the physics engine runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Cpu,
    Cuda,
}

impl Platform {
    /// Whether windows on this platform must hold a device from the pool.
    pub fn is_device_constrained(self) -> bool {
        matches!(self, Platform::Cuda)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Cpu => write!(f, "cpu"),
            Platform::Cuda => write!(f, "cuda"),
        }
    }
}

impl FromStr for Platform {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Platform::Cpu),
            "cuda" => Ok(Platform::Cuda),
            _ => Err(ConfigError::UnknownVariant {
                kind: "platform",
                value: s.to_string(),
            }),
        }
    }
}

/// Geometric constraint regime applied by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Constraint {
    None,
    HBonds,
    Bonds,
    HBondsNotPerturbed,
    BondsNotPerturbed,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Constraint::None => "none",
            Constraint::HBonds => "h-bonds",
            Constraint::Bonds => "bonds",
            Constraint::HBondsNotPerturbed => "h-bonds-not-perturbed",
            Constraint::BondsNotPerturbed => "bonds-not-perturbed",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Constraint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "none" => Ok(Constraint::None),
            "h-bonds" => Ok(Constraint::HBonds),
            "bonds" => Ok(Constraint::Bonds),
            "h-bonds-not-perturbed" => Ok(Constraint::HBondsNotPerturbed),
            "bonds-not-perturbed" => Ok(Constraint::BondsNotPerturbed),
            _ => Err(ConfigError::UnknownVariant {
                kind: "constraint",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_lambda: Option<usize>,
    /// Lambdas at which every window samples energies. Defaults to the lambda grid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lambda_energy: Option<Vec<f64>>,
    pub gradient_increment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicsConfig {
    /// Total production time in picoseconds.
    pub runtime: f64,
    /// Production integration timestep in picoseconds.
    pub timestep: f64,
    /// Temperature in Kelvin.
    pub temperature: f64,
    /// Pressure in atmospheres; ignored for non-periodic systems.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    pub constraint: Constraint,
    pub perturbable_constraint: Constraint,
    pub minimise: bool,
    /// Wall-clock limit for one minimisation, in seconds.
    pub minimisation_timeout: f64,
    pub minimisation_max_iterations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquilibrationConfig {
    /// Equilibration time in picoseconds; zero disables equilibration.
    pub time: f64,
    pub timestep: f64,
    /// Keep the production constraints during equilibration.
    pub constraints: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub checkpoint_frequency: f64,
    pub energy_frequency: f64,
    pub frame_frequency: f64,
    pub save_trajectories: bool,
    pub save_velocities: bool,
    pub save_energy_components: bool,
    pub write_config: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub platform: Platform,
    pub max_threads: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_gpus: Option<usize>,
    pub run_parallel: bool,
}

/// The immutable, validated set of parameters for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub restart: bool,
    pub lambda: LambdaConfig,
    pub dynamics: DynamicsConfig,
    pub equilibration: EquilibrationConfig,
    pub output: OutputConfig,
    pub resources: ResourceConfig,
}

impl RunConfig {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Default)]
pub struct RunConfigBuilder {
    restart: Option<bool>,
    num_lambda: Option<usize>,
    lambda_energy: Option<Vec<f64>>,
    gradient_increment: Option<f64>,
    runtime: Option<f64>,
    timestep: Option<f64>,
    temperature: Option<f64>,
    pressure: Option<f64>,
    constraint: Option<Constraint>,
    perturbable_constraint: Option<Constraint>,
    minimise: Option<bool>,
    minimisation_timeout: Option<f64>,
    minimisation_max_iterations: Option<usize>,
    equilibration_time: Option<f64>,
    equilibration_timestep: Option<f64>,
    equilibration_constraints: Option<bool>,
    output_directory: Option<PathBuf>,
    checkpoint_frequency: Option<f64>,
    energy_frequency: Option<f64>,
    frame_frequency: Option<f64>,
    save_trajectories: Option<bool>,
    save_velocities: Option<bool>,
    save_energy_components: Option<bool>,
    write_config: Option<bool>,
    platform: Option<Platform>,
    max_threads: Option<usize>,
    max_gpus: Option<usize>,
    run_parallel: Option<bool>,
}

impl RunConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restart(mut self, restart: bool) -> Self {
        self.restart = Some(restart);
        self
    }
    pub fn num_lambda(mut self, n: usize) -> Self {
        self.num_lambda = Some(n);
        self
    }
    pub fn lambda_energy(mut self, lambdas: Vec<f64>) -> Self {
        self.lambda_energy = Some(lambdas);
        self
    }
    pub fn gradient_increment(mut self, increment: f64) -> Self {
        self.gradient_increment = Some(increment);
        self
    }
    pub fn runtime(mut self, ps: f64) -> Self {
        self.runtime = Some(ps);
        self
    }
    pub fn timestep(mut self, ps: f64) -> Self {
        self.timestep = Some(ps);
        self
    }
    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.temperature = Some(kelvin);
        self
    }
    pub fn pressure(mut self, atm: Option<f64>) -> Self {
        self.pressure = atm;
        self
    }
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }
    pub fn perturbable_constraint(mut self, constraint: Constraint) -> Self {
        self.perturbable_constraint = Some(constraint);
        self
    }
    pub fn minimise(mut self, minimise: bool) -> Self {
        self.minimise = Some(minimise);
        self
    }
    pub fn minimisation_timeout(mut self, seconds: f64) -> Self {
        self.minimisation_timeout = Some(seconds);
        self
    }
    pub fn minimisation_max_iterations(mut self, iterations: usize) -> Self {
        self.minimisation_max_iterations = Some(iterations);
        self
    }
    pub fn equilibration_time(mut self, ps: f64) -> Self {
        self.equilibration_time = Some(ps);
        self
    }
    pub fn equilibration_timestep(mut self, ps: f64) -> Self {
        self.equilibration_timestep = Some(ps);
        self
    }
    pub fn equilibration_constraints(mut self, keep: bool) -> Self {
        self.equilibration_constraints = Some(keep);
        self
    }
    pub fn output_directory(mut self, path: PathBuf) -> Self {
        self.output_directory = Some(path);
        self
    }
    pub fn checkpoint_frequency(mut self, ps: f64) -> Self {
        self.checkpoint_frequency = Some(ps);
        self
    }
    pub fn energy_frequency(mut self, ps: f64) -> Self {
        self.energy_frequency = Some(ps);
        self
    }
    pub fn frame_frequency(mut self, ps: f64) -> Self {
        self.frame_frequency = Some(ps);
        self
    }
    pub fn save_trajectories(mut self, save: bool) -> Self {
        self.save_trajectories = Some(save);
        self
    }
    pub fn save_velocities(mut self, save: bool) -> Self {
        self.save_velocities = Some(save);
        self
    }
    pub fn save_energy_components(mut self, save: bool) -> Self {
        self.save_energy_components = Some(save);
        self
    }
    pub fn write_config(mut self, write: bool) -> Self {
        self.write_config = Some(write);
        self
    }
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }
    pub fn max_threads(mut self, threads: usize) -> Self {
        self.max_threads = Some(threads);
        self
    }
    pub fn max_gpus(mut self, gpus: Option<usize>) -> Self {
        self.max_gpus = gpus;
        self
    }
    pub fn run_parallel(mut self, parallel: bool) -> Self {
        self.run_parallel = Some(parallel);
        self
    }

    pub fn build(self) -> Result<RunConfig, ConfigError> {
        let runtime = self
            .runtime
            .ok_or(ConfigError::MissingParameter("runtime"))?;
        let timestep = self
            .timestep
            .ok_or(ConfigError::MissingParameter("timestep"))?;
        let checkpoint_frequency = self
            .checkpoint_frequency
            .ok_or(ConfigError::MissingParameter("checkpoint_frequency"))?;
        let energy_frequency = self
            .energy_frequency
            .ok_or(ConfigError::MissingParameter("energy_frequency"))?;

        let config = RunConfig {
            restart: self.restart.unwrap_or(false),
            lambda: LambdaConfig {
                num_lambda: self.num_lambda,
                lambda_energy: self.lambda_energy,
                gradient_increment: self.gradient_increment.unwrap_or(0.001),
            },
            dynamics: DynamicsConfig {
                runtime,
                timestep,
                temperature: self
                    .temperature
                    .ok_or(ConfigError::MissingParameter("temperature"))?,
                pressure: self.pressure,
                constraint: self.constraint.unwrap_or(Constraint::HBonds),
                perturbable_constraint: self.perturbable_constraint.unwrap_or(Constraint::None),
                minimise: self.minimise.unwrap_or(true),
                minimisation_timeout: self.minimisation_timeout.unwrap_or(300.0),
                minimisation_max_iterations: self.minimisation_max_iterations.unwrap_or(10_000),
            },
            equilibration: EquilibrationConfig {
                time: self.equilibration_time.unwrap_or(0.0),
                timestep: self.equilibration_timestep.unwrap_or(timestep),
                constraints: self.equilibration_constraints.unwrap_or(false),
            },
            output: OutputConfig {
                directory: self
                    .output_directory
                    .ok_or(ConfigError::MissingParameter("output_directory"))?,
                checkpoint_frequency,
                energy_frequency,
                frame_frequency: self.frame_frequency.unwrap_or(checkpoint_frequency),
                save_trajectories: self.save_trajectories.unwrap_or(true),
                save_velocities: self.save_velocities.unwrap_or(false),
                save_energy_components: self.save_energy_components.unwrap_or(false),
                write_config: self.write_config.unwrap_or(true),
            },
            resources: ResourceConfig {
                platform: self.platform.unwrap_or(Platform::Cpu),
                max_threads: self.max_threads.unwrap_or(1),
                max_gpus: self.max_gpus,
                run_parallel: self.run_parallel.unwrap_or(false),
            },
        };

        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &RunConfig) -> Result<(), ConfigError> {
    let positive = |parameter: &'static str, value: f64| {
        if value > 0.0 && value.is_finite() {
            Ok(())
        } else {
            Err(ConfigError::InvalidValue {
                parameter,
                reason: format!("must be a positive, finite number (got {})", value),
            })
        }
    };

    positive("runtime", config.dynamics.runtime)?;
    positive("timestep", config.dynamics.timestep)?;
    positive("temperature", config.dynamics.temperature)?;
    positive("checkpoint_frequency", config.output.checkpoint_frequency)?;
    positive("energy_frequency", config.output.energy_frequency)?;
    positive("frame_frequency", config.output.frame_frequency)?;
    positive("equilibration_timestep", config.equilibration.timestep)?;
    positive("minimisation_timeout", config.dynamics.minimisation_timeout)?;

    if config.equilibration.time < 0.0 {
        return Err(ConfigError::InvalidValue {
            parameter: "equilibration_time",
            reason: "must not be negative".to_string(),
        });
    }
    if config.output.energy_frequency > config.output.checkpoint_frequency {
        return Err(ConfigError::InvalidValue {
            parameter: "energy_frequency",
            reason: "must not exceed checkpoint_frequency".to_string(),
        });
    }
    let increment = config.lambda.gradient_increment;
    if !(increment > 0.0 && increment <= 0.5) {
        return Err(ConfigError::InvalidValue {
            parameter: "gradient_increment",
            reason: format!("must lie in (0, 0.5] (got {})", increment),
        });
    }
    if let Some(lambdas) = &config.lambda.lambda_energy {
        if let Some(&bad) = lambdas.iter().find(|l| !(0.0..=1.0).contains(*l)) {
            return Err(ConfigError::LambdaOutOfRange(bad));
        }
    }
    if config.resources.max_threads == 0 {
        return Err(ConfigError::InvalidValue {
            parameter: "max_threads",
            reason: "must be at least 1".to_string(),
        });
    }
    if config.resources.max_gpus == Some(0) {
        return Err(ConfigError::InvalidValue {
            parameter: "max_gpus",
            reason: "must be at least 1 when set".to_string(),
        });
    }
    Ok(())
}

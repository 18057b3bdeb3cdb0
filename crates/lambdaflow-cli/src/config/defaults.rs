use lambdaflow::engine::config::{Constraint, Platform};
use std::path::PathBuf;

pub struct DefaultsConfig {
    pub num_lambda: usize,
    pub gradient_increment: f64,
    pub runtime: f64,
    pub timestep: f64,
    pub temperature: f64,
    pub constraint: Constraint,
    pub perturbable_constraint: Constraint,
    pub minimise: bool,
    pub minimisation_timeout: f64,
    pub minimisation_max_iterations: usize,
    pub equilibration_time: f64,
    pub equilibration_constraints: bool,
    pub output_directory: PathBuf,
    pub checkpoint_frequency: f64,
    pub energy_frequency: f64,
    pub frame_frequency: f64,
    pub save_trajectories: bool,
    pub save_velocities: bool,
    pub save_energy_components: bool,
    pub write_config: bool,
    pub platform: Platform,
    pub max_threads: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            num_lambda: 11,
            gradient_increment: 0.001,
            runtime: 1000.0,
            timestep: 0.004,
            temperature: 300.0,
            constraint: Constraint::HBonds,
            perturbable_constraint: Constraint::None,
            minimise: true,
            minimisation_timeout: 300.0,
            minimisation_max_iterations: 10_000,
            equilibration_time: 0.0,
            equilibration_constraints: false,
            output_directory: PathBuf::from("output"),
            checkpoint_frequency: 100.0,
            energy_frequency: 1.0,
            frame_frequency: 20.0,
            save_trajectories: true,
            save_velocities: false,
            save_energy_components: false,
            write_config: true,
            platform: Platform::Cpu,
            max_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

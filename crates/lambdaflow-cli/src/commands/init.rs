use crate::cli::InitArgs;
use crate::config::{
    DefaultsConfig, FileConfig, FileDynamicsConfig, FileEquilibrationConfig, FileLambdaConfig,
    FileOutputConfig, FileResourceConfig, TimeValue,
};
use crate::error::{CliError, Result};
use lambdaflow::core::models::state::{Atom, SystemState};
use nalgebra::Point3;
use std::path::Path;
use tracing::info;

/// A six-atom tethered system whose two hydrogens are perturbed into stiffer tethers.
pub fn reference_system() -> SystemState {
    let atoms = vec![
        Atom::new("C", 12.011, Point3::new(0.000, 0.000, 0.000), 20.0),
        Atom::new("O", 15.999, Point3::new(1.430, 0.000, 0.000), 20.0),
        Atom::new("H", 1.008, Point3::new(-0.360, 1.030, 0.000), 5.0).with_perturbation(5.0, 40.0),
        Atom::new("H", 1.008, Point3::new(-0.360, -0.510, 0.890), 5.0)
            .with_perturbation(5.0, 40.0),
        Atom::new("H", 1.008, Point3::new(-0.360, -0.510, -0.890), 5.0),
        Atom::new("H", 1.008, Point3::new(1.750, -0.900, 0.000), 5.0),
    ];
    SystemState::new("reference", atoms)
}

/// A configuration file with every default written out explicitly.
pub fn default_file_config() -> FileConfig {
    let d = DefaultsConfig::default();
    FileConfig {
        restart: Some(false),
        lambda: Some(FileLambdaConfig {
            num_lambda: Some(d.num_lambda),
            lambda_energy: None,
            gradient_increment: Some(d.gradient_increment),
        }),
        dynamics: Some(FileDynamicsConfig {
            runtime: Some(TimeValue::Text(format!("{}ps", d.runtime))),
            timestep: Some(TimeValue::Text(format!("{}fs", d.timestep * 1e3))),
            temperature: Some(d.temperature),
            pressure: None,
            constraint: Some(d.constraint),
            perturbable_constraint: Some(d.perturbable_constraint),
            minimise: Some(d.minimise),
            minimisation_timeout: Some(d.minimisation_timeout),
            minimisation_max_iterations: Some(d.minimisation_max_iterations),
        }),
        equilibration: Some(FileEquilibrationConfig {
            time: Some(TimeValue::Picoseconds(d.equilibration_time)),
            timestep: None,
            constraints: Some(d.equilibration_constraints),
        }),
        output: Some(FileOutputConfig {
            directory: Some(d.output_directory),
            checkpoint_frequency: Some(TimeValue::Text(format!("{}ps", d.checkpoint_frequency))),
            energy_frequency: Some(TimeValue::Text(format!("{}ps", d.energy_frequency))),
            frame_frequency: Some(TimeValue::Text(format!("{}ps", d.frame_frequency))),
            save_trajectories: Some(d.save_trajectories),
            save_velocities: Some(d.save_velocities),
            save_energy_components: Some(d.save_energy_components),
            write_config: Some(d.write_config),
        }),
        resources: Some(FileResourceConfig {
            platform: Some(d.platform),
            max_threads: None,
            max_gpus: None,
            run_parallel: Some(false),
        }),
    }
}

pub fn run(args: InitArgs) -> Result<()> {
    let system = serde_json::to_string_pretty(&reference_system())
        .map_err(|e| CliError::Other(e.into()))?;
    write_new_file(&args.output, &system, args.force)?;
    println!("✓ Test system written to: {}", args.output.display());

    if let Some(config_path) = &args.config {
        let config = toml::to_string_pretty(&default_file_config())
            .map_err(|e| CliError::Other(e.into()))?;
        write_new_file(config_path, &config, args.force)?;
        println!("✓ Configuration written to: {}", config_path.display());
    }
    Ok(())
}

fn write_new_file(path: &Path, content: &str, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(CliError::Argument(format!(
            "'{}' already exists. Use --force to overwrite it.",
            path.display()
        )));
    }
    info!("Writing {:?}", path);
    std::fs::write(path, content)?;
    Ok(())
}

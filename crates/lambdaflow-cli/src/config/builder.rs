use super::defaults::DefaultsConfig;
use super::file::{FileConfig, TimeValue};
use super::models::AppConfig;
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use crate::utils::parser;
use lambdaflow::engine::config::{RunConfig, RunConfigBuilder};
use std::path::PathBuf;
use std::str::FromStr;

/// Resolves the final run configuration.
///
/// Precedence, highest first: command-line flags, `-S key=value` overrides, the config
/// file, built-in defaults.
pub fn build_config(args: &RunArgs, threads: Option<usize>) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = if let Some(config_path) = &args.config {
        FileConfig::from_file(config_path)?
    } else {
        FileConfig::default()
    };

    let file_config = apply_set_values(file_config, &args.set_values)?;
    let core_config = merge(args, threads, file_config, &defaults)?;

    Ok(AppConfig {
        input_path: args.input.clone(),
        seed: args.seed,
        core_config,
    })
}

fn merge(
    args: &RunArgs,
    threads: Option<usize>,
    file: FileConfig,
    defaults: &DefaultsConfig,
) -> Result<RunConfig> {
    let lambda = file.lambda.unwrap_or_default();
    let dynamics = file.dynamics.unwrap_or_default();
    let equilibration = file.equilibration.unwrap_or_default();
    let output = file.output.unwrap_or_default();
    let resources = file.resources.unwrap_or_default();

    let runtime = resolve_time("dynamics.runtime", args.runtime.as_deref(), dynamics.runtime)?
        .unwrap_or(defaults.runtime);
    let timestep = resolve_time("dynamics.timestep", args.timestep.as_deref(), dynamics.timestep)?
        .unwrap_or(defaults.timestep);
    let equilibration_time = resolve_time(
        "equilibration.time",
        args.equilibration_time.as_deref(),
        equilibration.time,
    )?
    .unwrap_or(defaults.equilibration_time);
    let equilibration_timestep =
        resolve_time("equilibration.timestep", None, equilibration.timestep)?.unwrap_or(timestep);
    let checkpoint_frequency =
        resolve_time("output.checkpoint-frequency", None, output.checkpoint_frequency)?
            .unwrap_or(defaults.checkpoint_frequency);
    let energy_frequency = resolve_time("output.energy-frequency", None, output.energy_frequency)?
        .unwrap_or(defaults.energy_frequency);
    let frame_frequency = resolve_time("output.frame-frequency", None, output.frame_frequency)?
        .unwrap_or(defaults.frame_frequency);

    let minimise = if args.no_minimise {
        false
    } else {
        dynamics.minimise.unwrap_or(defaults.minimise)
    };

    let mut builder = RunConfigBuilder::new()
        .restart(args.restart || file.restart.unwrap_or(false))
        .num_lambda(
            args.num_lambda
                .or(lambda.num_lambda)
                .unwrap_or(defaults.num_lambda),
        )
        .gradient_increment(
            lambda
                .gradient_increment
                .unwrap_or(defaults.gradient_increment),
        )
        .runtime(runtime)
        .timestep(timestep)
        .temperature(
            args.temperature
                .or(dynamics.temperature)
                .unwrap_or(defaults.temperature),
        )
        .pressure(dynamics.pressure)
        .constraint(dynamics.constraint.unwrap_or(defaults.constraint))
        .perturbable_constraint(
            dynamics
                .perturbable_constraint
                .unwrap_or(defaults.perturbable_constraint),
        )
        .minimise(minimise)
        .minimisation_timeout(
            dynamics
                .minimisation_timeout
                .unwrap_or(defaults.minimisation_timeout),
        )
        .minimisation_max_iterations(
            dynamics
                .minimisation_max_iterations
                .unwrap_or(defaults.minimisation_max_iterations),
        )
        .equilibration_time(equilibration_time)
        .equilibration_timestep(equilibration_timestep)
        .equilibration_constraints(
            equilibration
                .constraints
                .unwrap_or(defaults.equilibration_constraints),
        )
        .output_directory(
            args.output
                .clone()
                .or(output.directory)
                .unwrap_or_else(|| defaults.output_directory.clone()),
        )
        .checkpoint_frequency(checkpoint_frequency)
        .energy_frequency(energy_frequency)
        .frame_frequency(frame_frequency)
        .save_trajectories(
            output
                .save_trajectories
                .unwrap_or(defaults.save_trajectories),
        )
        .save_velocities(output.save_velocities.unwrap_or(defaults.save_velocities))
        .save_energy_components(
            output
                .save_energy_components
                .unwrap_or(defaults.save_energy_components),
        )
        .write_config(output.write_config.unwrap_or(defaults.write_config))
        .platform(args.platform.or(resources.platform).unwrap_or(defaults.platform))
        .max_threads(
            threads
                .or(resources.max_threads)
                .unwrap_or(defaults.max_threads),
        )
        .max_gpus(args.max_gpus.or(resources.max_gpus))
        .run_parallel(args.parallel || resources.run_parallel.unwrap_or(false));

    if let Some(lambdas) = lambda.lambda_energy {
        builder = builder.lambda_energy(lambdas);
    }

    builder.build().map_err(|e| CliError::Config(e.to_string()))
}

fn resolve_time(
    key: &str,
    cli_arg: Option<&str>,
    file_val: Option<TimeValue>,
) -> Result<Option<f64>> {
    let value = match cli_arg {
        Some(text) => Some(TimeValue::Text(text.to_string())),
        None => file_val,
    };
    value
        .map(|v| v.to_picoseconds())
        .transpose()
        .map_err(|e| CliError::Config(format!("Invalid value for {}: {}", key, e)))
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let (key, value) =
            parser::parse_key_value(kv_pair).map_err(|e| CliError::Config(e.to_string()))?;
        let time = || TimeValue::Text(value.to_string());

        match key {
            "restart" => config.restart = Some(parse_value(key, value)?),
            "lambda.num-lambda" => {
                config.lambda.get_or_insert_with(Default::default).num_lambda =
                    Some(parse_value(key, value)?);
            }
            "lambda.gradient-increment" => {
                config
                    .lambda
                    .get_or_insert_with(Default::default)
                    .gradient_increment = Some(parse_value(key, value)?);
            }
            "lambda.lambda-energy" => {
                let lambdas = value
                    .split(',')
                    .map(|l| parse_value(key, l.trim()))
                    .collect::<Result<Vec<f64>>>()?;
                config
                    .lambda
                    .get_or_insert_with(Default::default)
                    .lambda_energy = Some(lambdas);
            }
            "dynamics.runtime" => {
                config.dynamics.get_or_insert_with(Default::default).runtime = Some(time());
            }
            "dynamics.timestep" => {
                config.dynamics.get_or_insert_with(Default::default).timestep = Some(time());
            }
            "dynamics.temperature" => {
                config.dynamics.get_or_insert_with(Default::default).temperature =
                    Some(parse_value(key, value)?);
            }
            "dynamics.pressure" => {
                config.dynamics.get_or_insert_with(Default::default).pressure =
                    Some(parse_value(key, value)?);
            }
            "dynamics.constraint" => {
                config.dynamics.get_or_insert_with(Default::default).constraint =
                    Some(parse_value(key, value)?);
            }
            "dynamics.perturbable-constraint" => {
                config
                    .dynamics
                    .get_or_insert_with(Default::default)
                    .perturbable_constraint = Some(parse_value(key, value)?);
            }
            "dynamics.minimise" => {
                config.dynamics.get_or_insert_with(Default::default).minimise =
                    Some(parse_value(key, value)?);
            }
            "dynamics.minimisation-timeout" => {
                config
                    .dynamics
                    .get_or_insert_with(Default::default)
                    .minimisation_timeout = Some(parse_value(key, value)?);
            }
            "dynamics.minimisation-max-iterations" => {
                config
                    .dynamics
                    .get_or_insert_with(Default::default)
                    .minimisation_max_iterations = Some(parse_value(key, value)?);
            }
            "equilibration.time" => {
                config.equilibration.get_or_insert_with(Default::default).time = Some(time());
            }
            "equilibration.timestep" => {
                config.equilibration.get_or_insert_with(Default::default).timestep =
                    Some(time());
            }
            "equilibration.constraints" => {
                config
                    .equilibration
                    .get_or_insert_with(Default::default)
                    .constraints = Some(parse_value(key, value)?);
            }
            "output.directory" => {
                config.output.get_or_insert_with(Default::default).directory =
                    Some(PathBuf::from(value));
            }
            "output.checkpoint-frequency" => {
                config
                    .output
                    .get_or_insert_with(Default::default)
                    .checkpoint_frequency = Some(time());
            }
            "output.energy-frequency" => {
                config.output.get_or_insert_with(Default::default).energy_frequency =
                    Some(time());
            }
            "output.frame-frequency" => {
                config.output.get_or_insert_with(Default::default).frame_frequency =
                    Some(time());
            }
            "output.save-trajectories" => {
                config
                    .output
                    .get_or_insert_with(Default::default)
                    .save_trajectories = Some(parse_value(key, value)?);
            }
            "output.save-velocities" => {
                config.output.get_or_insert_with(Default::default).save_velocities =
                    Some(parse_value(key, value)?);
            }
            "output.save-energy-components" => {
                config
                    .output
                    .get_or_insert_with(Default::default)
                    .save_energy_components = Some(parse_value(key, value)?);
            }
            "output.write-config" => {
                config.output.get_or_insert_with(Default::default).write_config =
                    Some(parse_value(key, value)?);
            }
            "resources.platform" => {
                config.resources.get_or_insert_with(Default::default).platform =
                    Some(parse_value(key, value)?);
            }
            "resources.max-threads" => {
                config.resources.get_or_insert_with(Default::default).max_threads =
                    Some(parse_value(key, value)?);
            }
            "resources.max-gpus" => {
                config.resources.get_or_insert_with(Default::default).max_gpus =
                    Some(parse_value(key, value)?);
            }
            "resources.run-parallel" => {
                config.resources.get_or_insert_with(Default::default).run_parallel =
                    Some(parse_value(key, value)?);
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}

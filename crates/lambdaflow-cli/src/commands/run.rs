use crate::cli::RunArgs;
use crate::config::build_config;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use lambdaflow::{
    core::models::state::SystemState,
    engine::{progress::ProgressReporter, reference::ReferenceEngine},
    workflows::schedule::{RunResult, WindowFailure, WindowScheduler},
};
use std::path::Path;
use tracing::{info, warn};

pub fn run(args: RunArgs, threads: Option<usize>) -> Result<()> {
    info!("Merging configuration from defaults, file and CLI arguments...");
    let app = build_config(&args, threads)?;

    info!("Loading input system from {:?}", &app.input_path);
    let system = load_system(&app.input_path)?;

    let engine = match app.seed {
        Some(seed) => ReferenceEngine::with_seed(seed),
        None => ReferenceEngine::new(),
    };

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Running {} lambda windows into {}...",
        app.core_config.lambda.num_lambda.unwrap_or(0),
        app.core_config.output.directory.display()
    );
    info!("Invoking the window scheduler...");

    let outcomes = WindowScheduler::new(&engine, system, app.core_config).run_detailed(&reporter)?;

    let (results, failures): (Vec<_>, Vec<_>) = outcomes.into_iter().partition(|o| o.is_ok());
    let results: Vec<RunResult> = results.into_iter().filter_map(|o| o.ok()).collect();
    let failures: Vec<WindowFailure> = failures.into_iter().filter_map(|o| o.err()).collect();

    for result in &results {
        println!("  ✓ {}", describe_result(result));
    }
    for failure in &failures {
        warn!(lambda = failure.lambda, error = %failure.error, "Window excluded from results.");
        println!("  ✗ λ={:.5}: {}", failure.lambda, failure.error);
    }

    if results.is_empty() {
        return Err(CliError::Other(anyhow::anyhow!(
            "All {} windows failed",
            failures.len()
        )));
    }
    if !failures.is_empty() {
        println!(
            "Warning: {} of {} windows failed and were excluded.",
            failures.len(),
            failures.len() + results.len()
        );
    }
    Ok(())
}

pub fn load_system(path: &Path) -> Result<SystemState> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

fn describe_result(result: &RunResult) -> String {
    let speed = result
        .throughput
        .map_or_else(|| "n/a".to_string(), |s| format!("{:.1} ns/day", s));
    format!(
        "λ={:.5}: {} energy samples, {}",
        result.lambda,
        result.energy_trajectory.len(),
        speed
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::commands::init::reference_system;
    use clap::Parser;
    use lambdaflow::core::io::energy::EnergyTrajectoryFile;
    use std::fs;

    fn run_args(args: &[&str]) -> (RunArgs, Option<usize>) {
        let mut full = vec!["lambdaflow", "run"];
        full.extend_from_slice(args);
        let cli = Cli::parse_from(full);
        match cli.command {
            Commands::Run(run) => (run, cli.threads),
            _ => panic!("Expected 'run' subcommand"),
        }
    }

    #[test]
    fn end_to_end_run_writes_every_window() {
        let dir = tempfile::tempdir().unwrap();
        let system_path = dir.path().join("system.json");
        fs::write(
            &system_path,
            serde_json::to_string(&reference_system()).unwrap(),
        )
        .unwrap();
        let out = dir.path().join("out");

        let (args, threads) = run_args(&[
            "-i",
            system_path.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "-n",
            "3",
            "--runtime",
            "2ps",
            "--seed",
            "5",
            "-j",
            "2",
            "-S",
            "output.checkpoint-frequency=1ps",
            "-S",
            "output.energy-frequency=0.5ps",
            "-S",
            "output.frame-frequency=1ps",
        ]);
        run(args, threads).unwrap();

        for label in ["0.00000", "0.50000", "1.00000"] {
            let (meta, trajectory) =
                EnergyTrajectoryFile::read(&out.join(format!("energy_traj_{}.csv", label))).unwrap();
            assert_eq!(trajectory.len(), 4);
            assert!(meta.speed.is_some());
            assert!(out.join(format!("traj_{}.xyz", label)).exists());
            assert!(out.join(format!("checkpoint_{}.json", label)).exists());
        }
    }

    #[test]
    fn missing_system_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_system(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(CliError::Io(_))));
    }

    #[test]
    fn malformed_system_file_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{\"name\": 3}").unwrap();
        match load_system(&path) {
            Err(CliError::FileParsing { path: reported, .. }) => assert_eq!(reported, path),
            _ => panic!("expected a parsing error"),
        }
    }
}

use crate::cli::InspectArgs;
use crate::error::{CliError, Result};
use lambdaflow::core::io::energy::{EnergyMetadata, EnergyTrajectoryFile};
use lambdaflow::core::models::energy::EnergyTrajectory;
use tracing::info;

/// Per-column statistics of an energy trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub lambda: f64,
    pub mean: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnergySummary {
    pub samples: usize,
    pub first_time: Option<f64>,
    pub last_time: Option<f64>,
    pub columns: Vec<ColumnSummary>,
}

pub fn run(args: InspectArgs) -> Result<()> {
    info!("Reading energy trajectory from {:?}", &args.path);
    let (metadata, trajectory) =
        EnergyTrajectoryFile::read(&args.path).map_err(|e| CliError::FileParsing {
            path: args.path.clone(),
            source: e.into(),
        })?;

    print_summary(&metadata, &summarise(&trajectory));
    Ok(())
}

pub fn summarise(trajectory: &EnergyTrajectory) -> EnergySummary {
    let samples = trajectory.samples();
    let n = samples.len() as f64;

    let columns = trajectory
        .lambdas()
        .iter()
        .enumerate()
        .map(|(i, &lambda)| {
            if samples.is_empty() {
                return ColumnSummary {
                    lambda,
                    mean: f64::NAN,
                    std_dev: f64::NAN,
                };
            }
            let mean = samples.iter().map(|s| s.energies[i]).sum::<f64>() / n;
            let variance = samples
                .iter()
                .map(|s| (s.energies[i] - mean).powi(2))
                .sum::<f64>()
                / n;
            ColumnSummary {
                lambda,
                mean,
                std_dev: variance.sqrt(),
            }
        })
        .collect();

    EnergySummary {
        samples: samples.len(),
        first_time: samples.first().map(|s| s.time),
        last_time: samples.last().map(|s| s.time),
        columns,
    }
}

fn print_summary(metadata: &EnergyMetadata, summary: &EnergySummary) {
    println!("Window λ = {:.5}", metadata.lambda);
    println!(
        "  Temperature: {} K, energy unit: {}",
        metadata.temperature, metadata.attrs.energy_unit
    );
    match metadata.speed {
        Some(speed) => println!("  Throughput: {:.1} ns/day", speed),
        None => println!("  Throughput: not recorded (window unfinished)"),
    }
    println!("  Gradient neighbors: {:?}", metadata.lambda_grad);
    match (summary.first_time, summary.last_time) {
        (Some(first), Some(last)) => println!(
            "  Samples: {} ({} ps to {} ps)",
            summary.samples, first, last
        ),
        _ => println!("  Samples: 0"),
    }
    println!("  {:>10} {:>16} {:>16}", "lambda", "mean (kT)", "std (kT)");
    for column in &summary.columns {
        println!(
            "  {:>10.5} {:>16.4} {:>16.4}",
            column.lambda, column.mean, column.std_dev
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lambdaflow::core::models::energy::EnergySample;

    #[test]
    fn summary_reports_per_column_statistics() {
        let trajectory = EnergyTrajectory::from_samples(
            vec![0.0, 1.0],
            vec![
                EnergySample {
                    time: 1.0,
                    energies: vec![1.0, 4.0],
                },
                EnergySample {
                    time: 2.0,
                    energies: vec![3.0, 4.0],
                },
            ],
        );

        let summary = summarise(&trajectory);

        assert_eq!(summary.samples, 2);
        assert_eq!(summary.first_time, Some(1.0));
        assert_eq!(summary.last_time, Some(2.0));
        assert_eq!(summary.columns[0].mean, 2.0);
        assert_eq!(summary.columns[0].std_dev, 1.0);
        assert_eq!(summary.columns[1].mean, 4.0);
        assert_eq!(summary.columns[1].std_dev, 0.0);
    }

    #[test]
    fn empty_trajectory_has_no_time_range() {
        let summary = summarise(&EnergyTrajectory::new(vec![0.0, 0.5]));
        assert_eq!(summary.samples, 0);
        assert_eq!(summary.first_time, None);
        assert_eq!(summary.columns.len(), 2);
        assert!(summary.columns[0].mean.is_nan());
    }

    #[test]
    fn written_file_can_be_inspected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("energy_traj_0.50000.csv");
        let trajectory = EnergyTrajectory::from_samples(
            vec![0.0, 0.5, 1.0],
            vec![EnergySample {
                time: 0.1,
                energies: vec![2.0, 1.5, 1.0],
            }],
        );
        let metadata = EnergyMetadata::new(0.5, vec![0.0, 0.5, 1.0], vec![0.499, 0.501], 300.0);
        EnergyTrajectoryFile::write(&path, &metadata, &trajectory).unwrap();

        run(InspectArgs { path }).unwrap();
    }

    #[test]
    fn missing_file_is_a_parsing_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(InspectArgs {
            path: dir.path().join("absent.csv"),
        });
        assert!(matches!(result, Err(CliError::FileParsing { .. })));
    }
}

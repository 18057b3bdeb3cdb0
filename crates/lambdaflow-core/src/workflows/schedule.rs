use crate::core::io::energy::EnergyTrajectoryFile;
use crate::core::io::{FileError, write_atomically};
use crate::core::lambda::lambda_grid;
use crate::core::models::energy::EnergyTrajectory;
use crate::core::models::state::SystemState;
use crate::core::models::window::Window;
use crate::engine::config::{ConfigError, Platform, RunConfig};
use crate::engine::device::{DeviceLease, DevicePool, visible_devices_from_env};
use crate::engine::error::{SchedulerError, SessionError};
use crate::engine::md::MdEngine;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::session::{Placement, SimulationSession, energy_metadata, window_files};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{error, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// The outcome of one successfully completed window.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub lambda: f64,
    pub energy_trajectory: EnergyTrajectory,
    pub gradient_neighbors: Vec<f64>,
    /// Measured production throughput in ns/day.
    pub throughput: Option<f64>,
}

/// Why a window did not complete.
#[derive(Debug)]
pub struct WindowFailure {
    pub lambda: f64,
    pub error: SessionError,
}

/// Splits `max_threads` CPU threads over `num_windows` concurrently running windows.
///
/// Returns the number of workers and the threads each worker gets. Threads are divided
/// by floor division; leftover threads stay unused.
pub fn cpu_partition(max_threads: usize, num_windows: usize) -> (usize, usize) {
    if num_windows > max_threads {
        (max_threads, 1)
    } else {
        (num_windows, (max_threads / num_windows.max(1)).max(1))
    }
}

/// Runs every lambda window of an alchemical calculation.
///
/// Windows are independent. A window that fails, after its one permitted retry, is logged
/// and left out of the results; it never affects its siblings.
pub struct WindowScheduler<'a> {
    engine: &'a dyn MdEngine,
    system: SystemState,
    config: RunConfig,
    visible_devices: Option<Vec<String>>,
}

impl<'a> WindowScheduler<'a> {
    pub fn new(engine: &'a dyn MdEngine, system: SystemState, config: RunConfig) -> Self {
        Self {
            engine,
            system,
            config,
            visible_devices: None,
        }
    }

    /// Uses `devices` instead of reading the visible device list from the environment.
    pub fn with_visible_devices(mut self, devices: Vec<String>) -> Self {
        self.visible_devices = Some(devices);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The windows this run will execute, in ascending lambda order.
    ///
    /// # Errors
    ///
    /// Fails if the system has no perturbable atoms, fewer than two windows are
    /// configured, or any window's gradient neighbors fall outside `[0, 1]`.
    pub fn windows(&self) -> Result<Vec<Window>, ConfigError> {
        if !self.system.has_perturbable_atoms() {
            return Err(ConfigError::NoPerturbableAtoms);
        }
        let grid = lambda_grid(self.config.lambda.num_lambda.unwrap_or(0))?;
        let candidates = self
            .config
            .lambda
            .lambda_energy
            .clone()
            .unwrap_or_else(|| grid.clone());

        grid.iter()
            .map(|&lambda| {
                Window::new(
                    lambda,
                    &grid,
                    &candidates,
                    self.config.lambda.gradient_increment,
                )
            })
            .collect()
    }

    /// Runs every window and returns the results of those that succeeded.
    pub fn run(&self, reporter: &ProgressReporter) -> Result<Vec<RunResult>, SchedulerError> {
        Ok(self
            .run_detailed(reporter)?
            .into_iter()
            .filter_map(Result::ok)
            .collect())
    }

    /// Runs every window and returns one outcome per window, in ascending lambda order.
    ///
    /// # Errors
    ///
    /// Only configuration, output directory and device pool problems are returned as
    /// errors, and always before any window starts.
    #[instrument(skip_all, name = "window_scheduler")]
    pub fn run_detailed(
        &self,
        reporter: &ProgressReporter,
    ) -> Result<Vec<Result<RunResult, WindowFailure>>, SchedulerError> {
        let windows = self.windows()?;
        let directory = &self.config.output.directory;
        std::fs::create_dir_all(directory).map_err(|e| FileError::io(directory, e))?;

        let resources = &self.config.resources;
        let parallel = resources.run_parallel;
        let pool = if parallel && resources.platform.is_device_constrained() {
            let devices = match &self.visible_devices {
                Some(devices) => devices.clone(),
                None => visible_devices_from_env()?,
            };
            let pool = DevicePool::from_visible_devices(&devices, resources.max_gpus);
            if pool.capacity() == 0 {
                return Err(crate::engine::device::PoolError::Unpopulated.into());
            }
            Some(pool)
        } else {
            None
        };

        info!(
            windows = windows.len(),
            platform = %resources.platform,
            parallel,
            restart = self.config.restart,
            engine = self.engine.name(),
            "Starting alchemical run."
        );
        reporter.report(Progress::RunStart {
            total_windows: windows.len() as u64,
        });

        let outcomes = if parallel {
            self.run_parallel(&windows, pool.as_ref(), reporter)?
        } else {
            self.run_sequential(&windows, reporter)
        };

        let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
        for failure in outcomes.iter().filter_map(|o| o.as_ref().err()) {
            error!(
                lambda = failure.lambda,
                error = %failure.error,
                "Window failed and is excluded from the results."
            );
        }
        info!(
            succeeded,
            failed = outcomes.len() - succeeded,
            "Alchemical run finished."
        );
        reporter.report(Progress::RunFinish);
        Ok(outcomes)
    }

    fn run_sequential(
        &self,
        windows: &[Window],
        reporter: &ProgressReporter,
    ) -> Vec<Result<RunResult, WindowFailure>> {
        let placement = match self.config.resources.platform {
            Platform::Cuda => Placement {
                device: Some(0),
                threads: None,
            },
            Platform::Cpu => Placement {
                device: None,
                threads: Some(self.config.resources.max_threads),
            },
        };
        windows
            .iter()
            .map(|window| self.run_window(window, None, placement, reporter))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn run_parallel(
        &self,
        windows: &[Window],
        pool: Option<&DevicePool>,
        reporter: &ProgressReporter,
    ) -> Result<Vec<Result<RunResult, WindowFailure>>, SchedulerError> {
        let (workers, placement) = match pool {
            Some(pool) => (pool.capacity().min(windows.len()), Placement::default()),
            None => {
                let (workers, threads) =
                    cpu_partition(self.config.resources.max_threads, windows.len());
                (
                    workers,
                    Placement {
                        device: None,
                        threads: Some(threads),
                    },
                )
            }
        };
        info!(
            workers,
            threads_per_worker = ?placement.threads,
            "Dispatching windows to the worker pool."
        );

        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("lambdaflow-worker-{}", i))
            .build()
            .map_err(|e| SchedulerError::WorkerPool(e.to_string()))?;

        Ok(thread_pool.install(|| {
            windows
                .par_iter()
                .with_max_len(1)
                .map(|window| self.run_window(window, pool, placement, reporter))
                .collect()
        }))
    }

    #[cfg(not(feature = "parallel"))]
    fn run_parallel(
        &self,
        windows: &[Window],
        _pool: Option<&DevicePool>,
        reporter: &ProgressReporter,
    ) -> Result<Vec<Result<RunResult, WindowFailure>>, SchedulerError> {
        warn!("Built without the 'parallel' feature; running windows sequentially.");
        Ok(self.run_sequential(windows, reporter))
    }

    /// Runs one window behind the failure-isolation boundary. A device leased from
    /// `pool` is held for exactly the lifetime of the session and returned on every exit
    /// path, including panics.
    fn run_window(
        &self,
        window: &Window,
        pool: Option<&DevicePool>,
        placement: Placement,
        reporter: &ProgressReporter,
    ) -> Result<RunResult, WindowFailure> {
        let lambda = window.lambda();
        let outcome = pool
            .map(DevicePool::lease)
            .transpose()
            .map_err(SessionError::from)
            .and_then(|lease| {
                let placement = Placement {
                    device: lease.as_ref().map(DeviceLease::id).or(placement.device),
                    ..placement
                };
                catch_unwind(AssertUnwindSafe(|| {
                    self.execute_window(window, placement, reporter)
                }))
                .unwrap_or_else(|payload| Err(SessionError::Panicked(panic_message(payload))))
            });

        reporter.report(Progress::WindowFinish {
            lambda,
            succeeded: outcome.is_ok(),
        });
        outcome.map_err(|error| WindowFailure { lambda, error })
    }

    fn execute_window(
        &self,
        window: &Window,
        placement: Placement,
        reporter: &ProgressReporter,
    ) -> Result<RunResult, SessionError> {
        let config = &self.config;
        let lambda = window.lambda();
        info!(
            lambda,
            device = ?placement.device,
            threads = ?placement.threads,
            "Starting window."
        );

        let files = window_files(config, window);
        let mut session = if config.restart && files.checkpoint().exists() {
            SimulationSession::from_checkpoint(self.engine, config, window.clone(), placement)?
        } else {
            if config.restart {
                warn!(lambda, "No checkpoint found; starting the window from scratch.");
            }
            SimulationSession::fresh(
                self.engine,
                config,
                window.clone(),
                self.system.clone(),
                placement,
            )
        };

        if config.output.write_config {
            write_config_snapshot(config, &files.config_snapshot())?;
        }

        let output = session.execute(reporter)?;

        EnergyTrajectoryFile::write(
            &files.energy_trajectory(),
            &energy_metadata(window, config, output.throughput),
            &output.state.energy_trajectory,
        )?;

        info!(
            lambda,
            samples = output.state.energy_trajectory.len(),
            speed = ?output.throughput,
            "Window complete."
        );
        Ok(RunResult {
            lambda,
            energy_trajectory: output.state.energy_trajectory,
            gradient_neighbors: window.gradient_neighbors().to_vec(),
            throughput: output.throughput,
        })
    }
}

fn write_config_snapshot(config: &RunConfig, path: &std::path::Path) -> Result<(), FileError> {
    let text = toml::to_string(config).map_err(|e| FileError::Serialization {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    write_atomically(path, |w| w.write_all(text.as_bytes()))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

use super::block::{BlockPlan, RestartPoint};
use super::config::{Constraint, RunConfig};
use super::error::SessionError;
use super::md::{Dynamics, DynamicsSetup, MdEngine, MinimisationRequest, SamplingPlan};
use super::progress::{Progress, ProgressReporter};
use crate::core::io::FileError;
use crate::core::io::checkpoint::{read_checkpoint, write_checkpoint};
use crate::core::io::components::EnergyComponentsWriter;
use crate::core::io::energy::{EnergyMetadata, EnergyTrajectoryFile};
use crate::core::io::files::WindowFiles;
use crate::core::io::traits::TrajectoryFile;
use crate::core::io::trajectory::{back_up_trajectory, merge_chunks, write_chunk};
use crate::core::io::xyz::XyzFile;
use crate::core::models::state::{CheckpointMetadata, SystemState};
use crate::core::models::window::Window;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Lambda at which minimisation is repeated after a failed attempt.
pub const FALLBACK_LAMBDA: f64 = 0.0;

/// Lifecycle of a [`SimulationSession`]. `Failed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Created,
    Minimising,
    Equilibrating,
    Production,
    Finalizing,
    Complete,
    Failed,
}

/// Compute resources assigned to one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Placement {
    /// Logical device id from the device pool.
    pub device: Option<usize>,
    /// CPU threads the engine may use.
    pub threads: Option<usize>,
}

/// What a completed window hands back to the scheduler.
#[derive(Debug, Clone)]
pub struct SessionOutput {
    /// The final system state, including the complete energy trajectory.
    pub state: SystemState,
    /// Measured production throughput in ns/day.
    pub throughput: Option<f64>,
}

/// Builds the metadata header of a window's energy trajectory file.
pub fn energy_metadata(window: &Window, config: &RunConfig, speed: Option<f64>) -> EnergyMetadata {
    EnergyMetadata::new(
        window.lambda(),
        window.sample_lambdas().to_vec(),
        window.gradient_neighbors().to_vec(),
        config.dynamics.temperature,
    )
    .with_speed(speed)
}

/// Owns the full lifecycle of one lambda window: minimisation, optional equilibration,
/// block-wise production with checkpointing, and finalisation.
///
/// Every attempt starts from a copy of the input state and owns its own engine handle,
/// which is dropped on every exit path.
pub struct SimulationSession<'a> {
    engine: &'a dyn MdEngine,
    config: &'a RunConfig,
    window: Window,
    files: WindowFiles,
    initial: SystemState,
    resumed: bool,
    restart_point: RestartPoint,
    /// Trajectory written by earlier invocations, copied aside before the first attempt.
    prior_trajectory: Option<PathBuf>,
    placement: Placement,
    phase: SessionPhase,
}

impl<'a> SimulationSession<'a> {
    /// A session that starts production from time zero.
    pub fn fresh(
        engine: &'a dyn MdEngine,
        config: &'a RunConfig,
        window: Window,
        state: SystemState,
        placement: Placement,
    ) -> Self {
        let files = window_files(config, &window);
        Self {
            engine,
            config,
            restart_point: RestartPoint::fresh(config),
            window,
            files,
            initial: state,
            resumed: false,
            prior_trajectory: None,
            placement,
            phase: SessionPhase::Created,
        }
    }

    /// A session that continues from a checkpointed state of the same window.
    ///
    /// # Errors
    ///
    /// Fails if the checkpoint carries no window metadata or belongs to another lambda.
    pub fn resume(
        engine: &'a dyn MdEngine,
        config: &'a RunConfig,
        window: Window,
        state: SystemState,
        placement: Placement,
    ) -> Result<Self, SessionError> {
        let files = window_files(config, &window);
        let checkpoint = files.checkpoint();
        let found = state
            .metadata
            .as_ref()
            .map(|m| m.lambda)
            .ok_or_else(|| FileError::format(&checkpoint, "checkpoint carries no window metadata"))?;
        if (found - window.lambda()).abs() > 1e-9 {
            return Err(SessionError::CheckpointMismatch {
                path: checkpoint,
                expected: window.lambda(),
                found,
            });
        }

        let restart_point = RestartPoint::from_state(&state, config);
        info!(
            lambda = window.lambda(),
            time = state.time(),
            resume_block = restart_point.resume_block_index,
            remaining = restart_point.remaining_runtime,
            "Resuming window from checkpoint."
        );
        Ok(Self {
            engine,
            config,
            window,
            files,
            initial: state,
            resumed: true,
            restart_point,
            prior_trajectory: None,
            placement,
            phase: SessionPhase::Created,
        })
    }

    /// Loads the window's checkpoint from the output directory and resumes from it.
    pub fn from_checkpoint(
        engine: &'a dyn MdEngine,
        config: &'a RunConfig,
        window: Window,
        placement: Placement,
    ) -> Result<Self, SessionError> {
        let path = window_files(config, &window).checkpoint();
        let state = read_checkpoint(&path)?;
        Self::resume(engine, config, window, state, placement)
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn files(&self) -> &WindowFiles {
        &self.files
    }

    pub fn restart_point(&self) -> RestartPoint {
        self.restart_point
    }

    /// Runs the window to completion.
    ///
    /// The first attempt minimises at the window's lambda. If anything fails and
    /// minimisation is enabled, exactly one more attempt is made with minimisation at
    /// [`FALLBACK_LAMBDA`]; a second failure is final.
    #[instrument(skip_all, name = "window", fields(lambda = self.window.lambda()))]
    pub fn execute(&mut self, reporter: &ProgressReporter) -> Result<SessionOutput, SessionError> {
        let lambda = self.window.lambda();

        if let Err(e) = self.preserve_prior_trajectory() {
            self.phase = SessionPhase::Failed;
            return Err(e);
        }

        let result = match self.attempt(lambda, reporter) {
            Ok(output) => Ok(output),
            Err(first) if self.config.dynamics.minimise => {
                warn!(
                    error = %first,
                    fallback = FALLBACK_LAMBDA,
                    "Window failed; retrying with minimisation at the fallback lambda."
                );
                self.attempt(FALLBACK_LAMBDA, reporter)
                    .map_err(|second| SessionError::RetryExhausted {
                        lambda,
                        fallback: FALLBACK_LAMBDA,
                        source: Box::new(second),
                    })
            }
            Err(first) => Err(first),
        };

        if result.is_ok() {
            self.discard_prior_trajectory();
            self.phase = SessionPhase::Complete;
        } else {
            self.restore_prior_trajectory();
            self.phase = SessionPhase::Failed;
        }
        result
    }

    /// Copies the trajectory of earlier invocations aside. Every attempt merges its chunks
    /// onto this copy, never onto the trajectory file itself.
    fn preserve_prior_trajectory(&mut self) -> Result<(), SessionError> {
        if !self.resumed || !self.config.output.save_trajectories || self.prior_trajectory.is_some() {
            return Ok(());
        }
        let backup = self.files.trajectory_backup();
        if back_up_trajectory(&self.files.trajectory(), &backup)? {
            self.prior_trajectory = Some(backup);
        }
        Ok(())
    }

    /// Puts the trajectory of earlier invocations back after a failed window.
    fn restore_prior_trajectory(&mut self) {
        if let Some(backup) = self.prior_trajectory.take() {
            let trajectory = self.files.trajectory();
            if let Err(e) = std::fs::rename(&backup, &trajectory) {
                warn!(backup = %backup.display(), error = %e, "Could not restore trajectory backup.");
            }
        }
    }

    fn discard_prior_trajectory(&mut self) {
        if let Some(backup) = self.prior_trajectory.take() {
            if let Err(e) = std::fs::remove_file(&backup) {
                warn!(backup = %backup.display(), error = %e, "Could not remove trajectory backup.");
            }
        }
    }

    fn attempt(
        &mut self,
        minimisation_lambda: f64,
        reporter: &ProgressReporter,
    ) -> Result<SessionOutput, SessionError> {
        let config = self.config;
        let lambda = self.window.lambda();
        let equilibrate = config.equilibration.time > 0.0 && !self.resumed;

        let stale = self
            .files
            .remove_chunks_from(self.restart_point.resume_block_index)?;
        if stale > 0 {
            debug!(removed = stale, "Removed stale trajectory chunks.");
        }

        let mut state = self.initial.clone();

        if config.dynamics.minimise {
            self.phase = SessionPhase::Minimising;
            let (constraint, perturbable) = if equilibrate {
                (Constraint::None, Constraint::None)
            } else {
                self.production_constraints()
            };
            info!(at = minimisation_lambda, "Minimising.");
            state = self.engine.minimise(
                state,
                &self.minimisation_request(minimisation_lambda, constraint, perturbable),
            )?;
        }

        if equilibrate {
            self.phase = SessionPhase::Equilibrating;
            state = self.equilibrate(state)?;

            let timestep_grows = config.dynamics.timestep > config.equilibration.timestep;
            let constraint_tightens = !config.equilibration.constraints
                && config.dynamics.perturbable_constraint != Constraint::None;
            if timestep_grows || constraint_tightens {
                let (constraint, perturbable) = self.production_constraints();
                info!("Re-minimising before production.");
                state = self.engine.minimise(
                    state,
                    &self.minimisation_request(lambda, constraint, perturbable),
                )?;
            }
        }

        self.phase = SessionPhase::Production;
        let setup = self.dynamics_setup(&state, config.dynamics.timestep, true);
        let dynamics = self.engine.dynamics(state, &setup)?;
        let (state, throughput) = self.production(dynamics, reporter)?;

        self.phase = SessionPhase::Finalizing;
        let state = self.finalise(state)?;
        Ok(SessionOutput { state, throughput })
    }

    fn equilibrate(&self, state: SystemState) -> Result<SystemState, SessionError> {
        let config = self.config;
        info!(time = config.equilibration.time, "Equilibrating.");
        let setup = self.dynamics_setup(
            &state,
            config.equilibration.timestep,
            config.equilibration.constraints,
        );
        let mut dynamics = self.engine.dynamics(state, &setup)?;
        dynamics.run(config.equilibration.time, &SamplingPlan::none())?;
        let mut state = dynamics.commit();
        state.set_time(0.0);
        Ok(state)
    }

    fn production(
        &self,
        mut dynamics: Box<dyn Dynamics>,
        reporter: &ProgressReporter,
    ) -> Result<(SystemState, Option<f64>), SessionError> {
        let config = self.config;
        let lambda = self.window.lambda();
        let start = self.restart_point;
        let output = &config.output;

        let plan = BlockPlan::new(
            start.remaining_runtime,
            output.checkpoint_frequency,
            start.resume_block_index,
        );
        let total_blocks = start.resume_block_index + plan.len() as u64;
        let sampling = SamplingPlan {
            energy_frequency: output.energy_frequency,
            frame_frequency: if output.save_trajectories {
                output.frame_frequency
            } else {
                0.0
            },
            lambda_windows: self.window.energy_columns(),
            save_velocities: output.save_velocities,
        };

        let mut components = match (output.save_energy_components, self.resumed) {
            (false, _) => None,
            (true, false) => Some(EnergyComponentsWriter::new(self.files.energy_components())),
            (true, true) => Some(EnergyComponentsWriter::resume(self.files.energy_components())?),
        };

        info!(
            blocks = plan.len(),
            first_block = start.resume_block_index,
            interval = plan.checkpoint_interval(),
            "Running production."
        );
        reporter.report(Progress::WindowStart {
            lambda,
            total_blocks,
        });

        let atom_names = self.initial.atom_names();
        let mut state = dynamics.commit();
        let mut frames_written = state.num_frames();
        let mut energy_written = state.energy_trajectory.len();

        for block in plan.blocks() {
            dynamics.run(block.duration, &sampling)?;

            if !block.is_remainder {
                if let Some(writer) = components.as_mut() {
                    writer.record(&dynamics.energy_components()?)?;
                }
            }

            state = dynamics.commit();
            state.metadata = Some(self.checkpoint_metadata());

            if output.save_trajectories {
                write_chunk::<XyzFile>(
                    &self.files.chunk(block.index),
                    &atom_names,
                    state.frames_since(frames_written),
                )?;
                frames_written = state.num_frames();
            }

            if !block.is_remainder {
                write_checkpoint(&self.files.checkpoint(), &state)?;
            }

            let energy_path = self.files.energy_trajectory();
            if block.index == start.resume_block_index {
                EnergyTrajectoryFile::write(
                    &energy_path,
                    &energy_metadata(&self.window, config, None),
                    &state.energy_trajectory,
                )?;
            } else {
                EnergyTrajectoryFile::append(
                    &energy_path,
                    state.energy_trajectory.samples_since(energy_written),
                )?;
            }
            energy_written = state.energy_trajectory.len();

            info!(
                block = block.index + 1,
                total = total_blocks,
                time = state.time(),
                "Finished block."
            );
            reporter.report(Progress::BlockFinish {
                lambda,
                block: block.index + 1,
                total_blocks,
            });
        }

        let throughput = dynamics.throughput();
        Ok((state, throughput))
    }

    fn finalise(&self, mut state: SystemState) -> Result<SystemState, SessionError> {
        if self.config.output.save_trajectories {
            let chunks: Vec<PathBuf> = self
                .files
                .chunks()?
                .into_iter()
                .map(|(_, path)| path)
                .collect();
            merge_chunks::<XyzFile>(
                &chunks,
                &self.files.trajectory(),
                self.prior_trajectory.as_deref(),
            )?;
        }

        state.metadata = Some(self.checkpoint_metadata());
        write_checkpoint(&self.files.checkpoint(), &state)?;
        info!(time = state.time(), samples = state.energy_trajectory.len(), "Window finalised.");
        Ok(state)
    }

    fn production_constraints(&self) -> (Constraint, Constraint) {
        (
            self.config.dynamics.constraint,
            self.config.dynamics.perturbable_constraint,
        )
    }

    fn minimisation_request(
        &self,
        lambda: f64,
        constraint: Constraint,
        perturbable_constraint: Constraint,
    ) -> MinimisationRequest {
        MinimisationRequest {
            lambda,
            constraint,
            perturbable_constraint,
            max_iterations: self.config.dynamics.minimisation_max_iterations,
            timeout: Duration::from_secs_f64(self.config.dynamics.minimisation_timeout),
            device: self.placement.device,
            threads: self.placement.threads,
        }
    }

    fn dynamics_setup(&self, state: &SystemState, timestep: f64, constrained: bool) -> DynamicsSetup {
        let dynamics = &self.config.dynamics;
        let (constraint, perturbable_constraint) = if constrained {
            self.production_constraints()
        } else {
            (Constraint::None, Constraint::None)
        };
        let pressure = if state.is_periodic() {
            dynamics.pressure
        } else {
            if dynamics.pressure.is_some() {
                debug!("System is not periodic; running at constant volume.");
            }
            None
        };
        DynamicsSetup {
            lambda: self.window.lambda(),
            timestep,
            temperature: dynamics.temperature,
            pressure,
            constraint,
            perturbable_constraint,
            device: self.placement.device,
            threads: self.placement.threads,
        }
    }

    fn checkpoint_metadata(&self) -> CheckpointMetadata {
        CheckpointMetadata {
            config: self.config.to_json(),
            lambda: self.window.lambda(),
        }
    }
}

/// The files a window writes under the configured output directory.
pub fn window_files(config: &RunConfig, window: &Window) -> WindowFiles {
    WindowFiles::new(&config.output.directory, window, XyzFile::EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lambda::lambda_grid;
    use crate::engine::error::EngineError;
    use crate::engine::reference::ReferenceEngine;
    use crate::engine::testing::{FlakyEngine, test_builder, test_config, test_system};
    use std::path::Path;

    fn window(lambda: f64, config: &RunConfig) -> Window {
        let grid = lambda_grid(config.lambda.num_lambda.unwrap()).unwrap();
        Window::new(lambda, &grid, &grid, config.lambda.gradient_increment).unwrap()
    }

    fn run_fresh(engine: &dyn MdEngine, config: &RunConfig, lambda: f64) -> SessionOutput {
        let mut session =
            SimulationSession::fresh(engine, config, window(lambda, config), test_system(), Placement::default());
        let output = session.execute(&ProgressReporter::new()).unwrap();
        assert_eq!(session.phase(), SessionPhase::Complete);
        output
    }

    fn energy_times(path: &Path) -> Vec<f64> {
        let (_, traj) = EnergyTrajectoryFile::read(path).unwrap();
        traj.samples().iter().map(|s| s.time).collect()
    }

    fn assert_strictly_increasing(times: &[f64]) {
        assert!(
            times.windows(2).all(|w| w[1] > w[0]),
            "energy rows overlap: {:?}",
            times
        );
    }

    fn trajectory_frames(path: &Path) -> usize {
        XyzFile::read_from_path(path).unwrap().len()
    }

    #[test]
    fn fresh_window_writes_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let engine = ReferenceEngine::with_seed(1);

        let output = run_fresh(&engine, &config, 0.5);
        let files = window_files(&config, &window(0.5, &config));

        let (meta, traj) = EnergyTrajectoryFile::read(&files.energy_trajectory()).unwrap();
        assert_eq!(meta.lambda, 0.5);
        assert_eq!(meta.lambda_array, vec![0.0, 0.5, 1.0]);
        assert_eq!(meta.lambda_grad, vec![0.499, 0.501]);
        assert_eq!(meta.temperature, 300.0);
        assert_eq!(traj.len(), 30);
        assert_eq!(traj.lambdas(), &[0.0, 0.5, 1.0, 0.499, 0.501]);
        assert_strictly_increasing(&energy_times(&files.energy_trajectory()));

        let checkpoint = read_checkpoint(&files.checkpoint()).unwrap();
        assert!((checkpoint.time() - 3.0).abs() < 1e-9);
        assert_eq!(checkpoint.metadata.as_ref().unwrap().lambda, 0.5);
        assert_eq!(checkpoint.energy_trajectory.len(), 30);

        assert_eq!(trajectory_frames(&files.trajectory()), 6);
        assert!(files.chunks().unwrap().is_empty());
        assert_eq!(output.state.energy_trajectory.len(), 30);
        assert!(output.throughput.is_some());
    }

    #[test]
    fn single_block_window_writes_one_block_of_rows() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_builder(dir.path())
            .num_lambda(5)
            .runtime(1.0)
            .build()
            .unwrap();
        let engine = ReferenceEngine::with_seed(2);

        run_fresh(&engine, &config, 0.25);
        let files = window_files(&config, &window(0.25, &config));

        assert_eq!(energy_times(&files.energy_trajectory()).len(), 10);
        assert!(files.checkpoint().exists());
    }

    #[test]
    fn remainder_block_is_appended_without_a_checkpoint_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_builder(dir.path()).runtime(2.5).build().unwrap();
        let engine = ReferenceEngine::with_seed(3);

        let output = run_fresh(&engine, &config, 0.0);
        let files = window_files(&config, &window(0.0, &config));

        let times = energy_times(&files.energy_trajectory());
        assert_eq!(times.len(), 25);
        assert_strictly_increasing(&times);
        assert_eq!(trajectory_frames(&files.trajectory()), 5);
        assert!((output.state.time() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn runtime_shorter_than_a_block_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_builder(dir.path()).runtime(0.5).build().unwrap();
        let engine = ReferenceEngine::with_seed(4);

        run_fresh(&engine, &config, 1.0);
        let files = window_files(&config, &window(1.0, &config));
        assert_eq!(energy_times(&files.energy_trajectory()).len(), 5);
    }

    #[test]
    fn resuming_a_completed_window_adds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let engine = ReferenceEngine::with_seed(5);
        run_fresh(&engine, &config, 0.5);

        let restart = test_builder(dir.path()).restart(true).build().unwrap();
        let mut session =
            SimulationSession::from_checkpoint(&engine, &restart, window(0.5, &restart), Placement::default())
                .unwrap();
        assert_eq!(session.restart_point().resume_block_index, 3);

        session.execute(&ProgressReporter::new()).unwrap();

        let times = energy_times(&session.files().energy_trajectory());
        assert_eq!(times.len(), 30);
        assert_strictly_increasing(&times);
        assert_eq!(trajectory_frames(&session.files().trajectory()), 6);
        assert!(!session.files().trajectory_backup().exists());
    }

    #[test]
    fn extended_restart_continues_without_duplicating_rows() {
        let dir = tempfile::tempdir().unwrap();
        let short = test_builder(dir.path()).runtime(2.0).build().unwrap();
        let engine = ReferenceEngine::with_seed(6);
        run_fresh(&engine, &short, 0.5);

        let files = window_files(&short, &window(0.5, &short));
        std::fs::write(files.chunk(7), "").unwrap();

        let extended = test_builder(dir.path()).runtime(3.0).restart(true).build().unwrap();
        let mut session =
            SimulationSession::from_checkpoint(&engine, &extended, window(0.5, &extended), Placement::default())
                .unwrap();
        assert_eq!(session.restart_point().resume_block_index, 2);
        let output = session.execute(&ProgressReporter::new()).unwrap();

        let times = energy_times(&files.energy_trajectory());
        assert_eq!(times.len(), 30);
        assert_strictly_increasing(&times);
        assert_eq!(trajectory_frames(&files.trajectory()), 6);
        assert!(files.chunks().unwrap().is_empty());
        assert!((output.state.time() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn uneven_energy_frequency_writes_each_row_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_builder(dir.path()).energy_frequency(0.4).build().unwrap();
        let engine = ReferenceEngine::with_seed(10);

        let output = run_fresh(&engine, &config, 0.5);
        let files = window_files(&config, &window(0.5, &config));

        let times = energy_times(&files.energy_trajectory());
        let recorded: Vec<f64> = output.state.energy_trajectory.samples().iter().map(|s| s.time).collect();
        assert_eq!(times.len(), 7);
        assert_eq!(times, recorded);
        assert_strictly_increasing(&times);
    }

    #[test]
    fn remainder_holding_half_a_sample_writes_each_row_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_builder(dir.path()).runtime(2.55).build().unwrap();
        let engine = ReferenceEngine::with_seed(11);

        let output = run_fresh(&engine, &config, 0.5);
        let files = window_files(&config, &window(0.5, &config));

        let times = energy_times(&files.energy_trajectory());
        let recorded: Vec<f64> = output.state.energy_trajectory.samples().iter().map(|s| s.time).collect();
        assert_eq!(times.len(), 25);
        assert_eq!(times, recorded);
        assert_strictly_increasing(&times);
    }

    #[test]
    fn repeated_attempts_on_a_resumed_window_merge_onto_the_same_history() {
        let dir = tempfile::tempdir().unwrap();
        let short = test_builder(dir.path()).runtime(2.0).build().unwrap();
        let engine = ReferenceEngine::with_seed(12);
        run_fresh(&engine, &short, 0.5);
        let files = window_files(&short, &window(0.5, &short));
        assert_eq!(trajectory_frames(&files.trajectory()), 4);

        let extended = test_builder(dir.path()).runtime(3.0).restart(true).build().unwrap();
        let mut session =
            SimulationSession::from_checkpoint(&engine, &extended, window(0.5, &extended), Placement::default())
                .unwrap();
        let reporter = ProgressReporter::new();
        session.preserve_prior_trajectory().unwrap();

        session.attempt(0.5, &reporter).unwrap();
        assert_eq!(trajectory_frames(&files.trajectory()), 6);

        session.attempt(FALLBACK_LAMBDA, &reporter).unwrap();
        assert_eq!(trajectory_frames(&files.trajectory()), 6);
        assert!(files.chunks().unwrap().is_empty());

        session.discard_prior_trajectory();
        assert!(!files.trajectory_backup().exists());
    }

    #[test]
    fn failed_resumed_window_keeps_its_earlier_trajectory() {
        let dir = tempfile::tempdir().unwrap();
        let short = test_builder(dir.path()).runtime(2.0).build().unwrap();
        run_fresh(&ReferenceEngine::with_seed(13), &short, 0.5);
        let files = window_files(&short, &window(0.5, &short));

        let extended = test_builder(dir.path())
            .runtime(3.0)
            .restart(true)
            .minimise(false)
            .build()
            .unwrap();
        let engine = FlakyEngine::new().fail_dynamics_at(&[0.5]);
        let mut session =
            SimulationSession::from_checkpoint(&engine, &extended, window(0.5, &extended), Placement::default())
                .unwrap();

        assert!(session.execute(&ProgressReporter::new()).is_err());
        assert_eq!(session.phase(), SessionPhase::Failed);
        assert_eq!(trajectory_frames(&files.trajectory()), 4);
        assert!(!files.trajectory_backup().exists());
    }

    #[test]
    fn checkpoint_from_another_window_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let engine = ReferenceEngine::with_seed(7);
        run_fresh(&engine, &config, 0.5);

        let half = window_files(&config, &window(0.5, &config));
        let one = window_files(&config, &window(1.0, &config));
        std::fs::copy(half.checkpoint(), one.checkpoint()).unwrap();

        let result =
            SimulationSession::from_checkpoint(&engine, &config, window(1.0, &config), Placement::default());
        assert!(matches!(
            result,
            Err(SessionError::CheckpointMismatch { expected, found, .. }) if expected == 1.0 && found == 0.5
        ));
    }

    #[test]
    fn failed_minimisation_is_retried_once_at_the_fallback_lambda() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let engine = FlakyEngine::new().fail_minimisation_at(&[0.5]);

        run_fresh(&engine, &config, 0.5);
        assert_eq!(engine.minimisations(), vec![0.5, FALLBACK_LAMBDA]);
    }

    #[test]
    fn second_failure_is_final() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let engine = FlakyEngine::new()
            .fail_minimisation_at(&[0.5])
            .fail_dynamics_at(&[0.5]);

        let mut session =
            SimulationSession::fresh(&engine, &config, window(0.5, &config), test_system(), Placement::default());
        let result = session.execute(&ProgressReporter::new());

        match result {
            Err(SessionError::RetryExhausted { lambda, fallback, source }) => {
                assert_eq!(lambda, 0.5);
                assert_eq!(fallback, FALLBACK_LAMBDA);
                assert!(matches!(*source, SessionError::Engine(EngineError::Setup(_))));
            }
            other => panic!("unexpected result: {:?}", other.map(|o| o.throughput)),
        }
        assert_eq!(session.phase(), SessionPhase::Failed);
        assert_eq!(engine.minimisations(), vec![0.5, FALLBACK_LAMBDA]);
    }

    #[test]
    fn no_retry_without_minimisation() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_builder(dir.path()).minimise(false).build().unwrap();
        let engine = FlakyEngine::new().fail_dynamics_at(&[0.5]);

        let mut session =
            SimulationSession::fresh(&engine, &config, window(0.5, &config), test_system(), Placement::default());
        let result = session.execute(&ProgressReporter::new());

        assert!(matches!(result, Err(SessionError::Engine(EngineError::Setup(_)))));
        assert!(engine.minimisations().is_empty());
    }

    #[test]
    fn equilibration_resets_the_clock_and_reminimises_when_constraints_change() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_builder(dir.path())
            .equilibration_time(0.2)
            .perturbable_constraint(Constraint::HBonds)
            .build()
            .unwrap();
        let engine = FlakyEngine::new();

        let output = run_fresh(&engine, &config, 0.5);

        assert_eq!(engine.minimisations(), vec![0.5, 0.5]);
        let first = output.state.energy_trajectory.samples()[0].time;
        assert!((first - 0.1).abs() < 1e-9);
        assert!((output.state.time() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn energy_components_are_recorded_once_per_full_block() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_builder(dir.path())
            .runtime(2.5)
            .save_energy_components(true)
            .build()
            .unwrap();
        let engine = ReferenceEngine::with_seed(8);

        run_fresh(&engine, &config, 0.5);
        let files = window_files(&config, &window(0.5, &config));

        let text = std::fs::read_to_string(files.energy_components()).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().next().unwrap().contains("# Sample"));
    }

    #[test]
    fn progress_reports_every_block() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let engine = ReferenceEngine::with_seed(9);
        let blocks = std::sync::Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event: Progress| {
            if let Progress::BlockFinish { block, total_blocks, .. } = event {
                blocks.lock().unwrap().push((block, total_blocks));
            }
        }));

        let mut session =
            SimulationSession::fresh(&engine, &config, window(0.0, &config), test_system(), Placement::default());
        session.execute(&reporter).unwrap();
        drop(reporter);

        assert_eq!(blocks.into_inner().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
    }
}

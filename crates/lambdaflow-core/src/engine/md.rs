use super::config::Constraint;
use super::error::EngineError;
use crate::core::models::energy::ForceEnergy;
use crate::core::models::state::SystemState;
use std::time::Duration;

/// Parameters of one energy minimisation.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimisationRequest {
    /// Lambda at which the potential is minimised.
    pub lambda: f64,
    pub constraint: Constraint,
    pub perturbable_constraint: Constraint,
    pub max_iterations: usize,
    /// Engine-internal wall-clock limit; opaque to the scheduler.
    pub timeout: Duration,
    pub device: Option<usize>,
    pub threads: Option<usize>,
}

/// Parameters fixed for the lifetime of one [`Dynamics`] handle.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicsSetup {
    pub lambda: f64,
    /// Integration timestep in picoseconds.
    pub timestep: f64,
    /// Temperature in Kelvin.
    pub temperature: f64,
    /// Pressure in atmospheres. `None` runs at constant volume.
    pub pressure: Option<f64>,
    pub constraint: Constraint,
    pub perturbable_constraint: Constraint,
    pub device: Option<usize>,
    pub threads: Option<usize>,
}

/// What to record while dynamics advance.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingPlan {
    /// Interval between energy samples in picoseconds; zero disables sampling.
    pub energy_frequency: f64,
    /// Interval between trajectory frames in picoseconds; zero disables frames.
    pub frame_frequency: f64,
    /// Lambdas at which each energy sample is evaluated, in column order.
    pub lambda_windows: Vec<f64>,
    pub save_velocities: bool,
}

impl SamplingPlan {
    /// Advance without recording anything.
    pub fn none() -> Self {
        Self {
            energy_frequency: 0.0,
            frame_frequency: 0.0,
            lambda_windows: Vec::new(),
            save_velocities: false,
        }
    }
}

/// The physics engine. Implementations must be shareable across worker threads; each
/// window creates its own [`Dynamics`] handle, which is never shared.
pub trait MdEngine: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Minimises the potential energy of `state` and returns the relaxed state.
    fn minimise(
        &self,
        state: SystemState,
        request: &MinimisationRequest,
    ) -> Result<SystemState, EngineError>;

    /// Creates a dynamics handle that owns `state` until it is dropped.
    fn dynamics(
        &self,
        state: SystemState,
        setup: &DynamicsSetup,
    ) -> Result<Box<dyn Dynamics>, EngineError>;
}

/// A live integrator bound to one system. Dropping the handle releases every engine
/// resource it holds.
pub trait Dynamics: Send {
    /// Advances the system by `duration` picoseconds, recording energies and frames as
    /// requested.
    fn run(&mut self, duration: f64, sampling: &SamplingPlan) -> Result<(), EngineError>;

    /// A snapshot of the current system, including everything sampled so far.
    fn commit(&self) -> SystemState;

    /// Measured simulation throughput in ns/day, if any time has been simulated.
    fn throughput(&self) -> Option<f64>;

    /// Energy of each force group for the current configuration.
    fn energy_components(&self) -> Result<Vec<ForceEnergy>, EngineError>;
}

//! Fixtures shared by the engine and workflow tests.

use super::config::{RunConfig, RunConfigBuilder};
use super::error::EngineError;
use super::md::{Dynamics, DynamicsSetup, MdEngine, MinimisationRequest};
use super::reference::ReferenceEngine;
use crate::core::models::state::{Atom, SystemState};
use nalgebra::Point3;
use std::path::Path;
use std::sync::Mutex;

/// Four tethered atoms, two of them perturbable.
pub fn test_system() -> SystemState {
    let atoms = vec![
        Atom::new("C", 12.011, Point3::new(0.0, 0.0, 0.0), 10.0),
        Atom::new("C", 12.011, Point3::new(1.5, 0.0, 0.0), 10.0),
        Atom::new("O", 15.999, Point3::new(1.5, 1.2, 0.0), 10.0).with_perturbation(5.0, 20.0),
        Atom::new("H", 1.008, Point3::new(0.0, -1.0, 0.0), 10.0).with_perturbation(10.0, 2.0),
    ];
    SystemState::new("test", atoms)
}

/// Three 1 ps blocks with ten energy samples each, three windows.
pub fn test_config(dir: &Path) -> RunConfig {
    test_builder(dir).build().unwrap()
}

pub fn test_builder(dir: &Path) -> RunConfigBuilder {
    RunConfigBuilder::new()
        .num_lambda(3)
        .runtime(3.0)
        .timestep(0.004)
        .temperature(300.0)
        .checkpoint_frequency(1.0)
        .energy_frequency(0.1)
        .frame_frequency(0.5)
        .minimisation_max_iterations(200)
        .output_directory(dir.to_path_buf())
}

/// Wraps the reference engine and fails on demand.
///
/// Minimisation fails when the requested lambda is listed in `failing_minimisation`;
/// dynamics creation fails, or panics, when the window lambda is listed in
/// `failing_dynamics` or `panicking_dynamics`. Every minimisation request is recorded.
#[derive(Default)]
pub struct FlakyEngine {
    inner: ReferenceEngine,
    failing_minimisation: Vec<f64>,
    failing_dynamics: Vec<f64>,
    panicking_dynamics: Vec<f64>,
    minimisations: Mutex<Vec<f64>>,
}

impl FlakyEngine {
    pub fn new() -> Self {
        Self {
            inner: ReferenceEngine::with_seed(11),
            ..Self::default()
        }
    }

    pub fn fail_minimisation_at(mut self, lambdas: &[f64]) -> Self {
        self.failing_minimisation = lambdas.to_vec();
        self
    }

    pub fn fail_dynamics_at(mut self, lambdas: &[f64]) -> Self {
        self.failing_dynamics = lambdas.to_vec();
        self
    }

    pub fn panic_at(mut self, lambdas: &[f64]) -> Self {
        self.panicking_dynamics = lambdas.to_vec();
        self
    }

    /// Lambdas of every minimisation request received so far, in order.
    pub fn minimisations(&self) -> Vec<f64> {
        self.minimisations.lock().unwrap().clone()
    }
}

impl MdEngine for FlakyEngine {
    fn name(&self) -> &str {
        "flaky"
    }

    fn minimise(
        &self,
        state: SystemState,
        request: &MinimisationRequest,
    ) -> Result<SystemState, EngineError> {
        self.minimisations.lock().unwrap().push(request.lambda);
        if self.failing_minimisation.contains(&request.lambda) {
            return Err(EngineError::Minimisation {
                lambda: request.lambda,
                reason: "injected failure".to_string(),
            });
        }
        self.inner.minimise(state, request)
    }

    fn dynamics(
        &self,
        state: SystemState,
        setup: &DynamicsSetup,
    ) -> Result<Box<dyn Dynamics>, EngineError> {
        if self.panicking_dynamics.contains(&setup.lambda) {
            panic!("injected panic at lambda = {}", setup.lambda);
        }
        if self.failing_dynamics.contains(&setup.lambda) {
            return Err(EngineError::Setup("injected failure".to_string()));
        }
        self.inner.dynamics(state, setup)
    }
}

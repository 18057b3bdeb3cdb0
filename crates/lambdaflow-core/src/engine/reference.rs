//! A self-contained reference engine.
//!
//! Every atom is tethered harmonically to its anchor; perturbable atoms interpolate the
//! spring constant linearly in lambda. Dynamics use a BAOAB Langevin integrator. The
//! model is small enough to run in tests yet produces genuinely lambda-dependent reduced
//! potentials, so the energy files it writes can be fed to a free-energy estimator.

use super::error::EngineError;
use super::md::{Dynamics, DynamicsSetup, MdEngine, MinimisationRequest, SamplingPlan};
use crate::core::models::energy::{EnergySample, ForceEnergy};
use crate::core::models::state::{Frame, SystemState};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Boltzmann constant in kcal/mol/K.
pub const BOLTZMANN_KCAL: f64 = 0.001_987_204_1;
/// Converts kcal/mol/Å/amu to Å/ps².
const ACCEL_CONVERSION: f64 = 418.4;
/// Langevin collision frequency in 1/ps.
const FRICTION: f64 = 1.0;
const MINIMISATION_STEP: f64 = 0.5;
const MINIMISATION_TOLERANCE: f64 = 1e-8;

/// Total tether energy of `state` at `lambda`, in kcal/mol.
pub fn potential_energy(state: &SystemState, lambda: f64) -> f64 {
    state
        .atoms
        .iter()
        .map(|atom| {
            let displacement = atom.position - atom.anchor;
            0.5 * atom.spring_constant_at(lambda) * displacement.norm_squared()
        })
        .sum()
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceEngine {
    seed: Option<u64>,
}

impl ReferenceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds every dynamics handle deterministically from `seed` and its lambda.
    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    fn rng_for(&self, lambda: f64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ lambda.to_bits()),
            None => StdRng::from_entropy(),
        }
    }
}

impl MdEngine for ReferenceEngine {
    fn name(&self) -> &str {
        "reference"
    }

    fn minimise(
        &self,
        mut state: SystemState,
        request: &MinimisationRequest,
    ) -> Result<SystemState, EngineError> {
        let started = Instant::now();
        let lambda = request.lambda;

        if let Some(atom) = state
            .atoms
            .iter()
            .find(|a| !(a.spring_constant_at(lambda) >= 0.0))
        {
            return Err(EngineError::Minimisation {
                lambda,
                reason: format!("atom '{}' has a negative spring constant", atom.name),
            });
        }

        let mut converged = false;
        for iteration in 0..request.max_iterations {
            if started.elapsed() > request.timeout {
                return Err(EngineError::MinimisationTimeout {
                    lambda,
                    timeout_secs: request.timeout.as_secs_f64(),
                });
            }

            let mut largest_move: f64 = 0.0;
            for atom in state.atoms.iter_mut() {
                if atom.spring_constant_at(lambda) == 0.0 {
                    continue;
                }
                let shift = (atom.anchor - atom.position) * MINIMISATION_STEP;
                atom.position += shift;
                largest_move = largest_move.max(shift.norm());
            }

            if !largest_move.is_finite() {
                return Err(EngineError::Minimisation {
                    lambda,
                    reason: "coordinates became non-finite".to_string(),
                });
            }
            if largest_move < MINIMISATION_TOLERANCE {
                trace!(iteration, "Minimisation converged.");
                converged = true;
                break;
            }
        }

        debug!(
            lambda,
            converged,
            energy = potential_energy(&state, lambda),
            "Minimisation finished."
        );
        Ok(state)
    }

    fn dynamics(
        &self,
        state: SystemState,
        setup: &DynamicsSetup,
    ) -> Result<Box<dyn Dynamics>, EngineError> {
        if !(setup.timestep > 0.0) {
            return Err(EngineError::Setup(format!(
                "timestep must be positive (got {})",
                setup.timestep
            )));
        }
        if !(setup.temperature > 0.0) {
            return Err(EngineError::Setup(format!(
                "temperature must be positive (got {})",
                setup.temperature
            )));
        }
        debug!(
            lambda = setup.lambda,
            device = ?setup.device,
            threads = ?setup.threads,
            constraint = %setup.constraint,
            barostat = setup.pressure.is_some(),
            "Creating reference dynamics."
        );

        let origin_time = state.time();
        Ok(Box::new(ReferenceDynamics {
            state,
            setup: setup.clone(),
            rng: self.rng_for(setup.lambda),
            origin_time,
            steps_done: 0,
            wall_time: Duration::ZERO,
        }))
    }
}

struct ReferenceDynamics {
    state: SystemState,
    setup: DynamicsSetup,
    rng: StdRng,
    origin_time: f64,
    steps_done: u64,
    wall_time: Duration,
}

impl ReferenceDynamics {
    fn kt(&self) -> f64 {
        BOLTZMANN_KCAL * self.setup.temperature
    }

    fn gaussian(&mut self) -> f64 {
        let u1: f64 = self.rng.gen_range(f64::MIN_POSITIVE..1.0);
        let u2: f64 = self.rng.gen_range(0.0..1.0);
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }

    fn steps_for(&self, interval: f64) -> u64 {
        if interval > 0.0 {
            ((interval / self.setup.timestep).round() as u64).max(1)
        } else {
            0
        }
    }

    fn step(&mut self) {
        let dt = self.setup.timestep;
        let lambda = self.setup.lambda;
        let kt = self.kt();
        let c1 = (-FRICTION * dt).exp();
        let c2 = (1.0 - c1 * c1).sqrt();

        for i in 0..self.state.atoms.len() {
            let noise = Vector3::new(self.gaussian(), self.gaussian(), self.gaussian());
            let atom = &mut self.state.atoms[i];
            let k = atom.spring_constant_at(lambda);
            let scale = ACCEL_CONVERSION / atom.mass;
            let sigma = (kt * scale).sqrt();

            let accel = -(atom.position - atom.anchor) * k * scale;
            atom.velocity += accel * (0.5 * dt);
            atom.position += atom.velocity * (0.5 * dt);
            atom.velocity = atom.velocity * c1 + noise * (c2 * sigma);
            atom.position += atom.velocity * (0.5 * dt);
            let accel = -(atom.position - atom.anchor) * k * scale;
            atom.velocity += accel * (0.5 * dt);
        }

        self.steps_done += 1;
        self.state
            .set_time(self.origin_time + self.steps_done as f64 * dt);
    }

    fn is_finite(&self) -> bool {
        self.state
            .atoms
            .iter()
            .all(|a| a.position.coords.iter().all(|c| c.is_finite()))
    }

    fn sample_energies(&mut self, lambdas: &[f64]) {
        let kt = self.kt();
        let energies = lambdas
            .iter()
            .map(|&l| potential_energy(&self.state, l) / kt)
            .collect();
        let time = self.state.time();
        self.state
            .energy_trajectory
            .push(EnergySample { time, energies });
    }
}

impl Dynamics for ReferenceDynamics {
    fn run(&mut self, duration: f64, sampling: &SamplingPlan) -> Result<(), EngineError> {
        let started = Instant::now();
        let steps = self.steps_for(duration);
        let energy_every = self.steps_for(sampling.energy_frequency);
        let frame_every = self.steps_for(sampling.frame_frequency);

        if energy_every > 0 {
            let trajectory = &mut self.state.energy_trajectory;
            if !trajectory.accepts_columns(&sampling.lambda_windows) {
                return Err(EngineError::Sampling(format!(
                    "requested lambda windows {:?} differ from recorded columns {:?}",
                    sampling.lambda_windows,
                    trajectory.lambdas()
                )));
            }
            if trajectory.is_empty() {
                trajectory.set_lambdas(sampling.lambda_windows.clone());
            }
        }

        for _ in 0..steps {
            self.step();
            if !self.is_finite() {
                return Err(EngineError::Unstable {
                    time: self.state.time(),
                    reason: "non-finite coordinates".to_string(),
                });
            }
            if energy_every > 0 && self.steps_done % energy_every == 0 {
                self.sample_energies(&sampling.lambda_windows);
            }
            if frame_every > 0 && self.steps_done % frame_every == 0 {
                let frame = Frame {
                    time: self.state.time(),
                    positions: self.state.positions(),
                };
                self.state.push_frame(frame);
            }
        }

        self.wall_time += started.elapsed();
        Ok(())
    }

    fn commit(&self) -> SystemState {
        self.state.clone()
    }

    fn throughput(&self) -> Option<f64> {
        let wall_days = self.wall_time.as_secs_f64() / 86_400.0;
        if self.steps_done == 0 || wall_days <= 0.0 {
            return None;
        }
        let simulated_ns = self.steps_done as f64 * self.setup.timestep / 1000.0;
        Some(simulated_ns / wall_days)
    }

    fn energy_components(&self) -> Result<Vec<ForceEnergy>, EngineError> {
        let lambda = self.setup.lambda;
        let (mut fixed, mut perturbable) = (0.0, 0.0);
        for atom in &self.state.atoms {
            let energy = 0.5
                * atom.spring_constant_at(lambda)
                * (atom.position - atom.anchor).norm_squared();
            if atom.is_perturbable() {
                perturbable += energy;
            } else {
                fixed += energy;
            }
        }
        Ok(vec![
            ForceEnergy {
                name: "TetherForce".to_string(),
                energy: fixed,
            },
            ForceEnergy {
                name: "PerturbableTetherForce".to_string(),
                energy: perturbable,
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::Constraint;
    use crate::engine::testing::test_system;

    fn setup(lambda: f64) -> DynamicsSetup {
        DynamicsSetup {
            lambda,
            timestep: 0.002,
            temperature: 300.0,
            pressure: None,
            constraint: Constraint::None,
            perturbable_constraint: Constraint::None,
            device: None,
            threads: None,
        }
    }

    fn sampling(lambdas: Vec<f64>) -> SamplingPlan {
        SamplingPlan {
            energy_frequency: 0.1,
            frame_frequency: 0.5,
            lambda_windows: lambdas,
            save_velocities: false,
        }
    }

    #[test]
    fn minimisation_relaxes_atoms_onto_their_anchors() {
        let mut state = test_system();
        for atom in state.atoms.iter_mut() {
            atom.position.x += 0.5;
        }
        let request = MinimisationRequest {
            lambda: 0.5,
            constraint: Constraint::None,
            perturbable_constraint: Constraint::None,
            max_iterations: 200,
            timeout: Duration::from_secs(10),
            device: None,
            threads: None,
        };

        let relaxed = ReferenceEngine::new().minimise(state, &request).unwrap();
        assert!(potential_energy(&relaxed, 0.5) < 1e-10);
    }

    #[test]
    fn minimisation_fails_for_negative_spring_constant() {
        let mut state = test_system();
        state.atoms[0] = state.atoms[0].clone().with_perturbation(1.0, -1.0);
        let request = MinimisationRequest {
            lambda: 1.0,
            constraint: Constraint::None,
            perturbable_constraint: Constraint::None,
            max_iterations: 10,
            timeout: Duration::from_secs(10),
            device: None,
            threads: None,
        };

        let result = ReferenceEngine::new().minimise(state, &request);
        assert!(matches!(result, Err(EngineError::Minimisation { .. })));
    }

    #[test]
    fn run_samples_energies_and_frames_at_requested_intervals() {
        let engine = ReferenceEngine::with_seed(7);
        let mut dynamics = engine.dynamics(test_system(), &setup(0.5)).unwrap();

        dynamics.run(1.0, &sampling(vec![0.0, 0.5, 1.0])).unwrap();
        let state = dynamics.commit();

        assert!((state.time() - 1.0).abs() < 1e-9);
        assert_eq!(state.energy_trajectory.len(), 10);
        assert_eq!(state.energy_trajectory.lambdas(), &[0.0, 0.5, 1.0]);
        assert_eq!(state.num_frames(), 2);
        assert!(dynamics.throughput().is_some());
    }

    #[test]
    fn sampling_stays_aligned_across_consecutive_runs() {
        let engine = ReferenceEngine::with_seed(7);
        let mut dynamics = engine.dynamics(test_system(), &setup(0.0)).unwrap();
        let plan = sampling(vec![0.0, 0.001]);

        dynamics.run(1.0, &plan).unwrap();
        dynamics.run(1.0, &plan).unwrap();
        dynamics.run(0.5, &plan).unwrap();

        let state = dynamics.commit();
        assert_eq!(state.energy_trajectory.len(), 25);
        let times: Vec<f64> = state
            .energy_trajectory
            .samples()
            .iter()
            .map(|s| s.time)
            .collect();
        assert!(times.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn run_without_sampling_records_nothing() {
        let engine = ReferenceEngine::with_seed(1);
        let mut dynamics = engine.dynamics(test_system(), &setup(0.5)).unwrap();
        dynamics.run(0.2, &SamplingPlan::none()).unwrap();

        let state = dynamics.commit();
        assert!(state.energy_trajectory.is_empty());
        assert_eq!(state.num_frames(), 0);
    }

    #[test]
    fn changing_energy_columns_mid_trajectory_is_rejected() {
        let engine = ReferenceEngine::with_seed(1);
        let mut dynamics = engine.dynamics(test_system(), &setup(0.5)).unwrap();
        dynamics.run(0.2, &sampling(vec![0.0, 1.0])).unwrap();

        let result = dynamics.run(0.2, &sampling(vec![0.0, 0.5]));
        assert!(matches!(result, Err(EngineError::Sampling(_))));
    }

    #[test]
    fn energy_components_split_fixed_and_perturbable_tethers() {
        let engine = ReferenceEngine::with_seed(3);
        let mut dynamics = engine.dynamics(test_system(), &setup(0.5)).unwrap();
        dynamics.run(0.1, &SamplingPlan::none()).unwrap();

        let components = dynamics.energy_components().unwrap();
        let total: f64 = components.iter().map(|c| c.energy).sum();
        assert_eq!(components.len(), 2);
        assert!((total - potential_energy(&dynamics.commit(), 0.5)).abs() < 1e-9);
    }

    #[test]
    fn zero_timestep_is_a_setup_error() {
        let mut bad = setup(0.5);
        bad.timestep = 0.0;
        assert!(matches!(
            ReferenceEngine::new().dynamics(test_system(), &bad),
            Err(EngineError::Setup(_))
        ));
    }
}

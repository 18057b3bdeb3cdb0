use serde::{Deserialize, Serialize};

/// A single energy sample: the reduced potential of the current configuration evaluated
/// at every lambda value of the owning trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergySample {
    /// Simulated time of the sample in picoseconds.
    pub time: f64,
    /// Reduced potential energies (kT), one per lambda column.
    pub energies: Vec<f64>,
}

/// An append-only energy time series, keyed by sample index.
///
/// The column set (`lambdas`) is fixed once the first sample is recorded. Every sample
/// carries exactly one energy per column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyTrajectory {
    lambdas: Vec<f64>,
    samples: Vec<EnergySample>,
}

impl EnergyTrajectory {
    /// Creates an empty trajectory sampling the given lambda columns.
    pub fn new(lambdas: Vec<f64>) -> Self {
        Self {
            lambdas,
            samples: Vec::new(),
        }
    }

    /// Creates a trajectory from already recorded samples.
    pub fn from_samples(lambdas: Vec<f64>, samples: Vec<EnergySample>) -> Self {
        Self { lambdas, samples }
    }

    /// The lambda value of each energy column.
    pub fn lambdas(&self) -> &[f64] {
        &self.lambdas
    }

    pub fn samples(&self) -> &[EnergySample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns `true` if samples recorded at `lambdas` can be appended to this
    /// trajectory without changing its column set.
    pub fn accepts_columns(&self, lambdas: &[f64]) -> bool {
        self.samples.is_empty() || self.lambdas == lambdas
    }

    /// Resets the column set. Only valid while the trajectory is empty.
    pub fn set_lambdas(&mut self, lambdas: Vec<f64>) {
        debug_assert!(self.samples.is_empty());
        self.lambdas = lambdas;
    }

    pub fn push(&mut self, sample: EnergySample) {
        debug_assert_eq!(sample.energies.len(), self.lambdas.len());
        self.samples.push(sample);
    }

    /// Samples recorded after the first `already_written`.
    pub fn samples_since(&self, already_written: usize) -> &[EnergySample] {
        let start = already_written.min(self.samples.len());
        &self.samples[start..]
    }
}

/// Energy contribution of one force group, in kcal/mol.
#[derive(Debug, Clone, PartialEq)]
pub struct ForceEnergy {
    pub name: String,
    pub energy: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(time: f64) -> EnergySample {
        EnergySample {
            time,
            energies: vec![time, -time],
        }
    }

    #[test]
    fn samples_since_skips_written_samples() {
        let mut traj = EnergyTrajectory::new(vec![0.0, 1.0]);
        for i in 0..5 {
            traj.push(sample(i as f64));
        }

        let pending = traj.samples_since(3);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].time, 3.0);
        assert_eq!(pending[1].time, 4.0);
    }

    #[test]
    fn samples_since_is_empty_once_everything_is_written() {
        let mut traj = EnergyTrajectory::new(vec![0.0, 1.0]);
        traj.push(sample(0.0));
        assert!(traj.samples_since(1).is_empty());
        assert!(traj.samples_since(10).is_empty());
    }

    #[test]
    fn columns_are_locked_once_samples_exist() {
        let mut traj = EnergyTrajectory::new(vec![0.0, 1.0]);
        assert!(traj.accepts_columns(&[0.0, 0.5]));
        traj.push(sample(0.0));
        assert!(traj.accepts_columns(&[0.0, 1.0]));
        assert!(!traj.accepts_columns(&[0.0, 0.5]));
    }
}

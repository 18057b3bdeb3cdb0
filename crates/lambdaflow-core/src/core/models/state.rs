use super::energy::EnergyTrajectory;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Lambda-dependent parameters of a perturbable atom.
///
/// The tether spring constant is interpolated linearly between the reference
/// (`lambda = 0`) and perturbed (`lambda = 1`) end states.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Perturbation {
    /// Spring constant at the reference end state in kcal/mol/Å².
    pub k0: f64,
    /// Spring constant at the perturbed end state in kcal/mol/Å².
    pub k1: f64,
}

impl Perturbation {
    pub fn spring_constant(&self, lambda: f64) -> f64 {
        (1.0 - lambda) * self.k0 + lambda * self.k1
    }
}

/// A single atom of a simulated system.
///
/// Each atom is tethered harmonically to an anchor point. Perturbable atoms carry a
/// [`Perturbation`] that replaces the fixed spring constant with a lambda-dependent one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// Atom name, also used as the element label in trajectory files.
    pub name: String,
    /// Mass in atomic mass units.
    pub mass: f64,
    /// Current position in Ångströms.
    pub position: Point3<f64>,
    /// Current velocity in Å/ps.
    #[serde(default = "zero_velocity")]
    pub velocity: Vector3<f64>,
    /// Equilibrium position of the tether.
    pub anchor: Point3<f64>,
    /// Tether spring constant for non-perturbable atoms in kcal/mol/Å².
    pub spring_constant: f64,
    /// End-state parameters, present only for perturbable atoms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perturbation: Option<Perturbation>,
}

impl Atom {
    /// Creates an atom at rest, tethered to its initial position.
    pub fn new(name: &str, mass: f64, position: Point3<f64>, spring_constant: f64) -> Self {
        Self {
            name: name.to_string(),
            mass,
            position,
            velocity: Vector3::zeros(),
            anchor: position,
            spring_constant,
            perturbation: None,
        }
    }

    pub fn with_perturbation(mut self, k0: f64, k1: f64) -> Self {
        self.perturbation = Some(Perturbation { k0, k1 });
        self
    }

    pub fn is_perturbable(&self) -> bool {
        self.perturbation.is_some()
    }

    /// Tether spring constant at the given lambda.
    pub fn spring_constant_at(&self, lambda: f64) -> f64 {
        match &self.perturbation {
            Some(p) => p.spring_constant(lambda),
            None => self.spring_constant,
        }
    }
}

/// Coordinates of every atom at one instant of simulated time.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Simulated time in picoseconds.
    pub time: f64,
    pub positions: Vec<Point3<f64>>,
}

fn zero_velocity() -> Vector3<f64> {
    Vector3::zeros()
}

/// Metadata embedded in a checkpoint so that it can be interpreted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// The resolved run configuration that produced the checkpoint.
    pub config: serde_json::Value,
    /// The lambda value of the window the checkpoint belongs to.
    pub lambda: f64,
}

/// A full snapshot of a simulated system.
///
/// This is what the physics engine advances and what a checkpoint persists. Trajectory
/// frames are held only in memory: they are flushed to chunk files after every block and
/// are therefore not part of the serialized state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    pub name: String,
    pub atoms: Vec<Atom>,
    /// Edge lengths of an orthorhombic periodic box in Ångströms, if the system is
    /// periodic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub box_vectors: Option<Vector3<f64>>,
    #[serde(default)]
    time: f64,
    #[serde(default)]
    pub energy_trajectory: EnergyTrajectory,
    #[serde(skip)]
    frames: Vec<Frame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CheckpointMetadata>,
}

impl SystemState {
    pub fn new(name: &str, atoms: Vec<Atom>) -> Self {
        Self {
            name: name.to_string(),
            atoms,
            box_vectors: None,
            time: 0.0,
            energy_trajectory: EnergyTrajectory::default(),
            frames: Vec::new(),
            metadata: None,
        }
    }

    pub fn with_box(mut self, box_vectors: Vector3<f64>) -> Self {
        self.box_vectors = Some(box_vectors);
        self
    }

    /// Elapsed simulated time in picoseconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    pub fn is_periodic(&self) -> bool {
        self.box_vectors.is_some()
    }

    pub fn has_perturbable_atoms(&self) -> bool {
        self.atoms.iter().any(Atom::is_perturbable)
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn atom_names(&self) -> Vec<String> {
        self.atoms.iter().map(|a| a.name.clone()).collect()
    }

    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.atoms.iter().map(|a| a.position).collect()
    }

    /// Number of frames collected since the state was loaded or created.
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Frames collected after the first `already_written` ones.
    pub fn frames_since(&self, already_written: usize) -> &[Frame] {
        let start = already_written.min(self.frames.len());
        &self.frames[start..]
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_atom_state() -> SystemState {
        let a = Atom::new("C", 12.011, Point3::new(0.0, 0.0, 0.0), 10.0);
        let b = Atom::new("O", 15.999, Point3::new(1.2, 0.0, 0.0), 10.0)
            .with_perturbation(5.0, 20.0);
        SystemState::new("co", vec![a, b])
    }

    #[test]
    fn perturbation_interpolates_between_end_states() {
        let p = Perturbation { k0: 5.0, k1: 20.0 };
        assert_eq!(p.spring_constant(0.0), 5.0);
        assert_eq!(p.spring_constant(1.0), 20.0);
        assert_eq!(p.spring_constant(0.5), 12.5);
    }

    #[test]
    fn fixed_atoms_ignore_lambda() {
        let atom = Atom::new("C", 12.0, Point3::origin(), 7.0);
        assert_eq!(atom.spring_constant_at(0.0), 7.0);
        assert_eq!(atom.spring_constant_at(1.0), 7.0);
    }

    #[test]
    fn detects_perturbable_atoms() {
        let state = two_atom_state();
        assert!(state.has_perturbable_atoms());

        let plain = SystemState::new("plain", vec![Atom::new("C", 12.0, Point3::origin(), 1.0)]);
        assert!(!plain.has_perturbable_atoms());
    }

    #[test]
    fn frames_since_skips_written_frames() {
        let mut state = two_atom_state();
        for i in 0..3 {
            state.push_frame(Frame {
                time: i as f64,
                positions: state.positions(),
            });
        }
        assert_eq!(state.frames_since(1).len(), 2);
        assert_eq!(state.frames_since(1)[0].time, 1.0);
        assert!(state.frames_since(10).is_empty());
    }

    #[test]
    fn frames_are_not_serialized() {
        let mut state = two_atom_state();
        state.push_frame(Frame {
            time: 0.0,
            positions: state.positions(),
        });
        state.set_time(2.5);

        let json = serde_json::to_string(&state).unwrap();
        let restored: SystemState = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.num_frames(), 0);
        assert_eq!(restored.time(), 2.5);
        assert_eq!(restored.atoms, state.atoms);
    }
}

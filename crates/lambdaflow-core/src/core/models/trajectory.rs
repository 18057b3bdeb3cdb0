use super::state::Frame;

/// Coordinate frames of one system, in time order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    /// Atom names, one per coordinate in every frame.
    pub atom_names: Vec<String>,
    pub frames: Vec<Frame>,
}

impl Trajectory {
    pub fn new(atom_names: Vec<String>) -> Self {
        Self {
            atom_names,
            frames: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Appends every frame of `other`. Returns `false`, leaving `self` untouched, if the
    /// two trajectories describe different atoms.
    pub fn extend_from(&mut self, other: Trajectory) -> bool {
        if other.frames.is_empty() {
            return true;
        }
        if self.frames.is_empty() {
            self.atom_names = other.atom_names;
        } else if self.atom_names != other.atom_names {
            return false;
        }
        self.frames.extend(other.frames);
        true
    }
}

//! # Core Models Module
//!
//! The data structures that describe a simulated system and what a simulation produces.
//!
//! ## Key Components
//!
//! - [`state`] - The full snapshot of a simulated system: atoms, coordinates, velocities,
//!   periodic box, simulated clock, collected frames and embedded checkpoint metadata
//! - [`energy`] - The energy time series sampled at a fixed set of lambda values, and
//!   the per-force energy decomposition used for diagnostics
//! - [`trajectory`] - An ordered sequence of coordinate frames for one window
//! - [`window`] - One lambda window: its value, the grid it belongs to and the lambdas at
//!   which it samples energies
//!
//! A [`state::SystemState`] is the unit of exchange with the physics engine: the engine
//! consumes one, advances it, and hands a committed copy back. It is also exactly what
//! is persisted in a checkpoint file.

pub mod energy;
pub mod state;
pub mod trajectory;
pub mod window;

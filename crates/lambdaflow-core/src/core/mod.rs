//! # Core Module
//!
//! Foundational, stateless building blocks shared by the engine and workflow layers.
//!
//! - **Models** ([`models`]) - The simulated-system snapshot, trajectory frames and the
//!   energy time series sampled at a set of lambda values.
//! - **Lambda arithmetic** ([`lambda`]) - Grid generation, finite-difference gradient
//!   neighbors and the per-window energy sampling set.
//! - **I/O** ([`io`]) - Checkpoints, energy trajectory files, trajectory chunks, the
//!   energy-components table and lambda-qualified file naming.

pub mod io;
pub mod lambda;
pub mod models;

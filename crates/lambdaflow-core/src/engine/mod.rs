//! # Engine Module
//!
//! This module implements the stateful execution layer of lambdaflow: everything that
//! happens between "a window has been scheduled" and "its energy trajectory is on disk".
//!
//! ## Overview
//!
//! A lambda window is executed by a [`session::SimulationSession`], which drives a black-box
//! physics engine ([`md::MdEngine`]) through minimisation, optional equilibration and a
//! block-wise production phase. After every full block the session persists a checkpoint,
//! flushes trajectory frames to a chunk file and extends the window's energy trajectory, so
//! a crashed run can be resumed without re-simulating completed blocks.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - The immutable, validated run parameters and their builder
//! - **Engine Seam** ([`md`]) - Traits the physics engine implements, plus request types
//! - **Reference Engine** ([`reference`]) - A harmonic-tether Langevin engine for tests and demos
//! - **Device Pool** ([`device`]) - Bounded, mutually exclusive compute-device bookkeeping
//! - **Block Planning** ([`block`]) - Checkpoint block layout and restart resume points
//! - **Session** ([`session`]) - The per-window state machine
//! - **Progress Monitoring** ([`progress`]) - Progress reporting callbacks
//! - **Error Handling** ([`error`]) - Engine, session and scheduler error types

pub mod block;
pub mod config;
pub mod device;
pub mod error;
pub mod md;
pub mod progress;
pub mod reference;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

//! # lambdaflow Core Library
//!
//! Scheduling and checkpointed execution of alchemical free-energy simulations. A run is
//! split into independent lambda windows; each window is advanced by an external
//! molecular-dynamics engine in fixed-size blocks, and every block is persisted so that
//! an interrupted run resumes without re-simulating completed work.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`SystemState`,
//!   `EnergyTrajectory`), lambda arithmetic, and the on-disk formats for checkpoints,
//!   energy trajectories, trajectory chunks and diagnostics.
//!
//! - **[`engine`]: The Logic Core.** The stateful layer. It defines the black-box
//!   physics engine seam (`MdEngine`, `Dynamics`), the shared `DevicePool`, block
//!   planning and restart bookkeeping, and `SimulationSession`, which owns the full
//!   lifecycle of one window.
//!
//! - **[`workflows`]: The Public API.** `WindowScheduler` computes the lambda grid,
//!   dispatches sessions sequentially or on a bounded worker pool, and aggregates the
//!   results while isolating per-window failures.

pub mod core;
pub mod engine;
pub mod workflows;

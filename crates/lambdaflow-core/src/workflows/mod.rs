//! # Workflows Module
//!
//! High-level entry points that run a complete alchemical calculation.
//!
//! ## Overview
//!
//! A workflow turns a system and a validated [`RunConfig`](crate::engine::config::RunConfig)
//! into results. It validates everything that can be validated up front, so that a bad
//! configuration fails before any simulation time is spent, then dispatches one
//! [`SimulationSession`](crate::engine::session::SimulationSession) per lambda window and
//! aggregates what comes back.
//!
//! ## Architecture
//!
//! - **Window Scheduling** ([`schedule`]) - Lambda grid generation, sequential or parallel
//!   dispatch over a bounded worker pool, device leasing and per-window failure isolation.

pub mod schedule;

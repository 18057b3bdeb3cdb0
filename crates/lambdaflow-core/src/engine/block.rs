use super::config::RunConfig;
use crate::core::lambda::round_to;
use crate::core::models::state::SystemState;

/// Block counts are derived from `runtime / checkpoint_frequency` rounded to this many
/// decimals, so that values like `2.9999999999999996` count as three blocks.
const BLOCK_PRECISION: i32 = 12;

/// One unit of production time between checkpoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    /// Absolute block index across all invocations of the window.
    pub index: u64,
    /// Simulated time in picoseconds.
    pub duration: f64,
    /// The trailing partial block. It is not followed by a checkpoint.
    pub is_remainder: bool,
}

/// Where a window resumes production.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestartPoint {
    /// Index of the first block still to run.
    pub resume_block_index: u64,
    /// Production time still to simulate, in picoseconds.
    pub remaining_runtime: f64,
}

impl RestartPoint {
    /// A fresh window: nothing has run yet.
    pub fn fresh(config: &RunConfig) -> Self {
        Self {
            resume_block_index: 0,
            remaining_runtime: config.dynamics.runtime,
        }
    }

    /// Derives the resume point from the simulated time persisted in a checkpoint.
    pub fn from_state(state: &SystemState, config: &RunConfig) -> Self {
        let time = state.time();
        let ratio = round_to(time / config.output.checkpoint_frequency, BLOCK_PRECISION);
        Self {
            resume_block_index: ratio.max(0.0).trunc() as u64,
            remaining_runtime: config.dynamics.runtime - time,
        }
    }
}

/// The ordered list of blocks a production phase runs.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPlan {
    blocks: Vec<Block>,
    checkpoint_interval: f64,
}

impl BlockPlan {
    /// Splits `remaining` picoseconds into blocks of `checkpoint_frequency`.
    ///
    /// When less than one interval remains, the interval shrinks to exactly the remaining
    /// time and the plan holds a single full block. Otherwise the plan holds
    /// `floor(remaining / checkpoint_frequency)` full blocks followed by a remainder block
    /// if the division is inexact. Indices start at `resume_offset`. A remaining time that
    /// rounds to zero means the window is already complete.
    pub fn new(remaining: f64, checkpoint_frequency: f64, resume_offset: u64) -> Self {
        if !(round_to(remaining, BLOCK_PRECISION) > 0.0) {
            return Self {
                blocks: Vec::new(),
                checkpoint_interval: checkpoint_frequency,
            };
        }

        let mut interval = checkpoint_frequency;
        let mut frac = round_to(remaining / interval, BLOCK_PRECISION);
        if frac < 1.0 {
            interval = remaining;
            frac = 1.0;
        }

        let num_blocks = frac.trunc() as u64;
        let remainder = round_to(frac - num_blocks as f64, BLOCK_PRECISION);

        let mut blocks: Vec<Block> = (0..num_blocks)
            .map(|i| Block {
                index: resume_offset + i,
                duration: interval,
                is_remainder: false,
            })
            .collect();
        if remainder > 0.0 {
            blocks.push(Block {
                index: resume_offset + num_blocks,
                duration: remainder * interval,
                is_remainder: true,
            });
        }

        Self {
            blocks,
            checkpoint_interval: interval,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The effective block length, after shrinking to a short runtime.
    pub fn checkpoint_interval(&self) -> f64 {
        self.checkpoint_interval
    }
}

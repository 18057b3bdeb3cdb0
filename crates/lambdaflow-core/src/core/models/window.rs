use crate::core::lambda::{LAMBDA_PRECISION, energy_sample_lambdas, gradient_neighbors, round_to};
use crate::engine::config::ConfigError;

/// Tolerance used when locating a lambda value inside its grid.
const GRID_TOLERANCE: f64 = 1e-9;

/// One lambda window of an alchemical run. Immutable once scheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    lambda: f64,
    grid: Vec<f64>,
    sample_lambdas: Vec<f64>,
    gradient_neighbors: Vec<f64>,
}

impl Window {
    /// Creates the window at `lambda` of `grid`.
    ///
    /// `candidates` are the lambdas at which energies are sampled, in addition to the
    /// window's own value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::LambdaNotInGrid`] if `lambda` is not a grid value, and
    /// [`ConfigError::GradientIncrementTooLarge`] if the gradient neighbors cannot be
    /// placed inside `[0, 1]`.
    pub fn new(
        lambda: f64,
        grid: &[f64],
        candidates: &[f64],
        gradient_increment: f64,
    ) -> Result<Self, ConfigError> {
        let lambda = round_to(lambda, LAMBDA_PRECISION);
        if !grid.iter().any(|g| (g - lambda).abs() < GRID_TOLERANCE) {
            return Err(ConfigError::LambdaNotInGrid(lambda));
        }
        Ok(Self {
            lambda,
            grid: grid.to_vec(),
            sample_lambdas: energy_sample_lambdas(lambda, candidates),
            gradient_neighbors: gradient_neighbors(lambda, gradient_increment)?,
        })
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn grid(&self) -> &[f64] {
        &self.grid
    }

    /// Sorted, deduplicated sampling lambdas; always includes [`Window::lambda`].
    pub fn sample_lambdas(&self) -> &[f64] {
        &self.sample_lambdas
    }

    pub fn gradient_neighbors(&self) -> &[f64] {
        &self.gradient_neighbors
    }

    /// Columns of the energy trajectory: the sampling lambdas followed by any gradient
    /// neighbor not already among them.
    pub fn energy_columns(&self) -> Vec<f64> {
        let mut columns = self.sample_lambdas.clone();
        for &neighbor in &self.gradient_neighbors {
            if !columns.contains(&neighbor) {
                columns.push(neighbor);
            }
        }
        columns
    }

    /// The window's lambda formatted as it appears in file names.
    pub fn label(&self) -> String {
        format!("{:.5}", self.lambda)
    }
}

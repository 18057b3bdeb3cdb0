use crate::engine::config::ConfigError;

/// Number of decimal places lambda values are rounded to.
pub const LAMBDA_PRECISION: i32 = 5;

/// Rounds `value` to `decimals` decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Generates the evenly spaced, ascending lambda grid `i / (N - 1)` for `i in 0..N`.
///
/// # Errors
///
/// Returns [`ConfigError::SingleState`] if fewer than two windows are requested, since
/// a single-state (non-alchemical) run has no lambda schedule.
pub fn lambda_grid(num_lambda: usize) -> Result<Vec<f64>, ConfigError> {
    if num_lambda < 2 {
        return Err(ConfigError::SingleState);
    }
    let last = (num_lambda - 1) as f64;
    Ok((0..num_lambda)
        .map(|i| round_to(i as f64 / last, LAMBDA_PRECISION))
        .collect())
}

/// Lambda values offset from `lambda` by `increment`, used for finite-difference
/// gradient estimation.
///
/// Windows sitting exactly on an end state get a single, inward neighbor. Any other
/// window needs both neighbors inside `[0, 1]`.
///
/// # Errors
///
/// Returns [`ConfigError::GradientIncrementTooLarge`] if the increment pushes a
/// neighbor outside `[0, 1]` for an interior window, or both neighbors outside the
/// range for any window.
pub fn gradient_neighbors(lambda: f64, increment: f64) -> Result<Vec<f64>, ConfigError> {
    let lower = lambda - increment;
    let upper = lambda + increment;
    let lower_out = lower < 0.0;
    let upper_out = upper > 1.0;

    let too_large = || ConfigError::GradientIncrementTooLarge { lambda, increment };

    if lower_out && upper_out {
        return Err(too_large());
    }

    let neighbors = if lambda == 0.0 {
        vec![upper]
    } else if lambda == 1.0 {
        vec![lower]
    } else if lower_out || upper_out {
        return Err(too_large());
    } else {
        vec![lower, upper]
    };

    Ok(neighbors
        .into_iter()
        .map(|value| round_to(value, LAMBDA_PRECISION))
        .collect())
}

/// The sorted, deduplicated set of lambdas at which a window samples energies. Always
/// contains the window's own lambda.
pub fn energy_sample_lambdas(lambda: f64, candidates: &[f64]) -> Vec<f64> {
    let mut values: Vec<f64> = candidates.to_vec();
    values.push(lambda);
    values.sort_by(f64::total_cmp);
    values.dedup();
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_is_uniform_and_spans_unit_interval() {
        for n in 2..40 {
            let grid = lambda_grid(n).unwrap();
            assert_eq!(grid.len(), n);
            assert_eq!(grid[0], 0.0);
            assert_eq!(*grid.last().unwrap(), 1.0);
            assert!(grid.windows(2).all(|w| w[0] < w[1]));

            let spacing = 1.0 / (n - 1) as f64;
            for w in grid.windows(2) {
                assert!((w[1] - w[0] - spacing).abs() <= 1.01e-5);
            }
        }
    }

    #[test]
    fn grid_values_are_rounded() {
        let grid = lambda_grid(4).unwrap();
        assert_eq!(grid, vec![0.0, 0.33333, 0.66667, 1.0]);
    }

    #[test]
    fn single_state_grid_is_rejected() {
        assert_eq!(lambda_grid(1), Err(ConfigError::SingleState));
        assert_eq!(lambda_grid(0), Err(ConfigError::SingleState));
    }

    #[test]
    fn neighbors_at_lower_end_state() {
        assert_eq!(gradient_neighbors(0.0, 0.001).unwrap(), vec![0.001]);
    }

    #[test]
    fn neighbors_at_upper_end_state() {
        assert_eq!(gradient_neighbors(1.0, 0.001).unwrap(), vec![0.999]);
    }

    #[test]
    fn neighbors_for_interior_window() {
        assert_eq!(gradient_neighbors(0.5, 0.001).unwrap(), vec![0.499, 0.501]);
    }

    #[test]
    fn neighbors_reject_increment_crossing_a_boundary() {
        assert!(matches!(
            gradient_neighbors(0.0005, 0.001),
            Err(ConfigError::GradientIncrementTooLarge { .. })
        ));
    }

    #[test]
    fn neighbors_reject_increment_crossing_both_boundaries() {
        assert!(matches!(
            gradient_neighbors(0.5, 0.6),
            Err(ConfigError::GradientIncrementTooLarge { .. })
        ));
    }

    #[test]
    fn sample_lambdas_include_own_value_sorted_and_unique() {
        let lambdas = energy_sample_lambdas(0.3, &[1.0, 0.0, 0.5, 0.0]);
        assert_eq!(lambdas, vec![0.0, 0.3, 0.5, 1.0]);

        let lambdas = energy_sample_lambdas(0.5, &[0.0, 0.5, 1.0]);
        assert_eq!(lambdas, vec![0.0, 0.5, 1.0]);
    }
}

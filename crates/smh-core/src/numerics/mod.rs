pub mod linalg;
pub mod profiles;
pub mod solver;

pub use linalg::{LuDecomposition, LuError, lu_factorize, lu_invert};
pub use profiles::{
    LineShape, faddeeva, gaussian_smooth, line_profile, profile_integral,
};
pub use solver::{LeastSquaresSolution, ParameterSpec, SolverError, SolverOptions, minimize};

fn kahan_add(sum: &mut f64, correction: &mut f64, value: f64) {
    let corrected = value - *correction;
    let next = *sum + corrected;
    *correction = (next - *sum) - corrected;
    *sum = next;
}

pub fn stable_sum(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut correction = 0.0;

    for &value in values {
        kahan_add(&mut sum, &mut correction, value);
    }

    sum
}

pub fn stable_sum_of_squares(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut correction = 0.0;

    for &value in values {
        kahan_add(&mut sum, &mut correction, value * value);
    }

    sum
}

pub fn stable_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(stable_sum(values) / values.len() as f64)
}

/// Median of the finite entries; `None` when there are none.
pub fn finite_median(values: &[f64]) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_unstable_by(f64::total_cmp);
    let middle = finite.len() / 2;
    if finite.len() % 2 == 1 {
        Some(finite[middle])
    } else {
        Some(0.5 * (finite[middle - 1] + finite[middle]))
    }
}

/// Evaluate the polynomial `sum c_k x^k` with Horner's scheme.
pub fn polynomial(coefficients: &[f64], x: f64) -> f64 {
    coefficients
        .iter()
        .rev()
        .fold(0.0, |accumulator, coefficient| accumulator * x + coefficient)
}

/// Linear interpolation of `(x_grid, y_grid)` at every query, clamping to the
/// first/last sample outside the grid. The grid must be non-decreasing.
pub fn interpolate_onto(x_grid: &[f64], y_grid: &[f64], queries: &[f64]) -> Option<Vec<f64>> {
    if x_grid.len() < 2 || x_grid.len() != y_grid.len() {
        return None;
    }

    if !x_grid.windows(2).all(|window| window[0] <= window[1]) {
        return None;
    }

    let last = x_grid.len() - 1;
    let values = queries
        .iter()
        .map(|&x| {
            if x <= x_grid[0] {
                return y_grid[0];
            }
            if x >= x_grid[last] {
                return y_grid[last];
            }

            let upper = x_grid.partition_point(|sample| *sample < x);
            if x_grid[upper] == x {
                return y_grid[upper];
            }
            let lower = upper - 1;
            let x0 = x_grid[lower];
            let x1 = x_grid[upper];
            if x1 == x0 {
                return y_grid[upper];
            }
            let fraction = (x - x0) / (x1 - x0);
            y_grid[lower] + fraction * (y_grid[upper] - y_grid[lower])
        })
        .collect();

    Some(values)
}

/// Median spacing between consecutive samples.
pub fn median_spacing(x: &[f64]) -> Option<f64> {
    if x.len() < 2 {
        return None;
    }
    let steps: Vec<f64> = x.windows(2).map(|pair| pair[1] - pair[0]).collect();
    finite_median(&steps)
}

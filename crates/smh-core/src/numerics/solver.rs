//! Bounded Levenberg-Marquardt least squares with finite-difference Jacobians.
//!
//! Parameters whose lower and upper bounds coincide are held fixed and removed
//! from the free vector. Trial steps are projected back into the box.

use super::linalg::{DenseMatrix, LuError, lu_factorize, lu_invert};
use super::stable_sum_of_squares;
use crate::domain::{SmhError, SmhResult};

const JACOBIAN_RELATIVE_STEP: f64 = 6.0e-6;
const JACOBIAN_MINIMUM_SCALE: f64 = 1.0e-2;
const MINIMUM_DIAGONAL: f64 = 1.0e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSpec {
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ParameterSpec {
    pub const fn free(value: f64) -> Self {
        Self {
            value,
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    pub const fn bounded(value: f64, lower: f64, upper: f64) -> Self {
        Self {
            value,
            lower,
            upper,
        }
    }

    pub const fn fixed(value: f64) -> Self {
        Self {
            value,
            lower: value,
            upper: value,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.lower == self.upper
    }

    fn clamp(&self, value: f64) -> f64 {
        if self.is_fixed() {
            self.lower
        } else {
            value.max(self.lower).min(self.upper)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    pub max_iterations: usize,
    pub initial_damping: f64,
    pub max_damping: f64,
    pub relative_tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            initial_damping: 1.0e-3,
            max_damping: 1.0e12,
            relative_tolerance: 1.0e-10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverError {
    #[error("no free parameters to optimise")]
    NoFreeParameters,
    #[error("{residuals} residual(s) cannot constrain {parameters} free parameter(s)")]
    Underdetermined { residuals: usize, parameters: usize },
    #[error("residual vector changed length from {expected} to {actual}")]
    ResidualLength { expected: usize, actual: usize },
    #[error("residuals are not finite at the starting point")]
    NonFiniteStart,
    #[error("did not converge after {iterations} iteration(s)")]
    NotConverged { iterations: usize },
    #[error("covariance matrix is unavailable: {0}")]
    Covariance(#[source] LuError),
    #[error(transparent)]
    Evaluation(#[from] SmhError),
}

impl From<SolverError> for SmhError {
    fn from(error: SolverError) -> Self {
        match error {
            SolverError::Evaluation(inner) => inner,
            SolverError::Underdetermined { .. } => {
                SmhError::insufficient_data("FIT.UNDERDETERMINED", error.to_string())
            }
            SolverError::NotConverged { .. } => {
                SmhError::fit("FIT.NOT_CONVERGED", error.to_string())
            }
            SolverError::Covariance(_) => SmhError::fit("FIT.COVARIANCE", error.to_string()),
            other => SmhError::fit("FIT.SOLVER", other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeastSquaresSolution {
    pub parameters: Vec<f64>,
    /// Full covariance; rows and columns of fixed parameters are zero.
    pub covariance: Vec<Vec<f64>>,
    pub chi_square: f64,
    pub residual_count: usize,
    pub free_parameter_count: usize,
    pub iterations: usize,
}

impl LeastSquaresSolution {
    pub fn reduced_chi_square(&self) -> f64 {
        let dof = self.residual_count.saturating_sub(self.free_parameter_count);
        if dof == 0 {
            f64::NAN
        } else {
            self.chi_square / dof as f64
        }
    }

    pub fn standard_error(&self, index: usize) -> f64 {
        self.covariance
            .get(index)
            .and_then(|row| row.get(index))
            .map_or(f64::NAN, |variance| variance.max(0.0).sqrt())
    }
}

/// Minimise the sum of squares of `residuals(p)` subject to the parameter
/// boxes. `residuals` must already carry the `sqrt(weight)` factors.
pub fn minimize<F>(
    mut residuals: F,
    parameters: &[ParameterSpec],
    options: &SolverOptions,
) -> Result<LeastSquaresSolution, SolverError>
where
    F: FnMut(&[f64]) -> SmhResult<Vec<f64>>,
{
    let free: Vec<usize> = (0..parameters.len())
        .filter(|index| !parameters[*index].is_fixed())
        .collect();
    if free.is_empty() {
        return Err(SolverError::NoFreeParameters);
    }

    let mut current: Vec<f64> = parameters
        .iter()
        .map(|spec| spec.clamp(spec.value))
        .collect();
    let mut current_residuals = residuals(&current)?;
    let residual_count = current_residuals.len();
    if residual_count < free.len() {
        return Err(SolverError::Underdetermined {
            residuals: residual_count,
            parameters: free.len(),
        });
    }
    let mut chi_square = stable_sum_of_squares(&current_residuals);
    if !chi_square.is_finite() {
        return Err(SolverError::NonFiniteStart);
    }

    let mut damping = options.initial_damping;
    let mut iterations = 0;
    let mut converged = chi_square == 0.0;

    while !converged {
        if iterations >= options.max_iterations {
            return Err(SolverError::NotConverged { iterations });
        }
        iterations += 1;

        let jacobian = finite_difference_jacobian(&mut residuals, parameters, &current, &free)?;
        let (normal, gradient) = normal_equations(&jacobian, &current_residuals);

        loop {
            let mut damped = normal.clone();
            for k in 0..free.len() {
                damped[(k, k)] += damping * normal[(k, k)].max(MINIMUM_DIAGONAL);
            }

            let step = match lu_factorize(&damped).and_then(|lu| lu.solve(&gradient)) {
                Ok(step) => step,
                Err(_) => {
                    damping *= 10.0;
                    if damping > options.max_damping {
                        converged = true;
                        break;
                    }
                    continue;
                }
            };

            let mut trial = current.clone();
            for (k, &index) in free.iter().enumerate() {
                trial[index] = parameters[index].clamp(current[index] - step[k]);
            }

            let trial_residuals = residuals(&trial)?;
            if trial_residuals.len() != residual_count {
                return Err(SolverError::ResidualLength {
                    expected: residual_count,
                    actual: trial_residuals.len(),
                });
            }

            let trial_chi_square = stable_sum_of_squares(&trial_residuals);
            if trial_chi_square.is_finite() && trial_chi_square < chi_square {
                let decrease = (chi_square - trial_chi_square) / chi_square;
                let largest_step = free
                    .iter()
                    .map(|&index| {
                        (trial[index] - current[index]).abs()
                            / (current[index].abs() + options.relative_tolerance)
                    })
                    .fold(0.0, f64::max);

                current = trial;
                current_residuals = trial_residuals;
                chi_square = trial_chi_square;
                damping = (damping / 10.0).max(1.0e-12);

                if decrease < options.relative_tolerance
                    || largest_step < options.relative_tolerance
                    || chi_square == 0.0
                {
                    converged = true;
                }
                break;
            }

            damping *= 10.0;
            if damping > options.max_damping {
                converged = true;
                break;
            }
        }
    }

    let jacobian = finite_difference_jacobian(&mut residuals, parameters, &current, &free)?;
    let (normal, _) = normal_equations(&jacobian, &current_residuals);
    let inverse = lu_invert(&normal).map_err(SolverError::Covariance)?;

    let dimension = parameters.len();
    let mut covariance = vec![vec![0.0; dimension]; dimension];
    for (row, &row_index) in free.iter().enumerate() {
        for (col, &col_index) in free.iter().enumerate() {
            covariance[row_index][col_index] = inverse[(row, col)];
        }
    }

    Ok(LeastSquaresSolution {
        parameters: current,
        covariance,
        chi_square,
        residual_count,
        free_parameter_count: free.len(),
        iterations,
    })
}

fn finite_difference_jacobian<F>(
    residuals: &mut F,
    parameters: &[ParameterSpec],
    point: &[f64],
    free: &[usize],
) -> Result<Vec<Vec<f64>>, SolverError>
where
    F: FnMut(&[f64]) -> SmhResult<Vec<f64>>,
{
    let mut columns = Vec::with_capacity(free.len());
    let mut shifted = point.to_vec();

    for &index in free {
        let spec = parameters[index];
        let step = JACOBIAN_RELATIVE_STEP * point[index].abs().max(JACOBIAN_MINIMUM_SCALE);
        let upper = spec.clamp(point[index] + step);
        let lower = spec.clamp(point[index] - step);
        let span = upper - lower;

        shifted[index] = upper;
        let forward = residuals(&shifted)?;
        shifted[index] = lower;
        let backward = residuals(&shifted)?;
        shifted[index] = point[index];

        if forward.len() != backward.len() {
            return Err(SolverError::ResidualLength {
                expected: forward.len(),
                actual: backward.len(),
            });
        }

        let column = if span > 0.0 {
            forward
                .iter()
                .zip(&backward)
                .map(|(plus, minus)| (plus - minus) / span)
                .collect()
        } else {
            vec![0.0; forward.len()]
        };
        columns.push(column);
    }

    Ok(columns)
}

/// `J^T J` and `J^T r` for the column-major Jacobian.
fn normal_equations(columns: &[Vec<f64>], residuals: &[f64]) -> (DenseMatrix, Vec<f64>) {
    let dimension = columns.len();
    let mut normal = DenseMatrix::zeros(dimension, dimension);
    let mut gradient = vec![0.0; dimension];

    for row in 0..dimension {
        gradient[row] = columns[row]
            .iter()
            .zip(residuals)
            .map(|(derivative, residual)| derivative * residual)
            .sum();
        for col in row..dimension {
            let value: f64 = columns[row]
                .iter()
                .zip(&columns[col])
                .map(|(lhs, rhs)| lhs * rhs)
                .sum();
            normal[(row, col)] = value;
            normal[(col, row)] = value;
        }
    }

    (normal, gradient)
}

#[cfg(test)]
mod tests {
    use super::{ParameterSpec, SolverError, SolverOptions, minimize};
    use crate::domain::{SmhError, SmhErrorCategory};

    fn line(x: &[f64], slope: f64, intercept: f64) -> Vec<f64> {
        x.iter().map(|value| slope * value + intercept).collect()
    }

    #[test]
    fn recovers_exponential_decay_parameters() {
        let x: Vec<f64> = (0..40).map(|index| index as f64 * 0.25).collect();
        let y: Vec<f64> = x.iter().map(|value| 3.0 * (-0.7 * value).exp()).collect();

        let solution = minimize(
            |p| {
                Ok(x.iter()
                    .zip(&y)
                    .map(|(value, observed)| p[0] * (-p[1] * value).exp() - observed)
                    .collect())
            },
            &[ParameterSpec::free(1.0), ParameterSpec::bounded(0.1, 0.0, 5.0)],
            &SolverOptions::default(),
        )
        .expect("fit should converge");

        assert!((solution.parameters[0] - 3.0).abs() < 1.0e-6);
        assert!((solution.parameters[1] - 0.7).abs() < 1.0e-6);
        assert!(solution.chi_square < 1.0e-12);
    }

    #[test]
    fn fixed_parameters_keep_their_value_and_zero_covariance() {
        let x: Vec<f64> = (0..10).map(|index| index as f64).collect();
        let y = line(&x, 2.0, 1.0);

        let solution = minimize(
            |p| {
                Ok(line(&x, p[0], p[1])
                    .iter()
                    .zip(&y)
                    .map(|(model, observed)| model - observed + 0.01)
                    .collect())
            },
            &[ParameterSpec::free(0.0), ParameterSpec::fixed(1.0)],
            &SolverOptions::default(),
        )
        .expect("fit should converge");

        assert_eq!(solution.parameters[1], 1.0);
        assert_eq!(solution.covariance[1][1], 0.0);
        assert!(solution.covariance[0][0] > 0.0);
        assert_eq!(solution.free_parameter_count, 1);
        assert!(solution.standard_error(0) > 0.0);
    }

    #[test]
    fn bounds_are_respected() {
        let x: Vec<f64> = (0..10).map(|index| index as f64).collect();
        let y = line(&x, 2.0, 0.0);

        let solution = minimize(
            |p| {
                Ok(line(&x, p[0], 0.0)
                    .iter()
                    .zip(&y)
                    .map(|(model, observed)| model - observed)
                    .collect())
            },
            &[ParameterSpec::bounded(0.5, 0.0, 1.5)],
            &SolverOptions::default(),
        )
        .expect("fit should stop at the bound");

        assert_eq!(solution.parameters[0], 1.5);
    }

    #[test]
    fn evaluation_errors_propagate_with_their_category() {
        let error = minimize(
            |_| Err(SmhError::fit("FIT.RADIATIVE_TRANSFER", "backend offline")),
            &[ParameterSpec::free(1.0)],
            &SolverOptions::default(),
        )
        .expect_err("evaluation failure should surface");

        let error = SmhError::from(error);
        assert_eq!(error.category(), SmhErrorCategory::Fit);
        assert_eq!(error.placeholder(), "FIT.RADIATIVE_TRANSFER");
    }

    #[test]
    fn underdetermined_problems_are_rejected() {
        let error = minimize(
            |p| Ok(vec![p[0] + p[1]]),
            &[ParameterSpec::free(1.0), ParameterSpec::free(2.0)],
            &SolverOptions::default(),
        )
        .expect_err("one residual cannot fit two parameters");

        assert_eq!(
            error,
            SolverError::Underdetermined {
                residuals: 1,
                parameters: 2
            }
        );
        assert_eq!(
            SmhError::from(error).category(),
            SmhErrorCategory::InsufficientData
        );
    }
}

//! Least-squares line fitting for I-V traces.
//!
//! The controller models a junction as ohmic over each sweep: `I = m·V + b`.
//! `fit_linear` returns the closed-form ordinary least-squares solution
//! together with the standard errors of both coefficients. The slope is the
//! junction conductance, so the resistance estimate is `1 / slope`.

use thiserror::Error;

/// Errors from [`fit_linear`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// Fewer than two samples were supplied. Callers must never sweep fewer
    /// than two points, so hitting this is a caller bug.
    #[error("linear fit requires at least 2 points, got {0}")]
    TooFewPoints(usize),

    /// Voltage and current slices differ in length.
    #[error("voltage and current lengths differ ({voltages} vs {currents})")]
    LengthMismatch {
        /// Number of voltage samples.
        voltages: usize,
        /// Number of current samples.
        currents: usize,
    },

    /// All voltages are identical, so the design matrix is singular and the
    /// slope is undefined. Callers must not derive a resistance from this.
    #[error("degenerate fit: all voltages are identical")]
    Degenerate,
}

/// Result of a linear fit `I = slope·V + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    /// Fitted slope in A/V (conductance).
    pub slope: f64,
    /// Fitted intercept in A.
    pub intercept: f64,
    /// Standard error of the slope.
    pub slope_err: f64,
    /// Standard error of the intercept.
    pub intercept_err: f64,
}

impl LinearFit {
    /// Resistance implied by the fitted slope, in ohms.
    ///
    /// Only meaningful for a fit over two or more distinct voltages; a
    /// negative value means the measured current fell with rising voltage.
    pub fn resistance(&self) -> f64 {
        1.0 / self.slope
    }
}

/// Fit a line `I = m·V + b` to equal-length voltage/current samples.
///
/// Standard errors come from the residual variance and the diagonal of the
/// coefficient covariance matrix. They are diagnostic only; control
/// decisions use the slope alone.
pub fn fit_linear(voltages: &[f64], currents: &[f64]) -> Result<LinearFit, FitError> {
    if voltages.len() != currents.len() {
        return Err(FitError::LengthMismatch {
            voltages: voltages.len(),
            currents: currents.len(),
        });
    }
    if voltages.len() < 2 {
        return Err(FitError::TooFewPoints(voltages.len()));
    }

    let n = voltages.len() as f64;
    let mean_v = voltages.iter().sum::<f64>() / n;
    let mean_i = currents.iter().sum::<f64>() / n;

    let mut s_vv = 0.0;
    let mut s_vi = 0.0;
    for (v, i) in voltages.iter().zip(currents) {
        let dv = v - mean_v;
        s_vv += dv * dv;
        s_vi += dv * (i - mean_i);
    }

    if s_vv.abs() < f64::EPSILON {
        return Err(FitError::Degenerate);
    }

    let slope = s_vi / s_vv;
    let intercept = mean_i - slope * mean_v;

    // Residual variance with n-2 degrees of freedom. A two-point fit passes
    // through both samples exactly, so its errors are zero by definition.
    let dof = voltages.len().saturating_sub(2);
    let residual_var = if dof == 0 {
        0.0
    } else {
        let ss_res: f64 = voltages
            .iter()
            .zip(currents)
            .map(|(v, i)| {
                let r = i - (slope * v + intercept);
                r * r
            })
            .sum();
        ss_res / dof as f64
    };

    let slope_err = (residual_var / s_vv).sqrt();
    let intercept_err = (residual_var * (1.0 / n + mean_v * mean_v / s_vv)).sqrt();

    Ok(LinearFit {
        slope,
        intercept,
        slope_err,
        intercept_err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(m: f64, b: f64, vs: &[f64]) -> Vec<f64> {
        vs.iter().map(|v| m * v + b).collect()
    }

    #[test]
    fn recovers_known_lines_exactly() {
        let vs: Vec<f64> = (0..10).map(|i| i as f64 * 0.1).collect();
        for (m, b) in [(2.0, 0.0), (0.5, -1.25), (-3.0, 4.0)] {
            let is = line(m, b, &vs);
            let fit = fit_linear(&vs, &is).unwrap();
            assert!((fit.slope - m).abs() < 1e-9, "slope for m={m}");
            assert!((fit.intercept - b).abs() < 1e-9, "intercept for b={b}");
            assert!(fit.slope_err < 1e-9);
            assert!(fit.intercept_err < 1e-9);
        }
    }

    #[test]
    fn two_points_give_exact_interpolant() {
        let fit = fit_linear(&[1.0, 3.0], &[2.0, 8.0]).unwrap();
        assert!((fit.slope - 3.0).abs() < 1e-12);
        assert!((fit.intercept + 1.0).abs() < 1e-12);
        assert_eq!(fit.slope_err, 0.0);
        assert_eq!(fit.intercept_err, 0.0);
    }

    #[test]
    fn resistance_is_inverse_slope() {
        let vs = [0.0, 0.1, 0.2, 0.3];
        let is: Vec<f64> = vs.iter().map(|v| v / 50.0).collect();
        let fit = fit_linear(&vs, &is).unwrap();
        assert!((fit.resistance() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn identical_voltages_are_degenerate() {
        let err = fit_linear(&[0.5, 0.5, 0.5], &[1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(err, FitError::Degenerate);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let err = fit_linear(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert_eq!(
            err,
            FitError::LengthMismatch {
                voltages: 2,
                currents: 1
            }
        );
    }

    #[test]
    fn rejects_single_point() {
        let err = fit_linear(&[1.0], &[1.0]).unwrap_err();
        assert_eq!(err, FitError::TooFewPoints(1));
    }

    #[test]
    fn noisy_fit_reports_nonzero_errors() {
        let vs: Vec<f64> = (0..20).map(|i| i as f64 * 0.05).collect();
        let is: Vec<f64> = vs
            .iter()
            .enumerate()
            .map(|(i, v)| 2.0 * v + if i % 2 == 0 { 1e-3 } else { -1e-3 })
            .collect();
        let fit = fit_linear(&vs, &is).unwrap();
        assert!((fit.slope - 2.0).abs() < 0.05);
        assert!(fit.slope_err > 0.0);
        assert!(fit.intercept_err > 0.0);
    }
}

use crate::minimize::{MinimizerError, f64::Vector};
use ndarray::prelude::*;
use std::fmt;

/// Tolerances for the x-change, f-change and gradient-norm tests.
///
/// `None` switches a criterion off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    pub x_tol: Option<f64>,
    pub f_tol: Option<f64>,
    pub g_tol: Option<f64>,
}

impl Tolerances {
    pub fn new(x_tol: Option<f64>, f_tol: Option<f64>, g_tol: Option<f64>) -> Self {
        Tolerances {
            x_tol,
            f_tol,
            g_tol,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.x_tol.is_some() || self.f_tol.is_some() || self.g_tol.is_some()
    }

    pub fn validate(&self) -> Result<(), MinimizerError> {
        for tol in [self.x_tol, self.f_tol, self.g_tol].into_iter().flatten() {
            if !(tol > 0.0 && tol.is_finite()) {
                return Err(MinimizerError::InvalidTolerance);
            }
        }
        Ok(())
    }
}

impl Default for Tolerances {
    fn default() -> Self {
        Tolerances {
            x_tol: None,
            f_tol: None,
            g_tol: Some(1e-8),
        }
    }
}

/// Outcome of one convergence assessment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Convergence {
    pub x_converged: bool,
    pub f_converged: bool,
    pub g_converged: bool,
    pub f_increased: bool,
    /// `‖x - x_prev‖∞`
    pub x_change: f64,
    /// `|f - f_prev|`
    pub f_change: f64,
    /// `‖g‖∞`
    pub g_residual: f64,
    pub tolerances: Tolerances,
}

impl Convergence {
    pub fn assess(
        x: &Array1<f64>,
        x_prev: &Array1<f64>,
        f: f64,
        f_prev: f64,
        g: &Array1<f64>,
        tolerances: &Tolerances,
    ) -> Self {
        let x_change = Vector::max_abs_diff(x, x_prev);
        let f_change = (f - f_prev).abs();
        let g_residual = Vector::max_abs(g);

        Convergence {
            x_converged: tolerances.x_tol.is_some_and(|tol| x_change <= tol),
            f_converged: tolerances.f_tol.is_some_and(|tol| f_change <= tol),
            g_converged: tolerances.g_tol.is_some_and(|tol| g_residual <= tol),
            f_increased: f > f_prev,
            x_change,
            f_change,
            g_residual,
            tolerances: *tolerances,
        }
    }

    /// Only the gradient test, before any step has been taken.
    pub fn initial(g: &Array1<f64>, tolerances: &Tolerances) -> Self {
        let g_residual = Vector::max_abs(g);
        Convergence {
            x_converged: false,
            f_converged: false,
            g_converged: tolerances.g_tol.is_some_and(|tol| g_residual <= tol),
            f_increased: false,
            x_change: f64::NAN,
            f_change: f64::NAN,
            g_residual,
            tolerances: *tolerances,
        }
    }

    /// Every configured criterion passes, and at least one is configured.
    pub fn converged(&self) -> bool {
        let t = &self.tolerances;
        t.is_configured()
            && (t.x_tol.is_none() || self.x_converged)
            && (t.f_tol.is_none() || self.f_converged)
            && (t.g_tol.is_none() || self.g_converged)
    }
}

impl Default for Convergence {
    fn default() -> Self {
        Convergence {
            x_converged: false,
            f_converged: false,
            g_converged: false,
            f_increased: false,
            x_change: f64::NAN,
            f_change: f64::NAN,
            g_residual: f64::NAN,
            tolerances: Tolerances::default(),
        }
    }
}

/// One entry of an optimization trace.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationState {
    pub iteration: usize,
    pub value: f64,
    pub g_norm: f64,
    pub x: Option<Array1<f64>>,
    pub g: Option<Array1<f64>>,
}

impl IterationState {
    pub fn new(
        iteration: usize,
        value: f64,
        x: &Array1<f64>,
        g: &Array1<f64>,
        extended: bool,
    ) -> Self {
        IterationState {
            iteration,
            value,
            g_norm: Vector::max_abs(g),
            x: extended.then(|| x.clone()),
            g: extended.then(|| g.clone()),
        }
    }
}

impl fmt::Display for IterationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>6}   {:>14.6e}   {:>14.6e}",
            self.iteration, self.value, self.g_norm
        )
    }
}

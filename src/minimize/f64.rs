pub mod barrier;
pub mod bounds;
pub mod conjugate_gradient;
pub mod convergence;
pub mod fminbox;
pub mod gradient_descent;
pub mod inner;
pub mod line_search;
pub mod nelder_mead;
pub mod newton;
pub mod objective;
pub mod precondition;
pub mod quasi_newton;

pub use self::barrier::{
    BarrierObjective, BarrierWeight, barrier_magnitudes, barrier_value, initial_barrier_weight,
};
pub use self::bounds::Bounds;
pub use self::conjugate_gradient::{ConjGrad, ConjGradMethod};
pub use self::convergence::{Convergence, IterationState, Tolerances};
pub use self::fminbox::{
    Fminbox, FminboxEvent, FminboxParams, FminboxResult, LogObserver, Observer,
};
pub use self::gradient_descent::GradientDescent;
pub use self::inner::{InnerHooks, InnerParams, InnerResult, InnerSolver, Preconditioning};
pub use self::nelder_mead::NelderMead;
pub use self::newton::Newton;
pub use self::objective::{MultiDimFn, MultiDimGradFn, MultiDimNumGradFn, ObjFn, ObjGradFn};
pub use self::precondition::{BarrierPreconditioner, Preconditioner};
pub use self::quasi_newton::{Bfgs, LBfgs};

use ndarray::prelude::*;

/// Dense vector helpers shared by the solvers
#[derive(Debug, Clone)]
pub(crate) struct Vector {}

impl Vector {
    pub(crate) fn dot_product(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
        a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
    }

    pub(crate) fn vector_norm(v: &Array1<f64>) -> f64 {
        v.iter().map(|&x| x * x).sum::<f64>().sqrt()
    }

    pub(crate) fn max_abs(v: &Array1<f64>) -> f64 {
        v.iter().fold(0.0, |acc: f64, &x| acc.max(x.abs()))
    }

    pub(crate) fn max_abs_diff(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
        a.iter()
            .zip(b.iter())
            .fold(0.0, |acc: f64, (&x, &y)| acc.max((x - y).abs()))
    }

    pub(crate) fn axpy(x: &Array1<f64>, alpha: f64, d: &Array1<f64>) -> Array1<f64> {
        x.iter().zip(d.iter()).map(|(&xi, &di)| xi + alpha * di).collect()
    }
}

/// Spacing between `|v|` and the next larger representable double.
///
/// `eps(1.0) == f64::EPSILON`, `eps(0.0)` is the smallest subnormal.
pub fn eps(v: f64) -> f64 {
    let a = v.abs();
    if !a.is_finite() {
        return f64::NAN;
    }
    f64::from_bits(a.to_bits() + 1) - a
}

/// Line search result for internal use
#[derive(Debug, Clone)]
pub(crate) struct LineSearchResult {
    pub(crate) alpha: f64,
    pub(crate) f_new: f64,
    /// Gradient at the accepted point when the search had to compute it
    pub(crate) g_new: Option<Array1<f64>>,
    pub(crate) fn_evals: usize,
    pub(crate) g_evals: usize,
    pub(crate) converged: bool,
}

/// Strong Wolfe conditions parameters
#[derive(Debug, Clone)]
pub struct WolfeParams {
    pub c1: f64, // Armijo condition parameter (typically 1e-4)
    pub c2: f64, // Curvature condition parameter (typically 0.9 for CG, 0.1 for quasi-Newton)
    pub max_step: f64,
    pub min_step: f64,
}

impl WolfeParams {
    pub fn conjugate_gradient() -> Self {
        Self {
            c2: 0.1,
            ..Self::default()
        }
    }
}

impl Default for WolfeParams {
    fn default() -> Self {
        Self {
            c1: 1e-4,
            c2: 0.9,
            max_step: 1e6,
            min_step: 1e-16,
        }
    }
}

#[cfg(test)]
mod minimize_f64_tests {
    use super::*;

    #[test]
    fn test_eps() {
        assert_eq!(eps(1.0), f64::EPSILON);
        assert_eq!(eps(-1.0), f64::EPSILON);
        assert_eq!(eps(2.0), 2.0 * f64::EPSILON);
        assert_eq!(eps(0.0), f64::from_bits(1));
        assert!(eps(f64::INFINITY).is_nan());
    }

    #[test]
    fn test_vector_helpers() {
        assert_eq!(Vector::dot_product(&array![1.0, 2.0], &array![3.0, 4.0]), 11.0);
        assert_eq!(Vector::vector_norm(&array![3.0, 4.0]), 5.0);
        assert_eq!(Vector::max_abs(&array![1.0, -7.0, 3.0]), 7.0);
        assert_eq!(Vector::max_abs_diff(&array![1.0, 2.0], &array![1.5, 0.0]), 2.0);
        assert_eq!(
            Vector::axpy(&array![1.0, 1.0], 2.0, &array![1.0, -1.0]),
            array![3.0, -1.0]
        );
    }
}

use crate::minimize::f64::{BarrierWeight, Bounds};
use ndarray::prelude::*;
use std::fmt;

/// Approximate inverse curvature used to scale search directions.
///
/// `update` is called by the inner solver before each direction computation.
pub trait Preconditioner {
    fn update(&mut self, x: &Array1<f64>);

    /// `P * g`
    fn apply(&self, g: &Array1<f64>) -> Array1<f64>;

    /// `a' P b`
    fn inner(&self, a: &Array1<f64>, b: &Array1<f64>) -> f64;

    /// Diagonal of `P`, used as the initial inverse Hessian by L-BFGS.
    fn diagonal(&self) -> Array1<f64>;
}

/// Inverse of the diagonal of (barrier Hessian + identity):
/// `P[i] = 1 / (mu * (1/(x-l)^2 + 1/(u-x)^2) + 1)`.
#[derive(Clone)]
pub struct BarrierPreconditioner {
    bounds: Bounds,
    mu: BarrierWeight,
    diag: Array1<f64>,
}

impl BarrierPreconditioner {
    pub fn new(bounds: Bounds, mu: BarrierWeight) -> Self {
        let diag = Array1::ones(bounds.len());
        BarrierPreconditioner { bounds, mu, diag }
    }
}

impl Preconditioner for BarrierPreconditioner {
    fn update(&mut self, x: &Array1<f64>) {
        let mu = self.mu.get();
        let (lower, upper) = (self.bounds.lower(), self.bounds.upper());

        for i in 0..x.len() {
            let mut curvature = 0.0;
            if lower[i].is_finite() {
                curvature += 1.0 / (x[i] - lower[i]).powi(2);
            }
            if upper[i].is_finite() {
                curvature += 1.0 / (upper[i] - x[i]).powi(2);
            }
            self.diag[i] = 1.0 / (mu * curvature + 1.0);
        }
    }

    fn apply(&self, g: &Array1<f64>) -> Array1<f64> {
        &self.diag * g
    }

    fn inner(&self, a: &Array1<f64>, b: &Array1<f64>) -> f64 {
        a.iter()
            .zip(b.iter())
            .zip(self.diag.iter())
            .map(|((&ai, &bi), &pi)| ai * pi * bi)
            .sum()
    }

    fn diagonal(&self) -> Array1<f64> {
        self.diag.clone()
    }
}

impl fmt::Debug for BarrierPreconditioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BarrierPreconditioner( mu: {}, diag: {})",
            self.mu.get(),
            self.diag
        )
    }
}

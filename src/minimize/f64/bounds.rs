use crate::minimize::{MinimizerError, f64::eps};
use ndarray::prelude::*;
use std::fmt;

/// Elementwise box `lower ≤ x ≤ upper`.
///
/// A non-finite entry means the dimension is unbounded on that side.
#[derive(Clone, PartialEq)]
pub struct Bounds {
    lower: Array1<f64>,
    upper: Array1<f64>,
}

impl Bounds {
    pub fn new(lower: Array1<f64>, upper: Array1<f64>) -> Result<Self, MinimizerError> {
        if lower.len() != upper.len() {
            return Err(MinimizerError::DimensionMismatch {
                expected: lower.len(),
                found: upper.len(),
            });
        }

        for (index, (&l, &u)) in lower.iter().zip(upper.iter()).enumerate() {
            if l.is_nan() || u.is_nan() || l > u {
                return Err(MinimizerError::InvalidBounds {
                    index,
                    lower: l,
                    upper: u,
                });
            }
        }

        Ok(Bounds { lower, upper })
    }

    /// No finite bound in any of the `n` dimensions.
    pub fn unbounded(n: usize) -> Self {
        Bounds {
            lower: Array1::from_elem(n, f64::NEG_INFINITY),
            upper: Array1::from_elem(n, f64::INFINITY),
        }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn lower(&self) -> &Array1<f64> {
        &self.lower
    }

    pub fn upper(&self) -> &Array1<f64> {
        &self.upper
    }

    pub fn has_finite_bound(&self) -> bool {
        self.lower.iter().any(|l| l.is_finite()) || self.upper.iter().any(|u| u.is_finite())
    }

    /// `l[i] < x[i] < u[i]` for every dimension.
    pub fn contains_strictly(&self, x: &Array1<f64>) -> bool {
        x.len() == self.len()
            && x
                .iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(&xi, (&l, &u))| l < xi && xi < u)
    }

    /// Move coordinates sitting exactly on a bound into the interior.
    ///
    /// `x[i] == l[i]` becomes `0.99 l[i] + 0.01 u[i]` and `x[i] == u[i]`
    /// becomes `0.01 l[i] + 0.99 u[i]`. Returns the indices that were moved.
    /// A coordinate outside `[l[i], u[i]]` is a caller error.
    pub fn shift_into_interior(&self, x: &mut Array1<f64>) -> Result<Vec<usize>, MinimizerError> {
        if x.len() != self.len() {
            return Err(MinimizerError::DimensionMismatch {
                expected: self.len(),
                found: x.len(),
            });
        }

        let mut repaired = Vec::new();
        for i in 0..x.len() {
            let (l, u) = (self.lower[i], self.upper[i]);
            if x[i] == l {
                x[i] = 0.99 * l + 0.01 * u;
                repaired.push(i);
            } else if x[i] == u {
                x[i] = 0.01 * l + 0.99 * u;
                repaired.push(i);
            } else if !(l < x[i] && x[i] < u) {
                return Err(MinimizerError::OutOfBounds {
                    index: i,
                    value: x[i],
                });
            }
        }

        Ok(repaired)
    }

    /// Largest step `alpha ≥ 0` with `x + alpha * d` strictly inside the box.
    ///
    /// Only dimensions with a finite bound in the direction of travel
    /// constrain the step; `f64::INFINITY` when none does.
    pub fn max_feasible_step(&self, x: &Array1<f64>, d: &Array1<f64>) -> f64 {
        let mut alpha = f64::INFINITY;

        for i in 0..x.len() {
            let (l, u) = (self.lower[i], self.upper[i]);
            if d[i] < 0.0 && l.is_finite() {
                alpha = alpha.min(((l - x[i]) + eps(l)) / d[i]);
            } else if d[i] > 0.0 && u.is_finite() {
                alpha = alpha.min(((u - x[i]) - eps(u)) / d[i]);
            }
        }

        if alpha.is_finite() {
            alpha -= eps(alpha.max(1.0));
        }

        alpha.max(0.0)
    }
}

impl fmt::Debug for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bounds( lower: {}, upper: {})", self.lower, self.upper)
    }
}

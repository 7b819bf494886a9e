use crate::minimize::f64::{Bounds, ObjFn, ObjGradFn};
use ndarray::prelude::*;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Log barrier of the box at `x`: `-Σ ln(x[i] - l[i]) - Σ ln(u[i] - x[i])`
/// over the finite bounds.
///
/// When `grad` is given it receives the barrier gradient. As soon as one
/// coordinate is on or beyond a finite bound the function returns
/// `f64::INFINITY` without visiting the remaining coordinates, so `grad` is
/// then only partially written and must not be read.
pub fn barrier_value(bounds: &Bounds, x: &Array1<f64>, mut grad: Option<&mut Array1<f64>>) -> f64 {
    let (lower, upper) = (bounds.lower(), bounds.upper());
    let mut value = 0.0;

    for i in 0..x.len() {
        if let Some(g) = grad.as_deref_mut() {
            g[i] = 0.0;
        }

        let l = lower[i];
        if l.is_finite() {
            let dx = x[i] - l;
            if dx <= 0.0 {
                return f64::INFINITY;
            }
            value -= dx.ln();
            if let Some(g) = grad.as_deref_mut() {
                g[i] = -1.0 / dx;
            }
        }

        let u = upper[i];
        if u.is_finite() {
            let dx = u - x[i];
            if dx <= 0.0 {
                return f64::INFINITY;
            }
            value -= dx.ln();
            if let Some(g) = grad.as_deref_mut() {
                g[i] += 1.0 / dx;
            }
        }
    }

    value
}

/// Per-dimension size of the barrier pull, `1/(x-l) + 1/(u-x)` over the
/// finite bounds.
///
/// Unlike the signed gradient this does not cancel at the centre of the box,
/// which is what the initial weight heuristic needs.
pub fn barrier_magnitudes(bounds: &Bounds, x: &Array1<f64>) -> Array1<f64> {
    let (lower, upper) = (bounds.lower(), bounds.upper());
    Array1::from_shape_fn(x.len(), |i| {
        let below = if lower[i].is_finite() {
            1.0 / (x[i] - lower[i])
        } else {
            0.0
        };
        let above = if upper[i].is_finite() {
            1.0 / (upper[i] - x[i])
        } else {
            0.0
        };
        below + above
    })
}

/// Initial barrier weight.
///
/// An explicit `mu0` wins. Otherwise the weight balances the two gradients,
/// `mu0factor * Σ|gfunc| / Σ|gbarrier|`, and is exactly zero when there is
/// no barrier at all.
pub fn initial_barrier_weight(
    gfunc: &Array1<f64>,
    gbarrier: &Array1<f64>,
    mu0factor: f64,
    mu0: Option<f64>,
) -> f64 {
    if let Some(mu) = mu0 {
        return mu;
    }

    let barrier_sum: f64 = gbarrier.iter().map(|g| g.abs()).sum();
    if barrier_sum > 0.0 {
        mu0factor * gfunc.iter().map(|g| g.abs()).sum::<f64>() / barrier_sum
    } else {
        0.0
    }
}

/// Shared handle to the barrier weight `mu`.
///
/// Clones share one cell, so every holder sees the value current at call
/// time. Only the outer controller changes it, between inner solves.
#[derive(Clone, Default)]
pub struct BarrierWeight(Rc<Cell<f64>>);

impl BarrierWeight {
    pub fn new(mu: f64) -> Self {
        BarrierWeight(Rc::new(Cell::new(mu)))
    }

    pub fn get(&self) -> f64 {
        self.0.get()
    }

    pub fn set(&self, mu: f64) {
        self.0.set(mu);
    }

    /// `mu <- mu * factor`
    pub(crate) fn scale(&self, factor: f64) {
        self.0.set(self.0.get() * factor);
    }
}

impl fmt::Debug for BarrierWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BarrierWeight({})", self.get())
    }
}

/// `f(x) + mu * B(x)`, the function handed to the inner solver.
///
/// The barrier is evaluated first; outside the box the value is
/// `f64::INFINITY` and `f` is never called.
#[derive(Clone)]
pub struct BarrierObjective {
    f: Box<dyn ObjGradFn>,
    bounds: Bounds,
    mu: BarrierWeight,
}

impl BarrierObjective {
    pub fn new<F>(f: F, bounds: Bounds, mu: BarrierWeight) -> Self
    where
        F: ObjGradFn + Clone + 'static,
    {
        BarrierObjective {
            f: Box::new(f),
            bounds,
            mu,
        }
    }

    pub fn new_boxed(f: Box<dyn ObjGradFn>, bounds: Bounds, mu: BarrierWeight) -> Self {
        BarrierObjective { f, bounds, mu }
    }

    pub fn weight(&self) -> &BarrierWeight {
        &self.mu
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn objective(&self) -> &dyn ObjGradFn {
        &*self.f
    }
}

impl ObjFn for BarrierObjective {
    fn call(&self, x: &Array1<f64>) -> f64 {
        let barrier = barrier_value(&self.bounds, x, None);
        if !barrier.is_finite() {
            return f64::INFINITY;
        }
        self.f.call(x) + self.mu.get() * barrier
    }
}

impl ObjGradFn for BarrierObjective {
    fn grad(&self, x: &Array1<f64>) -> Array1<f64> {
        self.value_grad(x).1
    }

    fn value_grad(&self, x: &Array1<f64>) -> (f64, Array1<f64>) {
        let mut gbarrier = Array1::zeros(x.len());
        let barrier = barrier_value(&self.bounds, x, Some(&mut gbarrier));
        if !barrier.is_finite() {
            return (f64::INFINITY, gbarrier);
        }

        let mu = self.mu.get();
        let (value, mut grad) = self.f.value_grad(x);
        grad.scaled_add(mu, &gbarrier);
        (value + mu * barrier, grad)
    }
}

impl fmt::Debug for BarrierObjective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BarrierObjective( bounds: {:?}, mu: {})",
            self.bounds,
            self.mu.get()
        )
    }
}

#[cfg(test)]
mod minimize_f64_barrier_tests {
    use super::*;
    use crate::minimize::f64::MultiDimGradFn;
    use float_cmp::approx_eq;
    use std::cell::RefCell;

    fn unit_box(n: usize) -> Bounds {
        Bounds::new(Array1::zeros(n), Array1::ones(n)).unwrap()
    }

    #[test]
    fn test_barrier_value_interior() {
        let bounds = Bounds::new(array![0.0, -1.0], array![2.0, f64::INFINITY]).unwrap();
        let x = array![0.5, 1.0];
        let mut g = Array1::zeros(2);

        let value = barrier_value(&bounds, &x, Some(&mut g));

        let expected = -(0.5f64.ln()) - (1.5f64.ln()) - (2.0f64.ln());
        assert!(approx_eq!(f64, value, expected, ulps = 4));
        assert!(approx_eq!(f64, g[0], -1.0 / 0.5 + 1.0 / 1.5, ulps = 4));
        assert!(approx_eq!(f64, g[1], -0.5, ulps = 4));
    }

    #[test]
    fn test_barrier_value_no_finite_bounds() {
        let bounds = Bounds::unbounded(2);
        let mut g = array![7.0, 7.0];
        assert_eq!(barrier_value(&bounds, &array![3.0, -4.0], Some(&mut g)), 0.0);
        assert_eq!(g, array![0.0, 0.0]);
    }

    #[test]
    fn test_barrier_value_on_or_beyond_bound() {
        let bounds = unit_box(2);
        assert_eq!(barrier_value(&bounds, &array![0.0, 0.5], None), f64::INFINITY);
        assert_eq!(barrier_value(&bounds, &array![0.5, 1.0], None), f64::INFINITY);
        assert_eq!(barrier_value(&bounds, &array![0.5, 1.5], None), f64::INFINITY);
        assert_eq!(barrier_value(&bounds, &array![-3.0, 0.5], None), f64::INFINITY);
        assert!(barrier_value(&bounds, &array![1e-300, 0.5], None).is_finite());
    }

    #[test]
    fn test_barrier_gradient_left_partial() {
        let bounds = unit_box(3);
        let mut g = array![9.0, 9.0, 9.0];

        let value = barrier_value(&bounds, &array![0.5, 1.0, 0.5], Some(&mut g));

        assert_eq!(value, f64::INFINITY);
        assert_eq!(g[0], 0.0);
        // evaluation stopped at index 1, index 2 was never touched
        assert_eq!(g[2], 9.0);
    }

    #[test]
    fn test_barrier_magnitudes_centre() {
        let bounds = unit_box(2);
        let x = array![0.5, 0.5];
        let mut g = Array1::zeros(2);
        barrier_value(&bounds, &x, Some(&mut g));

        assert_eq!(g, array![0.0, 0.0]);
        assert_eq!(barrier_magnitudes(&bounds, &x), array![4.0, 4.0]);
    }

    #[test]
    fn test_initial_barrier_weight() {
        let gfunc = array![-3.0, 3.0];
        let gbarrier = array![4.0, 4.0];

        assert!(approx_eq!(
            f64,
            initial_barrier_weight(&gfunc, &gbarrier, 0.001, None),
            0.00075,
            epsilon = 1e-15
        ));
        assert_eq!(initial_barrier_weight(&gfunc, &gbarrier, 0.001, Some(2.5)), 2.5);
    }

    #[test]
    fn test_initial_barrier_weight_without_barrier() {
        let gfunc = array![1.0, -2.0];
        let gbarrier = barrier_magnitudes(&Bounds::unbounded(2), &array![0.3, 0.7]);

        assert_eq!(initial_barrier_weight(&gfunc, &gbarrier, 0.001, None), 0.0);
    }

    #[test]
    fn test_barrier_weight_is_shared() {
        let mu = BarrierWeight::new(1.0);
        let reader = mu.clone();

        mu.scale(0.1);
        assert_eq!(reader.get(), 0.1);
        mu.set(0.5);
        assert_eq!(reader.get(), 0.5);
    }

    #[test]
    fn test_barrier_objective_combines() {
        let f = MultiDimGradFn::new(
            |x: &Array1<f64>| x[0] * x[0],
            |x: &Array1<f64>| array![2.0 * x[0]],
        );
        let bounds = unit_box(1);
        let mu = BarrierWeight::new(0.5);
        let obj = BarrierObjective::new(f, bounds.clone(), mu.clone());
        let x = array![0.25];

        let mut gb = Array1::zeros(1);
        let b = barrier_value(&bounds, &x, Some(&mut gb));
        let (value, grad) = obj.value_grad(&x);

        assert!(approx_eq!(f64, value, 0.0625 + 0.5 * b, ulps = 4));
        assert!(approx_eq!(f64, grad[0], 0.5 + 0.5 * gb[0], ulps = 4));
        assert!(approx_eq!(f64, obj.call(&x), value, ulps = 4));

        // weight changes are visible without rebuilding the objective
        mu.set(0.0);
        assert!(approx_eq!(f64, obj.call(&x), 0.0625, ulps = 4));
    }

    #[test]
    fn test_barrier_objective_skips_user_function_outside() {
        let calls = Rc::new(RefCell::new(0usize));
        let counter = calls.clone();
        let f = MultiDimGradFn::new(
            move |x: &Array1<f64>| {
                *counter.borrow_mut() += 1;
                x[0]
            },
            |_x: &Array1<f64>| array![1.0],
        );
        let obj = BarrierObjective::new(f, unit_box(1), BarrierWeight::new(1.0));

        assert_eq!(obj.call(&array![1.5]), f64::INFINITY);
        assert_eq!(obj.value_grad(&array![-0.5]).0, f64::INFINITY);
        assert_eq!(*calls.borrow(), 0);

        assert!(obj.call(&array![0.5]).is_finite());
        assert_eq!(*calls.borrow(), 1);
    }
}

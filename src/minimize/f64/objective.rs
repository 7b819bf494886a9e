use dyn_clone::DynClone;
use ndarray::prelude::*;

// Define a trait for the objective function
pub trait ObjFn: DynClone {
    fn call(&self, x: &Array1<f64>) -> f64;
}
dyn_clone::clone_trait_object!(ObjFn);

// Define a trait for the gradient function
pub trait ObjGradFn: ObjFn + DynClone {
    fn grad(&self, x: &Array1<f64>) -> Array1<f64>;

    /// Value and gradient at the same point.
    ///
    /// Implementors that can share work between the two, or skip the
    /// gradient when the value is already known to be unusable, override this.
    fn value_grad(&self, x: &Array1<f64>) -> (f64, Array1<f64>) {
        (self.call(x), self.grad(x))
    }
}
dyn_clone::clone_trait_object!(ObjGradFn);

// Wrapper for multi-dimensional functions
#[derive(Clone)]
pub struct MultiDimFn<F>(pub F)
where
    F: Fn(&Array1<f64>) -> f64 + Clone;

// Convenience constructors
impl<F> MultiDimFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    pub fn new(f: F) -> Self {
        MultiDimFn(f)
    }
}

impl<F> ObjFn for MultiDimFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    fn call(&self, x: &Array1<f64>) -> f64 {
        (self.0)(x)
    }
}

// Wrapper for multi-dimensional function w/gradient
#[derive(Clone)]
pub struct MultiDimGradFn<F, GF>(pub F, pub GF)
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone;

// Convenience constructors
impl<F, GF> MultiDimGradFn<F, GF>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone,
{
    pub fn new(f: F, gf: GF) -> Self {
        MultiDimGradFn(f, gf)
    }
}

impl<F, GF> ObjFn for MultiDimGradFn<F, GF>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone,
{
    fn call(&self, x: &Array1<f64>) -> f64 {
        (self.0)(x)
    }
}

impl<F, GF> ObjGradFn for MultiDimGradFn<F, GF>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone,
{
    fn grad(&self, x: &Array1<f64>) -> Array1<f64> {
        (self.1)(x)
    }
}

// Wrapper for multi-dimensional function w/numerical gradient
#[derive(Clone)]
pub struct MultiDimNumGradFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    f: F,
    step: f64,
}

// Convenience constructors
impl<F> MultiDimNumGradFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    pub fn new(f: F, step: Option<f64>) -> Self {
        Self {
            f,
            step: step.unwrap_or(1e-7),
        }
    }

    /// Central differences with a step scaled to each coordinate.
    ///
    /// Near a box edge the barrier can make one side infinite; that
    /// coordinate then falls back to the one-sided difference on the finite side.
    pub fn numerical_gradient(&self, x: &Array1<f64>) -> Array1<f64> {
        let n = x.len();
        let mut grad = Array1::zeros(n);
        let mut shifted = x.clone();
        let f0 = (self.f)(x);

        for i in 0..n {
            let h = self.step * x[i].abs().max(1.0);

            shifted[i] = x[i] + h;
            let f_plus = (self.f)(&shifted);
            shifted[i] = x[i] - h;
            let f_minus = (self.f)(&shifted);
            shifted[i] = x[i];

            grad[i] = match (f_plus.is_finite(), f_minus.is_finite()) {
                (true, true) => (f_plus - f_minus) / (2.0 * h),
                (true, false) => (f_plus - f0) / h,
                (false, true) => (f0 - f_minus) / h,
                (false, false) => f64::NAN,
            };
        }

        grad
    }
}

impl<F> ObjFn for MultiDimNumGradFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    fn call(&self, x: &Array1<f64>) -> f64 {
        (self.f)(x)
    }
}

impl<F> ObjGradFn for MultiDimNumGradFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    fn grad(&self, x: &Array1<f64>) -> Array1<f64> {
        self.numerical_gradient(x)
    }
}

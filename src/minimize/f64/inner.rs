use crate::minimize::{
    MinimizerError,
    f64::{Bounds, Convergence, IterationState, ObjGradFn, Preconditioner, Tolerances, Vector},
};
use dyn_clone::DynClone;
use ndarray::prelude::*;
use std::fmt;

/// How an inner solver relates to the barrier preconditioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preconditioning {
    /// Scales its search directions with the preconditioner.
    Supported,
    /// Runs on the combined objective and never asks for conditioning
    /// (derivative-free methods, dense BFGS).
    Ignored,
    /// Second-order methods; cannot run on the barrier objective.
    Rejected,
}

impl fmt::Display for Preconditioning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Preconditioning::Supported => write!(f, "supported"),
            Preconditioning::Ignored => write!(f, "ignored"),
            Preconditioning::Rejected => write!(f, "rejected"),
        }
    }
}

/// Parameters of one inner solve
#[derive(Debug, Clone, PartialEq)]
pub struct InnerParams {
    pub iterations: usize,
    pub tolerances: Tolerances,
    pub store_trace: bool,
    pub extended_trace: bool,
}

impl InnerParams {
    pub fn new(
        iterations: Option<usize>,
        x_tol: Option<f64>,
        f_tol: Option<f64>,
        g_tol: Option<f64>,
    ) -> Self {
        InnerParams {
            iterations: iterations.unwrap_or(1000),
            tolerances: Tolerances::new(x_tol, f_tol, g_tol),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), MinimizerError> {
        self.tolerances.validate()
    }
}

impl Default for InnerParams {
    fn default() -> Self {
        InnerParams {
            iterations: 1000,
            tolerances: Tolerances::default(),
            store_trace: false,
            extended_trace: false,
        }
    }
}

/// Optional collaborators an inner solve can use.
#[derive(Default)]
pub struct InnerHooks<'a> {
    pub preconditioner: Option<&'a mut dyn Preconditioner>,
    pub bounds: Option<&'a Bounds>,
}

impl<'a> InnerHooks<'a> {
    pub fn none() -> Self {
        InnerHooks {
            preconditioner: None,
            bounds: None,
        }
    }

    pub fn new(
        preconditioner: Option<&'a mut dyn Preconditioner>,
        bounds: Option<&'a Bounds>,
    ) -> Self {
        InnerHooks {
            preconditioner,
            bounds,
        }
    }

    /// Longest step along `d` that keeps `x` strictly inside the bounds.
    pub fn max_step(&self, x: &Array1<f64>, d: &Array1<f64>) -> f64 {
        match self.bounds {
            Some(bounds) => bounds.max_feasible_step(x, d),
            None => f64::INFINITY,
        }
    }

    /// Refresh the preconditioner at `x` and return `P g`, or `g` itself
    /// without one.
    pub fn precondition(&mut self, x: &Array1<f64>, g: &Array1<f64>) -> Array1<f64> {
        match self.preconditioner.as_deref_mut() {
            Some(p) => {
                p.update(x);
                p.apply(g)
            }
            None => g.clone(),
        }
    }

    /// `a' P b`, or the plain dot product without a preconditioner.
    pub fn inner(&self, a: &Array1<f64>, b: &Array1<f64>) -> f64 {
        match self.preconditioner.as_deref() {
            Some(p) => p.inner(a, b),
            None => Vector::dot_product(a, b),
        }
    }

    /// Diagonal initial inverse Hessian, if a preconditioner is attached.
    pub fn diagonal(&self) -> Option<Array1<f64>> {
        self.preconditioner.as_deref().map(|p| p.diagonal())
    }
}

/// Result of one inner solve
#[derive(Debug, Clone)]
pub struct InnerResult {
    pub method: String,
    pub xmin: Array1<f64>,
    pub fmin: f64,
    pub iters: usize,
    pub fn_evals: usize,
    pub g_evals: usize,
    pub h_evals: usize,
    pub converged: bool,
    pub convergence: Convergence,
    pub trace: Vec<IterationState>,
}

/// Unconstrained minimizer used for the barrier subproblems.
pub trait InnerSolver: DynClone {
    fn name(&self) -> String;

    fn preconditioning(&self) -> Preconditioning;

    fn solve(
        &mut self,
        f: &dyn ObjGradFn,
        x0: &Array1<f64>,
        params: &InnerParams,
        hooks: InnerHooks<'_>,
    ) -> Result<InnerResult, MinimizerError>;

    /// Unconstrained solve with default parameters.
    fn minimize(
        &mut self,
        f: &dyn ObjGradFn,
        x0: &Array1<f64>,
    ) -> Result<InnerResult, MinimizerError> {
        self.solve(f, x0, &InnerParams::default(), InnerHooks::none())
    }
}
dyn_clone::clone_trait_object!(InnerSolver);

/// Common start of every inner solve: validate and evaluate at `x0`.
pub(crate) fn start(
    f: &dyn ObjGradFn,
    x0: &Array1<f64>,
    params: &InnerParams,
) -> Result<(f64, Array1<f64>), MinimizerError> {
    if x0.is_empty() {
        return Err(MinimizerError::InvalidDimension);
    }
    params.validate()?;

    let (value, grad) = f.value_grad(x0);
    if !value.is_finite() {
        return Err(MinimizerError::FunctionEvaluationError);
    }
    if grad.len() != x0.len() {
        return Err(MinimizerError::GradientEvaluationError);
    }
    Ok((value, grad))
}

/// Iterate, counters and trace of a running inner solve.
pub(crate) struct Progress {
    pub(crate) x: Array1<f64>,
    pub(crate) fx: f64,
    pub(crate) g: Array1<f64>,
    pub(crate) iters: usize,
    pub(crate) fn_evals: usize,
    pub(crate) g_evals: usize,
    pub(crate) h_evals: usize,
    pub(crate) convergence: Convergence,
    trace: Vec<IterationState>,
    store_trace: bool,
    extended_trace: bool,
}

impl Progress {
    pub(crate) fn new(x0: &Array1<f64>, fx: f64, g: Array1<f64>, params: &InnerParams) -> Self {
        let mut trace = Vec::new();
        if params.store_trace {
            trace.push(IterationState::new(0, fx, x0, &g, params.extended_trace));
        }
        Progress {
            x: x0.clone(),
            fx,
            convergence: Convergence::initial(&g, &params.tolerances),
            g,
            iters: 0,
            fn_evals: 1,
            g_evals: 1,
            h_evals: 0,
            trace,
            store_trace: params.store_trace,
            extended_trace: params.extended_trace,
        }
    }

    pub(crate) fn keep_going(&self, params: &InnerParams) -> bool {
        self.iters < params.iterations && !self.convergence.converged()
    }

    /// Accept `x_new` as the next iterate.
    pub(crate) fn advance(
        &mut self,
        x_new: Array1<f64>,
        f_new: f64,
        g_new: Array1<f64>,
        tolerances: &Tolerances,
    ) {
        self.iters += 1;
        self.convergence = Convergence::assess(&x_new, &self.x, f_new, self.fx, &g_new, tolerances);
        if self.store_trace {
            self.trace.push(IterationState::new(
                self.iters,
                f_new,
                &x_new,
                &g_new,
                self.extended_trace,
            ));
        }
        self.x = x_new;
        self.fx = f_new;
        self.g = g_new;
    }

    pub(crate) fn finish(self, method: String) -> InnerResult {
        InnerResult {
            method,
            xmin: self.x,
            fmin: self.fx,
            iters: self.iters,
            fn_evals: self.fn_evals,
            g_evals: self.g_evals,
            h_evals: self.h_evals,
            converged: self.convergence.converged(),
            convergence: self.convergence,
            trace: self.trace,
        }
    }
}

#[cfg(test)]
mod minimize_f64_inner_tests {
    use super::*;
    use crate::minimize::f64::{BarrierPreconditioner, BarrierWeight, MultiDimGradFn};

    #[test]
    fn test_hooks_without_collaborators() {
        let mut hooks = InnerHooks::none();
        let x = array![0.5];
        let g = array![2.0];

        assert_eq!(hooks.max_step(&x, &array![-1.0]), f64::INFINITY);
        assert_eq!(hooks.precondition(&x, &g), g);
        assert!(hooks.diagonal().is_none());
    }

    #[test]
    fn test_hooks_with_collaborators() {
        let bounds = Bounds::new(array![0.0], array![1.0]).unwrap();
        let mut p = BarrierPreconditioner::new(bounds.clone(), BarrierWeight::new(1.0));
        let mut hooks = InnerHooks::new(Some(&mut p), Some(&bounds));
        let x = array![0.5];

        assert!(hooks.max_step(&x, &array![-1.0]) < 0.5);
        let scaled = hooks.precondition(&x, &array![9.0]);
        assert!((scaled[0] - 1.0).abs() < 1e-12);
        assert!(hooks.diagonal().is_some());
    }

    #[test]
    fn test_progress_bookkeeping() {
        let params = InnerParams {
            store_trace: true,
            ..InnerParams::new(Some(5), Some(1e-3), None, None)
        };
        let mut progress = Progress::new(&array![1.0], 1.0, array![2.0], &params);
        assert!(progress.keep_going(&params));

        progress.advance(array![0.9995], 0.999, array![1.999], &params.tolerances);
        assert!(!progress.keep_going(&params));

        let result = progress.finish("test".to_string());
        assert!(result.converged);
        assert_eq!(result.iters, 1);
        assert_eq!(result.trace.len(), 2);
        assert_eq!(result.xmin, array![0.9995]);
    }

    #[test]
    fn test_start_rejects_bad_input() {
        let f = MultiDimGradFn::new(
            |x: &Array1<f64>| if x[0] > 0.0 { x[0] } else { f64::INFINITY },
            |_x: &Array1<f64>| array![1.0],
        );
        let params = InnerParams::default();

        assert_eq!(
            start(&f, &array![], &params).unwrap_err(),
            MinimizerError::InvalidDimension
        );
        assert_eq!(
            start(&f, &array![-1.0], &params).unwrap_err(),
            MinimizerError::FunctionEvaluationError
        );
        let bad = InnerParams::new(None, Some(-1.0), None, None);
        assert_eq!(
            start(&f, &array![1.0], &bad).unwrap_err(),
            MinimizerError::InvalidTolerance
        );
    }
}

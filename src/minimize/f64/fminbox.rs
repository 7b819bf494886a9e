use crate::minimize::{
    MinimizerError,
    f64::{
        BarrierObjective, BarrierPreconditioner, BarrierWeight, Bounds, Convergence, InnerHooks,
        InnerParams, InnerResult, InnerSolver, IterationState, ObjFn, ObjGradFn, Preconditioning,
        Tolerances, Vector, barrier_magnitudes, barrier_value, initial_barrier_weight,
    },
};
use dyn_clone::DynClone;
use ndarray::prelude::*;
use std::fmt;

/// Parameters of a box-constrained minimization
#[derive(Debug, Clone, PartialEq)]
pub struct FminboxParams {
    pub outer_iterations: usize,
    /// `None` switches the criterion off
    pub outer_x_tol: Option<f64>,
    pub outer_f_tol: Option<f64>,
    pub outer_g_tol: Option<f64>,
    pub allow_outer_f_increases: bool,
    /// Explicit initial barrier weight, bypassing the gradient balance
    pub mu0: Option<f64>,
    pub mu0factor: f64,
    /// Barrier weight decay per outer iteration, in (0, 1)
    pub mufactor: f64,
    /// Report every outer iteration to the observer
    pub show_trace: bool,
    pub store_trace: bool,
    pub extended_trace: bool,
    pub inner: InnerParams,
}

impl FminboxParams {
    /// Outer iteration budget and tolerances; a `None` tolerance is off.
    pub fn new(
        outer_iterations: Option<usize>,
        outer_x_tol: Option<f64>,
        outer_f_tol: Option<f64>,
        outer_g_tol: Option<f64>,
    ) -> Self {
        FminboxParams {
            outer_iterations: outer_iterations.unwrap_or(1000),
            outer_x_tol,
            outer_f_tol,
            outer_g_tol,
            ..Self::default()
        }
    }

    pub fn outer_tolerances(&self) -> Tolerances {
        Tolerances::new(self.outer_x_tol, self.outer_f_tol, self.outer_g_tol)
    }

    pub fn validate(&self) -> Result<(), MinimizerError> {
        self.outer_tolerances().validate()?;
        self.inner.validate()?;

        if !(self.mufactor > 0.0 && self.mufactor < 1.0) {
            return Err(MinimizerError::InvalidParameters(format!(
                "mufactor must lie in (0, 1), got {}",
                self.mufactor
            )));
        }
        if !(self.mu0factor > 0.0 && self.mu0factor.is_finite()) {
            return Err(MinimizerError::InvalidParameters(format!(
                "mu0factor must be positive and finite, got {}",
                self.mu0factor
            )));
        }
        if let Some(mu0) = self.mu0 {
            if !(mu0 >= 0.0 && mu0.is_finite()) {
                return Err(MinimizerError::InvalidParameters(format!(
                    "mu0 must be non-negative and finite, got {}",
                    mu0
                )));
            }
        }
        Ok(())
    }
}

impl Default for FminboxParams {
    fn default() -> Self {
        FminboxParams {
            outer_iterations: 1000,
            outer_x_tol: Some(1e-8),
            outer_f_tol: None,
            outer_g_tol: None,
            allow_outer_f_increases: false,
            mu0: None,
            mu0factor: 0.001,
            mufactor: 0.001,
            show_trace: false,
            store_trace: false,
            extended_trace: false,
            inner: InnerParams::default(),
        }
    }
}

/// Diagnostics emitted while minimizing
#[derive(Debug, Clone, PartialEq)]
pub enum FminboxEvent<'a> {
    /// Starting coordinates on a bound were moved into the interior
    StartRepaired { indices: &'a [usize] },
    InitialWeight { mu: f64 },
    /// Only emitted with `show_trace`
    OuterIteration {
        iteration: usize,
        mu: f64,
        minimum: f64,
        x: &'a Array1<f64>,
        g_norm: f64,
    },
    /// The combined minimum rose over an outer iteration; the run stops
    ObjectiveIncreased {
        iteration: usize,
        previous: f64,
        current: f64,
    },
    /// The inner solver returned a point outside the open box; the run stops
    LeftInterior {
        iteration: usize,
        x: &'a Array1<f64>,
    },
}

/// Receives the diagnostics of a run.
pub trait Observer: DynClone {
    fn notify(&mut self, event: &FminboxEvent<'_>);
}
dyn_clone::clone_trait_object!(Observer);

/// Forwards diagnostics to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn notify(&mut self, event: &FminboxEvent<'_>) {
        match event {
            FminboxEvent::StartRepaired { indices } => log::warn!(
                "initial point lies on the boundary, moved elements {:?} into the interior",
                indices
            ),
            FminboxEvent::InitialWeight { mu } => log::debug!("initial barrier weight {:e}", mu),
            FminboxEvent::OuterIteration {
                iteration,
                mu,
                minimum,
                x,
                g_norm,
            } => {
                log::info!(
                    "fminbox iteration {:>4}   mu {:>12.4e}   minimum {:>14.6e}   |g| {:>12.4e}",
                    iteration,
                    mu,
                    minimum,
                    g_norm
                );
                log::debug!("fminbox iteration {} x = {}", iteration, x);
            }
            FminboxEvent::ObjectiveIncreased {
                iteration,
                previous,
                current,
            } => log::warn!(
                "f(x) increased from {} to {} in outer iteration {}, stopping",
                previous,
                current,
                iteration
            ),
            FminboxEvent::LeftInterior { iteration, x } => log::warn!(
                "inner solver left the interior in outer iteration {} at {}, stopping",
                iteration,
                x
            ),
        }
    }
}

/// Result of a box-constrained minimization
#[derive(Debug, Clone)]
pub struct FminboxResult {
    pub method: String,
    pub initial_x: Array1<f64>,
    pub xmin: Array1<f64>,
    /// User objective at `xmin`, without the barrier
    pub fmin: f64,
    pub outer_iters: usize,
    /// Inner iterations over all outer iterations
    pub iters: usize,
    pub converged: bool,
    /// Last outer convergence assessment
    pub outer: Convergence,
    /// Convergence of the latest inner solve
    pub inner: Convergence,
    pub f_increased: bool,
    /// The run stopped on an inner minimizer outside the open box
    pub left_interior: bool,
    pub fn_evals: usize,
    pub g_evals: usize,
    pub h_evals: usize,
    pub trace: Vec<IterationState>,
    pub mu0: f64,
    pub final_mu: f64,
    /// Coordinates of the starting point moved off a bound
    pub repaired: Vec<usize>,
}

impl FminboxResult {
    fn new(method: String, initial_x: Array1<f64>, x: Array1<f64>, mu0: f64) -> Self {
        FminboxResult {
            method,
            initial_x,
            xmin: x,
            fmin: f64::NAN,
            outer_iters: 0,
            iters: 0,
            converged: false,
            outer: Convergence::default(),
            inner: Convergence::default(),
            f_increased: false,
            left_interior: false,
            fn_evals: 0,
            g_evals: 0,
            h_evals: 0,
            trace: Vec::new(),
            mu0,
            final_mu: mu0,
            repaired: Vec::new(),
        }
    }

    /// Fold one inner solve into the running result.
    ///
    /// Traces are concatenated and counters summed; the inner minimizer and
    /// convergence replace the previous ones.
    pub fn merge(&mut self, inner: InnerResult) {
        self.trace.extend(inner.trace);
        self.iters += inner.iters;
        self.fn_evals += inner.fn_evals;
        self.g_evals += inner.g_evals;
        self.h_evals += inner.h_evals;
        self.xmin = inner.xmin;
        self.inner = inner.convergence;
    }
}

impl fmt::Display for FminboxResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Results of {}", self.method)?;
        writeln!(f, "  initial x:        {}", self.initial_x)?;
        writeln!(f, "  minimizer:        {}", self.xmin)?;
        writeln!(f, "  minimum:          {:e}", self.fmin)?;
        writeln!(f, "  outer iterations: {}", self.outer_iters)?;
        writeln!(f, "  inner iterations: {}", self.iters)?;
        writeln!(f, "  converged:        {}", self.converged)?;
        writeln!(f, "  f increased:      {}", self.f_increased)?;
        write!(
            f,
            "  calls (f, g, h):  {}, {}, {}",
            self.fn_evals, self.g_evals, self.h_evals
        )
    }
}

/// Box-constrained minimizer: log barrier around an unconstrained inner
/// solver.
///
/// Each outer iteration minimizes `f + mu * B` from the current point, then
/// multiplies `mu` by `mufactor`. Iterates stay strictly inside the box.
#[derive(Clone)]
pub struct Fminbox {
    f: Box<dyn ObjGradFn>,
    bounds: Bounds,
    solver: Box<dyn InnerSolver>,
    observer: Box<dyn Observer>,
}

impl Fminbox {
    pub fn new<F, S>(f: F, bounds: Bounds, solver: S) -> Result<Self, MinimizerError>
    where
        F: ObjGradFn + Clone + 'static,
        S: InnerSolver + Clone + 'static,
    {
        Self::new_boxed(Box::new(f), bounds, Box::new(solver))
    }

    /// Fails with `UnsupportedMethod` for solvers that reject the barrier
    /// preconditioning.
    pub fn new_boxed(
        f: Box<dyn ObjGradFn>,
        bounds: Bounds,
        solver: Box<dyn InnerSolver>,
    ) -> Result<Self, MinimizerError> {
        if solver.preconditioning() == Preconditioning::Rejected {
            return Err(MinimizerError::UnsupportedMethod(solver.name()));
        }
        if bounds.is_empty() {
            return Err(MinimizerError::InvalidDimension);
        }

        Ok(Fminbox {
            f,
            bounds,
            solver,
            observer: Box::new(LogObserver),
        })
    }

    pub fn with_observer<O>(mut self, observer: O) -> Self
    where
        O: Observer + Clone + 'static,
    {
        self.observer = Box::new(observer);
        self
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn solver_name(&self) -> String {
        self.solver.name()
    }

    /// `∇f(x) + mu * ∇B(x)`, or `None` when `x` is not strictly inside the
    /// box and the barrier gradient is undefined.
    fn combined_gradient(&self, x: &Array1<f64>, mu: f64) -> Option<Array1<f64>> {
        let mut gbarrier = Array1::zeros(x.len());
        if !barrier_value(&self.bounds, x, Some(&mut gbarrier)).is_finite() {
            return None;
        }
        let mut g = self.f.grad(x);
        g.scaled_add(mu, &gbarrier);
        Some(g)
    }

    pub fn minimize(
        &mut self,
        x0: Array1<f64>,
        params: Option<FminboxParams>,
    ) -> Result<FminboxResult, MinimizerError> {
        let params = params.unwrap_or_default();
        params.validate()?;

        let n = self.bounds.len();
        if x0.len() != n {
            return Err(MinimizerError::DimensionMismatch {
                expected: n,
                found: x0.len(),
            });
        }

        // Init
        let mut x = x0.clone();
        let repaired = self.bounds.shift_into_interior(&mut x)?;
        if !repaired.is_empty() {
            self.observer
                .notify(&FminboxEvent::StartRepaired { indices: &repaired });
        }
        if !barrier_value(&self.bounds, &x, None).is_finite() {
            return Err(MinimizerError::InfeasibleStartingPoint);
        }

        let (f_x, gfunc) = self.f.value_grad(&x);
        if !f_x.is_finite() {
            return Err(MinimizerError::FunctionEvaluationError);
        }
        if gfunc.len() != n {
            return Err(MinimizerError::GradientEvaluationError);
        }
        let gbarrier = barrier_magnitudes(&self.bounds, &x);
        let mu0 = initial_barrier_weight(&gfunc, &gbarrier, params.mu0factor, params.mu0);
        self.observer.notify(&FminboxEvent::InitialWeight { mu: mu0 });

        let mu = BarrierWeight::new(mu0);
        let objective = BarrierObjective::new_boxed(self.f.clone(), self.bounds.clone(), mu.clone());
        let mut preconditioner = BarrierPreconditioner::new(self.bounds.clone(), mu.clone());
        let capability = self.solver.preconditioning();

        let method = format!("Fminbox with {}", self.solver.name());
        let mut result = FminboxResult::new(method, x0, x.clone(), mu0);
        result.repaired = repaired;
        result.fn_evals += 1;
        result.g_evals += 1;

        let inner_params = InnerParams {
            store_trace: params.inner.store_trace || params.store_trace,
            extended_trace: params.inner.extended_trace || params.extended_trace,
            ..params.inner.clone()
        };
        let tolerances = params.outer_tolerances();
        let mut outer = Convergence {
            tolerances,
            ..Convergence::default()
        };

        // Iterating
        while result.outer_iters < params.outer_iterations && !outer.converged() {
            let xold = x.clone();
            let fval0 = objective.call(&x);
            result.fn_evals += 1;

            let hooks = match capability {
                Preconditioning::Supported => {
                    InnerHooks::new(Some(&mut preconditioner), Some(&self.bounds))
                }
                Preconditioning::Ignored | Preconditioning::Rejected => {
                    InnerHooks::new(None, Some(&self.bounds))
                }
            };
            let inner = self.solver.solve(&objective, &x, &inner_params, hooks)?;
            let minimum = inner.fmin;

            result.merge(inner);
            result.outer_iters += 1;
            x = result.xmin.clone();

            mu.scale(params.mufactor);
            let g = match self.combined_gradient(&x, mu.get()) {
                Some(g) => g,
                None => {
                    self.observer.notify(&FminboxEvent::LeftInterior {
                        iteration: result.outer_iters,
                        x: &x,
                    });
                    result.left_interior = true;
                    result.xmin = xold;
                    break;
                }
            };
            result.g_evals += 1;

            outer = Convergence::assess(&x, &xold, minimum, fval0, &g, &tolerances);

            if params.show_trace {
                self.observer.notify(&FminboxEvent::OuterIteration {
                    iteration: result.outer_iters,
                    mu: mu.get(),
                    minimum,
                    x: &x,
                    g_norm: Vector::max_abs(&g),
                });
            }

            if outer.f_increased && !params.allow_outer_f_increases {
                self.observer.notify(&FminboxEvent::ObjectiveIncreased {
                    iteration: result.outer_iters,
                    previous: fval0,
                    current: minimum,
                });
                result.f_increased = true;
                result.xmin = xold;
                break;
            }
        }

        // Terminal
        result.outer = outer;
        result.final_mu = mu.get();
        result.converged = outer.converged() && !result.f_increased && !result.left_interior;
        result.fmin = self.f.call(&result.xmin);
        result.fn_evals += 1;

        Ok(result)
    }
}

impl fmt::Debug for Fminbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fminbox( solver: {}, bounds: {:?})",
            self.solver.name(),
            self.bounds
        )
    }
}

#[cfg(test)]
mod minimize_f64_fminbox_tests {
    use super::*;
    use crate::minimize::f64::{
        Bfgs, ConjGrad, GradientDescent, LBfgs, MultiDimGradFn, NelderMead, Newton,
    };
    use float_cmp::{F64Margin, approx_eq};
    use std::cell::RefCell;
    use std::rc::Rc;

    const MARGIN: F64Margin = F64Margin {
        epsilon: 1e-4,
        ulps: 10,
    };

    fn corner_quadratic(
    ) -> MultiDimGradFn<fn(&Array1<f64>) -> f64, fn(&Array1<f64>) -> Array1<f64>> {
        fn f(x: &Array1<f64>) -> f64 {
            (x[0] - 2.0).powi(2) + (x[1] + 1.0).powi(2)
        }
        fn g(x: &Array1<f64>) -> Array1<f64> {
            array![2.0 * (x[0] - 2.0), 2.0 * (x[1] + 1.0)]
        }
        MultiDimGradFn::new(f, g)
    }

    fn unit_box(n: usize) -> Bounds {
        Bounds::new(Array1::zeros(n), Array1::ones(n)).unwrap()
    }

    /// Collects event names
    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<String>>>);

    impl Observer for Recorder {
        fn notify(&mut self, event: &FminboxEvent<'_>) {
            let name = match event {
                FminboxEvent::StartRepaired { .. } => "repaired",
                FminboxEvent::InitialWeight { .. } => "weight",
                FminboxEvent::OuterIteration { .. } => "iteration",
                FminboxEvent::ObjectiveIncreased { .. } => "increased",
                FminboxEvent::LeftInterior { .. } => "left",
            };
            self.0.borrow_mut().push(name.to_string());
        }
    }

    #[test]
    fn test_newton_is_rejected() {
        let err = Fminbox::new(corner_quadratic(), unit_box(2), Newton::default()).unwrap_err();
        assert_eq!(err, MinimizerError::UnsupportedMethod("Newton".to_string()));
    }

    #[test]
    fn test_corner_with_every_solver() {
        let solvers: Vec<Box<dyn InnerSolver>> = vec![
            Box::new(GradientDescent::default()),
            Box::new(ConjGrad::default()),
            Box::new(LBfgs::default()),
            Box::new(Bfgs::default()),
            Box::new(NelderMead::default()),
        ];

        for solver in solvers {
            let name = solver.name();
            let mut fminbox =
                Fminbox::new_boxed(Box::new(corner_quadratic()), unit_box(2), solver).unwrap();
            let result = fminbox.minimize(array![0.5, 0.5], None).unwrap();

            assert!(unit_box(2).contains_strictly(&result.xmin), "{}", name);
            assert!(approx_eq!(f64, result.xmin[0], 1.0, MARGIN), "{}: {}", name, result.xmin);
            assert!(approx_eq!(f64, result.xmin[1], 0.0, MARGIN), "{}: {}", name, result.xmin);
            assert!(approx_eq!(f64, result.fmin, 2.0, epsilon = 1e-3), "{}", name);
        }
    }

    #[test]
    fn test_weight_decays_by_repeated_multiplication() {
        let mut fminbox =
            Fminbox::new(corner_quadratic(), unit_box(2), ConjGrad::default()).unwrap();
        let params = FminboxParams {
            mu0: Some(0.3),
            mufactor: 0.1,
            ..FminboxParams::new(Some(4), None, None, None)
        };

        let result = fminbox.minimize(array![0.25, 0.75], Some(params)).unwrap();

        let mut expected = 0.3;
        for _ in 0..4 {
            expected *= 0.1;
        }
        assert_eq!(result.outer_iters, 4);
        assert_eq!(result.mu0, 0.3);
        assert_eq!(result.final_mu, expected);
        assert!(!result.converged);
    }

    #[test]
    fn test_zero_outer_iterations() {
        let mut fminbox =
            Fminbox::new(corner_quadratic(), unit_box(2), ConjGrad::default()).unwrap();
        let params = FminboxParams::new(Some(0), Some(1e-8), None, None);

        let result = fminbox.minimize(array![0.0, 0.5], Some(params)).unwrap();

        assert_eq!(result.outer_iters, 0);
        assert!(!result.converged);
        assert_eq!(result.xmin, array![0.01, 0.5]);
        assert_eq!(result.repaired, vec![0]);
    }

    #[test]
    fn test_observer_receives_events() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut fminbox = Fminbox::new(corner_quadratic(), unit_box(2), LBfgs::default())
            .unwrap()
            .with_observer(Recorder(events.clone()));
        let params = FminboxParams {
            show_trace: true,
            ..FminboxParams::new(Some(2), None, None, None)
        };

        fminbox.minimize(array![1.0, 0.5], Some(params)).unwrap();

        assert_eq!(
            *events.borrow(),
            vec!["repaired", "weight", "iteration", "iteration"]
        );
    }

    #[test]
    fn test_trace_and_counters_merge() {
        let mut fminbox =
            Fminbox::new(corner_quadratic(), unit_box(2), ConjGrad::default()).unwrap();
        let params = FminboxParams {
            store_trace: true,
            ..FminboxParams::new(Some(3), None, None, None)
        };

        let result = fminbox.minimize(array![0.5, 0.5], Some(params)).unwrap();

        // every inner solve records its starting state plus one entry per iteration
        assert_eq!(result.trace.len(), result.iters + result.outer_iters);
        assert!(result.fn_evals > result.iters);
        assert!(result.g_evals > result.outer_iters);
        assert_eq!(result.h_evals, 0);
    }

    /// Returns its start with the first coordinate pushed onto the lower bound
    #[derive(Clone)]
    struct OntoLowerBound;

    impl InnerSolver for OntoLowerBound {
        fn name(&self) -> String {
            "OntoLowerBound".to_string()
        }

        fn preconditioning(&self) -> Preconditioning {
            Preconditioning::Ignored
        }

        fn solve(
            &mut self,
            _f: &dyn ObjGradFn,
            x0: &Array1<f64>,
            params: &InnerParams,
            _hooks: InnerHooks<'_>,
        ) -> Result<InnerResult, MinimizerError> {
            let mut xmin = x0.clone();
            xmin[0] = 0.0;
            Ok(InnerResult {
                method: self.name(),
                xmin,
                fmin: f64::INFINITY,
                iters: 1,
                fn_evals: 1,
                g_evals: 0,
                h_evals: 0,
                converged: true,
                convergence: Convergence {
                    tolerances: params.tolerances,
                    ..Convergence::default()
                },
                trace: Vec::new(),
            })
        }
    }

    #[test]
    fn test_boundary_minimizer_stops_run() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut fminbox = Fminbox::new(corner_quadratic(), unit_box(2), OntoLowerBound)
            .unwrap()
            .with_observer(Recorder(events.clone()));
        let params = FminboxParams::new(Some(3), Some(1e-8), None, None);

        let result = fminbox.minimize(array![0.5, 0.5], Some(params)).unwrap();

        assert!(result.left_interior);
        assert!(!result.converged);
        assert!(!result.f_increased);
        assert_eq!(result.outer_iters, 1);
        assert_eq!(result.xmin, array![0.5, 0.5]);
        assert!(unit_box(2).contains_strictly(&result.xmin));
        assert!(approx_eq!(f64, result.fmin, 4.5, ulps = 2));
        assert_eq!(*events.borrow(), vec!["weight", "left"]);
    }

    #[test]
    fn test_degenerate_box_is_infeasible() {
        let bounds = Bounds::new(array![0.0, 1.0], array![1.0, 1.0]).unwrap();
        let mut fminbox = Fminbox::new(corner_quadratic(), bounds, ConjGrad::default()).unwrap();

        let err = fminbox.minimize(array![0.5, 1.0], None).unwrap_err();
        assert_eq!(err, MinimizerError::InfeasibleStartingPoint);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut fminbox =
            Fminbox::new(corner_quadratic(), unit_box(2), ConjGrad::default()).unwrap();
        let err = fminbox.minimize(array![0.5], None).unwrap_err();
        assert_eq!(
            err,
            MinimizerError::DimensionMismatch {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn test_invalid_params() {
        let mut fminbox =
            Fminbox::new(corner_quadratic(), unit_box(2), ConjGrad::default()).unwrap();

        for params in [
            FminboxParams {
                mufactor: 1.0,
                ..FminboxParams::default()
            },
            FminboxParams {
                mu0factor: 0.0,
                ..FminboxParams::default()
            },
            FminboxParams {
                mu0: Some(-1.0),
                ..FminboxParams::default()
            },
        ] {
            assert!(matches!(
                fminbox.minimize(array![0.5, 0.5], Some(params)),
                Err(MinimizerError::InvalidParameters(_))
            ));
        }

        let params = FminboxParams::new(None, Some(0.0), None, None);
        assert_eq!(
            fminbox.minimize(array![0.5, 0.5], Some(params)).unwrap_err(),
            MinimizerError::InvalidTolerance
        );
    }

    #[test]
    fn test_result_display() {
        let mut fminbox =
            Fminbox::new(corner_quadratic(), unit_box(2), ConjGrad::default()).unwrap();
        let result = fminbox.minimize(array![0.5, 0.5], None).unwrap();

        let text = format!("{}", result);
        assert!(text.starts_with("Results of Fminbox with Conjugate Gradient (Polak-Ribiere)"));
        assert!(text.contains("converged:        true"));
    }
}

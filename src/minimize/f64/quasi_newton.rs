use crate::minimize::{
    MinimizerError,
    f64::{
        InnerHooks, InnerParams, InnerResult, InnerSolver, ObjGradFn, Preconditioning, Vector,
        WolfeParams,
        inner::{Progress, start},
        line_search::{first_trial_step, strong_wolfe},
    },
};
use ndarray::prelude::*;
use std::collections::VecDeque;
use std::fmt;

/// Curvature pairs with `s·y` below this fraction of `|s||y|` are skipped.
const CURVATURE_TOL: f64 = 1e-8;

fn curvature_ok(s: &Array1<f64>, y: &Array1<f64>, sy: f64) -> bool {
    sy > CURVATURE_TOL * Vector::vector_norm(s) * Vector::vector_norm(y)
}

/// One stored L-BFGS correction pair
#[derive(Debug, Clone)]
struct Correction {
    s: Array1<f64>,
    y: Array1<f64>,
    rho: f64,
}

/// Limited-memory BFGS.
///
/// With a preconditioner attached, its diagonal is the initial inverse
/// Hessian of the two-loop recursion; otherwise the usual `(s·y / y·y) I`
/// scaling from the newest pair is used.
#[derive(Clone)]
pub struct LBfgs {
    pub memory: usize,
    pub line_search: WolfeParams,
    history: VecDeque<Correction>,
}

impl LBfgs {
    pub fn new(memory: Option<usize>) -> Self {
        LBfgs {
            memory: memory.unwrap_or(10).max(1),
            line_search: WolfeParams::default(),
            history: VecDeque::new(),
        }
    }

    fn push(&mut self, s: Array1<f64>, y: Array1<f64>, sy: f64) {
        if self.history.len() == self.memory {
            self.history.pop_front();
        }
        self.history.push_back(Correction { s, y, rho: 1.0 / sy });
    }

    /// `-H g` from the two-loop recursion.
    fn direction(
        &self,
        x: &Array1<f64>,
        g: &Array1<f64>,
        hooks: &mut InnerHooks<'_>,
    ) -> Array1<f64> {
        let mut q = g.clone();
        let mut alpha = vec![0.0; self.history.len()];

        // First loop (newest to oldest)
        for (i, c) in self.history.iter().enumerate().rev() {
            alpha[i] = c.rho * Vector::dot_product(&c.s, &q);
            q.scaled_add(-alpha[i], &c.y);
        }

        let mut r = if hooks.preconditioner.is_some() {
            hooks.precondition(x, &q)
        } else {
            let gamma = self
                .history
                .back()
                .map(|c| {
                    let yy = Vector::dot_product(&c.y, &c.y);
                    if yy > 0.0 { 1.0 / (c.rho * yy) } else { 1.0 }
                })
                .unwrap_or(1.0);
            q * gamma
        };

        // Second loop (oldest to newest)
        for (i, c) in self.history.iter().enumerate() {
            let beta = c.rho * Vector::dot_product(&c.y, &r);
            r.scaled_add(alpha[i] - beta, &c.s);
        }

        -r
    }
}

impl Default for LBfgs {
    fn default() -> Self {
        LBfgs::new(None)
    }
}

impl InnerSolver for LBfgs {
    fn name(&self) -> String {
        format!("L-BFGS({})", self.memory)
    }

    fn preconditioning(&self) -> Preconditioning {
        Preconditioning::Supported
    }

    fn solve(
        &mut self,
        f: &dyn ObjGradFn,
        x0: &Array1<f64>,
        params: &InnerParams,
        mut hooks: InnerHooks<'_>,
    ) -> Result<InnerResult, MinimizerError> {
        let (f0, g0) = start(f, x0, params)?;
        let mut state = Progress::new(x0, f0, g0, params);
        // curvature pairs from an earlier barrier weight describe another function
        self.history.clear();

        while state.keep_going(params) {
            let mut d = self.direction(&state.x, &state.g, &mut hooks);
            if !(Vector::dot_product(&state.g, &d) < 0.0) {
                self.history.clear();
                d = -hooks.precondition(&state.x, &state.g);
            }

            let alpha0 = if self.history.is_empty() {
                first_trial_step(&state.x, &d)
            } else {
                1.0
            };
            let alpha_max = hooks.max_step(&state.x, &d);

            let ls = match strong_wolfe(
                f,
                &state.x,
                &d,
                state.fx,
                &state.g,
                alpha0,
                alpha_max,
                &self.line_search,
            ) {
                Ok(ls) => ls,
                Err(_) => break,
            };
            state.fn_evals += ls.fn_evals;
            state.g_evals += ls.g_evals;

            if ls.alpha <= 0.0 {
                if self.history.is_empty() {
                    break;
                }
                self.history.clear();
                continue;
            }

            let x_new = Vector::axpy(&state.x, ls.alpha, &d);
            let g_new = match ls.g_new {
                Some(g) => g,
                None => {
                    state.g_evals += 1;
                    f.grad(&x_new)
                }
            };
            if g_new.len() != x_new.len() {
                return Err(MinimizerError::GradientEvaluationError);
            }

            let s = &x_new - &state.x;
            let y = &g_new - &state.g;
            let sy = Vector::dot_product(&s, &y);
            if curvature_ok(&s, &y, sy) {
                self.push(s, y, sy);
            }

            state.advance(x_new, ls.f_new, g_new, &params.tolerances);
        }

        Ok(state.finish(self.name()))
    }
}

impl fmt::Debug for LBfgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LBfgs( memory: {}, stored: {})",
            self.memory,
            self.history.len()
        )
    }
}

/// Dense BFGS on the inverse Hessian.
///
/// The dense update carries its own curvature information, so a
/// preconditioner is never consulted.
#[derive(Clone)]
pub struct Bfgs {
    pub line_search: WolfeParams,
    h_inv: Array2<f64>,
}

impl Bfgs {
    pub fn new() -> Self {
        Bfgs {
            line_search: WolfeParams::default(),
            h_inv: Array2::zeros((0, 0)),
        }
    }

    /// Final inverse Hessian approximation of the last solve
    pub fn inverse_hessian(&self) -> &Array2<f64> {
        &self.h_inv
    }

    // BFGS update: H_new = H + (sy + y^T H y)(s s^T)/(sy)^2 - (H y s^T + s y^T H)/(sy)
    fn update(&mut self, s: &Array1<f64>, y: &Array1<f64>, sy: f64) {
        let n = s.len();
        let hy = self.h_inv.dot(y);
        let yhy = Vector::dot_product(y, &hy);

        let c1 = (sy + yhy) / (sy * sy);
        let c2 = 1.0 / sy;
        let update = Array2::from_shape_fn((n, n), |(i, j)| {
            c1 * s[i] * s[j] - c2 * (hy[i] * s[j] + s[i] * hy[j])
        });
        self.h_inv += &update;
    }
}

impl Default for Bfgs {
    fn default() -> Self {
        Bfgs::new()
    }
}

impl InnerSolver for Bfgs {
    fn name(&self) -> String {
        "BFGS".to_string()
    }

    fn preconditioning(&self) -> Preconditioning {
        Preconditioning::Ignored
    }

    fn solve(
        &mut self,
        f: &dyn ObjGradFn,
        x0: &Array1<f64>,
        params: &InnerParams,
        hooks: InnerHooks<'_>,
    ) -> Result<InnerResult, MinimizerError> {
        let (f0, g0) = start(f, x0, params)?;
        let n = x0.len();
        let mut state = Progress::new(x0, f0, g0, params);

        // Initialize inverse Hessian approximation as identity
        self.h_inv = Array2::eye(n);
        let mut scaled = false;

        while state.keep_going(params) {
            let mut d = -self.h_inv.dot(&state.g);
            if !(Vector::dot_product(&state.g, &d) < 0.0) {
                // Reset to steepest descent if not descent direction
                self.h_inv = Array2::eye(n);
                scaled = false;
                d = -&state.g;
            }

            let alpha0 = if scaled {
                1.0
            } else {
                first_trial_step(&state.x, &d)
            };
            let alpha_max = hooks.max_step(&state.x, &d);

            let ls = match strong_wolfe(
                f,
                &state.x,
                &d,
                state.fx,
                &state.g,
                alpha0,
                alpha_max,
                &self.line_search,
            ) {
                Ok(ls) => ls,
                Err(_) => break,
            };
            state.fn_evals += ls.fn_evals;
            state.g_evals += ls.g_evals;

            if ls.alpha <= 0.0 {
                if !scaled {
                    break;
                }
                self.h_inv = Array2::eye(n);
                scaled = false;
                continue;
            }

            let x_new = Vector::axpy(&state.x, ls.alpha, &d);
            let g_new = match ls.g_new {
                Some(g) => g,
                None => {
                    state.g_evals += 1;
                    f.grad(&x_new)
                }
            };
            if g_new.len() != n {
                return Err(MinimizerError::GradientEvaluationError);
            }

            let s = &x_new - &state.x;
            let y = &g_new - &state.g;
            let sy = Vector::dot_product(&s, &y);
            if curvature_ok(&s, &y, sy) {
                if !scaled {
                    // first pair sets the scale of the identity before updating
                    self.h_inv = Array2::eye(n) * (sy / Vector::dot_product(&y, &y));
                    scaled = true;
                }
                self.update(&s, &y, sy);
            }

            state.advance(x_new, ls.f_new, g_new, &params.tolerances);
        }

        Ok(state.finish(self.name()))
    }
}

impl fmt::Debug for Bfgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bfgs( n: {})", self.h_inv.nrows())
    }
}

#[cfg(test)]
mod minimize_f64_quasi_newton_tests {
    use super::*;
    use crate::minimize::f64::{
        BarrierObjective, BarrierPreconditioner, BarrierWeight, Bounds, MultiDimGradFn,
    };
    use float_cmp::{F64Margin, approx_eq};

    const MARGIN: F64Margin = F64Margin {
        epsilon: 1e-5,
        ulps: 10,
    };

    fn rosenbrock(x: &Array1<f64>) -> f64 {
        (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2)
    }

    fn rosenbrock_grad(x: &Array1<f64>) -> Array1<f64> {
        array![
            -2.0 * (1.0 - x[0]) - 400.0 * x[0] * (x[1] - x[0] * x[0]),
            200.0 * (x[1] - x[0] * x[0])
        ]
    }

    fn coupled(x: &Array1<f64>) -> f64 {
        2.0 * x[0] * x[0] + x[0] * x[1] + x[1] * x[1] - 3.0 * x[0]
    }

    fn coupled_grad(x: &Array1<f64>) -> Array1<f64> {
        array![4.0 * x[0] + x[1] - 3.0, x[0] + 2.0 * x[1]]
    }

    #[test]
    fn test_lbfgs_rosenbrock() {
        let f = MultiDimGradFn::new(rosenbrock, rosenbrock_grad);
        let result = LBfgs::default().minimize(&f, &array![-1.2, 1.0]).unwrap();

        assert!(result.converged);
        assert!(approx_eq!(f64, result.xmin[0], 1.0, MARGIN));
        assert!(approx_eq!(f64, result.xmin[1], 1.0, MARGIN));
        assert_eq!(result.method, "L-BFGS(10)");
    }

    #[test]
    fn test_bfgs_rosenbrock() {
        let f = MultiDimGradFn::new(rosenbrock, rosenbrock_grad);
        let mut bfgs = Bfgs::default();
        let result = bfgs.minimize(&f, &array![-1.2, 1.0]).unwrap();

        assert!(result.converged);
        assert!(approx_eq!(f64, result.xmin[0], 1.0, MARGIN));
        assert!(approx_eq!(f64, result.xmin[1], 1.0, MARGIN));
    }

    #[test]
    fn test_bfgs_coupled_quadratic() {
        let f = MultiDimGradFn::new(coupled, coupled_grad);
        let mut bfgs = Bfgs::default();
        let result = bfgs.minimize(&f, &array![0.0, 0.0]).unwrap();

        assert!(result.converged);
        assert!(approx_eq!(f64, result.xmin[0], 6.0 / 7.0, MARGIN));
        assert!(approx_eq!(f64, result.xmin[1], -3.0 / 7.0, MARGIN));
        let h = bfgs.inverse_hessian();
        assert!(h[[0, 0]] > 0.0 && h[[1, 1]] > 0.0);
        assert!((h[[0, 1]] - h[[1, 0]]).abs() < 1e-12);
    }

    #[test]
    fn test_lbfgs_memory_is_bounded() {
        let f = MultiDimGradFn::new(rosenbrock, rosenbrock_grad);
        let mut lbfgs = LBfgs::new(Some(3));
        lbfgs.minimize(&f, &array![-1.2, 1.0]).unwrap();

        assert!(lbfgs.history.len() <= 3);
        assert_eq!(lbfgs.name(), "L-BFGS(3)");
    }

    #[test]
    fn test_lbfgs_preconditioned_barrier() {
        let f = MultiDimGradFn::new(coupled, coupled_grad);
        // unconstrained minimum (6/7, -3/7) lies below the box in x1
        let bounds = Bounds::new(array![0.0, 0.0], array![2.0, 2.0]).unwrap();
        let mu = BarrierWeight::new(1e-6);
        let obj = BarrierObjective::new(f, bounds.clone(), mu.clone());
        let mut precon = BarrierPreconditioner::new(bounds.clone(), mu);

        let result = LBfgs::default()
            .solve(
                &obj,
                &array![1.0, 1.0],
                &InnerParams::default(),
                InnerHooks::new(Some(&mut precon), Some(&bounds)),
            )
            .unwrap();

        assert!(bounds.contains_strictly(&result.xmin));
        // constrained minimum is (3/4, 0)
        assert!(approx_eq!(f64, result.xmin[0], 0.75, epsilon = 1e-3));
        assert!(result.xmin[1] < 1e-3);
    }

    #[test]
    fn test_capabilities() {
        assert_eq!(LBfgs::default().preconditioning(), Preconditioning::Supported);
        assert_eq!(Bfgs::default().preconditioning(), Preconditioning::Ignored);
    }
}

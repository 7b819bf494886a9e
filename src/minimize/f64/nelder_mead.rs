use crate::minimize::{
    MinimizerError,
    f64::{
        Convergence, InnerHooks, InnerParams, InnerResult, InnerSolver, IterationState, ObjGradFn,
        Preconditioning, Vector,
    },
};
use ndarray::prelude::*;
use std::fmt;

/// Derivative-free downhill simplex.
///
/// Outside the box the barrier objective is `+∞`; such vertices sort last
/// and are contracted away. Convergence reads the tolerances as:
/// `g_tol` on both the standard deviation of the vertex values and the
/// simplex diameter, `x_tol` on the diameter alone and `f_tol` on the
/// spread between worst and best value.
///
/// A small value spread alone only locates a smooth minimum to about the
/// square root of the tolerance, hence the diameter in the `g_tol` test.
#[derive(Clone)]
pub struct NelderMead {
    pub alpha: f64, // Reflection coefficient
    pub beta: f64,  // Contraction coefficient
    pub gamma: f64, // Expansion coefficient
    pub rho: f64,   // Shrink coefficient
    /// Dimension-dependent coefficients, better suited to larger problems
    pub adaptive: bool,
}

impl NelderMead {
    pub fn new(adaptive: bool) -> Self {
        NelderMead {
            adaptive,
            ..Self::default()
        }
    }

    fn coefficients(&self, n: usize) -> (f64, f64, f64, f64) {
        if self.adaptive {
            let n = n as f64;
            (1.0, 0.75 - 1.0 / (2.0 * n), 1.0 + 2.0 / n, 1.0 - 1.0 / n)
        } else {
            (self.alpha, self.beta, self.gamma, self.rho)
        }
    }

    /// Vertex `i + 1` moves along coordinate `i`, inside the bounds when
    /// they are known.
    fn initial_simplex(x0: &Array1<f64>, hooks: &InnerHooks<'_>) -> Array2<f64> {
        let n = x0.len();
        let mut simplex = Array2::from_shape_fn((n + 1, n), |(_, j)| x0[j]);

        for i in 0..n {
            let mut h = if x0[i] != 0.0 { 0.05 * x0[i].abs() } else { 0.00025 };

            let mut e = Array1::zeros(n);
            e[i] = 1.0;
            let room_up = hooks.max_step(x0, &e);
            let room_down = hooks.max_step(x0, &-&e);
            if h >= room_up {
                if room_down > room_up {
                    h = -h.min(0.5 * room_down);
                } else {
                    h = 0.5 * room_up;
                }
            }

            simplex[(i + 1, i)] += h;
        }

        simplex
    }

    fn spread(values: &Array1<f64>) -> (f64, f64) {
        let n = values.len() as f64;
        let mean = values.sum() / n;
        let std = (values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        (std, values[values.len() - 1] - values[0])
    }

    fn diameter(simplex: &Array2<f64>) -> f64 {
        let best = simplex.row(0);
        simplex
            .rows()
            .into_iter()
            .skip(1)
            .map(|v| {
                v.iter()
                    .zip(best.iter())
                    .fold(0.0, |acc: f64, (&a, &b)| acc.max((a - b).abs()))
            })
            .fold(0.0, f64::max)
    }

    fn assess(simplex: &Array2<f64>, values: &Array1<f64>, params: &InnerParams) -> Convergence {
        let tols = &params.tolerances;
        let (std, f_spread) = Self::spread(values);
        let x_change = Self::diameter(simplex);

        Convergence {
            x_converged: tols.x_tol.is_some_and(|tol| x_change <= tol),
            f_converged: tols.f_tol.is_some_and(|tol| f_spread <= tol),
            g_converged: tols.g_tol.is_some_and(|tol| std <= tol && x_change <= tol),
            f_increased: false,
            x_change,
            f_change: f_spread,
            g_residual: std,
            tolerances: *tols,
        }
    }

    fn sort(simplex: &mut Array2<f64>, values: &mut Array1<f64>) {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

        let tmp_values = values.clone();
        let tmp_simplex = simplex.clone();
        for (i, &k) in order.iter().enumerate() {
            values[i] = tmp_values[k];
            simplex.row_mut(i).assign(&tmp_simplex.row(k));
        }
    }

    fn trace_entry(
        iteration: usize,
        simplex: &Array2<f64>,
        values: &Array1<f64>,
        extended: bool,
    ) -> IterationState {
        IterationState {
            iteration,
            value: values[0],
            g_norm: Self::spread(values).0,
            x: extended.then(|| simplex.row(0).to_owned()),
            g: None,
        }
    }
}

impl Default for NelderMead {
    fn default() -> Self {
        NelderMead {
            alpha: 1.0,
            beta: 0.5,
            gamma: 2.0,
            rho: 0.5,
            adaptive: false,
        }
    }
}

impl InnerSolver for NelderMead {
    fn name(&self) -> String {
        "Nelder-Mead".to_string()
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
        let n = x0.len();
        if n == 0 {
            return Err(MinimizerError::InvalidDimension);
        }
        params.validate()?;

        let f0 = f.call(x0);
        if !f0.is_finite() {
            return Err(MinimizerError::FunctionEvaluationError);
        }

        let (alpha, beta, gamma, rho) = self.coefficients(n);
        let mut simplex = Self::initial_simplex(x0, &hooks);
        let mut values = Array1::from_shape_fn(n + 1, |i| {
            if i == 0 { f0 } else { f.call(&simplex.row(i).to_owned()) }
        });
        let mut fn_evals = n + 1;
        let mut iters = 0;
        let mut trace = Vec::new();

        Self::sort(&mut simplex, &mut values);
        let mut convergence = Self::assess(&simplex, &values, params);
        if params.store_trace {
            trace.push(Self::trace_entry(0, &simplex, &values, params.extended_trace));
        }

        while iters < params.iterations && !convergence.converged() {
            iters += 1;
            let worst = n;

            // Centroid of all but the worst vertex
            let x_avg = simplex.slice(s![..n, ..]).sum_axis(Axis(0)) / n as f64;
            let x_w = simplex.row(worst).to_owned();

            let x_r = Vector::axpy(&x_avg, alpha, &(&x_avg - &x_w));
            let f_r = f.call(&x_r);
            fn_evals += 1;

            if f_r < values[0] {
                // Perform expansion
                let x_e = Vector::axpy(&x_avg, gamma, &(&x_r - &x_avg));
                let f_e = f.call(&x_e);
                fn_evals += 1;
                if f_e < f_r {
                    simplex.row_mut(worst).assign(&x_e);
                    values[worst] = f_e;
                } else {
                    simplex.row_mut(worst).assign(&x_r);
                    values[worst] = f_r;
                }
            } else if f_r < values[n - 1] {
                simplex.row_mut(worst).assign(&x_r);
                values[worst] = f_r;
            } else {
                let (x_c, f_c, accept) = if f_r < values[worst] {
                    // Outside contraction
                    let x_c = Vector::axpy(&x_avg, beta, &(&x_r - &x_avg));
                    let f_c = f.call(&x_c);
                    (x_c, f_c, f_c <= f_r)
                } else {
                    // Inside contraction
                    let x_c = Vector::axpy(&x_avg, beta, &(&x_w - &x_avg));
                    let f_c = f.call(&x_c);
                    (x_c, f_c, f_c < values[worst])
                };
                fn_evals += 1;

                if accept {
                    simplex.row_mut(worst).assign(&x_c);
                    values[worst] = f_c;
                } else {
                    // Shrink simplex toward the best vertex
                    let x_b = simplex.row(0).to_owned();
                    for i in 1..=n {
                        let v = simplex.row(i).to_owned();
                        let shrunk = Vector::axpy(&x_b, rho, &(&v - &x_b));
                        values[i] = f.call(&shrunk);
                        simplex.row_mut(i).assign(&shrunk);
                    }
                    fn_evals += n;
                }
            }

            Self::sort(&mut simplex, &mut values);
            convergence = Self::assess(&simplex, &values, params);
            if params.store_trace {
                trace.push(Self::trace_entry(iters, &simplex, &values, params.extended_trace));
            }
        }

        Ok(InnerResult {
            method: self.name(),
            xmin: simplex.row(0).to_owned(),
            fmin: values[0],
            iters,
            fn_evals,
            g_evals: 0,
            h_evals: 0,
            converged: convergence.converged(),
            convergence,
            trace,
        })
    }
}

impl fmt::Debug for NelderMead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NelderMead( alpha: {}, beta: {}, gamma: {}, rho: {}, adaptive: {})",
            self.alpha, self.beta, self.gamma, self.rho, self.adaptive
        )
    }
}

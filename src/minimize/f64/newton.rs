use crate::minimize::{
    MinimizerError,
    f64::{
        InnerHooks, InnerParams, InnerResult, InnerSolver, ObjGradFn, Preconditioning, Vector,
        WolfeParams,
        inner::{Progress, start},
        line_search::backtracking,
    },
};
use ndarray::prelude::*;
use std::fmt;

/// Damped Newton's method with a forward-difference Hessian.
///
/// Usable on its own, but the barrier controller refuses it: the barrier
/// Hessian blows up at the box edges and the difference quotient then
/// straddles the boundary.
#[derive(Clone)]
pub struct Newton {
    pub line_search: WolfeParams,
    /// Relative step of the Hessian difference quotient
    pub fd_step: f64,
}

impl Newton {
    pub fn new(fd_step: Option<f64>) -> Self {
        Newton {
            fd_step: fd_step.unwrap_or(f64::EPSILON.sqrt()),
            ..Self::default()
        }
    }

    /// Symmetrized forward differences of the gradient, one column per
    /// coordinate.
    fn hessian(&self, f: &dyn ObjGradFn, x: &Array1<f64>, g: &Array1<f64>) -> Array2<f64> {
        let n = x.len();
        let mut h = Array2::zeros((n, n));
        let mut shifted = x.clone();

        for j in 0..n {
            let step = self.fd_step * x[j].abs().max(1.0);
            shifted[j] = x[j] + step;
            let g_step = f.grad(&shifted);
            shifted[j] = x[j];

            for i in 0..n {
                h[[i, j]] = (g_step[i] - g[i]) / step;
            }
        }

        (&h + &h.t()) * 0.5
    }
}

impl Default for Newton {
    fn default() -> Self {
        Newton {
            line_search: WolfeParams::default(),
            fd_step: f64::EPSILON.sqrt(),
        }
    }
}

/// Gaussian elimination with partial pivoting.
pub(crate) fn solve_linear_system(
    a: &Array2<f64>,
    b: &Array1<f64>,
) -> Result<Array1<f64>, MinimizerError> {
    let mut ax = a.clone();
    let mut bx = b.clone();
    let n = ax.nrows();
    if ax.ncols() != n || bx.len() != n {
        return Err(MinimizerError::DimensionMismatch {
            expected: n,
            found: bx.len(),
        });
    }

    // Forward elimination with partial pivoting
    for k in 0..n {
        // Find pivot
        let mut max_row = k;
        for i in k + 1..n {
            if ax[[i, k]].abs() > ax[[max_row, k]].abs() {
                max_row = i;
            }
        }

        // Swap rows
        if max_row != k {
            for j in 0..n {
                ax.swap((k, j), (max_row, j));
            }
            bx.swap(k, max_row);
        }

        // Check for singularity
        if !(ax[[k, k]].abs() >= 1e-14) {
            return Err(MinimizerError::LinearSystemSingular);
        }

        // Eliminate below pivot
        for i in k + 1..n {
            let factor = ax[[i, k]] / ax[[k, k]];
            for j in k..n {
                ax[[i, j]] -= factor * ax[[k, j]];
            }
            bx[i] -= factor * bx[k];
        }
    }

    // Back substitution
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = bx[i];
        for j in i + 1..n {
            x[i] -= ax[[i, j]] * x[j];
        }
        x[i] /= ax[[i, i]];
    }

    Ok(x)
}

impl InnerSolver for Newton {
    fn name(&self) -> String {
        "Newton".to_string()
    }

    fn preconditioning(&self) -> Preconditioning {
        Preconditioning::Rejected
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

        while state.keep_going(params) {
            let h = self.hessian(f, &state.x, &state.g);
            state.h_evals += 1;
            state.g_evals += n;

            // Newton step, steepest descent when H is singular or indefinite
            let d = match solve_linear_system(&h, &-&state.g) {
                Ok(d) if Vector::dot_product(&d, &state.g) < 0.0 => d,
                _ => -&state.g,
            };
            let alpha_max = hooks.max_step(&state.x, &d);

            let ls = match backtracking(
                f,
                &state.x,
                &d,
                state.fx,
                &state.g,
                1.0,
                alpha_max,
                &self.line_search,
            ) {
                Ok(ls) => ls,
                Err(_) => break,
            };
            state.fn_evals += ls.fn_evals;
            if ls.alpha <= 0.0 {
                break;
            }

            let x_new = Vector::axpy(&state.x, ls.alpha, &d);
            let g_new = f.grad(&x_new);
            state.g_evals += 1;
            if g_new.len() != n {
                return Err(MinimizerError::GradientEvaluationError);
            }

            state.advance(x_new, ls.f_new, g_new, &params.tolerances);
        }

        Ok(state.finish(self.name()))
    }
}

impl fmt::Debug for Newton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Newton( fd_step: {:e})", self.fd_step)
    }
}

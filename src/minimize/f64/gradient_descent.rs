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

/// Preconditioned steepest descent with Armijo backtracking.
#[derive(Clone)]
pub struct GradientDescent {
    pub line_search: WolfeParams,
    pub initial_step: f64,
}

impl GradientDescent {
    pub fn new(initial_step: Option<f64>) -> Self {
        GradientDescent {
            initial_step: initial_step.unwrap_or(1.0),
            ..Self::default()
        }
    }
}

impl Default for GradientDescent {
    fn default() -> Self {
        GradientDescent {
            line_search: WolfeParams::default(),
            initial_step: 1.0,
        }
    }
}

impl InnerSolver for GradientDescent {
    fn name(&self) -> String {
        "Gradient Descent".to_string()
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
        let mut alpha0 = self.initial_step;

        while state.keep_going(params) {
            let d = -hooks.precondition(&state.x, &state.g);
            let alpha_max = hooks.max_step(&state.x, &d);

            let ls = match backtracking(
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
            if ls.alpha <= 0.0 {
                break;
            }

            let x_new = Vector::axpy(&state.x, ls.alpha, &d);
            let g_new = f.grad(&x_new);
            state.g_evals += 1;
            if g_new.len() != x_new.len() {
                return Err(MinimizerError::GradientEvaluationError);
            }

            // let the next step grow again after a short one
            alpha0 = (2.0 * ls.alpha).max(self.initial_step);
            state.advance(x_new, ls.f_new, g_new, &params.tolerances);
        }

        Ok(state.finish(self.name()))
    }
}

impl fmt::Debug for GradientDescent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GradientDescent( initial_step: {}, c1: {})",
            self.initial_step, self.line_search.c1
        )
    }
}

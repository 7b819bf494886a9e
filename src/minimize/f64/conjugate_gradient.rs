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
use std::fmt;

/// Conjugate gradient update formulas, in preconditioned form.
///
/// `s = P g` is the preconditioned gradient, `y = g_new - g_old` and `d` the
/// previous search direction. With `P = I` these reduce to the textbook
/// formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConjGradMethod {
    FletcherReeves,  // β = g_new·s_new / g_old·s_old
    PolakRibiere,    // β = max(0, y·s_new / g_old·s_old)
    HestenesStiefel, // β = y·s_new / d·y
    DaiYuan,         // β = g_new·s_new / d·y
    HagerZhang, // β = (y·s_new - 2 (y·P·y) (d·g_new) / d·y) / d·y, bounded below
}

impl fmt::Display for ConjGradMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConjGradMethod::FletcherReeves => write!(f, "Fletcher-Reeves"),
            ConjGradMethod::PolakRibiere => write!(f, "Polak-Ribiere"),
            ConjGradMethod::HestenesStiefel => write!(f, "Hestenes-Stiefel"),
            ConjGradMethod::DaiYuan => write!(f, "Dai-Yuan"),
            ConjGradMethod::HagerZhang => write!(f, "Hager-Zhang"),
        }
    }
}

/// Hager-Zhang lower bound parameter
const HZ_ETA: f64 = 0.4;

/// Inputs of one beta computation
struct BetaTerms<'a> {
    g_old: &'a Array1<f64>,
    s_old: &'a Array1<f64>,
    g_new: &'a Array1<f64>,
    s_new: &'a Array1<f64>,
    d: &'a Array1<f64>,
    y: &'a Array1<f64>,
    y_p_y: f64,
}

/// Nonlinear conjugate gradient with strong Wolfe line search.
///
/// Directions are restarted along `-P g` every `restart_period` iterations
/// (the dimension by default), whenever the update stops being a descent
/// direction and after a step that misses the curvature condition.
#[derive(Clone)]
pub struct ConjGrad {
    pub method: ConjGradMethod,
    pub restart_period: Option<usize>,
    pub line_search: WolfeParams,
}

impl ConjGrad {
    pub fn new(method: ConjGradMethod, restart_period: Option<usize>) -> Self {
        ConjGrad {
            method,
            restart_period,
            line_search: WolfeParams::conjugate_gradient(),
        }
    }

    fn beta(&self, t: &BetaTerms) -> f64 {
        match self.method {
            ConjGradMethod::FletcherReeves => {
                let denominator = Vector::dot_product(t.g_old, t.s_old);
                if denominator < 1e-300 {
                    0.0
                } else {
                    Vector::dot_product(t.g_new, t.s_new) / denominator
                }
            }

            ConjGradMethod::PolakRibiere => {
                let denominator = Vector::dot_product(t.g_old, t.s_old);
                if denominator < 1e-300 {
                    0.0
                } else {
                    (Vector::dot_product(t.y, t.s_new) / denominator).max(0.0) // Non-negative variant
                }
            }

            ConjGradMethod::HestenesStiefel => {
                let dy = Vector::dot_product(t.d, t.y);
                if dy.abs() < 1e-300 {
                    0.0
                } else {
                    Vector::dot_product(t.y, t.s_new) / dy
                }
            }

            ConjGradMethod::DaiYuan => {
                let dy = Vector::dot_product(t.d, t.y);
                if dy.abs() < 1e-300 {
                    0.0
                } else {
                    Vector::dot_product(t.g_new, t.s_new) / dy
                }
            }

            ConjGradMethod::HagerZhang => {
                let dy = Vector::dot_product(t.d, t.y);
                if dy.abs() < 1e-300 {
                    0.0
                } else {
                    let numerator = Vector::dot_product(t.y, t.s_new)
                        - 2.0 * t.y_p_y * Vector::dot_product(t.d, t.g_new) / dy;
                    let beta = numerator / dy;

                    let d_norm = Vector::vector_norm(t.d);
                    let g_norm = Vector::vector_norm(t.g_old);
                    let eta = -1.0 / (d_norm * HZ_ETA.min(g_norm));
                    if eta.is_finite() { beta.max(eta) } else { beta }
                }
            }
        }
    }
}

impl Default for ConjGrad {
    fn default() -> Self {
        ConjGrad::new(ConjGradMethod::PolakRibiere, None)
    }
}

impl InnerSolver for ConjGrad {
    fn name(&self) -> String {
        format!("Conjugate Gradient ({})", self.method)
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
        let restart_every = self.restart_period.unwrap_or(x0.len()).max(1);
        let mut state = Progress::new(x0, f0, g0, params);

        let mut s = hooks.precondition(&state.x, &state.g);
        let mut d = -&s;
        let mut since_restart = 0;
        let mut previous_step: Option<(f64, f64)> = None;

        while state.keep_going(params) {
            let mut slope = Vector::dot_product(&state.g, &d);
            if !(slope < 0.0) {
                // Not a descent direction, restart with steepest descent
                d = -&s;
                since_restart = 0;
                slope = Vector::dot_product(&state.g, &d);
                if !(slope < 0.0) {
                    break;
                }
            }

            let alpha0 = match previous_step {
                Some((alpha, previous_slope)) => {
                    let guess = alpha * previous_slope / slope;
                    if guess.is_finite() && guess > 0.0 {
                        guess.min(self.line_search.max_step)
                    } else {
                        1.0
                    }
                }
                None => first_trial_step(&state.x, &d),
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
                if since_restart > 0 {
                    d = -&s;
                    since_restart = 0;
                    previous_step = None;
                    continue;
                }
                break;
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

            let y = &g_new - &state.g;
            let s_new = hooks.precondition(&x_new, &g_new);
            let beta = self.beta(&BetaTerms {
                g_old: &state.g,
                s_old: &s,
                g_new: &g_new,
                s_new: &s_new,
                d: &d,
                y: &y,
                y_p_y: hooks.inner(&y, &y),
            });

            state.advance(x_new, ls.f_new, g_new, &params.tolerances);
            previous_step = Some((ls.alpha, slope));
            since_restart += 1;

            if since_restart >= restart_every || !ls.converged {
                d = -&s_new;
                since_restart = 0;
            } else {
                d = &d * beta - &s_new;
            }
            s = s_new;
        }

        Ok(state.finish(self.name()))
    }
}

impl fmt::Debug for ConjGrad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConjGrad( method: {}, restart_period: {:?})",
            self.method, self.restart_period
        )
    }
}

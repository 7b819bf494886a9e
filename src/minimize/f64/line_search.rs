use crate::minimize::{
    MinimizerError,
    f64::{LineSearchResult, ObjGradFn, Vector, WolfeParams},
};
use ndarray::prelude::*;

const MAX_BACKTRACKS: usize = 60;
const MAX_BRACKET_STEPS: usize = 50;
const MAX_ZOOM_STEPS: usize = 50;

impl LineSearchResult {
    /// No acceptable step was found; the caller stays at `x`.
    fn stalled(f_x: f64, fn_evals: usize, g_evals: usize) -> Self {
        LineSearchResult {
            alpha: 0.0,
            f_new: f_x,
            g_new: None,
            fn_evals,
            g_evals,
            converged: false,
        }
    }
}

fn directional_derivative(g: &Array1<f64>, d: &Array1<f64>) -> Result<f64, MinimizerError> {
    let slope = Vector::dot_product(g, d);
    if slope < 0.0 {
        Ok(slope)
    } else {
        Err(MinimizerError::LineSearchFailed)
    }
}

/// First trial step of a solve, a move of about 1% of the size of `x` and
/// never more than a unit step.
pub(crate) fn first_trial_step(x: &Array1<f64>, d: &Array1<f64>) -> f64 {
    let d_max = Vector::max_abs(d);
    if d_max > 0.0 {
        (0.01 * Vector::max_abs(x).max(1.0) / d_max).min(1.0)
    } else {
        1.0
    }
}

/// Armijo backtracking along `d`, never trying a step longer than
/// `alpha_max`.
///
/// Non-finite trial values count as a failed sufficient-decrease test, so
/// the search simply shrinks back inside the domain. Returns `alpha == 0`
/// when the step shrinks below `params.min_step`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn backtracking(
    f: &dyn ObjGradFn,
    x: &Array1<f64>,
    d: &Array1<f64>,
    f_x: f64,
    g_x: &Array1<f64>,
    alpha0: f64,
    alpha_max: f64,
    params: &WolfeParams,
) -> Result<LineSearchResult, MinimizerError> {
    let slope = directional_derivative(g_x, d)?;

    let mut alpha = alpha0.min(alpha_max).min(params.max_step);
    let mut fn_evals = 0;

    for _ in 0..MAX_BACKTRACKS {
        if !(alpha >= params.min_step) {
            break;
        }

        let f_new = f.call(&Vector::axpy(x, alpha, d));
        fn_evals += 1;

        if f_new.is_finite() && f_new <= f_x + params.c1 * alpha * slope {
            return Ok(LineSearchResult {
                alpha,
                f_new,
                g_new: None,
                fn_evals,
                g_evals: 0,
                converged: true,
            });
        }

        alpha *= 0.5;
    }

    Ok(LineSearchResult::stalled(f_x, fn_evals, 0))
}

/// Line search for the strong Wolfe conditions, capped at `alpha_max`.
///
/// Bracketing doubles the step until the bracket closes or the cap is
/// reached; zooming bisects the bracket. A trial point with a non-finite
/// value closes the bracket from above. When the curvature test cannot be
/// met the best Armijo point found is returned with `converged == false`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn strong_wolfe(
    f: &dyn ObjGradFn,
    x: &Array1<f64>,
    d: &Array1<f64>,
    f_x: f64,
    g_x: &Array1<f64>,
    alpha0: f64,
    alpha_max: f64,
    params: &WolfeParams,
) -> Result<LineSearchResult, MinimizerError> {
    let slope = directional_derivative(g_x, d)?;
    let cap = alpha_max.min(params.max_step);
    if !(cap >= params.min_step) {
        return Ok(LineSearchResult::stalled(f_x, 0, 0));
    }

    let mut alpha = alpha0.min(cap);
    let mut alpha_prev = 0.0;
    let mut f_prev = f_x;
    let mut g_prev: Option<Array1<f64>> = None;
    let mut fn_evals = 0;
    let mut g_evals = 0;

    for i in 0..MAX_BRACKET_STEPS {
        let x_new = Vector::axpy(x, alpha, d);
        let (f_new, g_new) = f.value_grad(&x_new);
        fn_evals += 1;
        g_evals += 1;

        if !f_new.is_finite()
            || f_new > f_x + params.c1 * alpha * slope
            || (i > 0 && f_new >= f_prev)
        {
            let bracket = Bracket {
                lo: alpha_prev,
                f_lo: f_prev,
                g_lo: g_prev,
                hi: alpha,
            };
            return Ok(zoom(f, x, d, f_x, slope, bracket, params, fn_evals, g_evals));
        }

        let slope_new = Vector::dot_product(&g_new, d);
        if slope_new.abs() <= -params.c2 * slope {
            return Ok(LineSearchResult {
                alpha,
                f_new,
                g_new: Some(g_new),
                fn_evals,
                g_evals,
                converged: true,
            });
        }

        if slope_new >= 0.0 {
            let bracket = Bracket {
                lo: alpha,
                f_lo: f_new,
                g_lo: Some(g_new),
                hi: alpha_prev,
            };
            return Ok(zoom(f, x, d, f_x, slope, bracket, params, fn_evals, g_evals));
        }

        alpha_prev = alpha;
        f_prev = f_new;
        g_prev = Some(g_new);

        if alpha >= cap {
            break;
        }
        alpha = (2.0 * alpha).min(cap);
    }

    // still descending at the cap: accept the last sufficient-decrease step
    Ok(LineSearchResult {
        alpha: alpha_prev,
        f_new: f_prev,
        g_new: g_prev,
        fn_evals,
        g_evals,
        converged: false,
    })
}

/// `lo` satisfies sufficient decrease, `hi` is the other end.
struct Bracket {
    lo: f64,
    f_lo: f64,
    g_lo: Option<Array1<f64>>,
    hi: f64,
}

#[allow(clippy::too_many_arguments)]
fn zoom(
    f: &dyn ObjGradFn,
    x: &Array1<f64>,
    d: &Array1<f64>,
    f_x: f64,
    slope: f64,
    mut bracket: Bracket,
    params: &WolfeParams,
    mut fn_evals: usize,
    mut g_evals: usize,
) -> LineSearchResult {
    for _ in 0..MAX_ZOOM_STEPS {
        if (bracket.hi - bracket.lo).abs() < params.min_step {
            break;
        }

        let alpha = 0.5 * (bracket.lo + bracket.hi);
        let (f_new, g_new) = f.value_grad(&Vector::axpy(x, alpha, d));
        fn_evals += 1;
        g_evals += 1;

        if !f_new.is_finite() || f_new > f_x + params.c1 * alpha * slope || f_new >= bracket.f_lo
        {
            bracket.hi = alpha;
            continue;
        }

        let slope_new = Vector::dot_product(&g_new, d);
        if slope_new.abs() <= -params.c2 * slope {
            return LineSearchResult {
                alpha,
                f_new,
                g_new: Some(g_new),
                fn_evals,
                g_evals,
                converged: true,
            };
        }

        if slope_new * (bracket.hi - bracket.lo) >= 0.0 {
            bracket.hi = bracket.lo;
        }
        bracket.lo = alpha;
        bracket.f_lo = f_new;
        bracket.g_lo = Some(g_new);
    }

    if bracket.lo > 0.0 {
        LineSearchResult {
            alpha: bracket.lo,
            f_new: bracket.f_lo,
            g_new: bracket.g_lo,
            fn_evals,
            g_evals,
            converged: false,
        }
    } else {
        LineSearchResult::stalled(f_x, fn_evals, g_evals)
    }
}

//! fminbox prelude.
//!
//! This module contains the most used types and traits, which you can import
//! easily as a group.
//!
//! ```
//! use fminbox::prelude::*;
//! ```

#[doc(no_inline)]
pub use crate::error::MinimizerError;

#[doc(no_inline)]
pub use crate::minimize::f64::{
    BarrierWeight, Bfgs, Bounds, ConjGrad, ConjGradMethod, Fminbox, FminboxParams, FminboxResult,
    GradientDescent, InnerParams, InnerSolver, LBfgs, LogObserver, MultiDimFn, MultiDimGradFn,
    MultiDimNumGradFn, NelderMead, Newton, ObjFn, ObjGradFn, Observer, Preconditioning,
};

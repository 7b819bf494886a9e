//! Box-constrained minimization with a logarithmic barrier.
//!
//! [`Fminbox`](minimize::f64::Fminbox) turns `min f(x)` subject to `l ≤ x ≤ u`
//! into a sequence of unconstrained problems `f(x) + mu * B(x)`, where `B` is
//! the log barrier of the box, and hands each of them to an unconstrained
//! inner solver. The barrier weight `mu` is decayed after every outer
//! iteration so the iterates approach the constrained minimum from the
//! interior.
//!
//! ```
//! use fminbox::prelude::*;
//! use ndarray::prelude::*;
//!
//! let f = |x: &Array1<f64>| (x[0] - 2.0).powi(2) + (x[1] + 1.0).powi(2);
//! let g = |x: &Array1<f64>| array![2.0 * (x[0] - 2.0), 2.0 * (x[1] + 1.0)];
//! let bounds = Bounds::new(array![0.0, 0.0], array![1.0, 1.0]).unwrap();
//!
//! let mut fminbox = Fminbox::new(MultiDimGradFn::new(f, g), bounds, ConjGrad::default()).unwrap();
//! let result = fminbox.minimize(array![0.5, 0.5], None).unwrap();
//!
//! assert!((result.xmin[0] - 1.0).abs() < 1e-4);
//! assert!(result.xmin[1].abs() < 1e-4);
//! assert!(result.xmin[0] < 1.0 && result.xmin[1] > 0.0);
//! ```
pub mod error;
pub mod minimize;
pub mod prelude;

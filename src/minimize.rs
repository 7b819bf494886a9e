pub use crate::error::MinimizerError;

pub mod f64;

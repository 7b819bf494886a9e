use std::fmt;

/// Error types for optimizers
#[derive(Debug, Clone, PartialEq)]
pub enum MinimizerError {
    DimensionMismatch { expected: usize, found: usize },
    FunctionEvaluationError,
    GradientEvaluationError,
    InfeasibleStartingPoint,
    InvalidBounds { index: usize, lower: f64, upper: f64 },
    InvalidDimension,
    InvalidParameters(String),
    InvalidTolerance,
    LineSearchFailed,
    LinearSystemSingular,
    OutOfBounds { index: usize, value: f64 },
    UnsupportedMethod(String),
}

impl fmt::Display for MinimizerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MinimizerError::DimensionMismatch { expected, found } => write!(
                f,
                "Dimension mismatch: expected {} elements, found {}",
                expected, found
            ),
            MinimizerError::FunctionEvaluationError => {
                write!(f, "Function evaluation returned invalid value")
            }
            MinimizerError::GradientEvaluationError => write!(f, "Gradient evaluation error"),
            MinimizerError::InfeasibleStartingPoint => {
                write!(f, "Starting point is not strictly inside the bounds")
            }
            MinimizerError::InvalidBounds {
                index,
                lower,
                upper,
            } => write!(
                f,
                "Invalid bounds at index {}: lower {} must not exceed upper {}",
                index, lower, upper
            ),
            MinimizerError::InvalidDimension => write!(f, "Invalid dimension or empty vector"),
            MinimizerError::InvalidParameters(msg) => write!(f, "Invalid parameters: {}", msg),
            MinimizerError::InvalidTolerance => {
                write!(f, "Tolerance must be positive and finite")
            }
            MinimizerError::LineSearchFailed => write!(f, "Line search failed to find valid step"),
            MinimizerError::LinearSystemSingular => write!(f, "Linear system is singular"),
            MinimizerError::OutOfBounds { index, value } => write!(
                f,
                "Initial point is outside the bounds at index {} (value {})",
                index, value
            ),
            MinimizerError::UnsupportedMethod(name) => write!(
                f,
                "{} cannot be used as an inner solver for box-constrained minimization",
                name
            ),
        }
    }
}

impl std::error::Error for MinimizerError {}

use thiserror::Error;

/// Failures raised by the contraction dispatcher and the amplitude engine.
///
/// None of these are recovered internally; they abort the current operation
/// and leave the engine state untouched.
#[derive(Debug, Error)]
pub enum CCError {
    /// Operand rank or a shared label's extent disagrees with the contraction.
    #[error("shape mismatch in contraction `{spec}`: {detail}")]
    ShapeMismatch { spec: String, detail: String },

    /// The contraction specification cannot be executed as a two-operand contraction.
    #[error("invalid contraction `{spec}`: {reason}")]
    InvalidContraction { spec: String, reason: String },

    /// A block accessor received a label string of wrong length or with characters outside `{o, v}`.
    #[error("invalid block label `{labels}`: expected {expected} characters from {{o, v}}")]
    InvalidLabel { labels: String, expected: usize },

    /// Estimated integral footprint exceeds the configured memory budget.
    #[error("estimated memory utilization ({required_gb:.2} GB) exceeds the configured limit of {limit_gb:.2} GB")]
    ResourceLimitExceeded { required_gb: f64, limit_gb: f64 },

    /// External reference data are inconsistent with each other.
    #[error("invalid reference data: {0}")]
    InvalidReference(String),
}

use thiserror::Error;

/// Failure categories raised by the simulation core.
///
/// Core operations return [`anyhow::Result`]; these variants travel inside the
/// `anyhow::Error` so a driver can recover the category with `downcast_ref`.
/// None of them is recoverable within a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// Configuration value the core cannot interpret.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Caller passed an argument outside the accepted domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A computation would divide by zero or sample from an empty distribution.
    #[error("arithmetic degenerate: {0}")]
    ArithmeticDegenerate(String),

    /// Population state no longer satisfies its structural invariants.
    #[error("population invariant violated: {0}")]
    InvariantViolation(String),
}

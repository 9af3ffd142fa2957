//! Validation errors raised before integration starts.

use thiserror::Error;

use crate::options::{JacobianMode, LinearSolver};

/// Configuration and schedule errors.
///
/// These are raised synchronously while constructing a driver or while
/// validating a solve request, before the first step is taken. Integration
/// failures are not represented here; they surface as a negative
/// [`crate::status::Status`] on the returned solution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("unsupported linear solver {0:?} for this back-end")]
    UnsupportedLinearSolver(LinearSolver),
    #[error("unsupported jacobian mode {0:?} for this back-end")]
    UnsupportedJacobian(JacobianMode),
    #[error("t_eval must contain at least two points (got {0})")]
    EvalScheduleTooShort(usize),
    #[error("t_eval must be finite and strictly increasing")]
    EvalScheduleNotIncreasing,
    #[error("t_interp must be strictly increasing and lie within [t0, t_end]")]
    InterpScheduleInvalid,
    #[error("initial state has length {got}, expected {expected}")]
    InitialStateLength { got: usize, expected: usize },
    #[error("inputs vector has length {got}, expected {expected}")]
    InputsLength { got: usize, expected: usize },
    #[error("absolute tolerance vector has length {got}, expected {expected}")]
    AtolLength { got: usize, expected: usize },
    #[error("differential mask has length {got}, expected {expected}")]
    MaskLength { got: usize, expected: usize },
    #[error("hermite output requires the full-state layout, not outputs-only")]
    HermiteWithOutputs,
    #[error("outputs-only sensitivities need one dvar_dy and one dvar_dp expression per output")]
    MissingOutputDerivatives,
    #[error("back-end rejected configuration (status {0})")]
    Backend(i32),
}

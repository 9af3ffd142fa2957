//! Convenient prelude: the commonly used traits, types, and entry points.
//!
//! Bring this into scope with:
//!
//! ```rust
//! use dae_ivp::prelude::*;
//! ```

pub use crate::{
    bdf::BdfDae,
    driver::{create_driver, perturb_time, StepDriver},
    error::Error,
    expression::{Expression, ExpressionSet},
    guard::NoProgressGuard,
    integrator::{DaeIntegrator, InitMode, IntegratorStats, StepFlag, StepOutcome},
    options::{JacobianMode, LinearSolver, Preconditioner, SetupOptions, SolverOptions},
    solution::SolutionData,
    status::Status,
    Float,
};

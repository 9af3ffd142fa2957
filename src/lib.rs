//! dae-ivp: a stepping driver for stiff, parameterised, index-1 DAE systems.
//!
//! This crate integrates implicit differential-algebraic systems
//! `F(t, y, y') = 0` over a user-supplied time window while optionally
//! propagating forward sensitivities `S_i = ∂y/∂p_i` and detecting
//! zero-crossings of user-supplied event functions.
//!
//! Highlights
//! - Consistent initial-condition correction (implicit solve, or an analytic
//!   shortcut for pure ODE systems)
//! - Adaptive BDF stepping with exact halts on every `t_eval` point
//! - Three snapshot schedules: forced stop-times, dense-output interpolation
//!   points, and per-step adaptive capture
//! - Optional user-defined output expressions in place of the full state,
//!   with parametric sensitivities via the chain rule
//! - Optional derivative snapshots (`y'`) for Hermite reconstruction
//!
//! Quick start
//! ```rust,no_run
//! use std::sync::Arc;
//! use dae_ivp::prelude::*;
//!
//! struct Decay;
//!
//! impl ExpressionSet for Decay {
//!     fn n_states(&self) -> usize { 1 }
//!     fn n_inputs(&self) -> usize { 0 }
//!     fn n_events(&self) -> usize { 0 }
//!     fn rhs_alg(&self, _t: f64, y: &[f64], _inputs: &[f64], out: &mut [f64]) {
//!         out[0] = -y[0];
//!     }
//!     fn mass_action(&self, v: &[f64], out: &mut [f64]) {
//!         out[0] = v[0];
//!     }
//!     fn events(&self, _t: f64, _y: &[f64], _inputs: &[f64], _out: &mut [f64]) {}
//! }
//!
//! fn main() {
//!     let setup = SetupOptions::builder().build();
//!     let solver = SolverOptions::builder().calc_ic(false).build();
//!     let mut driver = create_driver(
//!         Arc::new(Decay),
//!         1e-8,
//!         vec![1e-10],
//!         0,
//!         vec![1.0],
//!         setup,
//!         solver,
//!     )
//!     .unwrap();
//!
//!     let sol = driver
//!         .solve(&[0.0, 1.0, 2.0], &[], &[1.0], &[-1.0], &[], false, false)
//!         .unwrap();
//!     for i in 0..sol.len() {
//!         println!("t = {:.3}, y = {:?}", sol.t()[i], sol.y_row(i));
//!     }
//! }
//! ```
//!
//! The driver sits on top of an opaque [`integrator::DaeIntegrator`]
//! back-end. A reference BDF implementation is provided in [`bdf`]; the trait
//! keeps the driver testable against a scripted mock and isolates it from any
//! particular native integrator.

pub mod bdf;
pub mod driver;
pub mod error;
pub mod expression;
pub mod guard;
pub mod integrator;
pub mod options;
pub mod prelude;
pub mod recorder;
pub mod solution;
pub mod stager;
pub mod status;

/// Floating point type used throughout the crate.
pub type Float = f64;

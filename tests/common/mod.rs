//! Shared problem definitions for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use dae_ivp::prelude::*;

/// y' = -y, y(0) = 1 -> y = exp(-t).
pub struct Decay;

impl ExpressionSet for Decay {
    fn n_states(&self) -> usize {
        1
    }
    fn n_inputs(&self) -> usize {
        0
    }
    fn n_events(&self) -> usize {
        0
    }
    fn rhs_alg(&self, _t: Float, y: &[Float], _inputs: &[Float], out: &mut [Float]) {
        out[0] = -y[0];
    }
    fn mass_action(&self, v: &[Float], out: &mut [Float]) {
        out[0] = v[0];
    }
    fn events(&self, _t: Float, _y: &[Float], _inputs: &[Float], _out: &mut [Float]) {}
}

/// y' = -k y with k = inputs[0]; S = dy/dk = -t exp(-k t).
pub struct ParamDecay;

impl ExpressionSet for ParamDecay {
    fn n_states(&self) -> usize {
        1
    }
    fn n_inputs(&self) -> usize {
        1
    }
    fn n_events(&self) -> usize {
        0
    }
    fn rhs_alg(&self, _t: Float, y: &[Float], inputs: &[Float], out: &mut [Float]) {
        out[0] = -inputs[0] * y[0];
    }
    fn mass_action(&self, v: &[Float], out: &mut [Float]) {
        out[0] = v[0];
    }
    fn events(&self, _t: Float, _y: &[Float], _inputs: &[Float], _out: &mut [Float]) {}
}

/// y1' = y2 with the constraint y1 + y2 = 1; algebraic mask [1, 0].
/// Solution from y1(0) = 0: y1 = 1 - exp(-t).
pub struct TwoStateDae;

impl ExpressionSet for TwoStateDae {
    fn n_states(&self) -> usize {
        2
    }
    fn n_inputs(&self) -> usize {
        0
    }
    fn n_events(&self) -> usize {
        0
    }
    fn rhs_alg(&self, _t: Float, y: &[Float], _inputs: &[Float], out: &mut [Float]) {
        out[0] = y[1];
        out[1] = 1.0 - y[0] - y[1];
    }
    fn mass_action(&self, v: &[Float], out: &mut [Float]) {
        out[0] = v[0];
        out[1] = 0.0;
    }
    fn events(&self, _t: Float, _y: &[Float], _inputs: &[Float], _out: &mut [Float]) {}
}

/// Harmonic oscillator y1' = y2, y2' = -y1 with an event at y1 = 0.
/// From (1, 0) the first root is at t = pi/2.
pub struct Oscillator;

impl ExpressionSet for Oscillator {
    fn n_states(&self) -> usize {
        2
    }
    fn n_inputs(&self) -> usize {
        0
    }
    fn n_events(&self) -> usize {
        1
    }
    fn rhs_alg(&self, _t: Float, y: &[Float], _inputs: &[Float], out: &mut [Float]) {
        out[0] = y[1];
        out[1] = -y[0];
    }
    fn mass_action(&self, v: &[Float], out: &mut [Float]) {
        out[0] = v[0];
        out[1] = v[1];
    }
    fn events(&self, _t: Float, y: &[Float], _inputs: &[Float], out: &mut [Float]) {
        out[0] = y[0];
    }
}

/// y' = 1, y(0) = 0.
pub struct Ramp;

impl ExpressionSet for Ramp {
    fn n_states(&self) -> usize {
        1
    }
    fn n_inputs(&self) -> usize {
        0
    }
    fn n_events(&self) -> usize {
        0
    }
    fn rhs_alg(&self, _t: Float, _y: &[Float], _inputs: &[Float], out: &mut [Float]) {
        out[0] = 1.0;
    }
    fn mass_action(&self, v: &[Float], out: &mut [Float]) {
        out[0] = v[0];
    }
    fn events(&self, _t: Float, _y: &[Float], _inputs: &[Float], _out: &mut [Float]) {}
}

/// Scalar output expression f = y0^2.
pub struct Square;

impl Expression for Square {
    fn call(&self, _t: Float, y: &[Float], _inputs: &[Float], out: &mut [Float]) {
        out[0] = y[0] * y[0];
    }
    fn nnz_out(&self) -> usize {
        1
    }
    fn out_shape(&self, _d: usize) -> usize {
        1
    }
    fn rows(&self) -> &[usize] {
        &[0]
    }
    fn cols(&self) -> &[usize] {
        &[0]
    }
}

/// Decay with the single output f = y^2 instead of the full state.
pub struct SquaredDecayOutput {
    vars: Vec<Box<dyn Expression>>,
}

impl SquaredDecayOutput {
    pub fn new() -> Self {
        Self {
            vars: vec![Box::new(Square)],
        }
    }
}

impl ExpressionSet for SquaredDecayOutput {
    fn n_states(&self) -> usize {
        1
    }
    fn n_inputs(&self) -> usize {
        0
    }
    fn n_events(&self) -> usize {
        0
    }
    fn rhs_alg(&self, _t: Float, y: &[Float], _inputs: &[Float], out: &mut [Float]) {
        out[0] = -y[0];
    }
    fn mass_action(&self, v: &[Float], out: &mut [Float]) {
        out[0] = v[0];
    }
    fn events(&self, _t: Float, _y: &[Float], _inputs: &[Float], _out: &mut [Float]) {}
    fn var_fcns(&self) -> &[Box<dyn Expression>] {
        &self.vars
    }
}

/// Driver over the reference back-end with tight tolerances.
pub fn tight_driver<E: ExpressionSet>(
    sys: Arc<E>,
    n_params: usize,
    mask: Vec<Float>,
    solver_opts: SolverOptions,
) -> StepDriver<BdfDae<E>, E> {
    let n = sys.n_states();
    create_driver(
        sys,
        1e-8,
        vec![1e-10; n],
        n_params,
        mask,
        SetupOptions::default(),
        solver_opts,
    )
    .unwrap()
}

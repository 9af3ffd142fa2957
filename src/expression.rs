//! Contracts for the user-supplied expression machinery.
//!
//! The driver and the back-end treat residuals, events and output
//! expressions as opaque callables behind these traits. One implementation
//! exists per expression back-end (a symbolic AD library, compiled kernels,
//! plain closures in tests); the driver never inspects internals.

use crate::Float;

/// A single compiled expression.
///
/// Sparse outputs are described by parallel `rows()`/`cols()` index slices of
/// length `nnz_out()`.
pub trait Expression {
    /// Evaluate into `out`, which must hold at least `nnz_out()` entries.
    fn call(&self, t: Float, y: &[Float], inputs: &[Float], out: &mut [Float]);

    /// Number of structurally nonzero entries produced by `call`.
    fn nnz_out(&self) -> usize;

    /// Extent of output dimension `d`.
    fn out_shape(&self, d: usize) -> usize;

    /// Row index of each nonzero entry.
    fn rows(&self) -> &[usize];

    /// Column index of each nonzero entry.
    fn cols(&self) -> &[usize];
}

/// The full set of expressions describing one DAE system.
///
/// The system is written in the semi-explicit form
/// `F(t, y, y') = rhs_alg(t, y) - M·y'` with a diagonal 0/1 mass matrix, so
/// `rhs_alg` stacks the differential right-hand sides over the algebraic
/// constraints and `mass_action` zeroes the algebraic rows.
pub trait ExpressionSet {
    fn n_states(&self) -> usize;

    /// Length of the scalar parameter vector consumed by the expressions.
    fn n_inputs(&self) -> usize;

    /// Number of event (root) functions.
    fn n_events(&self) -> usize;

    /// Combined right-hand-side / algebraic expression.
    fn rhs_alg(&self, t: Float, y: &[Float], inputs: &[Float], out: &mut [Float]);

    /// Mass-matrix action `out = M·v`.
    fn mass_action(&self, v: &[Float], out: &mut [Float]);

    /// Event expressions; `out` holds `n_events()` values.
    fn events(&self, t: Float, y: &[Float], inputs: &[Float], out: &mut [Float]);

    /// Output expressions. Empty when the solver returns the full state.
    fn var_fcns(&self) -> &[Box<dyn Expression>] {
        &[]
    }

    /// `∂(output)/∂y` as sparse rows, parallel to `var_fcns`.
    fn dvar_dy_fcns(&self) -> &[Box<dyn Expression>] {
        &[]
    }

    /// Explicit `∂(output)/∂p` as sparse rows, parallel to `var_fcns`.
    fn dvar_dp_fcns(&self) -> &[Box<dyn Expression>] {
        &[]
    }

    /// Implicit residual `F(t, y, y') = rhs_alg(t, y) - M·y'`.
    ///
    /// `scratch` must hold `n_states()` entries.
    fn residual(
        &self,
        t: Float,
        y: &[Float],
        yp: &[Float],
        inputs: &[Float],
        out: &mut [Float],
        scratch: &mut [Float],
    ) {
        self.rhs_alg(t, y, inputs, out);
        self.mass_action(yp, scratch);
        for (o, s) in out.iter_mut().zip(scratch.iter()) {
            *o -= *s;
        }
    }
}

//! Consistent initial-condition solves for the reference back-end.
//!
//! Given user-supplied (y0, yp0) that need not satisfy `F(t0, y0, yp0) = 0`,
//! Newton-iterate on a subset of the unknowns until the residual vanishes.
//! The subset depends on the mode: fix the differential components of y and
//! solve for the algebraic components plus all of y', or solve for all of y
//! with y' held fixed.

use crate::{
    expression::ExpressionSet,
    integrator::InitMode,
    options::SolverOptions,
    status::Status,
    Float,
};

use super::newton::{error_weights, lu_solve, wrms_norm};

/// One Newton unknown: either a state component or a derivative component.
#[derive(Clone, Copy)]
enum Unknown {
    State(usize),
    Derivative(usize),
}

pub(crate) fn solve_consistent_ic<E: ExpressionSet>(
    functions: &E,
    inputs: &[Float],
    id_mask: &[Float],
    mode: InitMode,
    t: Float,
    y: &mut [Float],
    yp: &mut [Float],
    rtol: Float,
    atol: &[Float],
    opts: &SolverOptions,
) -> Result<(), Status> {
    let n = functions.n_states();
    let unknowns: Vec<Unknown> = match mode {
        InitMode::YaYdpInit => (0..n)
            .map(|i| {
                if id_mask[i] > 0.5 {
                    Unknown::Derivative(i)
                } else {
                    Unknown::State(i)
                }
            })
            .collect(),
        InitMode::YInit => (0..n).map(Unknown::State).collect(),
    };

    let mut res = vec![0.0; n];
    let mut res_pert = vec![0.0; n];
    let mut scratch = vec![0.0; n];
    let mut jac = vec![0.0; n * n];
    let mut delta = vec![0.0; n];
    let mut w = vec![0.0; n];
    error_weights(y, rtol, atol, &mut w);

    let sqrt_eps = Float::EPSILON.sqrt();

    for _ in 0..opts.max_num_iterations_ic.max(1) {
        functions.residual(t, y, yp, inputs, &mut res, &mut scratch);

        // Forward-difference Jacobian with respect to the unknowns.
        for (j, unknown) in unknowns.iter().enumerate() {
            let slot = match *unknown {
                Unknown::State(i) => &mut y[i],
                Unknown::Derivative(i) => &mut yp[i],
            };
            let base = *slot;
            let sig = sqrt_eps * (base.abs() + 1.0);
            *slot = base + sig;
            functions.residual(t, y, yp, inputs, &mut res_pert, &mut scratch);
            let slot = match *unknown {
                Unknown::State(i) => &mut y[i],
                Unknown::Derivative(i) => &mut yp[i],
            };
            *slot = base;
            for i in 0..n {
                jac[i * n + j] = (res_pert[i] - res[i]) / sig;
            }
        }

        for i in 0..n {
            delta[i] = -res[i];
        }
        lu_solve(&mut jac, &mut delta, n)?;

        for (j, unknown) in unknowns.iter().enumerate() {
            match *unknown {
                Unknown::State(i) => y[i] += delta[j],
                Unknown::Derivative(i) => yp[i] += delta[j],
            }
        }

        if wrms_norm(&delta, &w) <= opts.nonlinear_convergence_coefficient_ic {
            return Ok(());
        }
    }

    Err(Status::ConvFail)
}

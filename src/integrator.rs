//! The opaque nonlinear DAE integrator contract.
//!
//! The stepping driver coordinates schedules, events and reinitialisation on
//! top of these primitives; everything below them (step-size control, the
//! nonlinear corrector, the linear solver) is a black box. A reference
//! implementation lives in [`crate::bdf`]; tests drive the state machine
//! with a scripted mock.

use crate::{options::SolverOptions, status::Status, Float};

/// Classification of a successful `step_one` return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFlag {
    /// An ordinary internal step completed.
    Success,
    /// The step landed exactly on the active stop-time.
    StopReturn,
    /// An event function crossed zero within the step.
    RootReturn,
}

impl StepFlag {
    pub fn status(self) -> Status {
        match self {
            StepFlag::Success => Status::Success,
            StepFlag::StopReturn => Status::StopReturn,
            StepFlag::RootReturn => Status::RootReturn,
        }
    }
}

/// Result of one successful internal step.
#[derive(Debug, Clone, Copy)]
pub struct StepOutcome {
    /// Time reached by the step (the root time for [`StepFlag::RootReturn`]).
    pub t: Float,
    pub flag: StepFlag,
}

/// Consistent-initial-condition mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitMode {
    /// Fix the differential components of y, solve for the algebraic
    /// components and all of y'.
    YaYdpInit,
    /// Solve for all of y, keeping y' fixed.
    YInit,
}

/// Counters accumulated by a back-end across reinitialisations.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegratorStats {
    pub n_steps: u64,
    pub n_res_evals: u64,
    pub n_lin_setups: u64,
    pub n_err_test_fails: u64,
    pub n_nonlin_iters: u64,
    pub n_nonlin_conv_fails: u64,
    pub n_root_evals: u64,
    /// Order used on the last step.
    pub last_order: usize,
    pub last_step: Float,
    pub current_step: Float,
    pub current_time: Float,
}

/// Opaque back-end advancing an implicit DAE `F(t, y, y') = 0`.
///
/// Working vectors are owned by the caller and passed into every primitive,
/// mirroring the native integrator's call shape. After a successful call the
/// slices reflect the state at the reported time. `get_dky` is only valid
/// for times within the last completed step.
pub trait DaeIntegrator {
    /// (Re-)prime the integrator at `t` with the given state, discarding any
    /// accumulated step history. An active stop-time survives the call.
    fn reinit(&mut self, t: Float, y: &[Float], yp: &[Float]) -> Result<(), Status>;

    /// Re-prime the sensitivity solution (`n_params` vectors each).
    fn sens_reinit(&mut self, s: &[Vec<Float>], sp: &[Vec<Float>]) -> Result<(), Status>;

    /// Provide the scalar parameter vector consumed by the residual.
    fn set_inputs(&mut self, inputs: &[Float]);

    /// Differential-variable mask (1 differential, 0 algebraic).
    fn set_id(&mut self, mask: &[Float]) -> Result<(), Status>;

    /// Halt exactly on `tstop` instead of stepping past it.
    fn set_stop_time(&mut self, tstop: Float) -> Result<(), Status>;

    /// Apply integration tunables. May be called repeatedly.
    fn apply_options(&mut self, opts: &SolverOptions) -> Result<(), Status>;

    /// Correct (y, y') to a mutually consistent pair at the current time.
    /// `t_next` must lie strictly beyond the current time; it orients the
    /// solve.
    fn calc_ic(
        &mut self,
        mode: InitMode,
        t_next: Float,
        y: &mut [Float],
        yp: &mut [Float],
    ) -> Result<(), Status>;

    /// Advance by one internal step toward `t_end` (one-step semantics).
    fn step_one(
        &mut self,
        t_end: Float,
        y: &mut [Float],
        yp: &mut [Float],
    ) -> Result<StepOutcome, Status>;

    /// Interpolate the `k`-th derivative (k ∈ {0, 1}) of the solution at `t`
    /// within the last completed step.
    fn get_dky(&self, t: Float, k: usize, out: &mut [Float]) -> Result<(), Status>;

    /// Interpolate the `k`-th derivative of the sensitivity vectors at `t`
    /// within the last completed step.
    fn get_sens_dky(&self, t: Float, k: usize, out: &mut [Vec<Float>]) -> Result<(), Status>;

    /// Statistics accumulated since construction.
    fn stats(&self) -> IntegratorStats;
}

//! The stepping driver: consistent initialisation, adaptive stepping over
//! forced stop-times, the three snapshot schedules, root events, stall
//! detection and result assembly.

use std::sync::Arc;

use log::debug;

use crate::{
    bdf::BdfDae,
    error::Error,
    expression::ExpressionSet,
    guard::NoProgressGuard,
    integrator::{DaeIntegrator, InitMode, StepFlag},
    options::{SetupOptions, SolverOptions},
    recorder::StepRecorder,
    solution::SolutionData,
    stager::OutputStager,
    status::Status,
    Float,
};

/// Nudge `t` strictly forward (or backward for decreasing time). The
/// relative term guarantees progress away from zero, the absolute term
/// covers `t == 0`.
pub fn perturb_time(t: Float, increasing: bool) -> Float {
    let delta = Float::EPSILON.sqrt();
    let sign = if increasing { 1.0 } else { -1.0 };
    (1.0 + delta) * t + delta * sign
}

/// Build a driver over the reference BDF back-end.
///
/// `atol` has one entry per state; `differential_mask` marks differential
/// variables with 1 and algebraic variables with 0.
pub fn create_driver<E: ExpressionSet>(
    functions: Arc<E>,
    rel_tol: Float,
    atol: Vec<Float>,
    n_params: usize,
    differential_mask: Vec<Float>,
    setup_opts: SetupOptions,
    solver_opts: SolverOptions,
) -> Result<StepDriver<BdfDae<E>, E>, Error> {
    let integrator = BdfDae::new(Arc::clone(&functions), rel_tol, atol, n_params, &setup_opts)?;
    StepDriver::new(
        integrator,
        functions,
        n_params,
        differential_mask,
        setup_opts,
        solver_opts,
    )
}

/// One driver owns one trajectory: the back-end session, the working
/// vectors, and the snapshot machinery. Fan-out across parameter sets is a
/// plain map over independent drivers.
pub struct StepDriver<I: DaeIntegrator, E: ExpressionSet> {
    integrator: I,
    functions: Arc<E>,
    #[allow(dead_code)]
    setup_opts: SetupOptions,
    solver_opts: SolverOptions,
    guard: NoProgressGuard,
    recorder: StepRecorder,
    stager: OutputStager,
    n_states: usize,
    n_params: usize,
    sensitivity: bool,
    save_outputs_only: bool,
    save_hermite: bool,
    is_ode: bool,

    // Working vectors; after each back-end call they reflect the state at
    // the reported time.
    y_val: Vec<Float>,
    yp_val: Vec<Float>,
    ys_val: Vec<Vec<Float>>,
    yps_val: Vec<Vec<Float>>,
    y_cache: Vec<Float>,
    res_scratch: Vec<Float>,

    // Interpolation scratch, kept separate so catch-up never clobbers the
    // working vectors.
    y_int: Vec<Float>,
    yp_int: Vec<Float>,
    ys_int: Vec<Vec<Float>>,
    yps_int: Vec<Vec<Float>>,
}

impl<I: DaeIntegrator, E: ExpressionSet> StepDriver<I, E> {
    pub fn new(
        mut integrator: I,
        functions: Arc<E>,
        n_params: usize,
        differential_mask: Vec<Float>,
        setup_opts: SetupOptions,
        solver_opts: SolverOptions,
    ) -> Result<Self, Error> {
        let n = functions.n_states();
        if differential_mask.len() != n {
            return Err(Error::MaskLength {
                got: differential_mask.len(),
                expected: n,
            });
        }
        let sensitivity = n_params > 0;
        let save_outputs_only = !functions.var_fcns().is_empty();
        let save_hermite = solver_opts.save_hermite;
        if save_hermite && save_outputs_only {
            return Err(Error::HermiteWithOutputs);
        }
        if save_outputs_only && sensitivity {
            let nv = functions.var_fcns().len();
            if functions.dvar_dy_fcns().len() != nv || functions.dvar_dp_fcns().len() != nv {
                return Err(Error::MissingOutputDerivatives);
            }
        }

        // The mask tolerates values that are not exactly 1.
        let mut is_ode = n > 0;
        for &m in &differential_mask {
            is_ode &= m > 0.999;
        }

        integrator
            .set_id(&differential_mask)
            .map_err(|s| Error::Backend(s.code()))?;

        let stager = OutputStager::new(&*functions, n_params);
        let recorder = StepRecorder::new(
            stager.length_of_return_vector(),
            n_params,
            sensitivity,
            save_hermite,
        );
        let guard = NoProgressGuard::new(
            solver_opts.no_progress_window_size,
            solver_opts.no_progress_threshold,
        );

        let zeros = || vec![0.0; n];
        let sens = || vec![vec![0.0; n]; n_params];
        Ok(Self {
            integrator,
            functions,
            setup_opts,
            solver_opts,
            guard,
            recorder,
            stager,
            n_states: n,
            n_params,
            sensitivity,
            save_outputs_only,
            save_hermite,
            is_ode,
            y_val: zeros(),
            yp_val: zeros(),
            ys_val: sens(),
            yps_val: sens(),
            y_cache: zeros(),
            res_scratch: zeros(),
            y_int: zeros(),
            yp_int: zeros(),
            ys_int: sens(),
            yps_int: sens(),
        })
    }

    /// Re-apply integration tunables. A change of the Hermite flag rebuilds
    /// the recorder layout; structural ([`SetupOptions`]) changes require a
    /// fresh driver.
    pub fn set_solver_options(&mut self, opts: SolverOptions) -> Result<(), Error> {
        if opts.save_hermite != self.save_hermite {
            if opts.save_hermite && self.save_outputs_only {
                return Err(Error::HermiteWithOutputs);
            }
            self.save_hermite = opts.save_hermite;
            self.recorder = StepRecorder::new(
                self.stager.length_of_return_vector(),
                self.n_params,
                self.sensitivity,
                self.save_hermite,
            );
        }
        self.solver_opts = opts;
        Ok(())
    }

    pub fn is_ode(&self) -> bool {
        self.is_ode
    }

    /// Integrate over `t_eval`, capturing snapshots per the three schedules.
    ///
    /// `y0` and `yp0` are packed as the base state followed by one
    /// sensitivity block per parameter. Configuration and schedule errors
    /// are returned as `Err` before any stepping; integration failures
    /// return `Ok` with a negative status flag and the partial trajectory.
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &mut self,
        t_eval: &[Float],
        t_interp: &[Float],
        y0: &[Float],
        yp0: &[Float],
        inputs: &[Float],
        save_adaptive_steps: bool,
        save_interp_steps: bool,
    ) -> Result<SolutionData, Error> {
        self.validate_request(t_eval, t_interp, y0, yp0, inputs)?;
        debug!(
            "solve over [{}, {}] with {} eval / {} interp points",
            t_eval[0],
            t_eval[t_eval.len() - 1],
            t_eval.len(),
            t_interp.len()
        );

        let n = self.n_states;
        let number_of_evals = t_eval.len();
        let number_of_interps = t_interp.len();

        if self.recorder.capacity() < number_of_evals + number_of_interps {
            self.recorder.reserve(number_of_evals + number_of_interps);
        }
        self.recorder.reset();

        let t0 = t_eval[0];
        let tf = t_eval[number_of_evals - 1];
        let mut t_val = t0;
        let mut t_prev = t0;

        let save_interp = save_interp_steps && number_of_interps > 0;
        let mut i_interp = 0usize;

        // Unpack the base state and the per-parameter sensitivity blocks.
        self.y_val.copy_from_slice(&y0[..n]);
        self.yp_val.copy_from_slice(&yp0[..n]);
        for p in 0..self.n_params {
            let start = (p + 1) * n;
            self.ys_val[p].copy_from_slice(&y0[start..start + n]);
            self.yps_val[p].copy_from_slice(&yp0[start..start + n]);
        }

        self.integrator.set_inputs(inputs);
        self.integrator
            .apply_options(&self.solver_opts)
            .map_err(|s| Error::Backend(s.code()))?;
        self.guard = NoProgressGuard::new(
            self.solver_opts.no_progress_window_size,
            self.solver_opts.no_progress_threshold,
        );

        // Prepare the first stop time.
        let mut i_eval = 1usize;
        let mut t_eval_next = t_eval[i_eval];

        // Consistent initialization.
        self.reinitialize(t0).map_err(|s| Error::Backend(s.code()))?;
        let init_mode = if self.solver_opts.init_all_y_ic {
            InitMode::YInit
        } else {
            InitMode::YaYdpInit
        };
        if self.solver_opts.calc_ic {
            self.consistent_initialization(t0, t_eval_next, init_mode, inputs);
        }

        if self.sensitivity {
            self.integrator
                .get_sens_dky(t_val, 0, &mut self.ys_val)
                .map_err(|s| Error::Backend(s.code()))?;
        }

        // Store the consistent initialization.
        self.record_current(inputs, t_val);

        self.integrator
            .set_stop_time(t_eval_next)
            .map_err(|s| Error::Backend(s.code()))?;

        let mut retval;

        loop {
            // Progress one step.
            let outcome = match self.integrator.step_one(tf, &mut self.y_val, &mut self.yp_val) {
                Ok(outcome) => outcome,
                Err(status) => {
                    retval = status;
                    break;
                }
            };
            t_val = outcome.t;
            retval = outcome.flag.status();

            if t_prev == t_val {
                // The back-end can return an identical time point twice
                // instead of erroring. Synthesise the stall.
                retval = Status::ErrFail;
                break;
            }

            self.guard.add_dt(t_val - t_prev);
            if self.guard.violated() {
                debug!("no-progress guard tripped at t = {t_val}");
                retval = Status::ErrFail;
                break;
            }

            let hit_tinterp =
                save_interp && i_interp < number_of_interps && t_interp[i_interp] >= t_prev;
            let hit_teval = outcome.flag == StepFlag::StopReturn;
            let hit_final_time = t_val >= tf || (hit_teval && i_eval + 1 == number_of_evals);
            let hit_event = outcome.flag == StepFlag::RootReturn;
            let hit_adaptive = save_adaptive_steps && outcome.flag == StepFlag::Success;

            if self.sensitivity {
                if let Err(status) = self.integrator.get_sens_dky(t_val, 0, &mut self.ys_val) {
                    retval = status;
                    break;
                }
                if self.save_hermite {
                    if let Err(status) = self.integrator.get_sens_dky(t_val, 1, &mut self.yps_val)
                    {
                        retval = status;
                        break;
                    }
                }
            }

            if hit_tinterp {
                // Save the interpolated state at t_prev < t <= t_val for all
                // pending points of t_interp.
                if let Err(status) = self.catch_up_interp(t_interp, t_val, &mut i_interp, inputs)
                {
                    retval = status;
                    break;
                }
            }

            if hit_adaptive || hit_teval || hit_event {
                if hit_tinterp {
                    // Reset the states and sensitivities at t = t_val.
                    if let Err(status) = self.integrator.get_dky(t_val, 0, &mut self.y_val) {
                        retval = status;
                        break;
                    }
                    if self.sensitivity {
                        if let Err(status) =
                            self.integrator.get_sens_dky(t_val, 0, &mut self.ys_val)
                        {
                            retval = status;
                            break;
                        }
                    }
                }

                // Save the current state at t_val; adaptive writes past the
                // reservation grow the buffers by one.
                self.record_current(inputs, t_val);
            }

            if hit_final_time || hit_event {
                break;
            } else if hit_teval {
                // Set the next stop time.
                i_eval += 1;
                t_eval_next = t_eval[i_eval];
                if let Err(status) = self.integrator.set_stop_time(t_eval_next) {
                    retval = status;
                    break;
                }

                // Reinitialize to absorb the discontinuity implied by the
                // forced stop at t = t_val.
                if let Err(status) = self.reinitialize(t_val) {
                    retval = status;
                    break;
                }
                self.consistent_initialization(t_val, t_eval_next, InitMode::YaYdpInit, inputs);
            }

            t_prev = t_val;
        }

        // Terminal raw state slice so outputs-only consumers can restart.
        let y_term = if self.save_outputs_only {
            Some(self.y_val[..n].to_vec())
        } else {
            None
        };

        if self.solver_opts.print_stats {
            self.print_stats();
        }

        Ok(SolutionData::assemble(
            retval,
            &self.recorder,
            self.n_params,
            self.stager.length_of_return_vector(),
            self.save_outputs_only,
            self.save_hermite,
            y_term,
        ))
    }

    fn validate_request(
        &self,
        t_eval: &[Float],
        t_interp: &[Float],
        y0: &[Float],
        yp0: &[Float],
        inputs: &[Float],
    ) -> Result<(), Error> {
        if t_eval.len() < 2 {
            return Err(Error::EvalScheduleTooShort(t_eval.len()));
        }
        if !t_eval[0].is_finite() {
            return Err(Error::EvalScheduleNotIncreasing);
        }
        for pair in t_eval.windows(2) {
            if !pair[1].is_finite() || pair[1] <= pair[0] {
                return Err(Error::EvalScheduleNotIncreasing);
            }
        }
        let t0 = t_eval[0];
        let tf = t_eval[t_eval.len() - 1];
        let mut prev: Option<Float> = None;
        for &ti in t_interp {
            if !ti.is_finite() || ti < t0 || ti > tf || prev.is_some_and(|p| ti <= p) {
                return Err(Error::InterpScheduleInvalid);
            }
            prev = Some(ti);
        }
        let expected = self.n_states * (1 + self.n_params);
        if y0.len() != expected {
            return Err(Error::InitialStateLength {
                got: y0.len(),
                expected,
            });
        }
        if yp0.len() != expected {
            return Err(Error::InitialStateLength {
                got: yp0.len(),
                expected,
            });
        }
        let expected_inputs = self.functions.n_inputs();
        if inputs.len() != expected_inputs {
            return Err(Error::InputsLength {
                got: inputs.len(),
                expected: expected_inputs,
            });
        }
        Ok(())
    }

    /// Re-prime the back-end at `t_val` with the current working vectors.
    fn reinitialize(&mut self, t_val: Float) -> Result<(), Status> {
        self.integrator.reinit(t_val, &self.y_val, &self.yp_val)?;
        if self.sensitivity {
            self.integrator.sens_reinit(&self.ys_val, &self.yps_val)?;
        }
        Ok(())
    }

    /// Select the consistent-initialisation strategy. The IC solve is
    /// best-effort: a failure leaves the supplied values in place and the
    /// step loop surfaces any real inconsistency.
    fn consistent_initialization(
        &mut self,
        t_val: Float,
        t_next: Float,
        mode: InitMode,
        inputs: &[Float],
    ) {
        if self.is_ode && mode == InitMode::YaYdpInit {
            self.consistent_initialization_ode(t_val, inputs);
        } else {
            self.consistent_initialization_dae(t_val, t_next, mode);
        }
    }

    fn consistent_initialization_dae(&mut self, t_val: Float, t_next: Float, mode: InitMode) {
        // The back-end needs a strictly-future time to orient the solve.
        let t_next = if t_next > t_val {
            t_next
        } else {
            perturb_time(t_val, true)
        };
        if let Err(status) =
            self.integrator
                .calc_ic(mode, t_next, &mut self.y_val, &mut self.yp_val)
        {
            debug!(
                "consistent initialisation at t = {t_val} failed with status {}",
                status.code()
            );
        }
    }

    fn consistent_initialization_ode(&mut self, t_val: Float, inputs: &[Float]) {
        // With M = I, the residual of f(t, y) - M*y' at y' = 0 is exactly
        // f(t, y); one evaluation replaces the implicit solve.
        let functions = Arc::clone(&self.functions);
        for v in self.y_cache.iter_mut() {
            *v = 0.0;
        }
        functions.residual(
            t_val,
            &self.y_val,
            &self.y_cache,
            inputs,
            &mut self.yp_val,
            &mut self.res_scratch,
        );
        // Re-prime so the back-end picks up the corrected derivative.
        if let Err(status) = self.reinitialize(t_val) {
            debug!(
                "reinit after the ODE shortcut failed with status {}",
                status.code()
            );
        }
    }

    /// Catch up all pending interpolation points at or before `t_val` using
    /// dense output, without disturbing the working vectors.
    fn catch_up_interp(
        &mut self,
        t_interp: &[Float],
        t_val: Float,
        i_interp: &mut usize,
        inputs: &[Float],
    ) -> Result<(), Status> {
        let functions = Arc::clone(&self.functions);
        while *i_interp < t_interp.len() && t_interp[*i_interp] <= t_val {
            let ti = t_interp[*i_interp];
            self.integrator.get_dky(ti, 0, &mut self.y_int)?;
            if self.save_hermite {
                self.integrator.get_dky(ti, 1, &mut self.yp_int)?;
            }
            if self.sensitivity {
                self.integrator.get_sens_dky(ti, 0, &mut self.ys_int)?;
                if self.save_hermite {
                    self.integrator.get_sens_dky(ti, 1, &mut self.yps_int)?;
                }
            }
            let yp = self.save_hermite.then_some(&self.yp_int[..]);
            let yps = (self.save_hermite && self.sensitivity).then_some(&self.yps_int[..]);
            let snap = self
                .stager
                .stage(&*functions, inputs, ti, &self.y_int, &self.ys_int, yp, yps);
            self.recorder.write(&snap);
            *i_interp += 1;
        }
        Ok(())
    }

    /// Stage and record a snapshot of the current working vectors.
    fn record_current(&mut self, inputs: &[Float], t: Float) {
        let functions = Arc::clone(&self.functions);
        let yp = self.save_hermite.then_some(&self.yp_val[..]);
        let yps = (self.save_hermite && self.sensitivity).then_some(&self.yps_val[..]);
        let snap = self
            .stager
            .stage(&*functions, inputs, t, &self.y_val, &self.ys_val, yp, yps);
        self.recorder.write(&snap);
    }

    fn print_stats(&self) {
        let stats = self.integrator.stats();
        println!("Solver Stats:");
        println!("\tNumber of steps = {}", stats.n_steps);
        println!("\tNumber of calls to residual function = {}", stats.n_res_evals);
        println!("\tNumber of linear solver setup calls = {}", stats.n_lin_setups);
        println!("\tNumber of error test failures = {}", stats.n_err_test_fails);
        println!("\tMethod order used on last step = {}", stats.last_order);
        println!("\tStep size on last step = {}", stats.last_step);
        println!("\tStep size on next step = {}", stats.current_step);
        println!("\tCurrent internal time reached = {}", stats.current_time);
        println!(
            "\tNumber of nonlinear iterations performed = {}",
            stats.n_nonlin_iters
        );
        println!(
            "\tNumber of nonlinear convergence failures = {}",
            stats.n_nonlin_conv_fails
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perturb_time_makes_progress() {
        assert!(perturb_time(0.0, true) > 0.0);
        assert!(perturb_time(1.0, true) > 1.0);
        assert!(perturb_time(1e6, true) > 1e6);
        assert!(perturb_time(0.0, false) < 0.0);
        assert!(perturb_time(-1.0, false) < -1.0);
    }
}

//! End-to-end solves over the reference BDF back-end.

use std::sync::Arc;

use approx::assert_relative_eq;
use dae_ivp::prelude::*;

mod common;
use common::{Decay, Oscillator, ParamDecay, Ramp, SquaredDecayOutput, TwoStateDae, tight_driver};

#[test]
fn linear_decay_hits_every_eval_point() {
    let opts = SolverOptions::builder().calc_ic(false).build();
    let mut driver = tight_driver(Arc::new(Decay), 0, vec![1.0], opts);
    let sol = driver
        .solve(&[0.0, 0.5, 1.0, 2.0], &[], &[1.0], &[-1.0], &[], false, false)
        .unwrap();

    assert!(!sol.flag().is_failure());
    assert_eq!(sol.len(), 4);
    assert_eq!(sol.t(), &[0.0, 0.5, 1.0, 2.0]);
    let expected = [1.0, 0.6065306597, 0.3678794411, 0.1353352832];
    for (i, want) in expected.iter().enumerate() {
        assert_relative_eq!(sol.y_row(i)[0], *want, max_relative = 1e-6, epsilon = 1e-8);
    }
    // no sensitivities requested -> empty buffer
    assert!(sol.ys_flat().is_empty());
}

#[test]
fn two_state_dae_with_consistent_init() {
    let opts = SolverOptions::builder().calc_ic(true).build();
    let mut driver = tight_driver(Arc::new(TwoStateDae), 0, vec![1.0, 0.0], opts);
    assert!(!driver.is_ode());
    let sol = driver
        .solve(&[0.0, 1.0], &[], &[0.0, 1.0], &[1.0, 0.0], &[], false, false)
        .unwrap();

    assert!(!sol.flag().is_failure());
    // After IC the algebraic variable satisfies the constraint.
    assert_relative_eq!(sol.y_row(0)[0], 0.0, epsilon = 1e-8);
    assert_relative_eq!(sol.y_row(0)[1], 1.0, epsilon = 1e-8);
    // y1(1) = 1 - exp(-1)
    assert_relative_eq!(sol.y_row(1)[0], 0.6321205588, max_relative = 1e-6, epsilon = 1e-8);
    // the constraint holds at every snapshot
    for i in 0..sol.len() {
        let row = sol.y_row(i);
        assert_relative_eq!(row[0] + row[1], 1.0, epsilon = 1e-6);
    }
}

#[test]
fn oscillator_event_terminates_at_the_root() {
    let opts = SolverOptions::builder().calc_ic(false).build();
    let mut driver = tight_driver(Arc::new(Oscillator), 0, vec![1.0, 1.0], opts);
    let sol = driver
        .solve(
            &[0.0, 10.0],
            &[],
            &[1.0, 0.0],
            &[0.0, -1.0],
            &[],
            false,
            false,
        )
        .unwrap();

    assert_eq!(sol.flag(), Status::RootReturn);
    assert_eq!(sol.flag_code(), 2);
    let t_root = *sol.t().last().unwrap();
    assert_relative_eq!(t_root, std::f64::consts::FRAC_PI_2, epsilon = 1e-5);
    // The final snapshot sits on the root.
    assert_relative_eq!(sol.y_row(sol.len() - 1)[0], 0.0, epsilon = 1e-6);
}

#[test]
fn forced_stops_produce_exactly_the_scheduled_snapshots() {
    let opts = SolverOptions::builder().calc_ic(false).build();
    let mut driver = tight_driver(Arc::new(Ramp), 0, vec![1.0], opts);
    let sol = driver
        .solve(&[0.0, 1.0, 2.0], &[], &[0.0], &[1.0], &[], false, false)
        .unwrap();

    assert!(!sol.flag().is_failure());
    assert_eq!(sol.len(), 3);
    assert_eq!(sol.t(), &[0.0, 1.0, 2.0]);
    for (i, want) in [0.0, 1.0, 2.0].iter().enumerate() {
        assert_relative_eq!(sol.y_row(i)[0], *want, epsilon = 1e-7);
    }
}

#[test]
fn outputs_only_mode_returns_the_output_vector() {
    let opts = SolverOptions::builder().calc_ic(false).build();
    let mut driver = tight_driver(Arc::new(SquaredDecayOutput::new()), 0, vec![1.0], opts);
    let sol = driver
        .solve(&[0.0, 0.5, 1.0, 2.0], &[], &[1.0], &[-1.0], &[], false, false)
        .unwrap();

    assert!(!sol.flag().is_failure());
    assert_eq!(sol.len(), 4);
    assert_eq!(sol.length_of_return_vector(), 1);
    let expected = [1.0, 0.3678794, 0.1353353, 0.0183156];
    for (i, want) in expected.iter().enumerate() {
        assert_relative_eq!(sol.y_row(i)[0], *want, max_relative = 1e-5, epsilon = 1e-7);
    }
    assert!(sol.ys_flat().is_empty());
    // Terminal raw state slice allows restarting from t_end.
    let y_term = sol.y_term().unwrap();
    assert_eq!(sol.length_of_final_sv_slice(), 1);
    assert_relative_eq!(y_term[0], (-2.0f64).exp(), max_relative = 1e-6);
}

#[test]
fn adaptive_mode_keeps_internal_steps() {
    let opts = SolverOptions::builder().calc_ic(false).build();
    let mut driver = tight_driver(Arc::new(Decay), 0, vec![1.0], opts);
    let t_eval = [0.0, 0.5, 1.0, 2.0];
    let sol = driver
        .solve(&t_eval, &[], &[1.0], &[-1.0], &[], true, false)
        .unwrap();

    assert!(!sol.flag().is_failure());
    assert!(sol.len() > t_eval.len());
    // Strictly increasing times; every scheduled point appears once.
    for w in sol.t().windows(2) {
        assert!(w[0] < w[1]);
    }
    for te in t_eval {
        assert_eq!(sol.t().iter().filter(|&&t| t == te).count(), 1);
    }
    // Adaptive snapshots stay accurate too.
    for i in 0..sol.len() {
        assert_relative_eq!(
            sol.y_row(i)[0],
            (-sol.t()[i]).exp(),
            max_relative = 1e-5,
            epsilon = 1e-8
        );
    }
}

#[test]
fn interp_schedule_is_honoured_between_stops() {
    let opts = SolverOptions::builder().calc_ic(false).build();
    let mut driver = tight_driver(Arc::new(Decay), 0, vec![1.0], opts);
    let t_interp = [0.25, 0.75, 1.5];
    let sol = driver
        .solve(
            &[0.0, 1.0, 2.0],
            &t_interp,
            &[1.0],
            &[-1.0],
            &[],
            false,
            true,
        )
        .unwrap();

    assert!(!sol.flag().is_failure());
    assert_eq!(sol.len(), 3 + t_interp.len());
    for w in sol.t().windows(2) {
        assert!(w[0] < w[1]);
    }
    for ti in t_interp {
        let i = sol
            .t()
            .iter()
            .position(|&t| (t - ti).abs() < 1e-12)
            .expect("interpolation point missing from the trajectory");
        assert_relative_eq!(sol.y_row(i)[0], (-ti).exp(), max_relative = 1e-5, epsilon = 1e-8);
    }
}

#[test]
fn hermite_rows_match_the_derivative() {
    let opts = SolverOptions::builder().calc_ic(false).save_hermite(true).build();
    let mut driver = tight_driver(Arc::new(Decay), 0, vec![1.0], opts);
    let sol = driver
        .solve(&[0.0, 0.5, 1.0, 2.0], &[], &[1.0], &[-1.0], &[], false, false)
        .unwrap();

    assert!(sol.save_hermite());
    for i in 0..sol.len() {
        let yp = sol.yp_row(i).expect("hermite rows requested");
        assert_relative_eq!(yp[0], -sol.y_row(i)[0], max_relative = 1e-5, epsilon = 1e-8);
    }
}

#[test]
fn ode_shortcut_recovers_the_derivative_from_the_residual() {
    // The supplied yp0 is wildly inconsistent; the ODE shortcut replaces it
    // with f(t0, y0) in one residual evaluation.
    let opts = SolverOptions::builder().calc_ic(true).save_hermite(true).build();
    let mut driver = tight_driver(Arc::new(Decay), 0, vec![1.0], opts);
    assert!(driver.is_ode());
    let sol = driver
        .solve(&[0.0, 0.5], &[], &[1.0], &[5.0], &[], false, false)
        .unwrap();

    assert!(!sol.flag().is_failure());
    // yp(0) = -y(0) exactly, straight out of the residual evaluation.
    assert_eq!(sol.yp_row(0).unwrap()[0], -1.0);
    assert_relative_eq!(sol.y_row(1)[0], (-0.5f64).exp(), max_relative = 1e-6);
}

#[test]
fn forward_sensitivities_in_full_state_layout() {
    let opts = SolverOptions::builder().calc_ic(false).build();
    let mut driver = tight_driver(Arc::new(ParamDecay), 1, vec![1.0], opts);
    // Packed layout: base state then the parameter-1 block.
    let y0 = [1.0, 0.0];
    let yp0 = [-1.0, -1.0];
    let sol = driver
        .solve(&[0.0, 0.5, 1.0], &[], &y0, &yp0, &[1.0], false, false)
        .unwrap();

    assert!(!sol.flag().is_failure());
    assert_eq!(sol.sens_axes(), (1, 3, 1));
    // S(t) = dy/dk = -t exp(-k t) at k = 1
    assert_relative_eq!(sol.sens_row(0, 0)[0], 0.0, epsilon = 1e-10);
    assert_relative_eq!(sol.sens_row(0, 1)[0], -0.5 * (-0.5f64).exp(), epsilon = 1e-4);
    assert_relative_eq!(sol.sens_row(0, 2)[0], -(-1.0f64).exp(), epsilon = 1e-4);
}

#[test]
fn repeated_solves_are_bit_identical() {
    let opts = SolverOptions::builder().calc_ic(false).build();
    let mut driver = tight_driver(Arc::new(Decay), 0, vec![1.0], opts);
    let first = driver
        .solve(&[0.0, 1.0, 2.0], &[], &[1.0], &[-1.0], &[], true, false)
        .unwrap();
    let second = driver
        .solve(&[0.0, 1.0, 2.0], &[], &[1.0], &[-1.0], &[], true, false)
        .unwrap();

    assert_eq!(first.len(), second.len());
    assert_eq!(first.t(), second.t());
    assert_eq!(first.y_flat(), second.y_flat());
}

#[test]
fn refining_the_eval_schedule_preserves_shared_points() {
    let opts = SolverOptions::builder().calc_ic(false).build();
    let mut driver = tight_driver(Arc::new(Decay), 0, vec![1.0], opts);
    let coarse = driver
        .solve(&[0.0, 1.0, 2.0], &[], &[1.0], &[-1.0], &[], false, false)
        .unwrap();
    let fine = driver
        .solve(
            &[0.0, 0.5, 1.0, 1.5, 2.0],
            &[],
            &[1.0],
            &[-1.0],
            &[],
            false,
            false,
        )
        .unwrap();

    for (tc, yc) in coarse.t().iter().zip(0..coarse.len()) {
        let i = fine.t().iter().position(|t| t == tc).unwrap();
        assert_relative_eq!(
            fine.y_row(i)[0],
            coarse.y_row(yc)[0],
            max_relative = 1e-5,
            epsilon = 1e-8
        );
    }
}

#[test]
fn schedule_validation_rejects_bad_requests() {
    let opts = SolverOptions::builder().calc_ic(false).build();
    let mut driver = tight_driver(Arc::new(Decay), 0, vec![1.0], opts);

    assert!(matches!(
        driver.solve(&[0.0], &[], &[1.0], &[-1.0], &[], false, false),
        Err(Error::EvalScheduleTooShort(1))
    ));
    assert!(matches!(
        driver.solve(&[0.0, 0.0], &[], &[1.0], &[-1.0], &[], false, false),
        Err(Error::EvalScheduleNotIncreasing)
    ));
    assert!(matches!(
        driver.solve(&[0.0, 1.0], &[2.0], &[1.0], &[-1.0], &[], false, true),
        Err(Error::InterpScheduleInvalid)
    ));
    assert!(matches!(
        driver.solve(&[0.0, 1.0], &[], &[1.0, 2.0], &[-1.0], &[], false, false),
        Err(Error::InitialStateLength { got: 2, expected: 1 })
    ));
}

#[test]
fn unsupported_linear_solver_is_a_construction_error() {
    let setup = SetupOptions::builder().linear_solver(LinearSolver::Klu).build();
    let result = create_driver(
        Arc::new(Decay),
        1e-8,
        vec![1e-10],
        0,
        vec![1.0],
        setup,
        SolverOptions::default(),
    );
    assert!(matches!(
        result,
        Err(Error::UnsupportedLinearSolver(LinearSolver::Klu))
    ));
}

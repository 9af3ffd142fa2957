//! Harmonic oscillator with a terminal event at the first zero of y1.

use std::sync::Arc;

use dae_ivp::prelude::*;

struct Oscillator;

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

fn main() {
    let mut driver = create_driver(
        Arc::new(Oscillator),
        1e-8,
        vec![1e-10, 1e-10],
        0,
        vec![1.0, 1.0],
        SetupOptions::default(),
        SolverOptions::builder().calc_ic(true).build(),
    )
    .expect("driver construction");

    match driver.solve(
        &[0.0, 10.0],
        &[],
        &[1.0, 0.0],
        &[0.0, -1.0],
        &[],
        false,
        false,
    ) {
        Ok(sol) => {
            let t_end = *sol.t().last().unwrap();
            println!("status: {:?} (code {})", sol.flag(), sol.flag_code());
            println!("event at t = {t_end:.8} (pi/2 = {:.8})", std::f64::consts::FRAC_PI_2);
            println!("final state: {:?}", sol.y_row(sol.len() - 1));
        }
        Err(err) => eprintln!("solve failed: {err}"),
    }
}

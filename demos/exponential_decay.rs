//! Linear decay y' = -y integrated over a handful of forced stop-times.

use std::sync::Arc;

use dae_ivp::prelude::*;

struct Decay;

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

fn main() {
    let solver_opts = SolverOptions::builder().calc_ic(true).print_stats(true).build();
    let mut driver = create_driver(
        Arc::new(Decay),
        1e-8,
        vec![1e-10],
        0,
        vec![1.0],
        SetupOptions::default(),
        solver_opts,
    )
    .expect("driver construction");

    match driver.solve(&[0.0, 0.5, 1.0, 2.0], &[], &[1.0], &[-1.0], &[], false, false) {
        Ok(sol) => {
            println!("status code: {}", sol.flag_code());
            for i in 0..sol.len() {
                println!(
                    "t = {:>6.3}, y = {:>12.9}, exact = {:>12.9}",
                    sol.t()[i],
                    sol.y_row(i)[0],
                    (-sol.t()[i]).exp()
                );
            }
        }
        Err(err) => eprintln!("solve failed: {err}"),
    }
}

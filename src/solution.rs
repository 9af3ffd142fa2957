//! The owning result carrier handed to the consumer.

use crate::{recorder::StepRecorder, status::Status, Float};

/// Immutable, owning solution of one trajectory.
///
/// Buffers are flat and row-major: `y` stores `number_of_timesteps` rows of
/// `length_of_return_vector` entries. The sensitivity buffer follows the
/// axis triple `(arg_sens0, arg_sens1, arg_sens2)`: `(n_params, N, L)` in
/// full-state mode and `(N, L, n_params)` in outputs-only mode. The flip is
/// part of the external contract; callers key off the mode to interpret
/// strides.
///
/// The carrier is move-only: buffers are owned `Vec`s, no `Clone` is
/// provided, and the data outlives the driver that produced it.
#[derive(Debug)]
pub struct SolutionData {
    flag: Status,
    number_of_timesteps: usize,
    length_of_return_vector: usize,
    arg_sens0: usize,
    arg_sens1: usize,
    arg_sens2: usize,
    length_of_final_sv_slice: usize,
    save_hermite: bool,
    save_outputs_only: bool,
    t: Vec<Float>,
    y: Vec<Float>,
    yp: Option<Vec<Float>>,
    ys: Vec<Float>,
    yps: Option<Vec<Float>>,
    y_term: Option<Vec<Float>>,
}

impl SolutionData {
    /// Freeze the recorder's buffers into an owning result.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        flag: Status,
        recorder: &StepRecorder,
        n_params: usize,
        length_of_return_vector: usize,
        save_outputs_only: bool,
        save_hermite: bool,
        y_term: Option<Vec<Float>>,
    ) -> Self {
        let n = recorder.len();
        let l = length_of_return_vector;

        let t = recorder.times().to_vec();

        let mut y = vec![0.0; n * l];
        for i in 0..n {
            y[i * l..(i + 1) * l].copy_from_slice(recorder.state_row(i));
        }

        let yp = if save_hermite {
            let mut yp = vec![0.0; n * l];
            for i in 0..n {
                yp[i * l..(i + 1) * l].copy_from_slice(recorder.deriv_row(i));
            }
            Some(yp)
        } else {
            None
        };

        // Axis order flips between the two layouts; see the type docs.
        let (arg_sens0, arg_sens1, arg_sens2) = if save_outputs_only {
            (n, l, n_params)
        } else {
            (n_params, n, l)
        };

        let flatten_sens = |row: fn(&StepRecorder, usize, usize) -> &[Float]| {
            let mut out = vec![0.0; arg_sens0 * arg_sens1 * arg_sens2];
            let mut count = 0;
            for idx0 in 0..arg_sens0 {
                for idx1 in 0..arg_sens1 {
                    for idx2 in 0..arg_sens2 {
                        let i = if save_outputs_only { idx0 } else { idx1 };
                        let j = if save_outputs_only { idx1 } else { idx2 };
                        let k = if save_outputs_only { idx2 } else { idx0 };
                        out[count] = row(recorder, i, k)[j];
                        count += 1;
                    }
                }
            }
            out
        };

        let ys = if n_params > 0 {
            flatten_sens(StepRecorder::sens_row)
        } else {
            Vec::new()
        };
        let yps = if save_hermite && n_params > 0 {
            Some(flatten_sens(StepRecorder::sens_deriv_row))
        } else if save_hermite {
            Some(Vec::new())
        } else {
            None
        };

        let length_of_final_sv_slice = y_term.as_ref().map_or(0, Vec::len);

        Self {
            flag,
            number_of_timesteps: n,
            length_of_return_vector: l,
            arg_sens0,
            arg_sens1,
            arg_sens2,
            length_of_final_sv_slice,
            save_hermite,
            save_outputs_only,
            t,
            y,
            yp,
            ys,
            yps,
            y_term,
        }
    }

    pub fn flag(&self) -> Status {
        self.flag
    }

    /// Raw integer status code, forwarded untranslated.
    pub fn flag_code(&self) -> i32 {
        self.flag.code()
    }

    /// Number of snapshots.
    pub fn len(&self) -> usize {
        self.number_of_timesteps
    }

    pub fn is_empty(&self) -> bool {
        self.number_of_timesteps == 0
    }

    pub fn length_of_return_vector(&self) -> usize {
        self.length_of_return_vector
    }

    pub fn length_of_final_sv_slice(&self) -> usize {
        self.length_of_final_sv_slice
    }

    pub fn save_hermite(&self) -> bool {
        self.save_hermite
    }

    /// The sensitivity axis triple; `(n_params, N, L)` in full-state mode,
    /// `(N, L, n_params)` in outputs-only mode.
    pub fn sens_axes(&self) -> (usize, usize, usize) {
        (self.arg_sens0, self.arg_sens1, self.arg_sens2)
    }

    pub fn t(&self) -> &[Float] {
        &self.t
    }

    pub fn y_flat(&self) -> &[Float] {
        &self.y
    }

    /// State (or output) row of snapshot `i`.
    pub fn y_row(&self, i: usize) -> &[Float] {
        let l = self.length_of_return_vector;
        &self.y[i * l..(i + 1) * l]
    }

    /// Derivative row of snapshot `i`; only present when `save_hermite`.
    pub fn yp_row(&self, i: usize) -> Option<&[Float]> {
        let l = self.length_of_return_vector;
        self.yp.as_ref().map(|yp| &yp[i * l..(i + 1) * l])
    }

    pub fn ys_flat(&self) -> &[Float] {
        &self.ys
    }

    pub fn yps_flat(&self) -> Option<&[Float]> {
        self.yps.as_deref()
    }

    /// Sensitivity of snapshot `i` with respect to parameter `p`
    /// (full-state layout).
    pub fn sens_row(&self, p: usize, i: usize) -> &[Float] {
        debug_assert!(!self.save_outputs_only);
        let l = self.arg_sens2;
        let start = (p * self.arg_sens1 + i) * l;
        &self.ys[start..start + l]
    }

    /// Parameter sensitivities of output `j` at snapshot `i`
    /// (outputs-only layout).
    pub fn output_sens(&self, i: usize, j: usize) -> &[Float] {
        debug_assert!(self.save_outputs_only);
        let np = self.arg_sens2;
        let start = (i * self.arg_sens1 + j) * np;
        &self.ys[start..start + np]
    }

    /// Terminal raw state slice, recorded in outputs-only mode so a
    /// consumer can restart from the final state.
    pub fn y_term(&self) -> Option<&[Float]> {
        self.y_term.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::{Snapshot, StepRecorder};

    fn write(rec: &mut StepRecorder, t: Float, y: &[Float], ys: &[Vec<Float>]) {
        rec.write(&Snapshot {
            t,
            y,
            ys,
            yp: None,
            yps: None,
        });
    }

    #[test]
    fn full_state_axis_triple() {
        // 2 snapshots, 2 states, 1 parameter.
        let mut rec = StepRecorder::new(2, 1, true, false);
        rec.reserve(2);
        write(&mut rec, 0.0, &[1.0, 2.0], &[vec![10.0, 20.0]]);
        write(&mut rec, 1.0, &[3.0, 4.0], &[vec![30.0, 40.0]]);
        let sol = SolutionData::assemble(Status::Success, &rec, 1, 2, false, false, None);
        assert_eq!(sol.sens_axes(), (1, 2, 2));
        assert_eq!(sol.sens_row(0, 0), &[10.0, 20.0]);
        assert_eq!(sol.sens_row(0, 1), &[30.0, 40.0]);
        assert_eq!(sol.ys_flat(), &[10.0, 20.0, 30.0, 40.0]);
        assert_eq!(sol.y_row(1), &[3.0, 4.0]);
    }

    #[test]
    fn outputs_only_axis_triple_is_flipped() {
        // 2 snapshots, 1 output, 2 parameters.
        let mut rec = StepRecorder::new(1, 2, true, false);
        rec.reserve(2);
        write(&mut rec, 0.0, &[5.0], &[vec![1.0], vec![2.0]]);
        write(&mut rec, 1.0, &[6.0], &[vec![3.0], vec![4.0]]);
        let sol = SolutionData::assemble(
            Status::Success,
            &rec,
            2,
            1,
            true,
            false,
            Some(vec![7.0, 8.0]),
        );
        assert_eq!(sol.sens_axes(), (2, 1, 2));
        // innermost axis is the parameter axis
        assert_eq!(sol.output_sens(0, 0), &[1.0, 2.0]);
        assert_eq!(sol.output_sens(1, 0), &[3.0, 4.0]);
        assert_eq!(sol.ys_flat(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(sol.y_term(), Some(&[7.0, 8.0][..]));
        assert_eq!(sol.length_of_final_sv_slice(), 2);
    }

    #[test]
    fn no_sensitivities_means_empty_buffer() {
        let mut rec = StepRecorder::new(1, 0, false, false);
        rec.reserve(1);
        write(&mut rec, 0.0, &[1.0], &[]);
        let sol = SolutionData::assemble(Status::Success, &rec, 0, 1, false, false, None);
        assert!(sol.ys_flat().is_empty());
        assert_eq!(sol.sens_axes(), (0, 1, 1));
    }
}

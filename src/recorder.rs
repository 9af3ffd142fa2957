//! Growing snapshot buffers and the write cursor.

use crate::Float;

/// One staged snapshot, ready to be written.
///
/// `y` and each sensitivity row have the return-vector length; in
/// outputs-only mode that is the summed output size, otherwise the state
/// size. Derivative rows are present only when Hermite recording is on.
pub struct Snapshot<'a> {
    pub t: Float,
    pub y: &'a [Float],
    pub ys: &'a [Vec<Float>],
    pub yp: Option<&'a [Float]>,
    pub yps: Option<&'a [Vec<Float>]>,
}

/// Owns the time/state/sensitivity buffers for one trajectory.
///
/// Buffers are pre-reserved to the scheduled snapshot count and extended one
/// row at a time when adaptive-mode snapshots overflow the reservation. The
/// recorder does not deduplicate times; the driver guarantees monotonicity.
pub struct StepRecorder {
    row_len: usize,
    n_params: usize,
    sensitivity: bool,
    save_hermite: bool,
    t: Vec<Float>,
    y: Vec<Vec<Float>>,
    ys: Vec<Vec<Vec<Float>>>,
    yp: Vec<Vec<Float>>,
    yps: Vec<Vec<Vec<Float>>>,
    i_save: usize,
}

impl StepRecorder {
    pub fn new(row_len: usize, n_params: usize, sensitivity: bool, save_hermite: bool) -> Self {
        Self {
            row_len,
            n_params,
            sensitivity,
            save_hermite,
            t: Vec::new(),
            y: Vec::new(),
            ys: Vec::new(),
            yp: Vec::new(),
            yps: Vec::new(),
            i_save: 0,
        }
    }

    /// (Re-)initialise the buffers to `n` rows iff current capacity is
    /// smaller.
    pub fn reserve(&mut self, n: usize) {
        if self.t.len() >= n {
            return;
        }
        self.t = vec![0.0; n];
        self.y = vec![vec![0.0; self.row_len]; n];
        if self.sensitivity {
            self.ys = vec![vec![vec![0.0; self.row_len]; self.n_params]; n];
        }
        if self.save_hermite {
            self.yp = vec![vec![0.0; self.row_len]; n];
            if self.sensitivity {
                self.yps = vec![vec![vec![0.0; self.row_len]; self.n_params]; n];
            }
        }
    }

    /// Rewind the cursor for a fresh solve; capacity is retained.
    pub fn reset(&mut self) {
        self.i_save = 0;
    }

    /// Number of valid rows written so far.
    pub fn len(&self) -> usize {
        self.i_save
    }

    pub fn is_empty(&self) -> bool {
        self.i_save == 0
    }

    pub fn capacity(&self) -> usize {
        self.t.len()
    }

    fn extend_one(&mut self) {
        self.t.push(0.0);
        self.y.push(vec![0.0; self.row_len]);
        if self.sensitivity {
            self.ys.push(vec![vec![0.0; self.row_len]; self.n_params]);
        }
        if self.save_hermite {
            self.yp.push(vec![0.0; self.row_len]);
            if self.sensitivity {
                self.yps.push(vec![vec![0.0; self.row_len]; self.n_params]);
            }
        }
    }

    /// Write a snapshot at the cursor and advance it. Writes overwrite the
    /// reserved rows first, then grow the buffers one row per write.
    pub fn write(&mut self, snap: &Snapshot<'_>) {
        if self.i_save == self.t.len() {
            self.extend_one();
        }
        let i = self.i_save;
        self.t[i] = snap.t;
        self.y[i].copy_from_slice(snap.y);
        if self.sensitivity {
            for p in 0..self.n_params {
                self.ys[i][p].copy_from_slice(&snap.ys[p]);
            }
        }
        if self.save_hermite {
            if let Some(yp) = snap.yp {
                self.yp[i].copy_from_slice(yp);
            }
            if self.sensitivity {
                if let Some(yps) = snap.yps {
                    for p in 0..self.n_params {
                        self.yps[i][p].copy_from_slice(&yps[p]);
                    }
                }
            }
        }
        self.i_save += 1;
    }

    pub(crate) fn times(&self) -> &[Float] {
        &self.t[..self.i_save]
    }

    pub(crate) fn state_row(&self, i: usize) -> &[Float] {
        &self.y[i]
    }

    pub(crate) fn sens_row(&self, i: usize, p: usize) -> &[Float] {
        &self.ys[i][p]
    }

    pub(crate) fn deriv_row(&self, i: usize) -> &[Float] {
        &self.yp[i]
    }

    pub(crate) fn sens_deriv_row(&self, i: usize, p: usize) -> &[Float] {
        &self.yps[i][p]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_is_capacity_conditional() {
        let mut rec = StepRecorder::new(2, 0, false, false);
        rec.reserve(4);
        assert_eq!(rec.capacity(), 4);
        rec.reserve(2);
        assert_eq!(rec.capacity(), 4);
        rec.reserve(6);
        assert_eq!(rec.capacity(), 6);
    }

    #[test]
    fn writes_fill_reserved_rows_then_extend() {
        let mut rec = StepRecorder::new(1, 0, false, false);
        rec.reserve(2);
        for i in 0..3 {
            let y = [i as Float * 10.0];
            rec.write(&Snapshot {
                t: i as Float,
                y: &y,
                ys: &[],
                yp: None,
                yps: None,
            });
        }
        assert_eq!(rec.len(), 3);
        assert_eq!(rec.capacity(), 3);
        assert_eq!(rec.times(), &[0.0, 1.0, 2.0]);
        assert_eq!(rec.state_row(2), &[20.0]);
    }

    #[test]
    fn reset_rewinds_without_shrinking() {
        let mut rec = StepRecorder::new(1, 0, false, false);
        rec.reserve(2);
        let y = [1.0];
        rec.write(&Snapshot {
            t: 0.0,
            y: &y,
            ys: &[],
            yp: None,
            yps: None,
        });
        rec.reset();
        assert_eq!(rec.len(), 0);
        assert_eq!(rec.capacity(), 2);
    }

    #[test]
    fn hermite_and_sensitivity_rows_track_state_rows() {
        let mut rec = StepRecorder::new(2, 1, true, true);
        rec.reserve(1);
        let y = [1.0, 2.0];
        let yp = [-1.0, -2.0];
        let ys = vec![vec![0.5, 0.25]];
        let yps = vec![vec![-0.5, -0.25]];
        rec.write(&Snapshot {
            t: 0.0,
            y: &y,
            ys: &ys,
            yp: Some(&yp),
            yps: Some(&yps),
        });
        assert_eq!(rec.state_row(0), &[1.0, 2.0]);
        assert_eq!(rec.deriv_row(0), &[-1.0, -2.0]);
        assert_eq!(rec.sens_row(0, 0), &[0.5, 0.25]);
        assert_eq!(rec.sens_deriv_row(0, 0), &[-0.5, -0.25]);
    }
}

//! Dense linear algebra and norms for the Newton corrector.

use crate::{status::Status, Float};

/// Solve `A x = b` in place via LU with partial pivoting.
///
/// `a` is row-major n×n and is destroyed; `b` is overwritten with `x`.
/// A zero pivot reports a convergence failure rather than panicking so the
/// corrector can shrink the step and retry.
pub(crate) fn lu_solve(a: &mut [Float], b: &mut [Float], n: usize) -> Result<(), Status> {
    debug_assert_eq!(a.len(), n * n);
    debug_assert_eq!(b.len(), n);

    for k in 0..n {
        // pivot
        let mut pivot_row = k;
        let mut pivot_val = a[k * n + k].abs();
        for i in (k + 1)..n {
            let val = a[i * n + k].abs();
            if val > pivot_val {
                pivot_val = val;
                pivot_row = i;
            }
        }
        if pivot_val == 0.0 {
            return Err(Status::ConvFail);
        }
        if pivot_row != k {
            for j in 0..n {
                a.swap(k * n + j, pivot_row * n + j);
            }
            b.swap(k, pivot_row);
        }
        // Eliminate below the pivot
        let akk = a[k * n + k];
        for i in (k + 1)..n {
            let factor = a[i * n + k] / akk;
            a[i * n + k] = factor;
            for j in (k + 1)..n {
                a[i * n + j] -= factor * a[k * n + j];
            }
        }
    }

    // Forward solve L y = P b (b is already permuted)
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= a[i * n + k] * b[k];
        }
        b[i] = sum;
    }
    // Backward solve U x = y
    for i in (0..n).rev() {
        let mut sum = b[i];
        for k in (i + 1)..n {
            sum -= a[i * n + k] * b[k];
        }
        b[i] = sum / a[i * n + i];
    }
    Ok(())
}

/// Error-test weights `w_i = 1 / (rtol |y_i| + atol_i)`.
pub(crate) fn error_weights(y: &[Float], rtol: Float, atol: &[Float], w: &mut [Float]) {
    for i in 0..y.len() {
        w[i] = 1.0 / (rtol * y[i].abs() + atol[i]);
    }
}

/// Weighted root-mean-square norm.
pub(crate) fn wrms_norm(v: &[Float], w: &[Float]) -> Float {
    if v.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0;
    for (vi, wi) in v.iter().zip(w.iter()) {
        let s = vi * wi;
        sum += s * s;
    }
    (sum / v.len() as Float).sqrt()
}

/// Weighted RMS norm restricted to components with a positive mask entry.
pub(crate) fn wrms_norm_masked(v: &[Float], w: &[Float], mask: &[Float]) -> Float {
    let mut sum = 0.0;
    let mut count = 0usize;
    for i in 0..v.len() {
        if mask[i] > 0.0 {
            let s = v[i] * w[i];
            sum += s * s;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    (sum / count as Float).sqrt()
}

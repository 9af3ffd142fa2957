//! Snapshot staging: full state, or user-defined outputs with sensitivities.

use crate::{expression::ExpressionSet, recorder::Snapshot, Float};

/// Transforms a raw state snapshot into the row the recorder stores.
///
/// In full-state mode the working vectors pass straight through. In
/// outputs-only mode the output expressions are evaluated into staging rows
/// and the output sensitivities are assembled from the chain rule
///
/// ```text
/// d f_k / d p = (∂f_k/∂p)[p] + Σ_j (∂f_k/∂y)[j] · S_p[j]
/// ```
///
/// with `∂f_k/∂y` read as a sparse row (column indices from the expression)
/// and `∂f_k/∂p` densified from its sparse row before the chain-rule sum is
/// added on top.
pub struct OutputStager {
    save_outputs_only: bool,
    n_params: usize,
    length_of_return_vector: usize,
    res: Vec<Float>,
    res_dvar_dy: Vec<Float>,
    res_dvar_dp: Vec<Float>,
    dens_dvar_dp: Vec<Float>,
    row_y: Vec<Float>,
    row_ys: Vec<Vec<Float>>,
}

impl OutputStager {
    pub fn new<E: ExpressionSet>(functions: &E, n_params: usize) -> Self {
        let var_fcns = functions.var_fcns();
        let save_outputs_only = !var_fcns.is_empty();

        let mut length_of_return_vector = functions.n_states();
        let mut max_res = 0usize;
        let mut max_dvar_dy = 0usize;
        let mut max_dvar_dp = 0usize;
        if save_outputs_only {
            length_of_return_vector = 0;
            for var in var_fcns {
                max_res = max_res.max(var.out_shape(0));
                length_of_return_vector += var.nnz_out();
            }
            for dvar in functions.dvar_dy_fcns() {
                max_dvar_dy = max_dvar_dy.max(dvar.out_shape(0));
            }
            for dvar in functions.dvar_dp_fcns() {
                max_dvar_dp = max_dvar_dp.max(dvar.out_shape(0));
            }
        }

        Self {
            save_outputs_only,
            n_params,
            length_of_return_vector,
            res: vec![0.0; max_res],
            res_dvar_dy: vec![0.0; max_dvar_dy],
            res_dvar_dp: vec![0.0; max_dvar_dp],
            dens_dvar_dp: vec![0.0; n_params],
            row_y: vec![0.0; length_of_return_vector],
            row_ys: vec![vec![0.0; length_of_return_vector]; n_params],
        }
    }

    pub fn save_outputs_only(&self) -> bool {
        self.save_outputs_only
    }

    /// Length of the per-snapshot return vector.
    pub fn length_of_return_vector(&self) -> usize {
        self.length_of_return_vector
    }

    /// Stage one snapshot. The returned [`Snapshot`] borrows either the
    /// caller's working vectors (full-state mode) or the stager's rows
    /// (outputs-only mode).
    #[allow(clippy::too_many_arguments)]
    pub fn stage<'a, E: ExpressionSet>(
        &'a mut self,
        functions: &E,
        inputs: &[Float],
        t: Float,
        y: &'a [Float],
        ys: &'a [Vec<Float>],
        yp: Option<&'a [Float]>,
        yps: Option<&'a [Vec<Float>]>,
    ) -> Snapshot<'a> {
        if !self.save_outputs_only {
            return Snapshot { t, y, ys, yp, yps };
        }

        let mut j = 0;
        for var in functions.var_fcns() {
            var.call(t, y, inputs, &mut self.res);
            for jj in 0..var.nnz_out() {
                self.row_y[j] = self.res[jj];
                j += 1;
            }
        }

        if self.n_params > 0 {
            let dvar_dy_fcns = functions.dvar_dy_fcns();
            let dvar_dp_fcns = functions.dvar_dp_fcns();
            for k in 0..dvar_dy_fcns.len() {
                let dvar_dy = &dvar_dy_fcns[k];
                let dvar_dp = &dvar_dp_fcns[k];
                dvar_dy.call(t, y, inputs, &mut self.res_dvar_dy);
                dvar_dp.call(t, y, inputs, &mut self.res_dvar_dp);
                // Densify the explicit parameter derivative first, then add
                // the chain-rule sum on top.
                for v in self.dens_dvar_dp.iter_mut() {
                    *v = 0.0;
                }
                for nz in 0..dvar_dp.nnz_out() {
                    self.dens_dvar_dp[dvar_dp.rows()[nz]] = self.res_dvar_dp[nz];
                }
                for p in 0..self.n_params {
                    let mut acc = self.dens_dvar_dp[p];
                    for nz in 0..dvar_dy.nnz_out() {
                        acc += self.res_dvar_dy[nz] * ys[p][dvar_dy.cols()[nz]];
                    }
                    self.row_ys[p][k] = acc;
                }
            }
        }

        Snapshot {
            t,
            y: &self.row_y,
            ys: &self.row_ys,
            yp: None,
            yps: None,
        }
    }
}

//! Setup and solver options carried through the driver.

use bon::Builder;

use crate::Float;

/// Linear solver attached to the back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearSolver {
    /// Dense direct solve (LU with partial pivoting).
    Dense,
    /// Banded direct solve.
    Band,
    /// Sparse direct solve (KLU).
    Klu,
    /// Scaled preconditioned Bi-CGStab.
    Spbcgs,
    /// Scaled preconditioned flexible GMRES.
    Spfgmr,
    /// Scaled preconditioned GMRES.
    Spgmr,
    /// Scaled preconditioned TFQMR.
    Sptfqmr,
}

impl LinearSolver {
    /// Whether the solver is Krylov-iterative rather than direct.
    pub fn is_iterative(self) -> bool {
        matches!(
            self,
            LinearSolver::Spbcgs
                | LinearSolver::Spfgmr
                | LinearSolver::Spgmr
                | LinearSolver::Sptfqmr
        )
    }
}

/// How the Jacobian is supplied to the linear solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JacobianMode {
    Sparse,
    Banded,
    Dense,
    /// No user Jacobian; the back-end approximates it internally.
    None,
    /// Jacobian-vector products only.
    MatrixFree,
}

/// Preconditioner selection for iterative solvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preconditioner {
    None,
    /// Band-block-diagonal preconditioner with retained and working
    /// half-bandwidths.
    Bbd {
        half_bandwidth: usize,
        half_bandwidth_keep: usize,
    },
}

/// Structural choices fixed at driver construction.
///
/// Changing any of these requires building a fresh driver;
/// [`SolverOptions`] by contrast may be re-applied between solves.
#[derive(Debug, Clone, Builder)]
pub struct SetupOptions {
    #[builder(default = LinearSolver::Dense)]
    pub linear_solver: LinearSolver,
    #[builder(default = JacobianMode::Dense)]
    pub jacobian: JacobianMode,
    #[builder(default = Preconditioner::None)]
    pub preconditioner: Preconditioner,
    /// Worker threads for the back-end's vector kernels.
    #[builder(default = 1)]
    pub num_threads: usize,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Integration tunables applied to the back-end before each solve.
#[derive(Debug, Clone, Builder)]
pub struct SolverOptions {
    /// Maximum order of the BDF method.
    #[builder(default = 5)]
    pub max_order_bdf: usize,
    /// Maximum number of internal steps per stop interval.
    #[builder(default = 100_000)]
    pub max_num_steps: usize,
    /// Initial step size; 0 lets the back-end choose.
    #[builder(default = 0.0)]
    pub dt_init: Float,
    /// Maximum absolute step size; 0 means unbounded.
    #[builder(default = 0.0)]
    pub dt_max: Float,
    /// Minimum step size; 0 disables the floor.
    #[builder(default = 0.0)]
    pub dt_min: Float,
    /// Maximum number of error test failures in attempting one step.
    #[builder(default = 10)]
    pub max_error_test_failures: usize,
    /// Maximum number of nonlinear solver iterations at one step.
    #[builder(default = 4)]
    pub max_nonlinear_iterations: usize,
    /// Maximum number of nonlinear convergence failures at one step.
    #[builder(default = 10)]
    pub max_convergence_failures: usize,
    /// Safety factor in the nonlinear convergence test.
    #[builder(default = 0.33)]
    pub nonlinear_convergence_coefficient: Float,
    /// Suppress algebraic variables from the local error test.
    #[builder(default = false)]
    pub suppress_algebraic_error: bool,
    /// Positive constant in the Newton convergence test within the initial
    /// condition calculation.
    #[builder(default = 0.0033)]
    pub nonlinear_convergence_coefficient_ic: Float,
    /// Maximum number of steps allowed in the fix-differential IC solve.
    #[builder(default = 5)]
    pub max_num_steps_ic: usize,
    /// Maximum number of Jacobian or preconditioner evaluations during the
    /// IC calculation.
    #[builder(default = 4)]
    pub max_num_jacobians_ic: usize,
    /// Maximum number of Newton iterations in any one attempt to solve the
    /// IC calculation problem.
    #[builder(default = 10)]
    pub max_num_iterations_ic: usize,
    /// Maximum number of linesearch backtracks in any IC Newton iteration.
    #[builder(default = 100)]
    pub max_linesearch_backtracks_ic: usize,
    /// Turn off linesearch in the IC calculation.
    #[builder(default = false)]
    pub linesearch_off_ic: bool,
    /// Enable or disable linear solution scaling (direct solvers).
    #[builder(default = true)]
    pub linear_solution_scaling: bool,
    /// Ratio between linear and nonlinear tolerances (iterative solvers).
    #[builder(default = 0.05)]
    pub epsilon_linear_tolerance: Float,
    /// Increment factor used in difference-quotient Jv approximations.
    #[builder(default = 1.0)]
    pub increment_factor: Float,
    /// Print a statistics block after each solve.
    #[builder(default = false)]
    pub print_stats: bool,
    /// Run the consistent-initialisation step at t0.
    #[builder(default = true)]
    pub calc_ic: bool,
    /// Solve for the whole of y during the t0 initialisation instead of
    /// fixing the differential variables.
    #[builder(default = false)]
    pub init_all_y_ic: bool,
    /// Record y' (and S') rows so a consumer can Hermite-interpolate.
    #[builder(default = false)]
    pub save_hermite: bool,
    /// No-progress window length; 0 disables the guard.
    #[builder(default = 0)]
    pub no_progress_window_size: usize,
    /// No-progress threshold on the summed window, in integration time units.
    #[builder(default = 0.0)]
    pub no_progress_threshold: Float,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

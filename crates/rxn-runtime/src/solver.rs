//! Abstract stiff solver interface
//!
//! The driver is solver-agnostic: it talks to the integrator backend
//! through [`StiffSolver`] and hands it the continuous problem through
//! [`HybridSystem`]. The shipped backend is [`BdfSolver`]; an FFI
//! wrapper around an external solver library would implement the same
//! four primitives.
//!
//! [`BdfSolver`]: crate::bdf::BdfSolver

use crate::error::Result;
use crate::options::IntegratorOptions;

/// The continuous problem a solver integrates: derivatives plus the
/// event trigger-gap signals whose sign changes define roots.
///
/// Object-safe so solver backends can hold `&mut dyn HybridSystem`
/// without generics; the driver passes a borrowing adapter over the
/// model, so no user-data pointers or global state are involved.
pub trait HybridSystem {
    /// Evaluate `dy/dt` at `(t, y)` into `ydot`.
    fn rhs(&mut self, t: f64, y: &[f64], ydot: &mut [f64]) -> Result<()>;

    /// Evaluate the trigger-gap signals at `(t, y)` into `gout`
    /// (`gout.len()` equals the count passed to
    /// [`StiffSolver::root_init`]). Gap `i` is positive exactly when
    /// trigger `i` is true.
    fn roots(&mut self, t: f64, y: &[f64], gout: &mut [f64]) -> Result<()>;
}

/// How a [`StiffSolver::step`] call ended.
///
/// Failures are reported through `Result`, not a variant, so the
/// successful outcomes stay exhaustively matchable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The requested target time was reached.
    Converged,
    /// Integration stopped at a detected trigger-gap zero crossing
    /// at or before the target; see [`StiffSolver::root_info`].
    RootHit,
}

/// Direction of a trigger-gap sign change at a detected root.
///
/// One entry per root function: `+1` for a crossing into positive
/// (trigger went true), `-1` for a crossing into non-positive, `0` for
/// no crossing at this root time.
pub type RootDirections = [i8];

/// An adaptive implicit integrator with root finding.
///
/// Lifecycle: `configure` + `init` once, then any interleaving of
/// `step` and `reinit`. `reinit` restarts the method history after a
/// discontinuous state change while preserving tolerances and options.
pub trait StiffSolver {
    /// Apply configuration (method order bound, internal step limit,
    /// step-size bounds).
    fn configure(&mut self, opts: &IntegratorOptions) -> Result<()>;

    /// Allocate solver state for `y0` at `t0` with the given
    /// tolerances.
    fn init(&mut self, t0: f64, y0: &[f64], rel_tol: f64, abs_tol: &[f64]) -> Result<()>;

    /// Restart at `(t, y)` after a discontinuous state change,
    /// preserving tolerances and options.
    fn reinit(&mut self, t: f64, y: &[f64]) -> Result<()>;

    /// Replace the tolerances, preserving all other state.
    fn set_tolerances(&mut self, rel_tol: f64, abs_tol: &[f64]) -> Result<()>;

    /// Install `num_roots` trigger-gap signals to monitor. Zero
    /// disables root finding.
    fn root_init(&mut self, num_roots: usize) -> Result<()>;

    /// Re-apply step-size bounds (initial hint, minimum, maximum;
    /// 0.0 means automatic/unbounded).
    fn set_step_bounds(&mut self, init_step: f64, min_step: f64, max_step: f64);

    /// Advance toward `t_target`, writing the reached state into `y`.
    ///
    /// Returns the time actually reached and whether the call stopped
    /// at the target or at a root. On a root, the reached time is the
    /// refined crossing time and `y` the state there.
    fn step(
        &mut self,
        system: &mut dyn HybridSystem,
        t_target: f64,
        y: &mut [f64],
    ) -> Result<(f64, StepOutcome)>;

    /// Crossing directions recorded by the most recent
    /// [`StepOutcome::RootHit`].
    fn root_info(&self) -> &RootDirections;
}

//! Variable-order BDF integrator with root finding
//!
//! The default [`StiffSolver`] backend: backward differentiation
//! formulas of orders 1 through 5 on arbitrarily spaced step history,
//! a modified Newton iteration with a cached LU-factored iteration
//! matrix, and detection of trigger-gap sign changes across each
//! accepted step, refined to the crossing time with Brent's method on
//! a Hermite-cubic interpolant of the step.

use rxn_math::{weighted_rms_norm, LuDecomposition, Matrix};

use crate::error::{Result, RuntimeError};
use crate::options::IntegratorOptions;
use crate::solver::{HybridSystem, RootDirections, StepOutcome, StiffSolver};

/// Hard cap on the BDF order, independent of configuration.
const ORDER_CAP: usize = 5;
/// Newton iterations per stage before the step is abandoned.
const MAX_NEWTON: usize = 10;
/// Newton convergence threshold, as a fraction of the local error test.
const NEWTON_TOL: f64 = 0.01;
/// Step-size controller safety factor.
const SAFETY: f64 = 0.9;
/// Largest step growth per accepted step.
const MAX_GROWTH: f64 = 5.0;
/// Smallest step reduction per rejected step.
const MIN_SHRINK: f64 = 0.1;
/// Accepted steps between forced Jacobian refreshes.
const MAX_JACOBIAN_AGE: usize = 20;
/// Iteration cap for the root refinement per trigger gap.
const MAX_ROOT_ITER: usize = 50;

/// Cheap per-run counters for diagnostics and tests.
#[derive(Debug, Clone, Default)]
pub struct SolverStats {
    /// Accepted internal steps
    pub steps_taken: u64,
    /// Rejected internal steps (error test failures)
    pub steps_rejected: u64,
    /// Right-hand-side evaluations
    pub rhs_evals: u64,
    /// Jacobian evaluations
    pub jacobian_evals: u64,
    /// Newton iterations that failed to converge
    pub newton_failures: u64,
    /// Root returns
    pub roots_found: u64,
}

/// Variable-step, variable-order BDF integrator.
///
/// Construct, [`configure`](StiffSolver::configure), then
/// [`init`](StiffSolver::init); the driver handles the rest through the
/// [`StiffSolver`] trait.
#[derive(Debug)]
pub struct BdfSolver {
    // configuration
    max_order: usize,
    max_steps: usize,
    init_step: f64,
    min_step: f64,
    max_step: f64,
    rel_tol: f64,
    abs_tol: Vec<f64>,

    // method state: history[0] is the current point (t, y)
    t: f64,
    y: Vec<f64>,
    history: Vec<(f64, Vec<f64>)>,
    order: usize,
    h: f64,

    // modified-Newton iteration matrix cache
    jacobian: Matrix,
    iteration_lu: Option<LuDecomposition>,
    lu_c0: f64,
    jacobian_age: usize,

    // root finding
    num_roots: usize,
    g_prev: Vec<f64>,
    g_valid: bool,
    root_dirs: Vec<i8>,

    initialized: bool,
    /// Diagnostics counters
    pub stats: SolverStats,
}

impl Default for BdfSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl BdfSolver {
    /// Create an unconfigured solver
    pub fn new() -> Self {
        Self {
            max_order: ORDER_CAP,
            max_steps: crate::options::DEFAULT_MAX_STEPS,
            init_step: 0.0,
            min_step: 0.0,
            max_step: 0.0,
            rel_tol: 1e-6,
            abs_tol: Vec::new(),
            t: 0.0,
            y: Vec::new(),
            history: Vec::new(),
            order: 1,
            h: 0.0,
            jacobian: Matrix::zeros(0, 0),
            iteration_lu: None,
            lu_c0: 0.0,
            jacobian_age: 0,
            num_roots: 0,
            g_prev: Vec::new(),
            g_valid: false,
            root_dirs: Vec::new(),
            initialized: false,
            stats: SolverStats::default(),
        }
    }

    /// Time resolution at the current point: differences below this are
    /// indistinguishable from roundoff.
    fn time_resolution(&self, h: f64) -> f64 {
        100.0 * f64::EPSILON * (self.t.abs() + h.abs()).max(1.0)
    }

    /// BDF coefficients for a step to `t_new` over the `k` most recent
    /// history nodes: `c[0]` multiplies the new value, `c[j]` the j-th
    /// most recent history value, such that `sum(c_j * y_j)` is the
    /// derivative of the interpolating polynomial at `t_new`.
    fn bdf_coefficients(&self, t_new: f64, k: usize) -> Vec<f64> {
        let mut nodes = Vec::with_capacity(k + 1);
        nodes.push(t_new);
        for (t_j, _) in self.history.iter().take(k) {
            nodes.push(*t_j);
        }

        let mut c = vec![0.0; k + 1];
        // c[0] = d/dx of the Lagrange basis through node 0, at node 0
        for m in 1..=k {
            c[0] += 1.0 / (nodes[0] - nodes[m]);
        }
        // c[i] = L_i'(node 0) for the remaining basis polynomials
        for i in 1..=k {
            let mut num = 1.0;
            for m in 1..=k {
                if m != i {
                    num *= nodes[0] - nodes[m];
                }
            }
            let mut den = 1.0;
            for m in 0..=k {
                if m != i {
                    den *= nodes[i] - nodes[m];
                }
            }
            c[i] = num / den;
        }
        c
    }

    /// Extrapolate the polynomial through the `m` most recent history
    /// points to `t_new`. Serves as the Newton starting guess and as
    /// the predictor for the local error estimate.
    fn predict(&self, t_new: f64, m: usize) -> Vec<f64> {
        let n = self.y.len();
        let mut y_pred = vec![0.0; n];
        for i in 0..m {
            let (t_i, ref y_i) = self.history[i];
            let mut weight = 1.0;
            for j in 0..m {
                if j != i {
                    let t_j = self.history[j].0;
                    weight *= (t_new - t_j) / (t_i - t_j);
                }
            }
            for idx in 0..n {
                y_pred[idx] += weight * y_i[idx];
            }
        }
        y_pred
    }

    /// Error weights `atol[i] + rtol * max(|a[i]|, |b[i]|)`.
    fn error_weights(&self, a: &[f64], b: &[f64]) -> Vec<f64> {
        self.abs_tol
            .iter()
            .zip(a.iter().zip(b.iter()))
            .map(|(&tol, (&x, &z))| tol + self.rel_tol * x.abs().max(z.abs()))
            .collect()
    }

    /// Finite-difference Jacobian of `rhs` at the current point.
    fn refresh_jacobian(&mut self, system: &mut dyn HybridSystem) -> Result<()> {
        let n = self.y.len();
        let mut y_probe = self.y.clone();
        let mut f_plus = vec![0.0; n];
        let mut f_minus = vec![0.0; n];

        for j in 0..n {
            let base = y_probe[j];
            let delta = 1e-8 * (1.0 + base.abs());
            y_probe[j] = base + delta;
            system.rhs(self.t, &y_probe, &mut f_plus)?;
            y_probe[j] = base - delta;
            system.rhs(self.t, &y_probe, &mut f_minus)?;
            y_probe[j] = base;
            for i in 0..n {
                self.jacobian[(i, j)] = (f_plus[i] - f_minus[i]) / (2.0 * delta);
            }
        }
        self.stats.rhs_evals += 2 * n as u64;
        self.stats.jacobian_evals += 1;
        self.jacobian_age = 0;
        Ok(())
    }

    /// Factor the iteration matrix `c0·I − J` for the given leading
    /// coefficient.
    fn refactor_iteration_matrix(&mut self, c0: f64) -> Result<()> {
        let n = self.y.len();
        let mut a = Matrix::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                a[(i, j)] = -self.jacobian[(i, j)];
            }
            a[(i, i)] += c0;
        }
        self.iteration_lu = Some(a.lu()?);
        self.lu_c0 = c0;
        Ok(())
    }

    /// Newton-solve the BDF stage equation
    /// `c0·y + psi = f(t_new, y)`, starting from `y_guess`.
    ///
    /// Returns the converged solution, or `None` when the iteration
    /// stalls or diverges.
    #[allow(clippy::too_many_arguments)]
    fn solve_stage(
        lu: &LuDecomposition,
        system: &mut dyn HybridSystem,
        t_new: f64,
        c0: f64,
        psi: &[f64],
        y_guess: &[f64],
        weights: &[f64],
        stats: &mut SolverStats,
    ) -> Result<Option<Vec<f64>>> {
        let n = psi.len();
        let mut y_new = y_guess.to_vec();
        let mut f_new = vec![0.0; n];
        let mut residual = vec![0.0; n];
        let mut prev_norm = f64::INFINITY;

        for iteration in 0..MAX_NEWTON {
            system.rhs(t_new, &y_new, &mut f_new)?;
            stats.rhs_evals += 1;
            for i in 0..n {
                residual[i] = f_new[i] - c0 * y_new[i] - psi[i];
            }
            // correction = (c0·I − J)⁻¹ residual
            lu.solve_in_place(&mut residual)?;
            for i in 0..n {
                y_new[i] += residual[i];
            }
            let norm = weighted_rms_norm(&residual, weights);
            if norm <= NEWTON_TOL {
                return Ok(Some(y_new));
            }
            if iteration >= 1 && norm > 2.0 * prev_norm {
                break;
            }
            prev_norm = norm;
        }
        stats.newton_failures += 1;
        Ok(None)
    }

    /// Hermite-cubic interpolant of the step from `(t_a, y_a, f_a)` to
    /// `(t_b, y_b, f_b)`, evaluated at `t`.
    #[allow(clippy::too_many_arguments)]
    fn hermite(
        t_a: f64,
        y_a: &[f64],
        f_a: &[f64],
        t_b: f64,
        y_b: &[f64],
        f_b: &[f64],
        t: f64,
    ) -> Vec<f64> {
        let dt = t_b - t_a;
        let alpha = (t - t_a) / dt;
        let a2 = alpha * alpha;
        let a3 = a2 * alpha;
        let h00 = 1.0 - 3.0 * a2 + 2.0 * a3;
        let h10 = alpha - 2.0 * a2 + a3;
        let h01 = 3.0 * a2 - 2.0 * a3;
        let h11 = a3 - a2;

        y_a.iter()
            .zip(y_b)
            .zip(f_a.iter().zip(f_b))
            .map(|((&ya, &yb), (&fa, &fb))| {
                h00 * ya + h10 * dt * fa + h01 * yb + h11 * dt * fb
            })
            .collect()
    }

    /// Locate the earliest trigger-gap crossing inside an accepted step
    /// with Brent's method on the Hermite interpolant.
    ///
    /// Each crossed component is refined independently; the earliest
    /// crossing wins. Brackets are maintained on the true/false sides
    /// of the trigger rather than on the sign of the product, and the
    /// returned time is the bracket endpoint on the far side of the
    /// crossing: the gap signs at the returned state already reflect
    /// the transition.
    fn locate_root(
        &mut self,
        system: &mut dyn HybridSystem,
        t_new: f64,
        y_new: &[f64],
        g_new: &[f64],
    ) -> Result<(f64, Vec<f64>, Vec<f64>)> {
        let n = self.y.len();
        let mut f_a = vec![0.0; n];
        let mut f_b = vec![0.0; n];
        system.rhs(self.t, &self.y, &mut f_a)?;
        system.rhs(t_new, y_new, &mut f_b)?;
        self.stats.rhs_evals += 2;

        let resolution = self.time_resolution(t_new - self.t);
        let mut g_buf = vec![0.0; self.num_roots];
        let mut earliest = t_new;

        for i in 0..self.num_roots {
            let was_true = self.g_prev[i] > 0.0;
            if (g_new[i] > 0.0) == was_true {
                continue;
            }

            let mut a = self.t;
            let mut b = t_new;
            let mut fa = self.g_prev[i];
            let mut fb = g_new[i];
            let mut c = a;
            let mut fc = fa;
            let mut mflag = true;
            let mut d = b - a;

            for _ in 0..MAX_ROOT_ITER {
                // Keep b the best guess
                if fa.abs() < fb.abs() {
                    std::mem::swap(&mut a, &mut b);
                    std::mem::swap(&mut fa, &mut fb);
                }
                if (b - a).abs() <= resolution {
                    break;
                }

                let s = if fa != fc && fb != fc && fa != fb {
                    // Inverse quadratic interpolation
                    a * fb * fc / ((fa - fb) * (fa - fc))
                        + b * fa * fc / ((fb - fa) * (fb - fc))
                        + c * fa * fb / ((fc - fa) * (fc - fb))
                } else if fb != fa {
                    // Secant step
                    b - fb * (b - a) / (fb - fa)
                } else {
                    0.5 * (a + b)
                };

                let mid = 0.5 * (a + b);
                let use_bisection = (s - (3.0 * a + b) / 4.0) * (s - b) > 0.0
                    || (mflag && (s - b).abs() >= (b - c).abs() / 2.0)
                    || (!mflag && (s - b).abs() >= (c - d).abs() / 2.0)
                    || (mflag && (b - c).abs() < resolution)
                    || (!mflag && (c - d).abs() < resolution);
                let s = if use_bisection {
                    mflag = true;
                    mid
                } else {
                    mflag = false;
                    s
                };

                let y_s = Self::hermite(self.t, &self.y, &f_a, t_new, y_new, &f_b, s);
                system.roots(s, &y_s, &mut g_buf)?;
                let fs = g_buf[i];

                d = c;
                c = b;
                fc = fb;
                if (fa > 0.0) != (fs > 0.0) {
                    b = s;
                    fb = fs;
                } else {
                    a = s;
                    fa = fs;
                }
            }

            // The endpoint whose side differs from the step start is
            // past the crossing.
            let t_i = if (fa > 0.0) != was_true { a } else { b };
            if t_i < earliest {
                earliest = t_i;
            }
        }

        let y_root = if earliest == t_new {
            y_new.to_vec()
        } else {
            Self::hermite(self.t, &self.y, &f_a, t_new, y_new, &f_b, earliest)
        };
        system.roots(earliest, &y_root, &mut g_buf)?;
        Ok((earliest, y_root, g_buf))
    }
}

impl StiffSolver for BdfSolver {
    fn configure(&mut self, opts: &IntegratorOptions) -> Result<()> {
        opts.validate()?;
        self.max_order = opts.max_bdf_order.min(ORDER_CAP);
        self.max_steps = opts.max_steps;
        self.init_step = opts.init_step;
        self.min_step = opts.min_step;
        self.max_step = opts.max_step;
        Ok(())
    }

    fn init(&mut self, t0: f64, y0: &[f64], rel_tol: f64, abs_tol: &[f64]) -> Result<()> {
        if abs_tol.len() != y0.len() {
            return Err(RuntimeError::invalid_parameter(
                "abs_tol",
                abs_tol.len().to_string(),
                format!("length {}", y0.len()),
            ));
        }
        self.t = t0;
        self.y = y0.to_vec();
        self.rel_tol = rel_tol;
        self.abs_tol = abs_tol.to_vec();
        self.history = vec![(t0, y0.to_vec())];
        self.order = 1;
        self.h = 0.0;
        self.jacobian = Matrix::zeros(y0.len(), y0.len());
        self.iteration_lu = None;
        self.jacobian_age = MAX_JACOBIAN_AGE;
        self.g_valid = false;
        self.initialized = true;
        Ok(())
    }

    fn reinit(&mut self, t: f64, y: &[f64]) -> Result<()> {
        if !self.initialized {
            return Err(RuntimeError::initialization(
                "reinit called before init",
            ));
        }
        if y.len() != self.y.len() {
            return Err(RuntimeError::StateVectorMismatch {
                model: y.len(),
                allocated: self.y.len(),
            });
        }
        self.t = t;
        self.y.copy_from_slice(y);
        self.history.clear();
        self.history.push((t, y.to_vec()));
        self.order = 1;
        self.h = 0.0;
        self.iteration_lu = None;
        self.jacobian_age = MAX_JACOBIAN_AGE;
        // Assignments may have flipped trigger signs; the previous gap
        // values no longer describe the restart point.
        self.g_valid = false;
        Ok(())
    }

    fn set_tolerances(&mut self, rel_tol: f64, abs_tol: &[f64]) -> Result<()> {
        if self.initialized && abs_tol.len() != self.y.len() {
            return Err(RuntimeError::invalid_parameter(
                "abs_tol",
                abs_tol.len().to_string(),
                format!("length {}", self.y.len()),
            ));
        }
        self.rel_tol = rel_tol;
        self.abs_tol = abs_tol.to_vec();
        Ok(())
    }

    fn root_init(&mut self, num_roots: usize) -> Result<()> {
        self.num_roots = num_roots;
        self.g_prev = vec![0.0; num_roots];
        self.root_dirs = vec![0; num_roots];
        self.g_valid = false;
        Ok(())
    }

    fn set_step_bounds(&mut self, init_step: f64, min_step: f64, max_step: f64) {
        self.init_step = init_step;
        self.min_step = min_step;
        self.max_step = max_step;
    }

    fn step(
        &mut self,
        system: &mut dyn HybridSystem,
        t_target: f64,
        y: &mut [f64],
    ) -> Result<(f64, StepOutcome)> {
        if !self.initialized {
            return Err(RuntimeError::initialization("step called before init"));
        }
        let n = self.y.len();
        if t_target - self.t <= self.time_resolution(0.0) {
            y[..n].copy_from_slice(&self.y);
            return Ok((self.t, StepOutcome::Converged));
        }

        if self.num_roots > 0 && !self.g_valid {
            system.roots(self.t, &self.y, &mut self.g_prev)?;
            self.g_valid = true;
        }

        if self.h <= 0.0 {
            let span = t_target - self.t;
            self.h = if self.init_step > 0.0 {
                self.init_step.min(span)
            } else {
                span * 1e-3
            };
            if self.min_step > 0.0 {
                self.h = self.h.max(self.min_step);
            }
        }

        let mut g_new = vec![0.0; self.num_roots];
        let mut attempts = 0usize;

        loop {
            attempts += 1;
            if attempts > self.max_steps {
                return Err(RuntimeError::integrator(
                    -1,
                    format!(
                        "exceeded {} internal steps at t = {:e} before reaching {:e}",
                        self.max_steps, self.t, t_target
                    ),
                ));
            }

            // Clamp the working step to the configured bounds and the
            // remaining interval.
            let mut h = self.h;
            if self.max_step > 0.0 {
                h = h.min(self.max_step);
            }
            if self.min_step > 0.0 {
                h = h.max(self.min_step);
            }
            let remaining = t_target - self.t;
            let hitting_target = h >= remaining;
            if hitting_target {
                h = remaining;
            }
            let t_new = if hitting_target { t_target } else { self.t + h };

            let k = self.order.min(self.history.len());
            let c = self.bdf_coefficients(t_new, k);
            let c0 = c[0];

            // psi aggregates the history contribution of the formula
            let mut psi = vec![0.0; n];
            for (j, coeff) in c.iter().enumerate().skip(1) {
                let y_j = &self.history[j - 1].1;
                for i in 0..n {
                    psi[i] += coeff * y_j[i];
                }
            }

            let y_pred = self.predict(t_new, (k + 1).min(self.history.len()));
            let weights = self.error_weights(&self.y, &y_pred);

            // Refresh the iteration matrix when the Jacobian is old or
            // the leading coefficient drifted from the factored one.
            let lu_stale = self.iteration_lu.is_none()
                || self.jacobian_age >= MAX_JACOBIAN_AGE
                || (c0 - self.lu_c0).abs() > 0.2 * self.lu_c0.abs();
            if lu_stale {
                if self.jacobian_age >= MAX_JACOBIAN_AGE {
                    self.refresh_jacobian(system)?;
                }
                self.refactor_iteration_matrix(c0)?;
            }

            let solved = match self.iteration_lu.as_ref() {
                Some(lu) => Self::solve_stage(
                    lu,
                    system,
                    t_new,
                    c0,
                    &psi,
                    &y_pred,
                    &weights,
                    &mut self.stats,
                )?,
                None => None,
            };
            let y_new = match solved {
                Some(y_new) => y_new,
                None => {
                    if self.jacobian_age > 0 {
                        // Retry the same step with a current Jacobian
                        self.refresh_jacobian(system)?;
                        self.refactor_iteration_matrix(c0)?;
                        continue;
                    }
                    let h_next = h * 0.25;
                    if h_next < self.time_resolution(h).max(self.min_step) {
                        return Err(RuntimeError::integrator(
                            -4,
                            format!("Newton iteration failed at minimum step, t = {:e}", self.t),
                        ));
                    }
                    self.h = h_next;
                    self.iteration_lu = None;
                    continue;
                }
            };

            // Local error: corrector minus predictor, damped by order
            let error_scale = 1.0 / (k as f64 + 1.0);
            let err_vec: Vec<f64> = y_new
                .iter()
                .zip(y_pred.iter())
                .map(|(&a, &b)| error_scale * (a - b))
                .collect();
            let weights = self.error_weights(&self.y, &y_new);
            let err = weighted_rms_norm(&err_vec, &weights);

            if err > 1.0 {
                self.stats.steps_rejected += 1;
                let factor = (SAFETY * err.powf(-1.0 / (k as f64 + 1.0)))
                    .clamp(MIN_SHRINK, 0.9);
                let h_next = h * factor;
                if h_next < self.time_resolution(h).max(self.min_step) {
                    return Err(RuntimeError::integrator(
                        -3,
                        format!("error test failed at minimum step, t = {:e}", self.t),
                    ));
                }
                if err > 10.0 && self.order > 1 {
                    self.order -= 1;
                }
                self.h = h_next;
                self.iteration_lu = None;
                continue;
            }

            // Accepted: look for trigger crossings across the step.
            if self.num_roots > 0 {
                system.roots(t_new, &y_new, &mut g_new)?;
                let crossed = self
                    .g_prev
                    .iter()
                    .zip(g_new.iter())
                    .any(|(&a, &b)| (a > 0.0) != (b > 0.0));
                if crossed {
                    let (t_root, y_root, g_root) =
                        self.locate_root(system, t_new, &y_new, &g_new)?;
                    for (i, dir) in self.root_dirs.iter_mut().enumerate() {
                        let was_true = self.g_prev[i] > 0.0;
                        let is_true = g_root[i] > 0.0;
                        *dir = match (was_true, is_true) {
                            (false, true) => 1,
                            (true, false) => -1,
                            _ => 0,
                        };
                    }
                    self.t = t_root;
                    self.y.copy_from_slice(&y_root);
                    self.history.clear();
                    self.history.push((t_root, y_root));
                    self.order = 1;
                    self.g_prev.copy_from_slice(&g_root);
                    self.stats.steps_taken += 1;
                    self.stats.roots_found += 1;
                    y[..n].copy_from_slice(&self.y);
                    return Ok((self.t, StepOutcome::RootHit));
                }
                self.g_prev.copy_from_slice(&g_new);
            }

            self.t = t_new;
            self.y.copy_from_slice(&y_new);
            self.history.insert(0, (t_new, y_new));
            self.history.truncate(self.max_order + 1);
            self.jacobian_age += 1;
            self.stats.steps_taken += 1;

            if self.order < self.max_order && self.history.len() > self.order {
                self.order += 1;
            }
            let factor = if err == 0.0 {
                MAX_GROWTH
            } else {
                (SAFETY * err.powf(-1.0 / (k as f64 + 1.0))).clamp(MIN_SHRINK, MAX_GROWTH)
            };
            // A final step clamped to the remaining interval says
            // nothing about the natural step size; scale the unclamped
            // one instead.
            let h_base = if hitting_target { self.h } else { h };
            self.h = h_base * factor;

            if hitting_target {
                y[..n].copy_from_slice(&self.y);
                return Ok((self.t, StepOutcome::Converged));
            }
        }
    }

    fn root_info(&self) -> &RootDirections {
        &self.root_dirs
    }
}

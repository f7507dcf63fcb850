//! Hybrid ODE-with-events integration runtime for biochemical models
//!
//! This crate advances a [`KineticModel`] through time with a stiff
//! adaptive integrator while resolving discrete events: zero crossings
//! of trigger functions, priority-ordered simultaneous firings, delayed
//! and immediate assignments, persistent and non-persistent triggers,
//! and rapid re-firing near a single instant.
//!
//! The entry point is [`HybridDriver`]: construct it around a model and
//! an [`IntegratorOptions`], then call
//! [`advance`](HybridDriver::advance) repeatedly. The integrator
//! backend is pluggable through the [`StiffSolver`] trait; the default
//! is the built-in variable-order [`BdfSolver`].
//!
//! ```ignore
//! use rxn_runtime::{HybridDriver, IntegratorOptions};
//!
//! let options = IntegratorOptions::new(1e-12, 1e-9)?;
//! let mut driver = HybridDriver::new(model, options)?;
//! let mut t = 0.0;
//! for _ in 0..100 {
//!     t = driver.advance(t, 0.1)?;
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod bdf;
pub mod driver;
pub mod error;
pub mod options;
pub mod queue;
pub mod roots;
pub mod solver;
pub mod state;

pub use bdf::{BdfSolver, SolverStats};
pub use driver::HybridDriver;
pub use error::{Result, RuntimeError};
pub use options::IntegratorOptions;
pub use queue::{PendingAssignment, PendingAssignmentQueue};
pub use roots::RootHandler;
pub use solver::{HybridSystem, StepOutcome, StiffSolver};
pub use state::StateVector;

// The model contract lives in rxn-core; re-export the names callers
// implement against.
pub use rxn_core::{EventProfile, KineticModel, ModelError, SnapshotMode, ValueCapture};

//! Model collaborator contract for the rxn kinetics runtime
//!
//! The integration driver in `rxn-runtime` advances an arbitrary
//! biochemical model through time. This crate defines what a model has
//! to provide for that to work: derivative evaluation, event trigger
//! evaluation, event assignment hooks, per-event metadata, and the
//! transactional snapshot used to probe triggers without committing.
//!
//! Models are produced elsewhere (typically generated from a reaction
//! network description); nothing in this workspace implements one
//! outside of test fixtures.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod event;
pub mod model;

pub use error::{ModelError, ModelResult};
pub use event::{EventProfile, ValueCapture};
pub use model::{KineticModel, SnapshotMode};

//! Storage module: entity models and SQL repositories.
//!
//! - `model`: typed entities and the per-run digest view model.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! Callers import from `discourse_notifier::db`; the repository API and the
//! models they need are re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{DigestEntry, ReconcileStats, User};

//! The hierarchical state machine runtime.
//!
//! A [`Machine`] instantiates a declared region tree: it owns the live
//! context hierarchy, drives the transition/guard protocol through
//! per-child pending queues, and fans update ticks out across the tree.
//! Handler code sees the runtime through [`Scope`], and guard decisions
//! through [`Gate`].

mod config;
mod context;
mod engine;
mod error;
mod gate;
mod handler;
mod queue;
mod root;
mod scope;

pub use config::MachineConfig;
pub use error::MachineError;
pub use gate::Gate;
pub use handler::{EnterFn, ExitFn, Followup, GuardFn, UpdateFn};
pub use root::Machine;
pub use scope::Scope;

/// Name of the internal sentinel region wrapping the top-level nodes.
pub(crate) const SENTINEL: &str = "<root>";

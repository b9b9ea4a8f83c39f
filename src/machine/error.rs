//! Runtime errors for the machine protocol.

use thiserror::Error;

/// Errors that can occur while registering handlers or driving transitions.
///
/// These are programmer-error class failures: the runtime does not recover
/// from them or retry. A failing request propagates to its caller before
/// the target's state or live context is mutated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MachineError {
    #[error("no child named '{name}' is reachable from this region")]
    UnknownChild { name: String },

    #[error("'{state}' is not a declared state of '{node}'")]
    UnknownState { node: String, state: String },

    #[error("'{node}' declares no transition '{from}' -> '{to}'")]
    InvalidTransition {
        node: String,
        from: String,
        to: String,
    },

    #[error(
        "queued transition for '{node}' expected state {expected:?} but found {actual:?}"
    )]
    StateInconsistency {
        node: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("no enter handler registered for '{node}' state '{state}'")]
    MissingHandler { node: String, state: String },

    #[error("guard decision for '{node}' no longer matches a pending transition")]
    StaleGuard { node: String },
}

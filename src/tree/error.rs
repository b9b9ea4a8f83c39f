//! Declaration errors for region trees.

use thiserror::Error;

/// Errors that can occur while declaring a region tree.
///
/// All of these surface at `node()` time, before a machine exists; a tree
/// that constructs successfully never fails these checks again at runtime.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("node '{parent}' has two children named '{child}' visible in the same state")]
    DuplicateChild { parent: String, child: String },

    #[error("node '{node}' declares state '{state}' more than once")]
    DuplicateState { node: String, state: String },

    #[error("node '{node}' declares the reserved wildcard '*' as a state")]
    WildcardState { node: String },

    #[error("node '{node}' restricts a child to '{state}', which is not one of its states")]
    UnknownRestriction { node: String, state: String },
}

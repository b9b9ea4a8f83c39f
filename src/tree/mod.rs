//! Region tree declarations.
//!
//! A tree is declared once with [`node`], [`leaf`] and [`restrict`],
//! validated at construction, and then shared read-only by every live
//! context a [`Machine`](crate::Machine) instantiates from it.

mod error;
mod node;

pub use error::TreeError;
pub use node::{leaf, node, restrict, ChildSpec, Node, WILDCARD};

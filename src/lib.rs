//! Strata: a hierarchical state machine runtime
//!
//! Strata drives trees of named state regions: each region ("node") declares
//! a fixed set of states and optional child regions, and a child may be
//! restricted to particular parent states so that it only exists while the
//! parent holds one of them. The runtime creates and destroys nested
//! contexts as states change, consults guards before committing
//! transitions, and fans per-frame update ticks across the live tree.
//!
//! # Core Concepts
//!
//! - **Node**: immutable declaration of a region, its states, and children
//! - **Machine**: the live runtime over a tree, wrapped in a sentinel root
//! - **Scope**: the context handle handler code uses to register handlers
//!   and request transitions (`tell`/`ask`/`set`)
//! - **Gate**: the capability a guard holds while a transition awaits its
//!   decision
//!
//! # Example
//!
//! ```rust
//! use strata::tree::{leaf, node, restrict};
//! use strata::{Followup, Machine};
//!
//! let car = leaf("CAR", ["forward", "brake"]).unwrap();
//! let light = node(
//!     "LIGHT",
//!     ["red", "yellow", "green"],
//!     [restrict(["green"], [car])],
//! )
//! .unwrap();
//!
//! let mut machine = Machine::create([light]).unwrap();
//!
//! machine
//!     .when("LIGHT", "green", |scope, _data| {
//!         // CAR exists only while LIGHT is green
//!         scope.when("CAR", "forward", |_s, _d| Followup::None).unwrap();
//!         scope.tell("CAR", "forward", None).unwrap();
//!         Followup::None
//!     })
//!     .unwrap();
//!
//! machine.tell("LIGHT", "green", None).unwrap();
//! assert_eq!(machine.state_at(&["LIGHT", "CAR"]).unwrap(), Some("forward"));
//!
//! machine.tell("LIGHT", "red", None).unwrap();
//! assert!(!machine.context_live(&["LIGHT", "CAR"]));
//! ```

pub mod machine;
pub mod trace;
pub mod tree;

// Re-export commonly used types
pub use machine::{Followup, Gate, Machine, MachineConfig, MachineError, Scope};
pub use trace::{TransitionLog, TransitionRecord};
pub use tree::{leaf, node, restrict, Node, TreeError};

//! Machine configuration.

use serde::{Deserialize, Serialize};

/// Configuration shared by every context of a machine.
///
/// One value is owned by the machine root and read by every nested context;
/// [`Machine::configure`](crate::Machine::configure) replaces it wholesale.
///
/// # Example
///
/// ```rust
/// use strata::MachineConfig;
///
/// let config: MachineConfig = serde_json::from_str(r#"{"debug": true}"#).unwrap();
/// assert!(config.debug);
/// assert!(!config.require_handler);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Write one `<indent><name> => <state>` line to stderr per committed
    /// transition, indented four spaces per nesting level. Advisory output,
    /// not a stable format.
    pub debug: bool,

    /// Fail transitions with
    /// [`MissingHandler`](crate::MachineError::MissingHandler) when no
    /// enter handler is registered for the destination state.
    pub require_handler: bool,
}

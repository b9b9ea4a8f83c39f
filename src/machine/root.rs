//! The machine facade: sentinel root context, configuration, and queries.

use crate::machine::config::MachineConfig;
use crate::machine::context::RegionCtx;
use crate::machine::error::MachineError;
use crate::machine::gate::Gate;
use crate::machine::handler::Followup;
use crate::machine::scope::Scope;
use crate::machine::SENTINEL;
use crate::trace::TransitionLog;
use crate::tree::{Node, TreeError};
use serde_json::Value;
use std::rc::Rc;
use std::sync::Arc;

/// A running hierarchical state machine.
///
/// Wraps the caller's top-level regions as children of an internal sentinel
/// root context and owns everything live: nested contexts, pending queues,
/// configuration, and the committed-transition log.
///
/// # Example
///
/// ```rust
/// use strata::tree::leaf;
/// use strata::{Followup, Machine};
///
/// let light = leaf("LIGHT", ["red", "green"]).unwrap();
/// let mut machine = Machine::create([light]).unwrap();
///
/// machine.when("LIGHT", "red", |_scope, _data| Followup::None).unwrap();
/// machine.tell("LIGHT", "red", None).unwrap();
///
/// assert_eq!(machine.current_state("LIGHT").unwrap(), Some("red"));
/// ```
pub struct Machine {
    pub(crate) root: RegionCtx,
    pub(crate) config: MachineConfig,
    pub(crate) log: TransitionLog,
    pub(crate) serial: u64,
}

impl Machine {
    /// Build a machine over the given top-level regions. Fails with
    /// [`TreeError::DuplicateChild`] when two roots share a name.
    pub fn create(roots: impl IntoIterator<Item = Arc<Node>>) -> Result<Self, TreeError> {
        let sentinel = Node::sentinel(roots.into_iter().collect())?;
        Ok(Self {
            root: RegionCtx::new(sentinel, None, 0),
            config: MachineConfig::default(),
            log: TransitionLog::new(),
            serial: 0,
        })
    }

    /// Replace the configuration shared by every live context.
    pub fn configure(&mut self, config: MachineConfig) {
        self.config = config;
    }

    pub fn config(&self) -> MachineConfig {
        self.config
    }

    /// Register the enter handler for a top-level region's state.
    pub fn when(
        &mut self,
        child: &str,
        state: &str,
        handler: impl Fn(&mut Scope<'_>, Option<&Value>) -> Followup + 'static,
    ) -> Result<(), MachineError> {
        let serial = self.root.serial;
        self.register_handler(&[], serial, child, state, Rc::new(handler))
    }

    /// Register a guard on a top-level region. Either side may be `"*"`.
    pub fn guard(
        &mut self,
        child: &str,
        from: &str,
        to: &str,
        handler: impl Fn(&mut Scope<'_>, Gate, Option<&Value>) -> Followup + 'static,
    ) -> Result<(), MachineError> {
        let serial = self.root.serial;
        self.register_guard(&[], serial, child, from, to, Rc::new(handler))
    }

    /// Request a transition on a top-level region. `None` as the target
    /// state exits the region without re-entering it.
    pub fn tell<'a>(
        &mut self,
        child: &str,
        to: impl Into<Option<&'a str>>,
        data: impl Into<Option<Value>>,
    ) -> Result<(), MachineError> {
        let serial = self.root.serial;
        self.schedule(&[], serial, SENTINEL.to_string(), child, to.into(), data.into())
    }

    /// Advance every live context by one tick. Leaf update hooks run before
    /// their ancestors'; transitions requested inside an update hook take
    /// effect before this call returns.
    pub fn update(&mut self, delta: f64) -> Result<(), MachineError> {
        let serial = self.root.serial;
        self.update_ctx(&[], serial, delta)
    }

    /// Current state of a top-level region, `None` before its first entry.
    pub fn current_state(&self, child: &str) -> Result<Option<&str>, MachineError> {
        self.current_state_of(&[], self.root.serial, child)
    }

    /// Current state of a nested region addressed by name path from the
    /// root, e.g. `["LIGHT", "CAR"]`.
    pub fn state_at(&self, path: &[&str]) -> Result<Option<&str>, MachineError> {
        let Some((last, ancestors)) = path.split_last() else {
            return Err(MachineError::UnknownChild {
                name: String::new(),
            });
        };
        let mut ctx = &self.root;
        for name in ancestors {
            let idx = ctx.slot_index(name).ok_or_else(|| MachineError::UnknownChild {
                name: (*name).into(),
            })?;
            ctx = ctx.slots[idx]
                .ctx
                .as_deref()
                .ok_or_else(|| MachineError::UnknownChild {
                    name: (*name).into(),
                })?;
        }
        let idx = ctx.slot_index(last).ok_or_else(|| MachineError::UnknownChild {
            name: (*last).into(),
        })?;
        let slot = &ctx.slots[idx];
        Ok(slot.current.map(|id| slot.node.states()[id].as_str()))
    }

    /// True while the region addressed by name path has a live context.
    pub fn context_live(&self, path: &[&str]) -> bool {
        let mut ctx = &self.root;
        for name in path {
            let Some(idx) = ctx.slot_index(name) else {
                return false;
            };
            match ctx.slots[idx].ctx.as_deref() {
                Some(child) => ctx = child,
                None => return false,
            }
        }
        !path.is_empty()
    }

    /// The committed-transition log.
    pub fn trace(&self) -> &TransitionLog {
        &self.log
    }

    /// Drop all recorded transitions.
    pub fn clear_trace(&mut self) {
        self.log.clear();
    }
}

//! The per-context handle passed to handler callbacks.

use crate::machine::context::Path;
use crate::machine::error::MachineError;
use crate::machine::gate::Gate;
use crate::machine::handler::Followup;
use crate::machine::root::Machine;
use crate::tree::Node;
use serde_json::Value;
use std::rc::Rc;
use std::sync::Arc;

/// A live region context, as seen from inside a handler.
///
/// Every enter, update, exit and guard callback receives a scope for the
/// context it runs against. The scope registers handlers and guards for the
/// context's children, requests transitions ([`tell`](Scope::tell) /
/// [`ask`](Scope::ask) / [`set`](Scope::set)), and answers queries about
/// the live state assignment. All requests funnel through the machine's
/// pending queues, so a handler may freely request further transitions,
/// including ones that tear down the very context it runs against.
pub struct Scope<'m> {
    machine: &'m mut Machine,
    path: Path,
    serial: u64,
    node: Arc<Node>,
    assigned: Option<usize>,
}

impl<'m> Scope<'m> {
    pub(crate) fn new(machine: &'m mut Machine, path: Path, serial: u64) -> Option<Self> {
        let ctx = machine.ctx_checked(&path, serial)?;
        let node = Arc::clone(&ctx.node);
        let assigned = ctx.assigned;
        Some(Self {
            machine,
            path,
            serial,
            node,
            assigned,
        })
    }

    /// Name of the node this context instantiates.
    pub fn name(&self) -> &str {
        self.node.name()
    }

    /// This context's own assigned state (`None` for the sentinel root).
    pub fn state(&self) -> Option<&str> {
        self.assigned.map(|id| self.node.states()[id].as_str())
    }

    /// Nesting depth: 0 for the sentinel root, 1 for top-level regions.
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Current state of a child region, `None` before its first entry.
    pub fn current_state(&self, child: &str) -> Result<Option<&str>, MachineError> {
        self.machine.current_state_of(&self.path, self.serial, child)
    }

    /// Register the enter handler for `(child, state)`. The handler's
    /// [`Followup`] wires update/exit hooks onto the entered context. Last
    /// registration for a pair wins.
    pub fn when(
        &mut self,
        child: &str,
        state: &str,
        handler: impl Fn(&mut Scope<'_>, Option<&Value>) -> Followup + 'static,
    ) -> Result<(), MachineError> {
        self.machine
            .register_handler(&self.path, self.serial, child, state, Rc::new(handler))
    }

    /// Register a guard for transitions of `child` matching
    /// `(from, to)`, where either side may be the wildcard `"*"`. The most
    /// specific registered pattern wins at match time.
    pub fn guard(
        &mut self,
        child: &str,
        from: &str,
        to: &str,
        handler: impl Fn(&mut Scope<'_>, Gate, Option<&Value>) -> Followup + 'static,
    ) -> Result<(), MachineError> {
        self.machine
            .register_guard(&self.path, self.serial, child, from, to, Rc::new(handler))
    }

    /// Request a transition on a child of this context. `None` as the
    /// target state exits the child without re-entering it.
    pub fn tell<'a>(
        &mut self,
        child: &str,
        to: impl Into<Option<&'a str>>,
        data: impl Into<Option<Value>>,
    ) -> Result<(), MachineError> {
        let source = self.node.name().to_string();
        self.machine
            .schedule(&self.path, self.serial, source, child, to.into(), data.into())
    }

    /// Request a transition on a child of the parent context: a sibling,
    /// or this region itself.
    pub fn ask<'a>(
        &mut self,
        child: &str,
        to: impl Into<Option<&'a str>>,
        data: impl Into<Option<Value>>,
    ) -> Result<(), MachineError> {
        if self.path.is_empty() {
            return Err(MachineError::UnknownChild { name: child.into() });
        }
        // Own liveness implies the whole ancestor chain is intact.
        if self.machine.ctx_checked(&self.path, self.serial).is_none() {
            return Err(MachineError::UnknownChild { name: child.into() });
        }
        let parent = self.path[..self.path.len() - 1].to_vec();
        let parent_serial = self
            .machine
            .serial_at(&parent)
            .ok_or_else(|| MachineError::UnknownChild { name: child.into() })?;
        let source = self.node.name().to_string();
        self.machine
            .schedule(&parent, parent_serial, source, child, to.into(), data.into())
    }

    /// Request a transition on this context's own represented state;
    /// shorthand for `ask` with this region's name.
    pub fn set<'a>(
        &mut self,
        to: impl Into<Option<&'a str>>,
        data: impl Into<Option<Value>>,
    ) -> Result<(), MachineError> {
        let name = self.node.name().to_string();
        self.ask(&name, to, data)
    }

    /// Commit a pending guard decision from inside handler code.
    pub fn proceed(&mut self, gate: Gate) -> Result<(), MachineError> {
        self.machine.gate_proceed(gate)
    }

    /// Abandon a pending guard decision from inside handler code.
    pub fn cancel(&mut self, gate: Gate) -> Result<(), MachineError> {
        self.machine.gate_cancel(gate)
    }
}

//! The transition/guard protocol and update propagation.
//!
//! Every operation resolves its target context freshly from the machine
//! root by slot-index path, and no borrow is held across a callback
//! invocation: handlers are free to reenter the protocol, including in ways
//! that tear down the context they were resolved against. A context that
//! disappears mid-operation is detected by its serial and the operation
//! unwinds quietly; per-target ordering comes from the pending queues, not
//! from the call stack.

use crate::machine::context::{Command, Pat, PendingGuard, RegionCtx};
use crate::machine::error::MachineError;
use crate::machine::gate::Gate;
use crate::machine::handler::{EnterFn, Followup, GuardFn};
use crate::machine::root::Machine;
use crate::machine::scope::Scope;
use crate::trace::TransitionRecord;
use crate::tree::{Node, WILDCARD};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

fn label(node: &Node, id: Option<usize>) -> Option<String> {
    id.map(|i| node.states()[i].clone())
}

impl Machine {
    pub(crate) fn next_serial(&mut self) -> u64 {
        self.serial += 1;
        self.serial
    }

    pub(crate) fn ctx_at(&mut self, path: &[usize]) -> Option<&mut RegionCtx> {
        let mut cur = &mut self.root;
        for &i in path {
            cur = cur.slots.get_mut(i)?.ctx.as_deref_mut()?;
        }
        Some(cur)
    }

    pub(crate) fn ctx_checked(&mut self, path: &[usize], serial: u64) -> Option<&mut RegionCtx> {
        self.ctx_at(path).filter(|c| c.serial == serial)
    }

    pub(crate) fn ctx_ref(&self, path: &[usize]) -> Option<&RegionCtx> {
        let mut cur = &self.root;
        for &i in path {
            cur = cur.slots.get(i)?.ctx.as_deref()?;
        }
        Some(cur)
    }

    pub(crate) fn serial_at(&self, path: &[usize]) -> Option<u64> {
        self.ctx_ref(path).map(|c| c.serial)
    }

    pub(crate) fn current_state_of(
        &self,
        path: &[usize],
        serial: u64,
        child: &str,
    ) -> Result<Option<&str>, MachineError> {
        let ctx = self
            .ctx_ref(path)
            .filter(|c| c.serial == serial)
            .ok_or_else(|| MachineError::UnknownChild { name: child.into() })?;
        let idx = ctx
            .slot_index(child)
            .ok_or_else(|| MachineError::UnknownChild { name: child.into() })?;
        let slot = &ctx.slots[idx];
        Ok(slot.current.map(|id| slot.node.states()[id].as_str()))
    }

    pub(crate) fn register_handler(
        &mut self,
        path: &[usize],
        serial: u64,
        child: &str,
        state: &str,
        handler: EnterFn,
    ) -> Result<(), MachineError> {
        let Some(ctx) = self.ctx_checked(path, serial) else {
            return Err(MachineError::UnknownChild { name: child.into() });
        };
        let idx = ctx
            .slot_index(child)
            .ok_or_else(|| MachineError::UnknownChild { name: child.into() })?;
        let sid = ctx.slots[idx].node.state_id(state).ok_or_else(|| {
            MachineError::UnknownState {
                node: child.into(),
                state: state.into(),
            }
        })?;
        ctx.handlers.insert((idx, sid), handler);
        Ok(())
    }

    pub(crate) fn register_guard(
        &mut self,
        path: &[usize],
        serial: u64,
        child: &str,
        from: &str,
        to: &str,
        handler: GuardFn,
    ) -> Result<(), MachineError> {
        let Some(ctx) = self.ctx_checked(path, serial) else {
            return Err(MachineError::UnknownChild { name: child.into() });
        };
        let idx = ctx
            .slot_index(child)
            .ok_or_else(|| MachineError::UnknownChild { name: child.into() })?;
        if !ctx.slots[idx].node.has_transition(from, to) {
            return Err(MachineError::InvalidTransition {
                node: child.into(),
                from: from.into(),
                to: to.into(),
            });
        }
        let pf = if from == WILDCARD {
            Pat::Any
        } else {
            match ctx.slots[idx].node.state_id(from) {
                Some(id) => Pat::Is(id),
                None => {
                    return Err(MachineError::UnknownState {
                        node: child.into(),
                        state: from.into(),
                    })
                }
            }
        };
        let pt = if to == WILDCARD {
            Pat::Any
        } else {
            match ctx.slots[idx].node.state_id(to) {
                Some(id) => Pat::Is(id),
                None => {
                    return Err(MachineError::UnknownState {
                        node: child.into(),
                        state: to.into(),
                    })
                }
            }
        };
        ctx.guards.insert((idx, pf, pt), handler);
        Ok(())
    }

    /// The single scheduling primitive behind `tell`/`ask`/`set`: validate,
    /// queue with coalescing, and drain unless something already is.
    pub(crate) fn schedule(
        &mut self,
        owner: &[usize],
        owner_serial: u64,
        source: String,
        child: &str,
        to: Option<&str>,
        data: Option<Value>,
    ) -> Result<(), MachineError> {
        let Some(ctx) = self.ctx_checked(owner, owner_serial) else {
            return Err(MachineError::UnknownChild { name: child.into() });
        };
        let idx = ctx
            .slot_index(child)
            .ok_or_else(|| MachineError::UnknownChild { name: child.into() })?;
        let slot = &mut ctx.slots[idx];
        let to_id = match to {
            None => None,
            Some(state) => Some(slot.node.state_id(state).ok_or_else(|| {
                MachineError::UnknownState {
                    node: child.into(),
                    state: state.into(),
                }
            })?),
        };
        let superseding = slot.queue.len() == 2;
        let idle = slot.queue.push(Command {
            source,
            from: slot.current,
            to: to_id,
            data,
        });
        if superseding {
            tracing::trace!(region = child, "superseded pending transition dropped");
        }
        let deferred = ctx.in_update;
        if idle && !deferred {
            self.drain(owner, owner_serial, idx)
        } else {
            Ok(())
        }
    }

    /// Drain the pending queue of one child slot. The front command stays
    /// queued while it executes (queue length is the "something is already
    /// running" signal) and is popped once execution fully returns.
    pub(crate) fn drain(
        &mut self,
        owner: &[usize],
        owner_serial: u64,
        idx: usize,
    ) -> Result<(), MachineError> {
        loop {
            let cmd = {
                let Some(ctx) = self.ctx_checked(owner, owner_serial) else {
                    return Ok(());
                };
                match ctx.slots[idx].queue.front() {
                    Some(cmd) => cmd.clone(),
                    None => return Ok(()),
                }
            };
            let result = self.execute(owner, owner_serial, idx, cmd);
            if let Some(ctx) = self.ctx_checked(owner, owner_serial) {
                ctx.slots[idx].queue.shift();
            }
            result?;
        }
    }

    fn execute(
        &mut self,
        owner: &[usize],
        owner_serial: u64,
        idx: usize,
        cmd: Command,
    ) -> Result<(), MachineError> {
        let Some(ctx) = self.ctx_checked(owner, owner_serial) else {
            return Ok(());
        };
        let node = Arc::clone(&ctx.slots[idx].node);
        if ctx.slots[idx].current != cmd.from {
            return Err(MachineError::StateInconsistency {
                node: node.name().into(),
                expected: label(&node, cmd.from),
                actual: label(&node, ctx.slots[idx].current),
            });
        }
        match ctx.guard_for(idx, cmd.from, cmd.to) {
            Some(guard) => self.run_guard(owner, owner_serial, idx, guard, cmd),
            None => self.commit(owner, owner_serial, idx, &cmd),
        }
    }

    fn run_guard(
        &mut self,
        owner: &[usize],
        owner_serial: u64,
        idx: usize,
        guard: GuardFn,
        cmd: Command,
    ) -> Result<(), MachineError> {
        let token = self.next_serial();
        let Some(ctx) = self.ctx_checked(owner, owner_serial) else {
            return Ok(());
        };
        let node = Arc::clone(&ctx.slots[idx].node);
        ctx.slots[idx].pending_guard = Some(PendingGuard {
            token,
            from: cmd.from,
            to: cmd.to,
            data: cmd.data.clone(),
            source: cmd.source.clone(),
            on_update: None,
            on_exit: None,
        });
        let from_label = label(&node, cmd.from);
        let to_label = label(&node, cmd.to);
        tracing::trace!(
            region = node.name(),
            from = from_label.as_deref(),
            to = to_label.as_deref(),
            "guard consulted"
        );
        let gate = Gate {
            owner_path: owner.to_vec(),
            owner_serial,
            slot: idx,
            token,
            child: node.name().into(),
            source: cmd.source.clone(),
            from: from_label.clone(),
            to: to_label.clone(),
        };
        let followup = match Scope::new(self, owner.to_vec(), owner_serial) {
            Some(mut scope) => guard(&mut scope, gate, cmd.data.as_ref()),
            None => Followup::None,
        };
        match followup {
            Followup::Proceed => {
                let gate = Gate {
                    owner_path: owner.to_vec(),
                    owner_serial,
                    slot: idx,
                    token,
                    child: node.name().into(),
                    source: cmd.source,
                    from: from_label,
                    to: to_label,
                };
                self.gate_proceed(gate)
            }
            Followup::None => Ok(()),
            Followup::Override { update, exit } => {
                if let Some(ctx) = self.ctx_checked(owner, owner_serial) {
                    if let Some(pg) = ctx.slots[idx]
                        .pending_guard
                        .as_mut()
                        .filter(|pg| pg.token == token)
                    {
                        pg.on_update = update;
                        pg.on_exit = exit;
                    }
                }
                Ok(())
            }
            Followup::ExitOnly(exit) => {
                if let Some(ctx) = self.ctx_checked(owner, owner_serial) {
                    if let Some(pg) = ctx.slots[idx]
                        .pending_guard
                        .as_mut()
                        .filter(|pg| pg.token == token)
                    {
                        pg.on_exit = Some(exit);
                    }
                }
                Ok(())
            }
        }
    }

    /// The transition path: strictness check first, so a failure precedes
    /// any mutation; then exit the old context (deepest first), record the
    /// new assignment, enter, and wire the enter handler's followup.
    fn commit(
        &mut self,
        owner: &[usize],
        owner_serial: u64,
        idx: usize,
        cmd: &Command,
    ) -> Result<(), MachineError> {
        let require = self.config.require_handler;
        let Some(ctx) = self.ctx_checked(owner, owner_serial) else {
            return Ok(());
        };
        let node = Arc::clone(&ctx.slots[idx].node);
        let enter = cmd.to.and_then(|sid| ctx.handlers.get(&(idx, sid)).cloned());
        if let Some(sid) = cmd.to {
            if require && enter.is_none() {
                return Err(MachineError::MissingHandler {
                    node: node.name().into(),
                    state: node.states()[sid].clone(),
                });
            }
        }

        if let Some(old_serial) = ctx.slots[idx].ctx.as_ref().map(|c| c.serial) {
            let mut child_path = owner.to_vec();
            child_path.push(idx);
            self.exit_subtree(&child_path, old_serial);
            match self.ctx_checked(owner, owner_serial) {
                Some(ctx) => ctx.slots[idx].ctx = None,
                None => return Ok(()),
            }
        }

        let serial = self.next_serial();
        let Some(ctx) = self.ctx_checked(owner, owner_serial) else {
            return Ok(());
        };
        ctx.slots[idx].current = cmd.to;
        let depth = owner.len();
        match cmd.to {
            Some(sid) => {
                ctx.slots[idx].ctx = Some(Box::new(RegionCtx::new(
                    Arc::clone(&node),
                    Some(sid),
                    serial,
                )));
                self.record_commit(&node, cmd, depth);
                if let Some(enter) = enter {
                    let mut child_path = owner.to_vec();
                    child_path.push(idx);
                    let followup = match Scope::new(self, child_path.clone(), serial) {
                        Some(mut scope) => enter(&mut scope, cmd.data.as_ref()),
                        None => Followup::None,
                    };
                    match followup {
                        Followup::None | Followup::Proceed => {}
                        Followup::Override { update, exit } => {
                            if let Some(new_ctx) = self.ctx_checked(&child_path, serial) {
                                new_ctx.on_update = update;
                                new_ctx.on_exit = exit;
                            }
                        }
                        Followup::ExitOnly(exit) => {
                            if let Some(new_ctx) = self.ctx_checked(&child_path, serial) {
                                new_ctx.on_exit = Some(exit);
                            }
                        }
                    }
                }
            }
            None => self.record_commit(&node, cmd, depth),
        }
        Ok(())
    }

    /// Run exits for a context and everything under it: live children
    /// recursively first, depth-first, then the context's own exit hook.
    /// The caller detaches the context afterwards.
    fn exit_subtree(&mut self, path: &[usize], serial: u64) {
        let Some(ctx) = self.ctx_checked(path, serial) else {
            return;
        };
        let live: Vec<(usize, u64)> = ctx
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.ctx.as_ref().map(|c| (i, c.serial)))
            .collect();
        for (i, child_serial) in live {
            let mut child_path = path.to_vec();
            child_path.push(i);
            self.exit_subtree(&child_path, child_serial);
            match self.ctx_checked(path, serial) {
                Some(ctx) => {
                    if ctx.slots[i].ctx.as_ref().is_some_and(|c| c.serial == child_serial) {
                        ctx.slots[i].ctx = None;
                    }
                }
                None => return,
            }
        }
        let Some(ctx) = self.ctx_checked(path, serial) else {
            return;
        };
        let exit = ctx.on_exit.clone();
        if let Some(exit) = exit {
            tracing::trace!(region = ctx.node.name(), "exiting");
            if let Some(mut scope) = Scope::new(self, path.to_vec(), serial) {
                exit(&mut scope);
            }
        }
    }

    /// Depth-first update walk: recurse into live children before invoking
    /// their state update hooks, raise `in_update` around the hooks so
    /// transitions requested inside defer, then drain each child's queue.
    pub(crate) fn update_ctx(
        &mut self,
        path: &[usize],
        serial: u64,
        delta: f64,
    ) -> Result<(), MachineError> {
        let Some(ctx) = self.ctx_checked(path, serial) else {
            return Ok(());
        };
        let live: Vec<(usize, u64)> = ctx
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.ctx.as_ref().map(|c| (i, c.serial)))
            .collect();
        for (i, child_serial) in live {
            let mut child_path = path.to_vec();
            child_path.push(i);
            self.update_ctx(&child_path, child_serial, delta)?;

            let Some(ctx) = self.ctx_checked(path, serial) else {
                return Ok(());
            };
            let hook = ctx.slots[i]
                .ctx
                .as_ref()
                .filter(|c| c.serial == child_serial)
                .and_then(|c| c.on_update.clone());
            ctx.in_update = true;
            if let Some(hook) = hook {
                if let Some(mut scope) = Scope::new(self, child_path.clone(), child_serial) {
                    hook(&mut scope, delta);
                }
            }
            // a pending guard ticks with the context that owns the decision
            let guard_hook = self.ctx_checked(path, serial).and_then(|ctx| {
                ctx.slots[i]
                    .pending_guard
                    .as_ref()
                    .and_then(|pg| pg.on_update.clone())
            });
            if let Some(hook) = guard_hook {
                if let Some(mut scope) = Scope::new(self, path.to_vec(), serial) {
                    hook(&mut scope, delta);
                }
            }
            match self.ctx_checked(path, serial) {
                Some(ctx) => ctx.in_update = false,
                None => return Ok(()),
            }
            self.drain(path, serial, i)?;
        }
        // requests deferred onto slots whose own phase never ran (asks
        // aimed at an earlier or not-yet-entered sibling) still take
        // effect before the tick returns
        let Some(ctx) = self.ctx_checked(path, serial) else {
            return Ok(());
        };
        let backlog: Vec<usize> = ctx
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.queue.is_empty())
            .map(|(i, _)| i)
            .collect();
        for i in backlog {
            self.drain(path, serial, i)?;
        }
        Ok(())
    }

    pub(crate) fn gate_proceed(&mut self, gate: Gate) -> Result<(), MachineError> {
        let Some(ctx) = self.ctx_checked(&gate.owner_path, gate.owner_serial) else {
            return Err(MachineError::StaleGuard { node: gate.child });
        };
        let matches = ctx.slots[gate.slot]
            .pending_guard
            .as_ref()
            .is_some_and(|pg| pg.token == gate.token);
        if !matches {
            return Err(MachineError::StaleGuard { node: gate.child });
        }
        let Some(pg) = ctx.slots[gate.slot].pending_guard.take() else {
            return Err(MachineError::StaleGuard { node: gate.child });
        };
        let node = Arc::clone(&ctx.slots[gate.slot].node);
        if ctx.slots[gate.slot].current != pg.from {
            let actual = ctx.slots[gate.slot].current;
            return Err(MachineError::StateInconsistency {
                node: gate.child,
                expected: label(&node, pg.from),
                actual: label(&node, actual),
            });
        }
        tracing::trace!(region = node.name(), "guard proceeding");
        if let Some(exit) = pg.on_exit.clone() {
            if let Some(mut scope) = Scope::new(self, gate.owner_path.clone(), gate.owner_serial) {
                exit(&mut scope);
            }
        }
        let cmd = Command {
            source: pg.source,
            from: pg.from,
            to: pg.to,
            data: pg.data,
        };
        let Some(ctx) = self.ctx_checked(&gate.owner_path, gate.owner_serial) else {
            return Err(MachineError::StaleGuard { node: gate.child });
        };
        if ctx.slots[gate.slot].queue.is_empty() {
            // mark ourselves in flight so reentrant requests queue behind
            // us, then pick up anything that arrived during pendency
            ctx.slots[gate.slot].queue.push(cmd.clone());
            let result = self.commit(&gate.owner_path, gate.owner_serial, gate.slot, &cmd);
            if let Some(ctx) = self.ctx_checked(&gate.owner_path, gate.owner_serial) {
                ctx.slots[gate.slot].queue.shift();
            }
            result?;
            self.drain(&gate.owner_path, gate.owner_serial, gate.slot)
        } else {
            // a drain is already on the stack; run inline and let it keep
            // its ordering
            self.commit(&gate.owner_path, gate.owner_serial, gate.slot, &cmd)
        }
    }

    pub(crate) fn gate_cancel(&mut self, gate: Gate) -> Result<(), MachineError> {
        let Some(ctx) = self.ctx_checked(&gate.owner_path, gate.owner_serial) else {
            return Err(MachineError::StaleGuard { node: gate.child });
        };
        let matches = ctx.slots[gate.slot]
            .pending_guard
            .as_ref()
            .is_some_and(|pg| pg.token == gate.token);
        if !matches {
            return Err(MachineError::StaleGuard { node: gate.child });
        }
        ctx.slots[gate.slot].pending_guard = None;
        tracing::trace!(region = gate.child.as_str(), "guard cancelled");
        Ok(())
    }

    fn record_commit(&mut self, node: &Node, cmd: &Command, depth: usize) {
        let from = label(node, cmd.from);
        let to = label(node, cmd.to);
        tracing::debug!(
            region = node.name(),
            from = from.as_deref(),
            to = to.as_deref(),
            source = cmd.source.as_str(),
            "transition committed"
        );
        if self.config.debug {
            let shown = to.as_deref().unwrap_or("unset");
            eprintln!("{:indent$}{} => {}", "", node.name(), shown, indent = depth * 4);
        }
        self.log.record(TransitionRecord {
            region: node.name().into(),
            from,
            to,
            source: cmd.source.clone(),
            depth,
            timestamp: Utc::now(),
        });
    }
}

//! Live region contexts.
//!
//! A [`RegionCtx`] is the runtime instance of a [`Node`] at a particular
//! assigned state. The parent owns its live children by value; everything
//! upward-reaching goes through slot-index paths resolved from the machine
//! root, so no strong reference cycle ever forms. Contexts carry a serial
//! stamped at creation; a path plus the expected serial detects contexts
//! that were torn down and replaced while a callback was running.

use crate::machine::handler::{EnterFn, ExitFn, GuardFn, UpdateFn};
use crate::machine::queue::PendingPair;
use crate::tree::Node;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Slot-index path from the machine root to a context.
pub(crate) type Path = Vec<usize>;

/// A guard pattern side: a literal state or the wildcard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Pat {
    Any,
    Is(usize),
}

/// One requested state change, consumed by the protocol.
#[derive(Clone, Debug)]
pub(crate) struct Command {
    pub(crate) source: String,
    pub(crate) from: Option<usize>,
    pub(crate) to: Option<usize>,
    pub(crate) data: Option<Value>,
}

/// A guard that ran its enter callback and is awaiting proceed/cancel.
pub(crate) struct PendingGuard {
    pub(crate) token: u64,
    pub(crate) from: Option<usize>,
    pub(crate) to: Option<usize>,
    pub(crate) data: Option<Value>,
    pub(crate) source: String,
    pub(crate) on_update: Option<UpdateFn>,
    pub(crate) on_exit: Option<ExitFn>,
}

/// Per-child runtime state held by the owning context.
pub(crate) struct ChildSlot {
    pub(crate) node: Arc<Node>,
    pub(crate) current: Option<usize>,
    pub(crate) ctx: Option<Box<RegionCtx>>,
    pub(crate) queue: PendingPair<Command>,
    pub(crate) pending_guard: Option<PendingGuard>,
}

pub(crate) struct RegionCtx {
    pub(crate) node: Arc<Node>,
    pub(crate) assigned: Option<usize>,
    pub(crate) serial: u64,
    pub(crate) in_update: bool,
    pub(crate) slots: Vec<ChildSlot>,
    pub(crate) handlers: HashMap<(usize, usize), EnterFn>,
    pub(crate) guards: HashMap<(usize, Pat, Pat), GuardFn>,
    pub(crate) on_update: Option<UpdateFn>,
    pub(crate) on_exit: Option<ExitFn>,
}

impl RegionCtx {
    pub(crate) fn new(node: Arc<Node>, assigned: Option<usize>, serial: u64) -> Self {
        let slots = node
            .visible_decls(assigned)
            .map(|decl| ChildSlot {
                node: Arc::clone(&decl.node),
                current: None,
                ctx: None,
                queue: PendingPair::new(),
                pending_guard: None,
            })
            .collect();
        Self {
            node,
            assigned,
            serial,
            in_update: false,
            slots,
            handlers: HashMap::new(),
            guards: HashMap::new(),
            on_update: None,
            on_exit: None,
        }
    }

    /// Slot index of a visible child by name.
    pub(crate) fn slot_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.node.name() == name)
    }

    /// Matching guard for a decided `(from, to)`, by precedence:
    /// exact pair, then `(from, *)`, then `(*, to)`, then `(*, *)`.
    pub(crate) fn guard_for(
        &self,
        slot: usize,
        from: Option<usize>,
        to: Option<usize>,
    ) -> Option<GuardFn> {
        let mut keys = Vec::with_capacity(4);
        if let (Some(f), Some(t)) = (from, to) {
            keys.push((slot, Pat::Is(f), Pat::Is(t)));
        }
        if let Some(f) = from {
            keys.push((slot, Pat::Is(f), Pat::Any));
        }
        if let Some(t) = to {
            keys.push((slot, Pat::Any, Pat::Is(t)));
        }
        keys.push((slot, Pat::Any, Pat::Any));
        keys.into_iter().find_map(|k| self.guards.get(&k).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::handler::Followup;
    use crate::tree::{leaf, node, restrict};
    use std::rc::Rc;

    fn ctx_at(state: Option<usize>) -> RegionCtx {
        let car = leaf("CAR", ["forward", "brake"]).unwrap();
        let light = node(
            "LIGHT",
            ["red", "yellow", "green"],
            [restrict(["green"], [car])],
        )
        .unwrap();
        RegionCtx::new(light, state, 1)
    }

    #[test]
    fn slots_mirror_visibility() {
        // green is state index 2; CAR is restricted to it.
        assert_eq!(ctx_at(Some(2)).slot_index("CAR"), Some(0));
        assert_eq!(ctx_at(Some(0)).slot_index("CAR"), None);
        assert_eq!(ctx_at(None).slot_index("CAR"), None);
    }

    #[test]
    fn guard_precedence_prefers_the_most_specific_pattern() {
        let mut ctx = ctx_at(Some(2));
        let make = || -> GuardFn { Rc::new(|_s, _gate, _d| Followup::None) };
        let exact = make();
        let from_any = make();
        let any_to = make();
        let any_any = make();
        ctx.guards.insert((0, Pat::Is(0), Pat::Is(1)), Rc::clone(&exact));
        ctx.guards.insert((0, Pat::Is(0), Pat::Any), Rc::clone(&from_any));
        ctx.guards.insert((0, Pat::Any, Pat::Is(1)), Rc::clone(&any_to));
        ctx.guards.insert((0, Pat::Any, Pat::Any), Rc::clone(&any_any));

        let found = ctx.guard_for(0, Some(0), Some(1)).unwrap();
        assert!(Rc::ptr_eq(&found, &exact));

        ctx.guards.remove(&(0, Pat::Is(0), Pat::Is(1)));
        let found = ctx.guard_for(0, Some(0), Some(1)).unwrap();
        assert!(Rc::ptr_eq(&found, &from_any));

        ctx.guards.remove(&(0, Pat::Is(0), Pat::Any));
        let found = ctx.guard_for(0, Some(0), Some(1)).unwrap();
        assert!(Rc::ptr_eq(&found, &any_to));

        ctx.guards.remove(&(0, Pat::Any, Pat::Is(1)));
        let found = ctx.guard_for(0, Some(0), Some(1)).unwrap();
        assert!(Rc::ptr_eq(&found, &any_any));

        ctx.guards.remove(&(0, Pat::Any, Pat::Any));
        assert!(ctx.guard_for(0, Some(0), Some(1)).is_none());
    }

    #[test]
    fn unset_from_matches_only_wildcard_patterns() {
        let mut ctx = ctx_at(Some(2));
        let g: GuardFn = Rc::new(|_s, _gate, _d| Followup::None);
        ctx.guards.insert((0, Pat::Is(0), Pat::Is(1)), Rc::clone(&g));
        assert!(ctx.guard_for(0, None, Some(1)).is_none());
        ctx.guards.insert((0, Pat::Any, Pat::Is(1)), g);
        assert!(ctx.guard_for(0, None, Some(1)).is_some());
    }
}

//! Handler callback types and the enter-result contract.

use crate::machine::gate::Gate;
use crate::machine::scope::Scope;
use serde_json::Value;
use std::rc::Rc;

/// Enter handler for a `(child, state)` pair. Receives the freshly entered
/// context and the request payload; its return value wires further hooks.
pub type EnterFn = Rc<dyn Fn(&mut Scope<'_>, Option<&Value>) -> Followup>;

/// Guard handler for a `(child, from, to)` pattern. Receives the owning
/// context, the [`Gate`] for the decided transition, and the payload.
pub type GuardFn = Rc<dyn Fn(&mut Scope<'_>, Gate, Option<&Value>) -> Followup>;

/// Per-tick update hook installed by a [`Followup`].
pub type UpdateFn = Rc<dyn Fn(&mut Scope<'_>, f64)>;

/// Exit hook installed by a [`Followup`].
pub type ExitFn = Rc<dyn Fn(&mut Scope<'_>)>;

/// What an enter or guard callback asks the runtime to do next.
///
/// The variants mirror the handler wiring contract: `None` installs no
/// further hooks, `Override` installs update and/or exit hooks on the
/// entered context, `ExitOnly` installs a bare exit hook, and `Proceed`
/// commits a guarded transition immediately (meaningful on the guard path
/// only; a state enter handler returning it installs nothing).
pub enum Followup {
    None,
    Override {
        update: Option<UpdateFn>,
        exit: Option<ExitFn>,
    },
    ExitOnly(ExitFn),
    Proceed,
}

impl Followup {
    /// Install an update hook on the entered context.
    pub fn on_update(f: impl Fn(&mut Scope<'_>, f64) + 'static) -> Self {
        Followup::Override {
            update: Some(Rc::new(f)),
            exit: None,
        }
    }

    /// Install an exit hook on the entered context.
    pub fn on_exit(f: impl Fn(&mut Scope<'_>) + 'static) -> Self {
        Followup::ExitOnly(Rc::new(f))
    }

    /// Install both hooks.
    pub fn hooks(
        update: impl Fn(&mut Scope<'_>, f64) + 'static,
        exit: impl Fn(&mut Scope<'_>) + 'static,
    ) -> Self {
        Followup::Override {
            update: Some(Rc::new(update)),
            exit: Some(Rc::new(exit)),
        }
    }
}

//! The guard decision capability.

use crate::machine::context::Path;
use crate::machine::error::MachineError;
use crate::machine::root::Machine;

/// Capability handed to a guard's enter callback while a decided transition
/// awaits its verdict.
///
/// A gate is bound to one decided `(from, to)` request. Exactly one of
/// [`proceed`](Gate::proceed) or [`cancel`](Gate::cancel) may be called, at
/// most once; both consume the gate, so the type system enforces the
/// contract. The call may happen inside the guard callback (via
/// [`Scope::proceed`](crate::Scope::proceed)) or arbitrarily later from
/// outside handler code, e.g. a timer loop holding the machine.
///
/// A gate outlives its validity when the pending decision is superseded by
/// a newer guarded request, when the owning context is torn down, or when
/// the target's state drifts; spending it then fails with
/// [`MachineError::StaleGuard`] or
/// [`MachineError::StateInconsistency`].
pub struct Gate {
    pub(crate) owner_path: Path,
    pub(crate) owner_serial: u64,
    pub(crate) slot: usize,
    pub(crate) token: u64,
    pub(crate) child: String,
    pub(crate) source: String,
    pub(crate) from: Option<String>,
    pub(crate) to: Option<String>,
}

impl Gate {
    /// Name of the region whose state change is being guarded.
    pub fn child(&self) -> &str {
        &self.child
    }

    /// Name of the node that requested the transition.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The decided from-state (`None` = not yet entered).
    pub fn from(&self) -> Option<&str> {
        self.from.as_deref()
    }

    /// The decided to-state (`None` = exit without re-entry).
    pub fn to(&self) -> Option<&str> {
        self.to.as_deref()
    }

    /// Commit the decided transition: the guard's exit hook runs, then the
    /// transition path (exit old context, enter new), then any requests
    /// queued during the guard's pendency.
    pub fn proceed(self, machine: &mut Machine) -> Result<(), MachineError> {
        machine.gate_proceed(self)
    }

    /// Abandon the decided transition. The target's state and live context
    /// are left exactly as they were before the request was scheduled; no
    /// enter or exit hooks run.
    pub fn cancel(self, machine: &mut Machine) -> Result<(), MachineError> {
        machine.gate_cancel(self)
    }
}

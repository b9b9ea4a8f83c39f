//! Guarded Crossing
//!
//! This example demonstrates a pending guard: a requested transition is
//! held until external code decides, ticks keep flowing in the meantime,
//! and the decision resumes the protocol.
//!
//! Run with: cargo run --example crossing_guard

use std::cell::RefCell;
use std::rc::Rc;
use strata::tree::leaf;
use strata::{Followup, Gate, Machine, MachineConfig};

fn main() {
    println!("=== Guarded Crossing ===\n");

    let crossing = leaf("CROSSING", ["open", "closed"]).unwrap();
    let mut machine = Machine::create([crossing]).unwrap();
    machine.configure(MachineConfig {
        debug: true,
        ..MachineConfig::default()
    });

    // The request to reopen the crossing waits for the all-clear.
    let pending: Rc<RefCell<Option<Gate>>> = Rc::default();
    {
        let pending = Rc::clone(&pending);
        machine
            .guard("CROSSING", "closed", "open", move |_, gate, _| {
                println!(
                    "guard: {} asked for {:?} -> {:?}, holding",
                    gate.source(),
                    gate.from(),
                    gate.to()
                );
                *pending.borrow_mut() = Some(gate);
                Followup::None
            })
            .unwrap();
    }

    machine.tell("CROSSING", "closed", None).unwrap();
    machine.tell("CROSSING", "open", None).unwrap();
    println!(
        "requested open, still: {:?}",
        machine.current_state("CROSSING").unwrap()
    );

    // a few frames pass while the decision is pending
    for _ in 0..3 {
        machine.update(0.016).unwrap();
    }

    // the all-clear arrives; resume the held transition
    let gate = pending.borrow_mut().take().unwrap();
    gate.proceed(&mut machine).unwrap();
    println!(
        "proceeded, now: {:?}",
        machine.current_state("CROSSING").unwrap()
    );

    println!("\n=== Example Complete ===");
}

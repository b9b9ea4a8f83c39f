//! Traffic Light Region Tree
//!
//! This example demonstrates a nested region tree driven by update ticks.
//!
//! Key concepts:
//! - A child region (CAR) scoped to one parent state (green)
//! - Enter handlers that register handlers on the freshly entered context
//! - Update hooks requesting the next transition
//! - The committed-transition trace
//!
//! Run with: cargo run --example traffic_light

use strata::tree::{leaf, node, restrict};
use strata::{Followup, Machine, MachineConfig};

fn main() {
    println!("=== Traffic Light Region Tree ===\n");

    let car = leaf("CAR", ["forward", "brake"]).unwrap();
    let light = node(
        "LIGHT",
        ["red", "yellow", "green"],
        [restrict(["green"], [car])],
    )
    .unwrap();

    let mut machine = Machine::create([light]).unwrap();
    machine.configure(MachineConfig {
        debug: true,
        ..MachineConfig::default()
    });

    machine
        .when("LIGHT", "red", |_, _| {
            Followup::on_update(|scope, _| {
                scope.set("green", None).unwrap();
            })
        })
        .unwrap();

    machine
        .when("LIGHT", "green", |scope, _| {
            // CAR exists only while the light is green
            scope
                .when("CAR", "forward", |_, _| Followup::None)
                .unwrap();
            scope.tell("CAR", "forward", None).unwrap();
            Followup::on_update(|scope, _| {
                scope.set("yellow", None).unwrap();
            })
        })
        .unwrap();

    machine
        .when("LIGHT", "yellow", |_, _| {
            Followup::on_update(|scope, _| {
                scope.set("red", None).unwrap();
            })
        })
        .unwrap();

    machine.tell("LIGHT", "red", None).unwrap();

    for tick in 0..4 {
        println!(
            "tick {tick}: LIGHT={:?} CAR live={}",
            machine.current_state("LIGHT").unwrap(),
            machine.context_live(&["LIGHT", "CAR"]),
        );
        machine.update(0.016).unwrap();
    }

    println!("\nLIGHT path: {:?}", machine.trace().path_of("LIGHT"));
    println!("CAR path:   {:?}", machine.trace().path_of("CAR"));
    println!("\n=== Example Complete ===");
}

//! `stepbridge check` command: parse a script and print its steps.

use std::path::Path;

use anyhow::Result;

use crate::script::Script;

pub fn run_check(path: &Path) -> Result<()> {
    let script = Script::load(path)?;

    println!("{}: {} step(s)", path.display(), script.steps().len());
    for (idx, step) in script.steps().iter().enumerate() {
        println!("  {:>3}. {step}", idx + 1);
    }

    match script.total_delay() {
        Some(total) if total.is_zero() => {}
        Some(total) => println!("Minimum host time: {total:?}"),
        None => println!("Minimum host time: unbounded"),
    }
    let keys = script.custom_keys();
    if !keys.is_empty() {
        println!("Custom conditions: {}", keys.join(", "));
        println!("  (pass --signal <key>=<delay> to `stepbridge run` to satisfy them)");
    }

    Ok(())
}

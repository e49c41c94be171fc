// demos/dump.rs

//! Decodes a recording and prints its events, busiest types first.
//!
//! Usage:
//! cargo run --example dump -- <recording> [limit]

#![allow(missing_docs)]

use std::collections::HashMap;
use std::process::ExitCode;
use std::time::Instant;

use parflight::{Control, Parflight};

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: dump <recording> [limit]");
        return ExitCode::FAILURE;
    };
    let limit: usize = args
        .next()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(10);

    let mut printed = 0usize;
    let mut per_type: HashMap<String, u64> = HashMap::new();
    let started = Instant::now();

    let outcome = Parflight::events(&path, |ctx, descriptor, event| {
        *per_type.entry(descriptor.name.to_string()).or_insert(0) += 1;
        if printed < limit {
            match event.value() {
                Ok(value) => {
                    let body = serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"));
                    println!(
                        "chunk {} @ {:#06x} {}: {body}",
                        ctx.index(),
                        event.offset(),
                        descriptor.name
                    );
                }
                Err(err) => println!(
                    "chunk {} @ {:#06x} {}: <{err}>",
                    ctx.index(),
                    event.offset(),
                    descriptor.name
                ),
            }
            printed += 1;
        }
        Control::Continue
    });
    if let Err(err) = outcome {
        eprintln!("{path}: {err}");
        return ExitCode::FAILURE;
    }

    let total: u64 = per_type.values().sum();
    let mut ranked: Vec<_> = per_type.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    println!();
    println!("{total} events in {:?}", started.elapsed());
    for (name, count) in ranked.iter().take(15) {
        println!("{count:>10}  {name}");
    }
    ExitCode::SUCCESS
}

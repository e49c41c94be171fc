// demos/inspect.rs

//! Prints the structural report of a recording without decoding payloads.
//!
//! Usage:
//! cargo run --example inspect -- <recording> [--json]

#![allow(missing_docs)]

use std::process::ExitCode;

use parflight::ParflightInspector;

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: inspect <recording> [--json]");
        return ExitCode::FAILURE;
    };
    let as_json = args.next().as_deref() == Some("--json");

    let report = match ParflightInspector::inspect(&path) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("{path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    if as_json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("{path}: {err}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print!("{report}");
    }
    ExitCode::SUCCESS
}

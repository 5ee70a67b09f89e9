// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: msgq entrypoint wiring the CLI to the kernel facility

use clap::Parser;
use msgq::Cli;

#[cfg(target_os = "linux")]
fn main() {
    env_logger::init();
    let cli = Cli::parse();
    match msgq::execute(&cli, nexus_msgq::SysV) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
        }
        Err(err) => {
            eprintln!("msgq: {err}");
            std::process::exit(1);
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn main() {
    env_logger::init();
    let _ = Cli::parse();
    eprintln!("msgq: SysV message queues are only wired up on Linux");
    std::process::exit(1);
}

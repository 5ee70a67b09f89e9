//! CONTEXT: Integration tests for the msgq CLI over the host facility
//! TEST_SCENARIOS:
//!   - push/pop through parsed command lines
//!   - purge and reset counts
//!   - stats output, single field and full map
//!   - config file supplies key and options; flags override
//!   - missing key and bad values are reported
// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use clap::Parser;
use msgq::{execute, Cli, CliError};
use nexus_msgq::HostFacility;
use tempfile::TempDir;

fn run(facility: &HostFacility, args: &[&str]) -> Result<String, CliError> {
    let cli = Cli::try_parse_from(std::iter::once("msgq").chain(args.iter().copied()))
        .expect("arguments parse");
    execute(&cli, facility.clone())
}

#[test]
fn push_then_pop_prints_message() {
    let facility = HostFacility::new();
    run(&facility, &["--key", "4242", "push", "hello", "--type", "1"]).unwrap();
    run(&facility, &["--key", "4242", "push", "world", "-t", "1"]).unwrap();
    assert_eq!(run(&facility, &["-k", "4242", "stats", "msg_qnum"]).unwrap(), "2");
    assert_eq!(run(&facility, &["-k", "4242", "pop", "-t", "1"]).unwrap(), "hello");
    assert_eq!(run(&facility, &["-k", "4242", "pop", "-t", "1"]).unwrap(), "world");
    let err = run(&facility, &["-k", "4242", "--non-blocking", "pop", "-t", "1"]).unwrap_err();
    assert!(matches!(err, CliError::Queue(nexus_msgq::Error::WouldBlock)));
}

#[test]
fn json_messages_roundtrip() {
    let facility = HostFacility::new();
    run(&facility, &["-k", "7", "push", "--json", r#"{"job":[1,2]}"#]).unwrap();
    assert_eq!(run(&facility, &["-k", "7", "pop"]).unwrap(), r#"{"job":[1,2]}"#);
    let err = run(&facility, &["-k", "7", "push", "--json", "{broken"]).unwrap_err();
    assert!(matches!(err, CliError::Json(_)));
}

#[test]
fn purge_and_reset_report_counts() {
    let facility = HostFacility::new();
    for ty in ["1", "1", "2"] {
        run(&facility, &["-k", "9", "push", "m", "-t", ty]).unwrap();
    }
    assert_eq!(run(&facility, &["-k", "9", "purge", "-t", "1"]).unwrap(), "2");
    assert_eq!(run(&facility, &["-k", "9", "reset"]).unwrap(), "1");
}

#[test]
fn stats_prints_full_map() {
    let facility = HostFacility::new();
    run(&facility, &["-k", "10", "set", "mode", "0640"]).unwrap();
    let out = run(&facility, &["-k", "10", "stats"]).unwrap();
    let map: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(map["msg_perm.mode"], 0o640);
    assert_eq!(map["msg_qnum"], 0);
    let err = run(&facility, &["-k", "10", "stats", "msg_bogus"]).unwrap_err();
    assert!(matches!(err, CliError::Queue(nexus_msgq::Error::UnknownStatField(_))));
}

#[test]
fn config_file_supplies_key_and_raw_mode() {
    let facility = HostFacility::new();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("queue.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "[queue]\nkey = 31\nserialize = false\nblocking = false").unwrap();
    let config = path.to_str().unwrap();

    run(&facility, &["--config", config, "push", "raw text"]).unwrap();
    assert_eq!(run(&facility, &["--config", config, "pop"]).unwrap(), "raw text");
    let err = run(&facility, &["--config", config, "pop"]).unwrap_err();
    assert!(matches!(err, CliError::Queue(nexus_msgq::Error::WouldBlock)));
    assert_eq!(run(&facility, &["--config", config, "-k", "32", "reset"]).unwrap(), "0");
}

#[test]
fn remove_destroys_queue() {
    let facility = HostFacility::new();
    run(&facility, &["-k", "12", "push", "x"]).unwrap();
    assert_eq!(facility.queue_count(), 1);
    run(&facility, &["-k", "12", "remove"]).unwrap();
    assert_eq!(facility.queue_count(), 0);
}

#[test]
fn missing_key_and_bad_values_are_errors() {
    let facility = HostFacility::new();
    assert!(matches!(run(&facility, &["reset"]), Err(CliError::MissingKey)));
    let err = run(&facility, &["-k", "13", "set", "uid", "root"]).unwrap_err();
    assert!(matches!(err, CliError::InvalidValue { .. }));
    let err = run(&facility, &["--key", "-1", "reset"]).unwrap_err();
    assert!(matches!(err, CliError::Queue(nexus_msgq::Error::InvalidKey(-1))));
}

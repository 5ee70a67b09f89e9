// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Operator CLI for key-addressed message queues
//! OWNERS: @tools-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests + CLI integration tests (host facility)
//!
//! PUBLIC API:
//!   - CLI: msgq [--config FILE] [--key K] [--non-blocking] [--raw] <push|pop|purge|reset|stats|set|remove>
//!   - execute(): runs a parsed command against any facility and returns the text to print
//!
//! DEPENDENCIES:
//!   - clap: argument parsing
//!   - nexus-msgq: queue handle and facilities
//!   - serde_json: structured payloads and stats output

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use nexus_msgq::{ConfigError, Facility, Payload, QueueFile, QueueHandle};
use serde_json::Value;
use thiserror::Error;

/// Command line of the `msgq` tool.
#[derive(Debug, Parser)]
#[command(name = "msgq", version, about = "Drive and inspect SysV message queues")]
pub struct Cli {
    /// TOML file with a `[queue]` table.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Queue key; overrides the config file.
    #[arg(short, long, allow_negative_numbers = true)]
    pub key: Option<i32>,
    /// Fail instead of waiting when the queue is full or empty.
    #[arg(long)]
    pub non_blocking: bool,
    /// Send and receive raw bytes instead of serialized payloads.
    #[arg(long)]
    pub raw: bool,
    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Queue operations exposed by the tool.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one message.
    Push {
        /// Message text.
        message: String,
        /// Message type; defaults to the configured type.
        #[arg(short = 't', long = "type")]
        message_type: Option<i64>,
        /// Parse the message as a JSON value.
        #[arg(long)]
        json: bool,
    },
    /// Receive one message and print it.
    Pop {
        /// Type filter; 0 selects any type.
        #[arg(short = 't', long = "type")]
        message_type: Option<i64>,
    },
    /// Drop every message of one type.
    Purge {
        /// Type to drop; defaults to the configured type.
        #[arg(short = 't', long = "type")]
        message_type: Option<i64>,
    },
    /// Drop every message.
    Reset,
    /// Print queue metadata.
    Stats {
        /// Single field, e.g. `msg_qnum`.
        field: Option<String>,
    },
    /// Change ownership or permissions.
    Set {
        /// Field to change.
        attr: Attr,
        /// New value; modes are octal (`640`, `0640` or `0o640`).
        value: String,
    },
    /// Destroy the queue for every attached process.
    Remove,
}

/// Writable queue attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Attr {
    /// Owner user id.
    Uid,
    /// Owner group id.
    Gid,
    /// Permission bits.
    Mode,
}

/// Failures reported by the tool.
#[derive(Debug, Error)]
pub enum CliError {
    /// Config file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Neither `--key` nor the config file named a key.
    #[error("no queue key given (use --key or a [queue] key in --config)")]
    MissingKey,
    /// Queue operation failed.
    #[error(transparent)]
    Queue(#[from] nexus_msgq::Error),
    /// `--json` message is not valid JSON.
    #[error("invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),
    /// Attribute value is not a number.
    #[error("invalid {attr:?} value `{value}`")]
    InvalidValue {
        /// Attribute being set.
        attr: Attr,
        /// Rejected input.
        value: String,
    },
}

/// Runs `cli` against `facility` and returns the text to print.
pub fn execute<F: Facility>(cli: &Cli, facility: F) -> Result<String, CliError> {
    let file = match &cli.config {
        Some(path) => QueueFile::load(path)?,
        None => QueueFile::default(),
    };
    let key = cli.key.or(file.key).ok_or(CliError::MissingKey)?;
    let mut config = file.config;
    if cli.non_blocking {
        config.blocking = false;
    }
    if cli.raw {
        config.serialize = false;
    }
    let mut queue = QueueHandle::attach_with(facility, key, config)?;
    log::debug!("msgq: running {:?} on key {key}", cli.command);

    let output = match &cli.command {
        Command::Push { message, message_type, json } => {
            let payload = if *json {
                Payload::Value(serde_json::from_str(message)?)
            } else if config.serialize {
                Payload::from(message.as_str())
            } else {
                Payload::Bytes(message.clone().into_bytes())
            };
            queue.push(payload, *message_type)?;
            String::new()
        }
        Command::Pop { message_type } => render(&queue.pop(*message_type)?),
        Command::Purge { message_type } => queue.purge(*message_type).to_string(),
        Command::Reset => queue.reset().to_string(),
        Command::Stats { field: Some(name) } => queue.stat_by_name(name)?.to_string(),
        Command::Stats { field: None } => serde_json::to_string_pretty(&queue.stats()?.to_map())?,
        Command::Set { attr, value } => {
            let parsed = parse_attr_value(*attr, value)?;
            match attr {
                Attr::Uid => queue.set_uid(parsed)?,
                Attr::Gid => queue.set_gid(parsed)?,
                Attr::Mode => queue.set_mode(parsed)?,
            }
            String::new()
        }
        Command::Remove => {
            queue.detach()?;
            String::new()
        }
    };
    Ok(output)
}

fn render(payload: &Payload) -> String {
    match payload {
        Payload::Value(Value::String(text)) => text.clone(),
        Payload::Value(value) => value.to_string(),
        Payload::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn parse_attr_value(attr: Attr, value: &str) -> Result<u32, CliError> {
    let parsed = match attr {
        Attr::Mode => {
            let digits = value.strip_prefix("0o").unwrap_or(value);
            u32::from_str_radix(digits, 8)
        }
        Attr::Uid | Attr::Gid => value.parse(),
    };
    parsed.map_err(|_| CliError::InvalidValue { attr, value: value.to_string() })
}

//! CLI utilities.
//!
//! The utilities present in this module back the `influx_cli` binary: an
//! interactive prompt and the parser turning user input into [`ShellCommand`]s.
//!
//! # Example
//! ```rust
//! use influx_wire::ShellCommand;
//!
//! let cmd: ShellCommand = ".create metrics".try_into().unwrap();
//! assert_eq!(cmd, ShellCommand::CreateDatabase("metrics".into()));
//! ```
use std::io::{BufRead, Write};

use thiserror::Error;

use crate::protocol::{FieldValue, Point, Series};

/// List of possible errors when parsing user input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    #[error("invalid field assignment '{0}', expected field=value")]
    InvalidAssignment(String),

    #[error("no command provided")]
    Empty,
}

/// Possible commands from a user.
#[derive(Clone, Debug, PartialEq)]
pub enum ShellCommand {
    /// `.exit`
    Exit,
    /// `.ping`
    Ping,
    /// `.databases`
    ListDatabases,
    /// `.create <name>`
    CreateDatabase(String),
    /// `.drop <name>`
    DropDatabase(String),
    /// `.write <series> <field=value>...`
    Write(Series),
    /// Anything not starting with `.`
    Query(String),
}

impl TryFrom<&str> for ShellCommand {
    type Error = CommandError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let s = value.trim();
        let mut parts = s.split_whitespace();

        match parts.next() {
            None => Err(CommandError::Empty),
            Some(".exit") => Ok(ShellCommand::Exit),
            Some(".ping") => Ok(ShellCommand::Ping),
            Some(".databases") => Ok(ShellCommand::ListDatabases),
            Some(cmd @ (".create" | ".drop")) => {
                let name = parts
                    .next()
                    .ok_or_else(|| CommandError::InvalidCommandArguments {
                        command: cmd.to_string(),
                        reason: format!("requires a database name. Example: {cmd} metrics"),
                    })?
                    .to_string();

                if cmd == ".create" {
                    Ok(ShellCommand::CreateDatabase(name))
                } else {
                    Ok(ShellCommand::DropDatabase(name))
                }
            }
            Some(".write") => {
                let name = parts
                    .next()
                    .ok_or_else(|| CommandError::InvalidCommandArguments {
                        command: ".write".to_string(),
                        reason: "requires a series name. Example: .write cpu value=0.5".into(),
                    })?;
                let assignments = parts.collect::<Vec<_>>();
                Ok(ShellCommand::Write(series_from_assignments(name, &assignments)?))
            }
            Some(cmd) if cmd.starts_with('.') => {
                Err(CommandError::UnrecognizedCommand(cmd.to_string()))
            }
            Some(_) => Ok(ShellCommand::Query(s.to_string())),
        }
    }
}

/// Builds a single-point series from `field=value` pairs.
pub fn series_from_assignments<S: AsRef<str>>(
    name: &str,
    assignments: &[S],
) -> Result<Series, CommandError> {
    if assignments.is_empty() {
        return Err(CommandError::InvalidCommandArguments {
            command: ".write".to_string(),
            reason: "requires at least one field=value pair".into(),
        });
    }

    let mut fields = Vec::with_capacity(assignments.len());
    let mut values = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let assignment = assignment.as_ref();
        match assignment.split_once('=') {
            Some((field, value)) if !field.is_empty() && !value.is_empty() => {
                fields.push(field.to_string());
                values.push(parse_value(value));
            }
            _ => return Err(CommandError::InvalidAssignment(assignment.to_string())),
        }
    }

    Ok(Series::new(name, fields).with_point(Point::new(values)))
}

/// Integer, float and boolean literals keep their type; anything else is a string.
pub fn parse_value(literal: &str) -> FieldValue {
    if let Ok(v) = literal.parse::<i64>() {
        v.into()
    } else if let Ok(v) = literal.parse::<f64>() {
        v.into()
    } else if let Ok(v) = literal.parse::<bool>() {
        v.into()
    } else {
        literal.trim_matches('"').into()
    }
}

/// Prompt user for a shell command.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> std::io::Result<Option<String>>
where
    R: BufRead,
    W: Write,
{
    write!(&mut writer, "> ")?;
    writer.flush()?;

    let mut s = String::default();
    if reader.read_line(&mut s)? == 0 {
        return Ok(None);
    }
    Ok(Some(s))
}

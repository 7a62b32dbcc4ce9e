//! Module `command`
//!
//! Parsing of control lines into commands, and the result type every
//! command handler returns.

use std::fmt;

use crate::protocol::responses::format_response;

/// One parsed control line.
///
/// The verb is uppercased. `rest` is the text after the verb exactly as sent,
/// minus the surrounding whitespace and line terminator; `args` is the same
/// text split on whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: String,
    pub args: Vec<String>,
    pub rest: String,
}

impl Command {
    /// First argument token, if any
    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// The whole argument text, inner whitespace untouched, so path names
    /// containing runs of spaces survive.
    pub fn argument(&self) -> Option<String> {
        if self.rest.is_empty() {
            None
        } else {
            Some(self.rest.clone())
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.verb == "PASS" && !self.args.is_empty() {
            return write!(f, "PASS ****");
        }
        if self.rest.is_empty() {
            write!(f, "{}", self.verb)
        } else {
            write!(f, "{} {}", self.verb, self.rest)
        }
    }
}

/// Parses a raw control line into a `Command`.
pub fn parse_command(raw: &str) -> Command {
    let line = raw.trim();
    let (verb, rest) = match line.find(char::is_whitespace) {
        Some(idx) => (&line[..idx], line[idx..].trim_start()),
        None => (line, ""),
    };

    Command {
        verb: verb.to_ascii_uppercase(),
        args: rest.split_whitespace().map(str::to_string).collect(),
        rest: rest.to_string(),
    }
}

/// Represents the outcome status of executing a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failure(String),
    CloseConnection,
}

/// Struct encapsulating the full result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: CommandStatus,
    /// Final reply line, already formatted with its CRLF
    pub message: Option<String>,
}

impl CommandResult {
    pub fn success(code: u16, text: &str) -> Self {
        Self {
            status: CommandStatus::Success,
            message: Some(format_response(code, text)),
        }
    }

    pub fn failure(code: u16, text: &str) -> Self {
        Self {
            status: CommandStatus::Failure(text.to_string()),
            message: Some(format_response(code, text)),
        }
    }

    /// Reply and then close the control connection.
    pub fn close(code: u16, text: &str) -> Self {
        Self {
            status: CommandStatus::CloseConnection,
            message: Some(format_response(code, text)),
        }
    }

    /// Close the control connection without a reply; used once the control
    /// stream itself has failed.
    pub fn abort() -> Self {
        Self {
            status: CommandStatus::CloseConnection,
            message: None,
        }
    }

    /// Reply code of the message, if there is one
    pub fn code(&self) -> Option<u16> {
        self.message.as_ref()?.get(..3)?.parse().ok()
    }
}

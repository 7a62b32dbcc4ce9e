//! FTP Protocol implementation
//!
//! Command parsing, reply formatting and the verb dispatcher that routes
//! each command to its handler.

pub mod commands;
pub mod dispatcher;
pub mod handlers;
pub mod responses;

pub use commands::{Command, CommandResult, CommandStatus, parse_command};
pub use dispatcher::Dispatcher;
pub use responses::format_response;

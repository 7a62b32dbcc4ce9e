//! Command dispatcher
//!
//! Owns the table of recognized verbs and routes each parsed command to its
//! handler, enforcing the login requirement on the way.

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncWrite;

use crate::client::SessionState;
use crate::config::ServerConfig;
use crate::protocol::handlers::{self, CommandContext};
use crate::protocol::responses::{NOT_IMPLEMENTED, NOT_LOGGED_IN};
use crate::protocol::{Command, CommandResult};

/// Handler selected for a verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    User,
    Pass,
    Pwd,
    Cwd,
    Cdup,
    Mkd,
    Rmd,
    Pasv,
    List,
    Stor,
    Retr,
    Dele,
    Type,
    Quit,
}

impl Verb {
    /// Every verb except the login pair and QUIT needs an authenticated session.
    pub fn requires_auth(self) -> bool {
        !matches!(self, Verb::User | Verb::Pass | Verb::Quit)
    }
}

const VERB_TABLE: [(&str, Verb); 14] = [
    ("USER", Verb::User),
    ("PASS", Verb::Pass),
    ("PWD", Verb::Pwd),
    ("CWD", Verb::Cwd),
    ("CDUP", Verb::Cdup),
    ("MKD", Verb::Mkd),
    ("RMD", Verb::Rmd),
    ("PASV", Verb::Pasv),
    ("LIST", Verb::List),
    ("STOR", Verb::Stor),
    ("RETR", Verb::Retr),
    ("DELE", Verb::Dele),
    ("TYPE", Verb::Type),
    ("QUIT", Verb::Quit),
];

/// Routes commands of one session to their handlers.
pub struct Dispatcher {
    handlers: HashMap<&'static str, Verb>,
    config: Arc<ServerConfig>,
}

impl Dispatcher {
    /// Builds the verb table; it is never modified afterwards.
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            handlers: VERB_TABLE.into_iter().collect(),
            config,
        }
    }

    /// Looks up the handler for an already uppercased verb.
    pub fn lookup(&self, verb: &str) -> Option<Verb> {
        self.handlers.get(verb).copied()
    }

    /// Runs one command to completion.
    ///
    /// Preliminary replies (150) are written to `control` by the transfer
    /// handlers themselves; the final reply is returned in the result.
    pub async fn dispatch<W>(
        &self,
        command: &Command,
        state: &mut SessionState,
        control: &mut W,
    ) -> CommandResult
    where
        W: AsyncWrite + Unpin + Send,
    {
        if command.verb == "AUTH"
            && command
                .first_arg()
                .is_some_and(|arg| arg.eq_ignore_ascii_case("TLS"))
        {
            debug!("Rejecting AUTH TLS, encrypted sessions are not supported");
            return CommandResult::failure(NOT_IMPLEMENTED, "Command not supported");
        }

        let verb = match self.lookup(&command.verb) {
            Some(verb) => verb,
            None => {
                warn!("Unknown command: {}", command);
                return CommandResult::failure(NOT_IMPLEMENTED, "Command does not exist");
            }
        };

        if verb.requires_auth() && !state.is_authenticated() {
            return CommandResult::failure(NOT_LOGGED_IN, "Please log in");
        }

        let mut ctx = CommandContext {
            state,
            config: &self.config,
            control,
        };

        match verb {
            Verb::User => handlers::handle_user(&mut ctx, command),
            Verb::Pass => handlers::handle_pass(&mut ctx, command),
            Verb::Pwd => handlers::handle_pwd(&mut ctx),
            Verb::Cwd => handlers::handle_cwd(&mut ctx, command).await,
            Verb::Cdup => handlers::handle_cdup(&mut ctx).await,
            Verb::Mkd => handlers::handle_mkd(&mut ctx, command).await,
            Verb::Rmd => handlers::handle_rmd(&mut ctx, command).await,
            Verb::Pasv => handlers::handle_pasv(&mut ctx),
            Verb::List => handlers::handle_list(&mut ctx, command).await,
            Verb::Stor => handlers::handle_stor(&mut ctx, command).await,
            Verb::Retr => handlers::handle_retr(&mut ctx, command).await,
            Verb::Dele => handlers::handle_dele(&mut ctx, command).await,
            Verb::Type => handlers::handle_type(&mut ctx, command),
            Verb::Quit => handlers::handle_quit(&mut ctx),
        }
    }
}

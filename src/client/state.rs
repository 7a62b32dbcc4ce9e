//! Module `state`
//!
//! Defines `SessionState`, the mutable per-connection state: login status,
//! identity, current directory and the pending passive data channel.

use log::info;

use crate::transfer::DataChannel;

/// State of one control connection, owned by its session.
///
/// Login moves through three states: unauthenticated, awaiting a password
/// (a username is pending) and authenticated. The current directory is a
/// normalized path relative to the root, `""` being the root itself.
#[derive(Debug, Default)]
pub struct SessionState {
    authenticated: bool,
    pending_username: Option<String>,
    username: Option<String>,
    is_anonymous: bool,
    current_directory: String,
    data_channel: Option<DataChannel>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    // --------------------
    // Login transitions
    // --------------------

    /// Anonymous USER: authenticated without a password.
    pub fn login_anonymous(&mut self) {
        self.pending_username = None;
        self.username = None;
        self.is_anonymous = true;
        self.authenticated = true;
    }

    /// Named USER: remember the name and wait for PASS.
    ///
    /// Starting a new login drops any previous authentication.
    pub fn begin_login(&mut self, username: &str) {
        self.authenticated = false;
        self.is_anonymous = false;
        self.username = None;
        self.pending_username = Some(username.to_string());
    }

    /// PASS matched the configured credentials.
    pub fn complete_login(&mut self) {
        self.username = self.pending_username.take();
        self.is_anonymous = false;
        self.authenticated = true;
    }

    /// PASS did not match: back to unauthenticated, not awaiting a password.
    pub fn fail_login(&mut self) {
        self.pending_username = None;
        self.username = None;
        self.is_anonymous = false;
        self.authenticated = false;
    }

    /// Clears every login flag, used by QUIT.
    pub fn logout(&mut self) {
        self.fail_login();
    }

    // --------------------
    // Getter methods
    // --------------------

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn is_anonymous(&self) -> bool {
        self.is_anonymous
    }

    /// Username given by USER and not yet confirmed by PASS.
    pub fn pending_username(&self) -> Option<&str> {
        self.pending_username.as_deref()
    }

    /// Name the session is logged in as, for replies and logs.
    pub fn identity(&self) -> &str {
        if self.is_anonymous {
            "Anonymous user"
        } else {
            self.username.as_deref().unwrap_or("unauthenticated")
        }
    }

    pub fn current_directory(&self) -> &str {
        &self.current_directory
    }

    pub fn set_current_directory(&mut self, relative: String) {
        self.current_directory = relative;
    }

    // --------------------
    // Data channel
    // --------------------

    pub fn has_data_channel(&self) -> bool {
        self.data_channel.is_some()
    }

    /// Installs a freshly opened channel. Any previous channel must have
    /// been closed with `close_data_channel` first.
    pub fn set_data_channel(&mut self, channel: DataChannel) {
        self.data_channel = Some(channel);
    }

    /// Hands the channel to a transfer; the state no longer holds one.
    pub fn take_data_channel(&mut self) -> Option<DataChannel> {
        self.data_channel.take()
    }

    /// Closes an unconsumed channel. Returns whether one was open.
    pub fn close_data_channel(&mut self) -> bool {
        match self.data_channel.take() {
            Some(channel) => {
                info!("Closing unused data channel on port {}", channel.port());
                true
            }
            None => false,
        }
    }
}

//! Command handlers module.
//!
//! One function per verb. Handlers only run once the dispatcher has checked
//! the login requirement, and each turns every failure into a reply; nothing
//! here tears the session down except QUIT or a broken control stream.

use log::{error, info, warn};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::auth::{self, UserOutcome};
use crate::client::SessionState;
use crate::config::ServerConfig;
use crate::error::{StorageError, TransferError};
use crate::navigate::{self, ResolvedPath};
use crate::protocol::responses::*;
use crate::protocol::{Command, CommandResult};
use crate::storage;
use crate::transfer::{self, DataChannel};

const LOCAL_ERROR_TEXT: &str = "Action aborted. Local error in processing";
const MISSING_ARGUMENT_TEXT: &str = "Syntax error in parameters or arguments";

/// Everything a handler may touch while running one command.
pub struct CommandContext<'a, W> {
    pub state: &'a mut SessionState,
    pub config: &'a ServerConfig,
    /// Control stream, for preliminary replies
    pub control: &'a mut W,
}

impl<W> CommandContext<'_, W> {
    /// Resolves a client path against the session's current directory.
    fn resolve(&self, requested: &str) -> Result<ResolvedPath, CommandResult> {
        navigate::resolve(
            &self.config.root_directory,
            self.state.current_directory(),
            requested,
        )
        .map_err(|e| {
            warn!("Rejected path {:?}: {}", requested, e);
            CommandResult::failure(FILE_UNAVAILABLE, "Attempt to access outside the root directory is not allowed")
        })
    }
}

fn missing_argument() -> CommandResult {
    CommandResult::failure(SYNTAX_ERROR_IN_ARGUMENTS, MISSING_ARGUMENT_TEXT)
}

// --------------------
// Login
// --------------------

/// USER: anonymous logins complete at once, any other name awaits PASS.
pub fn handle_user<W>(ctx: &mut CommandContext<'_, W>, command: &Command) -> CommandResult {
    let username = match command.argument() {
        Some(username) => username,
        None => return missing_argument(),
    };

    match auth::validate_user(&username, ctx.config) {
        UserOutcome::Anonymous => {
            ctx.state.login_anonymous();
            info!("Anonymous login");
            CommandResult::success(LOGIN_SUCCESS, "Logged in successfully")
        }
        UserOutcome::PasswordRequired => {
            ctx.state.begin_login(&username);
            CommandResult::success(PASSWORD_REQUIRED, "Please enter password")
        }
    }
}

/// PASS: completes a named login or sends the session back to unauthenticated.
pub fn handle_pass<W>(ctx: &mut CommandContext<'_, W>, command: &Command) -> CommandResult {
    if ctx.state.is_authenticated() && ctx.state.is_anonymous() {
        return CommandResult::success(LOGIN_SUCCESS, "Logged in as Anonymous user");
    }

    let password = match command.argument() {
        Some(password) => password,
        None => return missing_argument(),
    };

    match auth::validate_password(ctx.state.pending_username(), &password, ctx.config) {
        Ok(()) => {
            ctx.state.complete_login();
            info!("User {} logged in", ctx.state.identity());
            CommandResult::success(
                LOGIN_SUCCESS,
                &format!("Logged in as {}", ctx.state.identity()),
            )
        }
        Err(e) => {
            warn!("Login failed: {}", e);
            ctx.state.fail_login();
            CommandResult::failure(
                e.reply_code(),
                "Authentication error, login or password does not match the configured user",
            )
        }
    }
}

/// QUIT: clears the login and closes the control connection.
pub fn handle_quit<W>(ctx: &mut CommandContext<'_, W>) -> CommandResult {
    ctx.state.logout();
    CommandResult::close(
        CLOSING_CONTROL,
        "Successfully terminated the connection. See you again",
    )
}

// --------------------
// Directories
// --------------------

pub fn handle_pwd<W>(ctx: &mut CommandContext<'_, W>) -> CommandResult {
    let directory = navigate::display_path(ctx.state.current_directory());
    CommandResult::success(
        PATHNAME_CREATED,
        &format!("\"{}\" is the current directory", directory),
    )
}

/// CWD: moves to an existing directory inside the root.
pub async fn handle_cwd<W>(ctx: &mut CommandContext<'_, W>, command: &Command) -> CommandResult {
    let requested = match command.argument() {
        Some(requested) => requested,
        None => return missing_argument(),
    };
    let target = match ctx.resolve(&requested) {
        Ok(target) => target,
        Err(result) => return result,
    };

    if !is_directory(&target).await {
        return CommandResult::failure(
            FILE_UNAVAILABLE,
            "Failed to change directory. Directory does not exist or there was a problem with the provided path",
        );
    }

    let shown = target.display();
    ctx.state.set_current_directory(target.relative);
    CommandResult::success(FILE_ACTION_OK, &format!("Directory changed to {}", shown))
}

/// CDUP: moves to the parent directory; at the root it succeeds without moving.
pub async fn handle_cdup<W>(ctx: &mut CommandContext<'_, W>) -> CommandResult {
    let parent = match navigate::parent_of(ctx.state.current_directory()) {
        Some(parent) => parent,
        None => return CommandResult::success(OK, "You are already in the root directory"),
    };

    let target = match ctx.resolve(&navigate::display_path(&parent)) {
        Ok(target) => target,
        Err(result) => return result,
    };

    if !is_directory(&target).await {
        return CommandResult::failure(FILE_UNAVAILABLE, "Failed to change directory to parent");
    }

    let shown = target.display();
    ctx.state.set_current_directory(target.relative);
    CommandResult::success(OK, &format!("Directory changed to parent: {}", shown))
}

pub async fn handle_mkd<W>(ctx: &mut CommandContext<'_, W>, command: &Command) -> CommandResult {
    let requested = match command.argument() {
        Some(requested) => requested,
        None => return missing_argument(),
    };
    let target = match ctx.resolve(&requested) {
        Ok(target) => target,
        Err(result) => return result,
    };

    match storage::make_directory(&target).await {
        Ok(()) => CommandResult::success(
            PATHNAME_CREATED,
            &format!("\"{}\" Directory created", target.display()),
        ),
        Err(StorageError::AlreadyExists(path)) => {
            CommandResult::failure(FILE_UNAVAILABLE, &format!("Directory {} already exists", path))
        }
        Err(e) => {
            error!("MKD {} failed: {}", target.absolute.display(), e);
            CommandResult::failure(
                e.reply_code(),
                &format!("No permission to create directory {}", target.display()),
            )
        }
    }
}

/// RMD: removes an empty directory. Removing the current directory moves
/// the session to its parent.
pub async fn handle_rmd<W>(ctx: &mut CommandContext<'_, W>, command: &Command) -> CommandResult {
    let requested = match command.argument() {
        Some(requested) => requested,
        None => return missing_argument(),
    };
    let target = match ctx.resolve(&requested) {
        Ok(target) => target,
        Err(result) => return result,
    };

    match storage::remove_directory(&target).await {
        Ok(()) => {
            let current = ctx.state.current_directory();
            if current == target.relative || current.starts_with(&format!("{}/", target.relative)) {
                let parent = navigate::parent_of(&target.relative).unwrap_or_default();
                ctx.state.set_current_directory(parent);
            }
            CommandResult::success(
                FILE_ACTION_OK,
                &format!("Directory {} removed", target.display()),
            )
        }
        Err(StorageError::NotEmpty(path)) => CommandResult::failure(
            FILE_UNAVAILABLE,
            &format!("Directory {} is not empty. Removal failed.", path),
        ),
        Err(e) => {
            warn!("RMD {} failed: {}", target.absolute.display(), e);
            CommandResult::failure(e.reply_code(), "Failed to remove directory")
        }
    }
}

pub async fn handle_dele<W>(ctx: &mut CommandContext<'_, W>, command: &Command) -> CommandResult {
    let requested = match command.argument() {
        Some(requested) => requested,
        None => return missing_argument(),
    };
    let target = match ctx.resolve(&requested) {
        Ok(target) => target,
        Err(result) => return result,
    };

    match storage::delete_file(&target).await {
        Ok(()) => CommandResult::success(
            FILE_ACTION_OK,
            &format!("File {} has been deleted", target.display()),
        ),
        Err(e) => {
            warn!("DELE {} failed: {}", target.absolute.display(), e);
            CommandResult::failure(e.reply_code(), "Failed to delete file")
        }
    }
}

// --------------------
// Transfer parameters
// --------------------

/// TYPE: I and A are acknowledged; transfers stay raw bytes either way.
pub fn handle_type<W>(_ctx: &mut CommandContext<'_, W>, command: &Command) -> CommandResult {
    match command.first_arg().map(str::to_ascii_uppercase).as_deref() {
        Some("I") => CommandResult::success(OK, "Type set to I."),
        Some("A") => CommandResult::success(OK, "Type set to A."),
        _ => CommandResult::failure(PARAMETER_NOT_IMPLEMENTED, "Type not supported."),
    }
}

/// PASV: replaces any unused channel with a new listener from the port range.
pub fn handle_pasv<W>(ctx: &mut CommandContext<'_, W>) -> CommandResult {
    if ctx.state.close_data_channel() {
        info!("PASV replaces the previous data channel");
    }

    match DataChannel::open(ctx.config.bind_ip, ctx.config.passive_ports()) {
        Ok(channel) => {
            let tuple = transfer::pasv_tuple(ctx.config.pasv_address(), channel.port());
            ctx.state.set_data_channel(channel);
            CommandResult::success(
                ENTERING_PASSIVE_MODE,
                &format!("Entering Passive Mode ({})", tuple),
            )
        }
        Err(e) => {
            warn!("PASV failed: {}", e);
            CommandResult::failure(e.reply_code(), "Failed to find a free port")
        }
    }
}

// --------------------
// Transfers
// --------------------

fn not_passive(verb: &str) -> CommandResult {
    CommandResult::failure(
        TransferError::NotPassive.reply_code(),
        &format!("Server is not in passive mode! Use PASV command before {}", verb),
    )
}

/// Sends the 150 reply and waits for the client's data connection.
///
/// The channel leaves the session state here, so it is closed whatever
/// happens next.
async fn open_data_connection<W>(
    ctx: &mut CommandContext<'_, W>,
    verb: &str,
    preliminary: &str,
) -> Result<TcpStream, CommandResult>
where
    W: AsyncWrite + Unpin,
{
    let channel = ctx.state.take_data_channel().ok_or_else(|| not_passive(verb))?;

    let reply = format_response(OPENING_DATA_CONNECTION, preliminary);
    if let Err(e) = write_preliminary(ctx.control, &reply).await {
        error!("Failed to send preliminary reply for {}: {}", verb, e);
        return Err(CommandResult::abort());
    }

    channel.accept().await.map_err(|e| {
        error!("{} data connection failed: {}", verb, e);
        CommandResult::failure(e.reply_code(), LOCAL_ERROR_TEXT)
    })
}

async fn write_preliminary<W>(control: &mut W, reply: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    control.write_all(reply.as_bytes()).await?;
    control.flush().await
}

fn finish_transfer(verb: &str, outcome: Result<u64, TransferError>) -> CommandResult {
    match outcome {
        Ok(bytes) => {
            info!("{} transferred {} bytes", verb, bytes);
            CommandResult::success(TRANSFER_COMPLETE, "Transfer completed successfully")
        }
        Err(e) => {
            error!("{} transfer failed: {}", verb, e);
            CommandResult::failure(LOCAL_ERROR, LOCAL_ERROR_TEXT)
        }
    }
}

/// LIST [path]: sends the directory listing over the data channel.
pub async fn handle_list<W>(ctx: &mut CommandContext<'_, W>, command: &Command) -> CommandResult
where
    W: AsyncWrite + Unpin,
{
    if !ctx.state.has_data_channel() {
        return not_passive("LIST");
    }

    let argument = command.rest.as_str();
    let names_entry = match ctx.resolve(argument) {
        Ok(target) if !argument.is_empty() => {
            fs::try_exists(&target.absolute).await.unwrap_or(false)
        }
        _ => false,
    };
    let requested = if names_entry {
        argument
    } else {
        strip_list_options(argument)
    };
    let requested = if requested.is_empty() { "." } else { requested };
    let target = match ctx.resolve(requested) {
        Ok(target) => target,
        Err(result) => return result,
    };

    let listing = match storage::list_directory(&target).await {
        Ok(listing) => listing,
        Err(e) => {
            warn!("LIST {} failed: {}", target.absolute.display(), e);
            return CommandResult::failure(e.reply_code(), "Failed to list directory");
        }
    };

    let mut data = match open_data_connection(ctx, "LIST", "Opening connection for file listing").await {
        Ok(data) => data,
        Err(result) => return result,
    };
    finish_transfer("LIST", transfer::send_bytes(&mut data, listing.as_bytes()).await)
}

/// Drops leading option tokens such as `-la` from a LIST argument.
///
/// Only tokens before the first path are options; the path itself is kept
/// verbatim, whatever it starts with.
fn strip_list_options(argument: &str) -> &str {
    let mut rest = argument.trim_start();
    while rest.starts_with('-') {
        rest = match rest.find(char::is_whitespace) {
            Some(idx) => rest[idx..].trim_start(),
            None => "",
        };
    }
    rest
}

/// RETR path: streams a file to the client.
pub async fn handle_retr<W>(ctx: &mut CommandContext<'_, W>, command: &Command) -> CommandResult
where
    W: AsyncWrite + Unpin,
{
    if !ctx.state.has_data_channel() {
        return not_passive("RETR");
    }
    let requested = match command.argument() {
        Some(requested) => requested,
        None => return missing_argument(),
    };
    let target = match ctx.resolve(&requested) {
        Ok(target) => target,
        Err(result) => return result,
    };

    if let Err(e) = storage::require_file(&target).await {
        warn!("RETR {} refused: {}", target.absolute.display(), e);
        return CommandResult::failure(e.reply_code(), "Failed to read file");
    }

    let mut data = match open_data_connection(ctx, "RETR", "Opening binary connection for file transfer").await {
        Ok(data) => data,
        Err(result) => return result,
    };
    let outcome = transfer::send_file(&mut data, &target.absolute, ctx.config.buffer_size).await;
    finish_transfer("RETR", outcome)
}

/// STOR path: writes everything the client sends into a file.
pub async fn handle_stor<W>(ctx: &mut CommandContext<'_, W>, command: &Command) -> CommandResult
where
    W: AsyncWrite + Unpin,
{
    if !ctx.state.has_data_channel() {
        return not_passive("STOR");
    }
    let requested = match command.argument() {
        Some(requested) => requested,
        None => return missing_argument(),
    };
    let target = match ctx.resolve(&requested) {
        Ok(target) => target,
        Err(result) => return result,
    };

    if let Err(e) = storage::prepare_upload(&target).await {
        warn!("STOR {} refused: {}", target.absolute.display(), e);
        return CommandResult::failure(e.reply_code(), "Failed to store file");
    }

    let mut data = match open_data_connection(ctx, "STOR", "Opening binary connection for file upload").await {
        Ok(data) => data,
        Err(result) => return result,
    };
    let outcome = transfer::receive_file(&mut data, &target.absolute, ctx.config.buffer_size).await;
    finish_transfer("STOR", outcome)
}

async fn is_directory(target: &ResolvedPath) -> bool {
    fs::metadata(&target.absolute)
        .await
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false)
}

//! Control connection session loop.
//!
//! Greets the client, reads CRLF terminated command lines, dispatches them
//! and writes the replies back until QUIT or disconnect.

use log::{debug, error, info};
use std::io;
use std::sync::Arc;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

use crate::client::SessionState;
use crate::config::ServerConfig;
use crate::protocol::responses::{LINE_TOO_LONG, READY};
use crate::protocol::{CommandStatus, Dispatcher, format_response, parse_command};

/// One line read from the control connection
enum ControlLine {
    Command(String),
    TooLong,
    Closed,
}

/// A single client session on a control stream.
pub struct Session<S> {
    stream: S,
    peer: String,
    config: Arc<ServerConfig>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// `peer` is only used to label log lines.
    pub fn new(stream: S, peer: String, config: Arc<ServerConfig>) -> Self {
        Self {
            stream,
            peer,
            config,
        }
    }

    /// Runs the session to completion.
    ///
    /// Returns an error only when the control stream itself fails; any
    /// data channel still open is closed on every exit path.
    pub async fn run(self) -> io::Result<()> {
        let Session {
            stream,
            peer,
            config,
        } = self;

        let max_line = config.max_command_length;
        let dispatcher = Dispatcher::new(config);
        let mut state = SessionState::new();

        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        let outcome = serve(&dispatcher, &mut state, &mut reader, &mut write_half, max_line, &peer).await;

        state.close_data_channel();
        match &outcome {
            Ok(()) => info!("Client {} disconnected", peer),
            Err(e) => error!("Session with {} ended: {}", peer, e),
        }
        outcome
    }
}

async fn serve<R, W>(
    dispatcher: &Dispatcher,
    state: &mut SessionState,
    reader: &mut R,
    writer: &mut W,
    max_line: usize,
    peer: &str,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    send(writer, &format_response(READY, "FTP Server ready.")).await?;

    loop {
        let line = match read_control_line(reader, max_line).await? {
            ControlLine::Command(line) => line,
            ControlLine::TooLong => {
                send(writer, &format_response(LINE_TOO_LONG, "Command line too long")).await?;
                continue;
            }
            ControlLine::Closed => {
                info!("Connection closed by client {}", peer);
                return Ok(());
            }
        };

        let command = parse_command(&line);
        if command.verb.is_empty() {
            continue;
        }
        info!("Received from {}: {}", peer, command);

        let result = dispatcher.dispatch(&command, state, writer).await;

        if let Some(msg) = &result.message {
            debug!("Sending response to client {}: {}", peer, msg.trim_end());
            send(writer, msg).await?;
        }

        if result.status == CommandStatus::CloseConnection {
            info!("Client {} requested to quit", peer);
            // The peer may already be gone; the session ends either way.
            let _ = writer.shutdown().await;
            return Ok(());
        }
    }
}

/// Reads one line, refusing to buffer more than `max_line` bytes of it.
///
/// The remainder of an oversized line is read and discarded so the next
/// command starts cleanly.
async fn read_control_line<R>(reader: &mut R, max_line: usize) -> io::Result<ControlLine>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = max_line as u64 + 1;
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(ControlLine::Closed);
    }

    if buf.len() > max_line {
        if buf.last() != Some(&b'\n') {
            let mut rest = Vec::new();
            loop {
                rest.clear();
                let n = (&mut *reader).take(limit).read_until(b'\n', &mut rest).await?;
                if n == 0 || rest.last() == Some(&b'\n') {
                    break;
                }
            }
        }
        return Ok(ControlLine::TooLong);
    }

    Ok(ControlLine::Command(String::from_utf8_lossy(&buf).into_owned()))
}

async fn send<W>(writer: &mut W, reply: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(reply.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use tokio::io::{DuplexStream, Lines, ReadHalf, WriteHalf};
    use tokio::net::TcpStream;
    use tokio::task::JoinHandle;
    use tempfile::TempDir;

    struct TestClient {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
        session: JoinHandle<io::Result<()>>,
    }

    impl TestClient {
        async fn start(dir: &TempDir, passive_min: u16, passive_max: u16) -> Self {
            let config = Arc::new(test_config(dir.path(), passive_min, passive_max));
            let (client, server) = tokio::io::duplex(4096);
            let session = tokio::spawn(Session::new(server, "test".into(), config).run());
            let (read_half, writer) = tokio::io::split(client);
            let mut client = Self {
                lines: BufReader::new(read_half).lines(),
                writer,
                session,
            };
            assert_eq!(client.reply().await, "220 FTP Server ready.");
            client
        }

        async fn reply(&mut self) -> String {
            self.lines.next_line().await.unwrap().expect("reply line")
        }

        async fn send(&mut self, line: &str) {
            self.writer.write_all(format!("{}\r\n", line).as_bytes()).await.unwrap();
        }

        async fn cmd(&mut self, line: &str) -> String {
            self.send(line).await;
            self.reply().await
        }

        /// Sends PASV and returns the announced port.
        async fn pasv(&mut self) -> u16 {
            let reply = self.cmd("PASV").await;
            assert!(reply.starts_with("227 Entering Passive Mode (127,0,0,1,"), "{}", reply);
            let inner = &reply[reply.find('(').unwrap() + 1..reply.find(')').unwrap()];
            let parts: Vec<u16> = inner.split(',').map(|p| p.parse().unwrap()).collect();
            parts[4] * 256 + parts[5]
        }
    }

    async fn connect(port: u16) -> TcpStream {
        TcpStream::connect(("127.0.0.1", port)).await.unwrap()
    }

    #[tokio::test]
    async fn test_scenario_walkthrough() {
        let dir = TempDir::new().unwrap();
        let mut client = TestClient::start(&dir, 45000, 45009).await;

        assert!(client.cmd("USER anonymous").await.starts_with("230"));
        let port = client.pasv().await;
        assert!((45000..=45009).contains(&port));

        assert!(client.cmd("MKD /sub").await.starts_with("257"));
        assert!(client.cmd("CWD /sub").await.starts_with("250"));
        assert!(client.cmd("PWD").await.starts_with("257 \"/sub\""));

        client.send("STOR file.txt").await;
        let mut data = connect(port).await;
        data.write_all(b"hi").await.unwrap();
        data.shutdown().await.unwrap();
        drop(data);
        assert!(client.reply().await.starts_with("150"));
        assert_eq!(client.reply().await, "226 Transfer completed successfully");
        assert_eq!(std::fs::read(dir.path().join("sub/file.txt")).unwrap(), b"hi");

        let port = client.pasv().await;
        client.send("RETR file.txt").await;
        let mut data = connect(port).await;
        assert!(client.reply().await.starts_with("150"));
        let mut received = Vec::new();
        data.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hi");
        assert!(client.reply().await.starts_with("226"));

        assert!(client.cmd("DELE file.txt").await.starts_with("250"));
        assert!(client.cmd("RMD /sub").await.starts_with("250"));
        assert!(!dir.path().join("sub").exists());

        assert!(client.cmd("QUIT").await.starts_with("221"));
        assert!(client.lines.next_line().await.unwrap().is_none());
        client.session.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_transfers_need_pasv() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        let mut client = TestClient::start(&dir, 45010, 45019).await;
        client.cmd("USER anonymous").await;

        assert_eq!(
            client.cmd("RETR a.txt").await,
            "425 Server is not in passive mode! Use PASV command before RETR"
        );
        assert!(client.cmd("STOR b.txt").await.starts_with("425"));
        assert!(client.cmd("LIST").await.starts_with("425"));
        assert!(!dir.path().join("b.txt").exists());
    }

    #[tokio::test]
    async fn test_channel_is_single_use() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"abc").unwrap();
        let mut client = TestClient::start(&dir, 45020, 45029).await;
        client.cmd("USER anonymous").await;

        let port = client.pasv().await;
        client.send("LIST").await;
        let mut data = connect(port).await;
        assert_eq!(client.reply().await, "150 Opening connection for file listing");
        let mut listing = String::new();
        data.read_to_string(&mut listing).await.unwrap();
        assert!(listing.contains(" a.txt\r\n"));
        assert!(client.reply().await.starts_with("226"));

        assert!(client.cmd("RETR a.txt").await.starts_with("425"));
    }

    #[tokio::test]
    async fn test_second_pasv_reuses_freed_port() {
        let dir = TempDir::new().unwrap();
        let mut client = TestClient::start(&dir, 45030, 45039).await;
        client.cmd("USER anonymous").await;

        let first = client.pasv().await;
        let second = client.pasv().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_rejection_before_transfer_keeps_channel() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"abc").unwrap();
        let mut client = TestClient::start(&dir, 45040, 45049).await;
        client.cmd("USER anonymous").await;

        let port = client.pasv().await;
        assert!(client.cmd("RETR docs").await.starts_with("550"));
        assert!(client.cmd("RETR missing.txt").await.starts_with("550"));
        assert!(client.cmd("STOR nowhere/x.txt").await.starts_with("550"));
        assert!(client.cmd("LIST a.txt").await.starts_with("550"));
        assert!(client.cmd("RETR ../../etc/passwd").await.starts_with("550"));

        client.send("RETR a.txt").await;
        let mut data = connect(port).await;
        assert!(client.reply().await.starts_with("150"));
        let mut received = Vec::new();
        data.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"abc");
        assert!(client.reply().await.starts_with("226"));
    }

    #[tokio::test]
    async fn test_cdup_at_root_is_idempotent() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        let mut client = TestClient::start(&dir, 45050, 45059).await;
        client.cmd("USER anonymous").await;

        assert!(client.cmd("CWD a").await.starts_with("250"));
        assert_eq!(client.cmd("CDUP").await, "200 Directory changed to parent: /");
        assert_eq!(client.cmd("CDUP").await, "200 You are already in the root directory");
        assert_eq!(client.cmd("CDUP").await, "200 You are already in the root directory");
        assert!(client.cmd("PWD").await.starts_with("257 \"/\""));
    }

    #[tokio::test]
    async fn test_cwd_cannot_leave_root() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        let mut client = TestClient::start(&dir, 45060, 45069).await;
        client.cmd("USER anonymous").await;

        client.cmd("CWD a").await;
        assert!(client.cmd("CWD ../..").await.starts_with("550"));
        assert!(client.cmd("CWD /../a").await.starts_with("550"));
        assert!(client.cmd("CWD missing").await.starts_with("550"));
        assert!(client.cmd("PWD").await.starts_with("257 \"/a\""));
        assert!(client.cmd("CWD \\").await.starts_with("250"));
        assert!(client.cmd("PWD").await.starts_with("257 \"/\""));
    }

    #[tokio::test]
    async fn test_password_login_matrix() {
        let dir = TempDir::new().unwrap();
        let mut client = TestClient::start(&dir, 45070, 45079).await;

        assert!(client.cmd("PASS alice123").await.starts_with("530"));
        assert_eq!(client.cmd("USER alice").await, "331 Please enter password");
        assert!(client.cmd("PASS wrong").await.starts_with("530"));
        assert!(client.cmd("PWD").await.starts_with("530"));
        // The failed PASS cleared the pending user.
        assert!(client.cmd("PASS alice123").await.starts_with("530"));

        assert_eq!(client.cmd("USER mallory").await, "331 Please enter password");
        assert!(client.cmd("PASS alice123").await.starts_with("530"));

        client.cmd("USER alice").await;
        assert_eq!(client.cmd("PASS alice123").await, "230 Logged in as alice");
        assert!(client.cmd("PWD").await.starts_with("257"));
    }

    #[tokio::test]
    async fn test_rmd_of_current_directory_moves_to_parent() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        let mut client = TestClient::start(&dir, 45080, 45089).await;
        client.cmd("USER anonymous").await;

        client.cmd("CWD /a/b").await;
        assert!(client.cmd("RMD /a/b").await.starts_with("250"));
        assert!(client.cmd("PWD").await.starts_with("257 \"/a\""));
        assert!(client.cmd("RMD /").await.starts_with("550"));
    }

    #[tokio::test]
    async fn test_misc_replies() {
        let dir = TempDir::new().unwrap();
        let mut client = TestClient::start(&dir, 45090, 45099).await;

        assert_eq!(client.cmd("AUTH TLS").await, "502 Command not supported");
        assert_eq!(client.cmd("NOOP").await, "502 Command does not exist");
        assert!(client.cmd("USER").await.starts_with("501"));
        client.cmd("user anonymous").await;
        assert_eq!(client.cmd("type i").await, "200 Type set to I.");
        assert_eq!(client.cmd("TYPE A").await, "200 Type set to A.");
        assert_eq!(client.cmd("TYPE E").await, "504 Type not supported.");
        assert!(client.cmd("MKD").await.starts_with("501"));
        assert!(client.cmd("PASS anything").await.starts_with("230"));
    }

    #[tokio::test]
    async fn test_overlong_line_is_rejected_and_session_continues() {
        let dir = TempDir::new().unwrap();
        let mut client = TestClient::start(&dir, 45100, 45109).await;

        let long = format!("USER {}", "x".repeat(2000));
        assert_eq!(client.cmd(&long).await, "500 Command line too long");
        assert!(client.cmd("USER anonymous").await.starts_with("230"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_end_session() {
        let dir = TempDir::new().unwrap();
        let mut client = TestClient::start(&dir, 45110, 45119).await;

        client.writer.write_all(b"\xff\xfe\r\n").await.unwrap();
        assert!(client.reply().await.starts_with("502"));
        assert!(client.cmd("USER anonymous").await.starts_with("230"));
    }

    #[tokio::test]
    async fn test_disconnect_releases_data_channel() {
        let dir = TempDir::new().unwrap();
        let mut client = TestClient::start(&dir, 45120, 45120).await;
        client.cmd("USER anonymous").await;
        assert_eq!(client.pasv().await, 45120);

        let TestClient { lines, writer, session } = client;
        drop(writer);
        drop(lines);
        session.await.unwrap().unwrap();

        let mut client = TestClient::start(&dir, 45120, 45120).await;
        client.cmd("USER anonymous").await;
        assert_eq!(client.pasv().await, 45120);
    }

    #[tokio::test]
    async fn test_aborted_retr_reports_local_error_and_consumes_channel() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("big.bin"), vec![7u8; 16 * 1024 * 1024]).unwrap();
        std::fs::write(dir.path().join("small.txt"), b"ok").unwrap();
        let mut client = TestClient::start(&dir, 45130, 45139).await;
        client.cmd("USER anonymous").await;

        let port = client.pasv().await;
        client.send("RETR big.bin").await;
        let data = connect(port).await;
        assert!(client.reply().await.starts_with("150"));
        drop(data);
        assert_eq!(client.reply().await, "451 Action aborted. Local error in processing");

        assert_eq!(
            client.cmd("RETR big.bin").await,
            "425 Server is not in passive mode! Use PASV command before RETR"
        );

        let port = client.pasv().await;
        client.send("RETR small.txt").await;
        let mut data = connect(port).await;
        assert!(client.reply().await.starts_with("150"));
        let mut received = Vec::new();
        data.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"ok");
        assert!(client.reply().await.starts_with("226"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_out_of_root_is_refused() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret"), b"TOPSECRET").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let mut client = TestClient::start(&dir, 45140, 45149).await;
        client.cmd("USER anonymous").await;

        client.pasv().await;
        assert!(client.cmd("RETR link/secret").await.starts_with("550"));
        assert!(client.cmd("STOR link/planted.txt").await.starts_with("550"));
        assert!(client.cmd("CWD link").await.starts_with("550"));
        assert!(client.cmd("LIST link").await.starts_with("550"));
        assert!(!outside.path().join("planted.txt").exists());
    }

    #[tokio::test]
    async fn test_names_with_spaces_and_dashes() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("-dir")).unwrap();
        std::fs::write(dir.path().join("-dir/inside.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("a  b.txt"), b"spaced").unwrap();
        let mut client = TestClient::start(&dir, 45150, 45159).await;
        client.cmd("USER anonymous").await;

        let port = client.pasv().await;
        client.send("RETR a  b.txt").await;
        let mut data = connect(port).await;
        assert!(client.reply().await.starts_with("150"));
        let mut received = Vec::new();
        data.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"spaced");
        assert!(client.reply().await.starts_with("226"));

        for command in ["LIST -dir", "LIST -la /-dir"] {
            let port = client.pasv().await;
            client.send(command).await;
            let mut data = connect(port).await;
            assert!(client.reply().await.starts_with("150"), "{}", command);
            let mut listing = String::new();
            data.read_to_string(&mut listing).await.unwrap();
            assert!(listing.ends_with(" inside.txt\r\n"), "{}: {:?}", command, listing);
            assert!(client.reply().await.starts_with("226"));
        }

        let port = client.pasv().await;
        client.send("LIST -la").await;
        let mut data = connect(port).await;
        assert!(client.reply().await.starts_with("150"));
        let mut listing = String::new();
        data.read_to_string(&mut listing).await.unwrap();
        assert!(listing.contains(" a  b.txt\r\n"));
        assert!(listing.contains(" -dir\r\n"));
        assert!(client.reply().await.starts_with("226"));
    }
}

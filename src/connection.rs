use bytes::BytesMut;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::config::ConnectionConfig;
use crate::decoder::{ReplyDecoder, StreamDecoder};
use crate::error::{ClientError, ClientResult};
use crate::reply::Reply;
use crate::shared::SharedConnection;
use crate::transport::Transport;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake (AUTH / SELECT) in progress.
    Connecting,
    Open,
    /// Transport released. Terminal.
    Closed,
}

/// Closes a connection from outside the task that owns it. An in-flight
/// read or write fails promptly with [`ClientError::ConnectionClosed`].
#[derive(Debug, Clone)]
pub struct CloseHandle {
    token: CancellationToken,
}

impl CloseHandle {
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A single RESP connection.
///
/// Commands are strictly request-then-response: every method that talks to
/// the server takes `&mut self`, so a connection never has two commands in
/// flight. Wrap it in a [`SharedConnection`] to use it from several tasks.
///
/// Transport and protocol failures close the connection for good; server
/// error replies (`-ERR ...`) are returned as [`Reply::Error`] and leave it
/// open.
pub struct Connection<S = Transport> {
    id: u64,
    host: String,
    port: u16,
    db: u32,
    // Writes are buffered so a command goes out in one flush.
    stream: Option<BufWriter<S>>,
    // Bytes received but not yet decoded.
    buffer: BytesMut,
    decoder: StreamDecoder,
    state: ConnectionState,
    // Replies the server still owes us.
    pending: usize,
    // Set while a write is in progress. Still set on entry means a previous
    // write was abandoned halfway and the request stream is corrupt.
    poisoned: bool,
    last_activity: Instant,
    cancel: CancellationToken,
}

impl Connection<Transport> {
    /// Connect over TCP (or the configured Unix socket) and perform the
    /// handshake.
    pub async fn connect(config: &ConnectionConfig) -> ClientResult<Self> {
        config.validate()?;

        let transport = match &config.unix_socket {
            #[cfg(unix)]
            Some(path) => Transport::connect_unix(path).await?,
            #[cfg(not(unix))]
            Some(_) => {
                return Err(ClientError::Config(
                    "unix sockets are not supported on this platform".into(),
                ));
            }
            None => Transport::connect_tcp(&config.host, config.port).await?,
        };

        Self::handshake(transport, config).await
    }

    /// Shorthand for [`Connection::connect`] with the usual four settings.
    pub async fn open(host: &str, password: Option<&str>, port: u16, db: u32) -> ClientResult<Self> {
        let mut config = ConnectionConfig::new(host, port).db(db);
        config.password = password.map(str::to_string);
        Self::connect(&config).await
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Run the handshake over an already connected stream: `AUTH` when a
    /// password is configured, then `SELECT` when the database is not 0.
    /// On failure the stream is dropped.
    #[tracing::instrument(
        name = "handshake",
        skip_all,
        fields(host = %config.host, port = config.port, db = config.db)
    )]
    pub async fn handshake(stream: S, config: &ConnectionConfig) -> ClientResult<Self> {
        let mut conn = Connection {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            host: config.host.clone(),
            port: config.port,
            db: 0,
            stream: Some(BufWriter::new(stream)),
            buffer: BytesMut::with_capacity(4096),
            decoder: StreamDecoder::new(ReplyDecoder::with_max_depth(config.max_depth)),
            state: ConnectionState::Connecting,
            pending: 0,
            poisoned: false,
            last_activity: Instant::now(),
            cancel: CancellationToken::new(),
        };

        if let Some(password) = &config.password {
            let mut auth = Command::new("AUTH");
            if let Some(user) = &config.username {
                auth = auth.arg(user);
            }
            let auth = auth.arg(password);

            let reply = conn.round_trip(&auth).await?;
            if !reply.is_ok() {
                conn.teardown();
                warn!("AUTH rejected: {reply}");
                return Err(ClientError::Authentication(reply_message(&reply)));
            }
        }

        if config.db != 0 {
            let reply = conn.round_trip(&Command::new("SELECT").arg(config.db)).await?;
            if !reply.is_ok() {
                conn.teardown();
                warn!("SELECT {} rejected: {reply}", config.db);
                return Err(ClientError::Select(reply_message(&reply)));
            }
            conn.db = config.db;
        }

        conn.state = ConnectionState::Open;
        info!(id = conn.id, "connection open");
        Ok(conn)
    }

    /// Send a whitespace-separated text command.
    ///
    /// The text is split on ASCII whitespace, so arguments can neither
    /// contain spaces nor carry arbitrary bytes. Prefer
    /// [`Connection::command_argv`].
    pub async fn command(&mut self, text: &str) -> ClientResult<Reply> {
        self.command_with(&Command::parse_text(text)).await
    }

    /// Send a command given as a binary-safe argument vector.
    pub async fn command_argv<I, A>(&mut self, argv: I) -> ClientResult<Reply>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.command_with(&Command::from_argv(argv)).await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(id = self.id, command = %cmd.name()))]
    pub async fn command_with(&mut self, cmd: &Command) -> ClientResult<Reply> {
        self.ensure_open()?;
        if cmd.is_empty() {
            return Err(ClientError::InvalidCommand);
        }
        if self.pending > 0 {
            // Our reply would be queued behind theirs.
            return Err(ClientError::ConnectionBusy);
        }
        self.round_trip(cmd).await
    }

    /// Switch to another logical database. Returns `false`, keeping the
    /// current index, when the server rejects the switch.
    pub async fn select_db(&mut self, db: u32) -> ClientResult<bool> {
        Ok(self.select(db).await?.is_ok())
    }

    /// Like [`Connection::select_db`], but hands back the server's reply so
    /// a rejection can be shown with its own message.
    pub async fn select(&mut self, db: u32) -> ClientResult<Reply> {
        let reply = self.command_with(&Command::new("SELECT").arg(db)).await?;
        if reply.is_ok() {
            self.db = db;
        } else {
            debug!(id = self.id, "SELECT {db} rejected: {reply}");
        }
        Ok(reply)
    }

    /// Write a command without waiting for its reply. Collect replies, in
    /// order, with [`Connection::get_reply`].
    pub async fn append_command(&mut self, cmd: &Command) -> ClientResult<()> {
        self.ensure_open()?;
        if cmd.is_empty() {
            return Err(ClientError::InvalidCommand);
        }
        self.send(cmd).await
    }

    /// Read the reply to the oldest command written with
    /// [`Connection::append_command`].
    pub async fn get_reply(&mut self) -> ClientResult<Reply> {
        self.ensure_open()?;
        if self.pending == 0 {
            return Err(ClientError::NoPendingReply);
        }
        self.read_reply().await
    }

    /// Send every command in one write, then read all the replies.
    pub async fn pipeline(&mut self, cmds: &[Command]) -> ClientResult<Vec<Reply>> {
        self.ensure_open()?;
        if cmds.iter().any(Command::is_empty) {
            return Err(ClientError::InvalidCommand);
        }
        if self.pending > 0 {
            return Err(ClientError::ConnectionBusy);
        }
        if cmds.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = BytesMut::with_capacity(cmds.iter().map(Command::encoded_len).sum());
        for cmd in cmds {
            cmd.write_to(&mut out);
        }
        debug!(id = self.id, commands = cmds.len(), "sending pipeline");
        self.write_bytes(&out).await?;
        self.pending += cmds.len();

        let mut replies = Vec::with_capacity(cmds.len());
        for _ in cmds {
            replies.push(self.read_reply().await?);
        }
        Ok(replies)
    }

    /// Shut down and release the transport. Closing twice is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            // Skip the BufWriter: anything unflushed belongs to a command
            // nobody is waiting on.
            if let Err(e) = stream.get_mut().shutdown().await {
                debug!(id = self.id, "shutdown failed: {e}");
            }
            info!(id = self.id, "connection closed");
        }
        self.teardown();
    }

    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            token: self.cancel.clone(),
        }
    }

    pub fn into_shared(self) -> SharedConnection<S> {
        SharedConnection::new(self)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The currently selected database index.
    pub fn db(&self) -> u32 {
        self.db
    }

    pub fn state(&self) -> ConnectionState {
        if self.cancel.is_cancelled() {
            return ConnectionState::Closed;
        }
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    fn ensure_open(&mut self) -> ClientResult<()> {
        if self.cancel.is_cancelled() || self.state == ConnectionState::Closed {
            self.teardown();
            return Err(ClientError::ConnectionClosed);
        }
        if self.poisoned {
            warn!(id = self.id, "previous write was abandoned, closing connection");
            self.teardown();
            return Err(ClientError::ConnectionClosed);
        }
        Ok(())
    }

    async fn round_trip(&mut self, cmd: &Command) -> ClientResult<Reply> {
        self.send(cmd).await?;
        self.read_reply().await
    }

    async fn send(&mut self, cmd: &Command) -> ClientResult<()> {
        debug!(id = self.id, command = %cmd.name(), argc = cmd.len(), "sending command");
        self.write_bytes(&cmd.encode()).await?;
        self.pending += 1;
        Ok(())
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> ClientResult<()> {
        let result = {
            let Some(stream) = self.stream.as_mut() else {
                return Err(ClientError::ConnectionClosed);
            };
            self.poisoned = true;
            tokio::select! {
                res = async {
                    stream.write_all(bytes).await?;
                    stream.flush().await
                } => Some(res),
                _ = self.cancel.cancelled() => None,
            }
        };

        match result {
            Some(Ok(())) => {
                self.poisoned = false;
                Ok(())
            }
            Some(Err(e)) => Err(self.fail(e.into())),
            None => {
                self.teardown();
                Err(ClientError::ConnectionClosed)
            }
        }
    }

    async fn read_reply(&mut self) -> ClientResult<Reply> {
        loop {
            match self.decoder.decode(&mut self.buffer) {
                Ok(Some(reply)) => {
                    self.pending = self.pending.saturating_sub(1);
                    self.last_activity = Instant::now();
                    debug!(id = self.id, reply = %reply.kind(), "received reply");
                    return Ok(reply);
                }
                Ok(None) => {}
                Err(e) => return Err(self.fail(e)),
            }

            let read = {
                let Some(stream) = self.stream.as_mut() else {
                    return Err(ClientError::ConnectionClosed);
                };
                tokio::select! {
                    res = stream.read_buf(&mut self.buffer) => Some(res),
                    _ = self.cancel.cancelled() => None,
                }
            };

            match read {
                Some(Ok(0)) => {
                    let err = if self.buffer.is_empty() {
                        ClientError::Transport(io::Error::new(
                            io::ErrorKind::ConnectionReset,
                            "connection reset by server",
                        ))
                    } else {
                        ClientError::protocol("stream closed before reply was complete")
                    };
                    return Err(self.fail(err));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(self.fail(e.into())),
                None => {
                    self.teardown();
                    return Err(ClientError::ConnectionClosed);
                }
            }
        }
    }

    /// Close the connection if `err` leaves the stream unusable, then hand
    /// the error back.
    fn fail(&mut self, err: ClientError) -> ClientError {
        if err.is_fatal() {
            warn!(id = self.id, "closing connection: {err}");
            self.teardown();
        }
        err
    }

    fn teardown(&mut self) {
        self.stream = None;
        self.buffer.clear();
        self.decoder.reset();
        self.pending = 0;
        self.poisoned = false;
        self.state = ConnectionState::Closed;
    }
}

fn reply_message(reply: &Reply) -> String {
    match reply {
        Reply::Error(msg) | Reply::Status(msg) => msg.clone(),
        other => format!("unexpected {} reply", other.kind()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{DuplexStream, duplex};

    async fn expect_request(peer: &mut DuplexStream, cmd: Command) {
        let expected = cmd.encode();
        let mut buf = vec![0u8; expected.len()];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, expected.to_vec());
    }

    async fn open_plain() -> (Connection<DuplexStream>, DuplexStream) {
        let (client, peer) = duplex(64 * 1024);
        let conn = Connection::handshake(client, &ConnectionConfig::default())
            .await
            .unwrap();
        (conn, peer)
    }

    #[tokio::test]
    async fn test_handshake_without_auth_sends_nothing() {
        let (mut conn, mut peer) = open_plain().await;
        assert!(conn.is_open());
        assert_eq!(conn.db(), 0);

        peer.write_all(b"+PONG\r\n").await.unwrap();
        let reply = conn.command("PING").await.unwrap();
        assert_eq!(reply, Reply::status("PONG"));

        // The first thing the server saw was the PING.
        expect_request(&mut peer, Command::new("PING")).await;
    }

    #[tokio::test]
    async fn test_handshake_auth_and_select() {
        let (client, mut peer) = duplex(4096);
        let config = ConnectionConfig::default().password("secret").db(3);

        let server = tokio::spawn(async move {
            expect_request(&mut peer, Command::new("AUTH").arg("secret")).await;
            peer.write_all(b"+OK\r\n").await.unwrap();
            expect_request(&mut peer, Command::new("SELECT").arg("3")).await;
            peer.write_all(b"+OK\r\n").await.unwrap();
            peer
        });

        let conn = Connection::handshake(client, &config).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.db(), 3);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_acl_auth() {
        let (client, mut peer) = duplex(4096);
        let config = ConnectionConfig::default().username("app").password("pw");

        let server = tokio::spawn(async move {
            expect_request(&mut peer, Command::new("AUTH").arg("app").arg("pw")).await;
            peer.write_all(b"+OK\r\n").await.unwrap();
            peer
        });

        assert!(Connection::handshake(client, &config).await.is_ok());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_password_fails_construction() {
        let (client, mut peer) = duplex(4096);
        let config = ConnectionConfig::default().password("wrongpass");

        let server = tokio::spawn(async move {
            expect_request(&mut peer, Command::new("AUTH").arg("wrongpass")).await;
            peer.write_all(b"-WRONGPASS invalid username-password pair\r\n")
                .await
                .unwrap();
            // The client drops its end after the rejection.
            let mut rest = Vec::new();
            peer.read_to_end(&mut rest).await.unwrap();
            rest
        });

        let err = Connection::handshake(client, &config).await.err().unwrap();
        match err {
            ClientError::Authentication(msg) => assert!(msg.starts_with("WRONGPASS")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(server.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_select_rejected_fails_construction() {
        let (client, mut peer) = duplex(4096);
        let config = ConnectionConfig::default().db(99);

        tokio::spawn(async move {
            expect_request(&mut peer, Command::new("SELECT").arg(99)).await;
            peer.write_all(b"-ERR DB index is out of range\r\n").await.unwrap();
            peer
        });

        let err = Connection::handshake(client, &config).await.err().unwrap();
        assert!(matches!(err, ClientError::Select(ref msg) if msg.contains("out of range")));
    }

    #[tokio::test]
    async fn test_empty_command_is_rejected_locally() {
        let (mut conn, mut peer) = open_plain().await;

        let err = conn.command_argv(Vec::<Vec<u8>>::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidCommand));
        let err = conn.command("   ").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidCommand));
        assert!(conn.is_open());

        peer.write_all(b":1\r\n").await.unwrap();
        conn.command_argv(["INCR", "n"]).await.unwrap();
        expect_request(&mut peer, Command::new("INCR").arg("n")).await;
    }

    #[tokio::test]
    async fn test_error_reply_is_data() {
        let (mut conn, mut peer) = open_plain().await;

        peer.write_all(b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n:2\r\n")
            .await
            .unwrap();

        let reply = conn.command("LPUSH k v").await.unwrap();
        assert!(reply.is_error());
        assert!(conn.is_open());

        let reply = conn.command("INCR n").await.unwrap();
        assert_eq!(reply.as_integer().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let (mut conn, mut peer) = open_plain().await;

        conn.close().await;
        conn.close().await;
        assert_eq!(conn.state(), ConnectionState::Closed);

        let err = conn.command("PING").await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionClosed));
        let err = conn.select_db(1).await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionClosed));

        // Nothing was written after the close.
        let mut rest = Vec::new();
        peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_reply_closes_connection() {
        let (mut conn, mut peer) = open_plain().await;

        peer.write_all(b"#bad\r\n").await.unwrap();
        let err = conn.command("GET k").await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert_eq!(conn.state(), ConnectionState::Closed);

        let err = conn.command("GET k").await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_reply_split_across_reads() {
        let (mut conn, mut peer) = open_plain().await;

        let writer = tokio::spawn(async move {
            for part in [&b"*2\r\n$5\r\nhel"[..], b"lo\r\n", b"$-1", b"\r\n"] {
                peer.write_all(part).await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            peer
        });

        let reply = conn.command("MGET a b").await.unwrap();
        assert_eq!(
            reply,
            Reply::array(vec![Reply::bulk("hello"), Reply::nil_bulk()])
        );
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_eof_mid_reply_is_protocol_error() {
        let (mut conn, mut peer) = open_plain().await;

        tokio::spawn(async move {
            expect_request(&mut peer, Command::new("GET").arg("k")).await;
            // Hang up three bytes into a ten byte bulk string.
            peer.write_all(b"$10\r\nabc").await.unwrap();
        });

        let err = conn.command("GET k").await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_eof_before_reply_is_transport_error() {
        let (mut conn, peer) = open_plain().await;
        drop(peer);

        let err = conn.command("PING").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_select_db() {
        let (mut conn, mut peer) = open_plain().await;

        peer.write_all(b"+OK\r\n-ERR DB index is out of range\r\n")
            .await
            .unwrap();

        assert!(conn.select_db(5).await.unwrap());
        assert_eq!(conn.db(), 5);

        assert!(!conn.select_db(1000).await.unwrap());
        assert_eq!(conn.db(), 5);
        assert!(conn.is_open());

        expect_request(&mut peer, Command::new("SELECT").arg(5)).await;
        expect_request(&mut peer, Command::new("SELECT").arg(1000)).await;
    }

    #[tokio::test]
    async fn test_select_returns_server_reply() {
        let (mut conn, mut peer) = open_plain().await;

        peer.write_all(b"-ERR DB index is out of range\r\n+OK\r\n")
            .await
            .unwrap();

        let reply = conn.select(99).await.unwrap();
        assert_eq!(reply, Reply::error("ERR DB index is out of range"));
        assert_eq!(conn.db(), 0);

        assert!(conn.select(2).await.unwrap().is_ok());
        assert_eq!(conn.db(), 2);

        expect_request(&mut peer, Command::new("SELECT").arg(99)).await;
        expect_request(&mut peer, Command::new("SELECT").arg(2)).await;
    }

    #[tokio::test]
    async fn test_large_array_reply_over_small_pipe() {
        let n = 200_000;
        let (client, mut peer) = duplex(8 * 1024);
        let mut conn = Connection::handshake(client, &ConnectionConfig::default())
            .await
            .unwrap();

        tokio::spawn(async move {
            expect_request(&mut peer, Command::from_argv(["LRANGE", "big", "0", "-1"])).await;
            let mut data = format!("*{n}\r\n").into_bytes();
            for _ in 0..n {
                data.extend_from_slice(b"$1\r\nx\r\n");
            }
            peer.write_all(&data).await.unwrap();
            expect_request(&mut peer, Command::new("PING")).await;
            peer.write_all(b"+PONG\r\n").await.unwrap();
            peer
        });

        let start = Instant::now();
        let reply = conn.command_argv(["LRANGE", "big", "0", "-1"]).await.unwrap();
        let elapsed = start.elapsed();

        let items = reply.into_array().unwrap();
        assert_eq!(items.len(), n);
        assert!(items.iter().all(|item| item.as_bytes().unwrap() == b"x"));
        // Reading a reply this size must not slow down with the square of
        // its length.
        assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");

        // The decoder starts fresh for the next reply.
        assert_eq!(conn.command("PING").await.unwrap(), Reply::status("PONG"));
    }

    #[tokio::test]
    async fn test_append_and_get_reply() {
        let (mut conn, mut peer) = open_plain().await;

        let err = conn.get_reply().await.unwrap_err();
        assert!(matches!(err, ClientError::NoPendingReply));

        conn.append_command(&Command::new("SET").arg("a").arg(1))
            .await
            .unwrap();
        conn.append_command(&Command::new("GET").arg("a"))
            .await
            .unwrap();

        // A round trip would read someone else's reply.
        let err = conn.command("PING").await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionBusy));

        peer.write_all(b"+OK\r\n$1\r\n1\r\n").await.unwrap();
        assert!(conn.get_reply().await.unwrap().is_ok());
        assert_eq!(conn.get_reply().await.unwrap(), Reply::bulk("1"));
        assert!(matches!(
            conn.get_reply().await,
            Err(ClientError::NoPendingReply)
        ));
    }

    #[tokio::test]
    async fn test_pipeline() {
        let (mut conn, mut peer) = open_plain().await;

        let cmds = vec![
            Command::new("SET").arg("k").arg("v"),
            Command::new("GET").arg("k"),
            Command::new("DEL").arg("k"),
        ];
        peer.write_all(b"+OK\r\n$1\r\nv\r\n:1\r\n").await.unwrap();

        let replies = conn.pipeline(&cmds).await.unwrap();
        assert_eq!(
            replies,
            vec![Reply::ok(), Reply::bulk("v"), Reply::Integer(1)]
        );

        for cmd in cmds {
            expect_request(&mut peer, cmd).await;
        }

        let bad = vec![Command::new("PING"), Command::from_argv(Vec::<String>::new())];
        assert!(matches!(
            conn.pipeline(&bad).await,
            Err(ClientError::InvalidCommand)
        ));
    }

    #[tokio::test]
    async fn test_close_handle_cancels_in_flight_read() {
        let (mut conn, _peer) = open_plain().await;
        let handle = conn.close_handle();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.close();
        });

        // The peer never answers.
        let err = conn.command("BLPOP q 0").await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionClosed));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_last_activity_advances() {
        let (mut conn, mut peer) = open_plain().await;
        let before = conn.last_activity();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(conn.idle_time() >= Duration::from_millis(10));

        peer.write_all(b"+PONG\r\n").await.unwrap();
        conn.command("PING").await.unwrap();
        assert!(conn.last_activity() > before);
    }
}

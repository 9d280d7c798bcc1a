use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

use crate::command::Command;
use crate::connection::{CloseHandle, Connection, ConnectionState};
use crate::error::{ClientError, ClientResult};
use crate::reply::Reply;
use crate::transport::Transport;

/// A cloneable handle to one connection, for use from several tasks.
///
/// Commands still run one at a time. The plain methods wait their turn;
/// the `try_` variants fail with [`ClientError::ConnectionBusy`] instead.
pub struct SharedConnection<S = Transport> {
    inner: Arc<Mutex<Connection<S>>>,
    close: CloseHandle,
}

impl<S> Clone for SharedConnection<S> {
    fn clone(&self) -> Self {
        SharedConnection {
            inner: self.inner.clone(),
            close: self.close.clone(),
        }
    }
}

impl<S> SharedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(conn: Connection<S>) -> Self {
        let close = conn.close_handle();
        SharedConnection {
            inner: Arc::new(Mutex::new(conn)),
            close,
        }
    }

    pub async fn command(&self, text: &str) -> ClientResult<Reply> {
        self.command_with(&Command::parse_text(text)).await
    }

    pub async fn command_argv<I, A>(&self, argv: I) -> ClientResult<Reply>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.command_with(&Command::from_argv(argv)).await
    }

    pub async fn command_with(&self, cmd: &Command) -> ClientResult<Reply> {
        self.inner.lock().await.command_with(cmd).await
    }

    pub async fn try_command_argv<I, A>(&self, argv: I) -> ClientResult<Reply>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.try_command_with(&Command::from_argv(argv)).await
    }

    pub async fn try_command_with(&self, cmd: &Command) -> ClientResult<Reply> {
        let mut conn = self
            .inner
            .try_lock()
            .map_err(|_| ClientError::ConnectionBusy)?;
        conn.command_with(cmd).await
    }

    pub async fn select_db(&self, db: u32) -> ClientResult<bool> {
        self.inner.lock().await.select_db(db).await
    }

    pub async fn select(&self, db: u32) -> ClientResult<Reply> {
        self.inner.lock().await.select(db).await
    }

    pub async fn pipeline(&self, cmds: &[Command]) -> ClientResult<Vec<Reply>> {
        self.inner.lock().await.pipeline(cmds).await
    }

    /// Close the connection, aborting any command in flight.
    pub async fn close(&self) {
        self.close.close();
        self.inner.lock().await.close().await;
    }

    pub fn close_handle(&self) -> CloseHandle {
        self.close.clone()
    }

    /// Current state; `Closed` as soon as a close has been requested.
    pub async fn state(&self) -> ConnectionState {
        if self.close.is_closed() {
            return ConnectionState::Closed;
        }
        self.inner.lock().await.state()
    }
}

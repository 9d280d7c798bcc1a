//! # respline
//!
//! An async client for the RESP2 protocol spoken by Redis-compatible
//! servers.
//!
//! Commands are encoded as multi-bulk requests, written to a TCP or Unix
//! socket (or any `AsyncRead + AsyncWrite` stream), and each reply is decoded
//! into a [`Reply`]. Server error replies are ordinary values; only I/O and
//! protocol failures are errors, and those close the connection.
//!
//! ```no_run
//! # async fn demo() -> respline::ClientResult<()> {
//! use respline::{Command, Connection};
//!
//! let mut conn = Connection::open("127.0.0.1", None, 6379, 0).await?;
//! conn.command_with(&Command::new("SET").arg("greeting").arg(b"hi\x00there"))
//!     .await?;
//! let value = conn.command_argv(["GET", "greeting"]).await?;
//! assert_eq!(value.as_bytes()?, b"hi\x00there");
//! conn.close().await;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod connection;
pub mod decoder;
pub mod error;
pub mod reply;
pub mod shared;
pub mod transport;

pub use command::{Command, ToArg};
pub use config::ConnectionConfig;
pub use connection::{CloseHandle, Connection, ConnectionState};
pub use decoder::{RespCodec, ReplyDecoder, StreamDecoder};
pub use error::{ClientError, ClientResult};
pub use reply::Reply;
pub use shared::SharedConnection;
pub use transport::Transport;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("SELECT failed: {0}")]
    Select(String),

    #[error("invalid command: empty argument list")]
    InvalidCommand,

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("connection is busy with another command")]
    ConnectionBusy,

    #[error("no reply is pending on this connection")]
    NoPendingReply,

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        ClientError::Protocol(msg.into())
    }

    /// Whether this error leaves the stream in an unknown position, which
    /// forces the connection closed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Protocol(_))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(ClientError::from(io).is_fatal());
        assert!(ClientError::protocol("bad").is_fatal());

        assert!(!ClientError::InvalidCommand.is_fatal());
        assert!(!ClientError::ConnectionClosed.is_fatal());
        assert!(!ClientError::Authentication("nope".into()).is_fatal());
        assert!(
            !ClientError::TypeMismatch {
                expected: "integer",
                found: "bulk string",
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_display() {
        let err = ClientError::TypeMismatch {
            expected: "integer",
            found: "status",
        };
        assert_eq!(err.to_string(), "type mismatch: expected integer, found status");
        assert_eq!(
            ClientError::protocol("unrecognized reply type '#'").to_string(),
            "protocol error: unrecognized reply type '#'"
        );
    }
}

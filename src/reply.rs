use bytes::BufMut;
use std::fmt;

use crate::command::{put_bulk, put_line};
use crate::error::{ClientError, ClientResult};

/// A decoded RESP2 reply.
///
/// Nil is a distinct, valid value for both bulk strings and arrays:
/// `Bulk(None)` is not `Bulk(Some(vec![]))` and `Array(None)` is not
/// `Array(Some(vec![]))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// +OK\r\n
    Status(String),
    /// -ERR message\r\n
    Error(String),
    /// :1000\r\n
    Integer(i64),
    /// $6\r\nfoobar\r\n  or  $-1\r\n (nil)
    Bulk(Option<Vec<u8>>),
    /// *2\r\n...  or  *-1\r\n (nil)
    Array(Option<Vec<Reply>>),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    pub fn bulk(data: impl Into<Vec<u8>>) -> Self {
        Reply::Bulk(Some(data.into()))
    }

    pub fn nil_bulk() -> Self {
        Reply::Bulk(None)
    }

    pub fn array(items: Vec<Reply>) -> Self {
        Reply::Array(Some(items))
    }

    pub fn nil_array() -> Self {
        Reply::Array(None)
    }

    /// Name of the variant, as used in `TypeMismatch` errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Status(_) => "status",
            Reply::Error(_) => "error",
            Reply::Integer(_) => "integer",
            Reply::Bulk(Some(_)) => "bulk string",
            Reply::Bulk(None) => "nil bulk string",
            Reply::Array(Some(_)) => "array",
            Reply::Array(None) => "nil array",
        }
    }

    fn mismatch<T>(&self, expected: &'static str) -> ClientResult<T> {
        Err(ClientError::TypeMismatch {
            expected,
            found: self.kind(),
        })
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Bulk(None) | Reply::Array(None))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// True for `+OK`.
    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Status(s) if s == "OK")
    }

    pub fn as_integer(&self) -> ClientResult<i64> {
        match self {
            Reply::Integer(n) => Ok(*n),
            other => other.mismatch("integer"),
        }
    }

    pub fn as_status(&self) -> ClientResult<&str> {
        match self {
            Reply::Status(s) => Ok(s),
            other => other.mismatch("status"),
        }
    }

    /// The message of a server error reply.
    pub fn as_error_msg(&self) -> ClientResult<&str> {
        match self {
            Reply::Error(s) => Ok(s),
            other => other.mismatch("error"),
        }
    }

    /// Raw bytes of a non-nil bulk string.
    pub fn as_bytes(&self) -> ClientResult<&[u8]> {
        match self {
            Reply::Bulk(Some(data)) => Ok(data),
            other => other.mismatch("bulk string"),
        }
    }

    /// A non-nil bulk string decoded as UTF-8. Invalid UTF-8 is reported as
    /// a mismatch rather than replaced.
    pub fn as_text(&self) -> ClientResult<&str> {
        match self {
            Reply::Bulk(Some(data)) => std::str::from_utf8(data).map_err(|_| {
                ClientError::TypeMismatch {
                    expected: "utf-8 text",
                    found: "binary bulk string",
                }
            }),
            other => other.mismatch("bulk string"),
        }
    }

    pub fn as_array(&self) -> ClientResult<&[Reply]> {
        match self {
            Reply::Array(Some(items)) => Ok(items),
            other => other.mismatch("array"),
        }
    }

    pub fn into_bytes(self) -> ClientResult<Vec<u8>> {
        match self {
            Reply::Bulk(Some(data)) => Ok(data),
            other => other.mismatch("bulk string"),
        }
    }

    pub fn into_array(self) -> ClientResult<Vec<Reply>> {
        match self {
            Reply::Array(Some(items)) => Ok(items),
            other => other.mismatch("array"),
        }
    }

    /// Serialize this reply to RESP bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        buf
    }

    /// Append the RESP encoding of this reply to `buf`. Used by code that
    /// plays the server side, such as test doubles.
    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        match self {
            Reply::Status(s) => put_line(buf, b'+', s.as_bytes()),
            Reply::Error(s) => put_line(buf, b'-', s.as_bytes()),
            Reply::Integer(n) => put_line(buf, b':', n.to_string().as_bytes()),
            Reply::Bulk(None) => buf.put_slice(b"$-1\r\n"),
            Reply::Bulk(Some(data)) => put_bulk(buf, data),
            Reply::Array(None) => buf.put_slice(b"*-1\r\n"),
            Reply::Array(Some(items)) => {
                put_line(buf, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.write_to(buf);
                }
            }
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{s}"),
            Reply::Error(s) => write!(f, "(error) {s}"),
            Reply::Integer(n) => write!(f, "(integer) {n}"),
            Reply::Bulk(None) | Reply::Array(None) => write!(f, "(nil)"),
            Reply::Bulk(Some(data)) => write!(f, "\"{}\"", String::from_utf8_lossy(data)),
            Reply::Array(Some(items)) if items.is_empty() => write!(f, "(empty array)"),
            Reply::Array(Some(items)) => {
                for (i, item) in items.iter().enumerate() {
                    let label = format!("{}) ", i + 1);
                    if i > 0 {
                        write!(f, "\n{:indent$}", "")?;
                    }
                    write!(f, "{label}")?;
                    item.fmt_indented(f, indent + label.len())?;
                }
                Ok(())
            }
        }
    }
}

/// Renders the reply the way `redis-cli` prints it.
impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

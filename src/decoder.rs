use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::command::Command;
use crate::error::{ClientError, ClientResult};
use crate::reply::Reply;

/// Default limit on array nesting.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Largest bulk string the decoder accepts (512 MiB, the server's own cap).
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Longest header line (`+`, `-`, `:`, `$`, `*`) the decoder will wait on.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// RESP2 reply decoder.
///
/// [`ReplyDecoder::decode`] looks at a buffer of received bytes and either
/// returns one complete reply together with the number of bytes it spans,
/// returns `Ok(None)` when the buffer holds only a prefix of a reply, or
/// fails with [`ClientError::Protocol`] when the bytes are not valid RESP.
/// The buffer is never modified; callers advance past the consumed bytes.
///
/// Each call starts from the beginning of the buffer. For a reply that
/// arrives over many reads use [`StreamDecoder`], which remembers how far
/// it got.
#[derive(Debug, Clone, Copy)]
pub struct ReplyDecoder {
    max_depth: usize,
}

impl Default for ReplyDecoder {
    fn default() -> Self {
        ReplyDecoder {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ReplyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow at most `max_depth` levels of nested arrays. A reply that nests
    /// deeper fails with a protocol error.
    pub fn with_max_depth(max_depth: usize) -> Self {
        ReplyDecoder { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn decode(&self, buf: &[u8]) -> ClientResult<Option<(Reply, usize)>> {
        self.parse_at(buf, 0, 0)
    }

    fn check_depth(&self, depth: usize) -> ClientResult<()> {
        if depth >= self.max_depth {
            return Err(ClientError::protocol(format!(
                "reply nesting exceeds maximum depth of {}",
                self.max_depth
            )));
        }
        Ok(())
    }

    /// Parse one reply starting at `pos`. On success returns the reply and
    /// the position just past it.
    fn parse_at(&self, buf: &[u8], pos: usize, depth: usize) -> ClientResult<Option<(Reply, usize)>> {
        let Some((prefix, line, next)) = header_line(buf, pos)? else {
            return Ok(None);
        };

        match prefix {
            b'+' => Ok(Some((
                Reply::Status(String::from_utf8_lossy(line).into_owned()),
                next,
            ))),
            b'-' => Ok(Some((
                Reply::Error(String::from_utf8_lossy(line).into_owned()),
                next,
            ))),
            b':' => {
                let n = parse_int(line, "integer")?;
                Ok(Some((Reply::Integer(n), next)))
            }
            b'$' => {
                let Some(len) = bulk_len(line)? else {
                    return Ok(Some((Reply::Bulk(None), next)));
                };
                let Some(end) = bulk_end(buf, next, len)? else {
                    return Ok(None);
                };
                let data = buf[next..next + len].to_vec();
                Ok(Some((Reply::Bulk(Some(data)), end)))
            }
            b'*' => {
                let Some(len) = array_len(line)? else {
                    return Ok(Some((Reply::Array(None), next)));
                };
                self.check_depth(depth)?;

                // The length comes off the wire; don't trust it for allocation.
                let mut items = Vec::with_capacity(len.min(1024));
                let mut cursor = next;
                for _ in 0..len {
                    match self.parse_at(buf, cursor, depth + 1)? {
                        Some((item, after)) => {
                            items.push(item);
                            cursor = after;
                        }
                        None => return Ok(None),
                    }
                }

                Ok(Some((Reply::Array(Some(items)), cursor)))
            }
            _ => unreachable!("prefix validated by header_line"),
        }
    }
}

/// Decoder for a byte stream that delivers replies in pieces.
///
/// Between calls it keeps the offset up to which the pending reply has been
/// checked, plus the number of elements still owed by every array that is
/// open at that offset. A call only looks at bytes that arrived since the
/// last one, and the [`Reply`] is built once the whole frame is present, so
/// a reply costs time linear in its size however it is split across reads.
///
/// The caller must only append to the buffer while a reply is pending.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    decoder: ReplyDecoder,
    /// Bytes of the pending reply already known to be well formed.
    scanned: usize,
    /// Elements still missing from each open array, outermost first.
    open: Vec<usize>,
}

impl StreamDecoder {
    pub fn new(decoder: ReplyDecoder) -> Self {
        StreamDecoder {
            decoder,
            scanned: 0,
            open: Vec::new(),
        }
    }

    /// Take one complete reply off the front of `buf`, or return `Ok(None)`
    /// and remember the progress made so far.
    pub fn decode(&mut self, buf: &mut BytesMut) -> ClientResult<Option<Reply>> {
        let len = match self.scan(buf) {
            Ok(Some(len)) => len,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };
        self.reset();

        match self.decoder.decode(&buf[..len])? {
            Some((reply, consumed)) if consumed == len => {
                buf.advance(len);
                Ok(Some(reply))
            }
            _ => Err(ClientError::protocol("reply framing mismatch")),
        }
    }

    /// Forget any partially scanned reply.
    pub fn reset(&mut self) {
        self.scanned = 0;
        self.open.clear();
    }

    /// Walk forward from the saved offset without allocating. Returns the
    /// length of the first reply once its last byte is in `buf`.
    fn scan(&mut self, buf: &[u8]) -> ClientResult<Option<usize>> {
        loop {
            let Some((prefix, line, next)) = header_line(buf, self.scanned)? else {
                return Ok(None);
            };

            let end = match prefix {
                b'+' | b'-' => next,
                b':' => {
                    parse_int(line, "integer")?;
                    next
                }
                b'$' => match bulk_len(line)? {
                    None => next,
                    Some(len) => match bulk_end(buf, next, len)? {
                        Some(end) => end,
                        None => return Ok(None),
                    },
                },
                b'*' => match array_len(line)? {
                    None => next,
                    Some(len) => {
                        self.decoder.check_depth(self.open.len())?;
                        if len > 0 {
                            self.open.push(len);
                            self.scanned = next;
                            continue;
                        }
                        next
                    }
                },
                _ => unreachable!("prefix validated by header_line"),
            };
            self.scanned = end;

            // One value is complete; close every array it was the last of.
            loop {
                match self.open.last_mut() {
                    None => return Ok(Some(self.scanned)),
                    Some(remaining) => {
                        *remaining -= 1;
                        if *remaining > 0 {
                            break;
                        }
                        self.open.pop();
                    }
                }
            }
        }
    }
}

/// Split off the header line at `pos`: its type byte, its body, and the
/// position after its CRLF.
fn header_line(buf: &[u8], pos: usize) -> ClientResult<Option<(u8, &[u8], usize)>> {
    let Some(&prefix) = buf.get(pos) else {
        return Ok(None);
    };

    if !matches!(prefix, b'+' | b'-' | b':' | b'$' | b'*') {
        return Err(ClientError::protocol(format!(
            "unrecognized reply type {:?}",
            prefix as char
        )));
    }

    let start = pos + 1;
    let Some(end) = find_crlf_from(buf, start) else {
        if buf.len() - start > MAX_LINE_LEN + 1 {
            return Err(ClientError::protocol(format!(
                "reply line longer than {MAX_LINE_LEN} bytes"
            )));
        }
        return Ok(None);
    };
    Ok(Some((prefix, &buf[start..end], end + 2)))
}

/// `None` for the nil bulk string.
fn bulk_len(line: &[u8]) -> ClientResult<Option<usize>> {
    let len = parse_int(line, "bulk length")?;
    if len == -1 {
        return Ok(None);
    }
    if !(0..=MAX_BULK_LEN).contains(&len) {
        return Err(ClientError::protocol(format!("invalid bulk length {len}")));
    }
    Ok(Some(len as usize))
}

/// Position after a bulk payload of `len` bytes starting at `start`.
fn bulk_end(buf: &[u8], start: usize, len: usize) -> ClientResult<Option<usize>> {
    let end = start + len + 2;
    if buf.len() < end {
        return Ok(None);
    }
    if &buf[start + len..end] != b"\r\n" {
        return Err(ClientError::protocol(
            "missing trailing CRLF after bulk string",
        ));
    }
    Ok(Some(end))
}

/// `None` for the nil array.
fn array_len(line: &[u8]) -> ClientResult<Option<usize>> {
    let len = parse_int(line, "multibulk length")?;
    if len == -1 {
        return Ok(None);
    }
    if len < 0 {
        return Err(ClientError::protocol(format!(
            "invalid multibulk length {len}"
        )));
    }
    Ok(Some(len as usize))
}

fn parse_int(line: &[u8], what: &str) -> ClientResult<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            ClientError::protocol(format!(
                "invalid {what}: {:?}",
                String::from_utf8_lossy(line)
            ))
        })
}

/// Find \r\n starting from the given position, looking no further than a
/// maximum-length line.
fn find_crlf_from(buf: &[u8], start: usize) -> Option<usize> {
    let limit = buf.len().min(start + MAX_LINE_LEN + 2);
    if limit < start + 2 {
        return None;
    }
    buf[start..limit]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|i| start + i)
}

/// `tokio_util` codec pairing the command encoder with [`StreamDecoder`], for
/// use with `Framed` streams.
#[derive(Debug, Default)]
pub struct RespCodec {
    decoder: StreamDecoder,
}

impl RespCodec {
    pub fn new(decoder: ReplyDecoder) -> Self {
        RespCodec {
            decoder: StreamDecoder::new(decoder),
        }
    }
}

impl Decoder for RespCodec {
    type Item = Reply;
    type Error = ClientError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Reply>, ClientError> {
        self.decoder.decode(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Reply>, ClientError> {
        match self.decode(src)? {
            Some(reply) => Ok(Some(reply)),
            None if src.is_empty() => Ok(None),
            None => {
                self.decoder.reset();
                Err(ClientError::protocol(
                    "stream closed before reply was complete",
                ))
            }
        }
    }
}

impl Encoder<&Command> for RespCodec {
    type Error = ClientError;

    fn encode(&mut self, cmd: &Command, dst: &mut BytesMut) -> Result<(), ClientError> {
        if cmd.is_empty() {
            return Err(ClientError::InvalidCommand);
        }
        cmd.write_to(dst);
        Ok(())
    }
}

impl Encoder<Command> for RespCodec {
    type Error = ClientError;

    fn encode(&mut self, cmd: Command, dst: &mut BytesMut) -> Result<(), ClientError> {
        <Self as Encoder<&Command>>::encode(self, &cmd, dst)
    }
}

use bytes::{BufMut, Bytes, BytesMut};

/// A command ready to be sent: the verb followed by its arguments, each an
/// arbitrary byte sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Vec<u8>>,
}

impl Command {
    pub fn new(verb: impl ToArg) -> Self {
        Command {
            args: vec![verb.to_arg()],
        }
    }

    pub fn arg(mut self, arg: impl ToArg) -> Self {
        self.args.push(arg.to_arg());
        self
    }

    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        self.args.extend(args.into_iter().map(|a| a.to_arg()));
        self
    }

    /// Build a command from a complete argument vector. The vector may be
    /// empty; the connection rejects empty commands before sending.
    pub fn from_argv<I, A>(argv: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        Command {
            args: argv.into_iter().map(|a| a.as_ref().to_vec()).collect(),
        }
    }

    /// Split a text command on ASCII whitespace.
    ///
    /// This form cannot carry binary arguments or arguments that contain
    /// spaces; use [`Command::from_argv`] or the builder for those.
    pub fn parse_text(text: &str) -> Self {
        Command {
            args: text
                .split_ascii_whitespace()
                .map(|t| t.as_bytes().to_vec())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn argv(&self) -> &[Vec<u8>] {
        &self.args
    }

    /// The verb, lossily decoded, for logging.
    pub fn name(&self) -> String {
        self.args
            .first()
            .map(|v| String::from_utf8_lossy(v).to_uppercase())
            .unwrap_or_default()
    }

    /// Exact size of the multi-bulk encoding.
    pub fn encoded_len(&self) -> usize {
        let mut len = 1 + decimal_len(self.args.len()) + 2;
        for arg in &self.args {
            len += 1 + decimal_len(arg.len()) + 2 + arg.len() + 2;
        }
        len
    }

    /// Encode as a RESP multi-bulk request:
    /// `*<argc>\r\n` then `$<len>\r\n<bytes>\r\n` per argument.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        put_line(buf, b'*', self.args.len().to_string().as_bytes());
        for arg in &self.args {
            put_bulk(buf, arg);
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.write_to(&mut buf);
        buf.freeze()
    }
}

/// `<prefix><body>\r\n`, the shape of every RESP header line.
pub(crate) fn put_line<B: BufMut>(buf: &mut B, prefix: u8, body: &[u8]) {
    buf.put_u8(prefix);
    buf.put_slice(body);
    buf.put_slice(b"\r\n");
}

pub(crate) fn put_bulk<B: BufMut>(buf: &mut B, data: &[u8]) {
    put_line(buf, b'$', data.len().to_string().as_bytes());
    buf.put_slice(data);
    buf.put_slice(b"\r\n");
}

fn decimal_len(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Conversion into a single binary-safe command argument.
pub trait ToArg {
    fn to_arg(&self) -> Vec<u8>;
}

impl ToArg for str {
    fn to_arg(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl ToArg for [u8] {
    fn to_arg(&self) -> Vec<u8> {
        self.to_vec()
    }
}

impl<const N: usize> ToArg for [u8; N] {
    fn to_arg(&self) -> Vec<u8> {
        self.to_vec()
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Vec<u8> {
        self.clone()
    }
}

impl ToArg for Bytes {
    fn to_arg(&self) -> Vec<u8> {
        self.to_vec()
    }
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Vec<u8> {
        (**self).to_arg()
    }
}

macro_rules! decimal_to_arg {
    ($($t:ty),*) => {
        $(
            impl ToArg for $t {
                fn to_arg(&self) -> Vec<u8> {
                    self.to_string().into_bytes()
                }
            }
        )*
    };
}

decimal_to_arg!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

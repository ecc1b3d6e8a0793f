//! RESP wire format.
//!
//! Requests are always arrays of bulk strings. Replies are parsed
//! incrementally: [`parse`] returns `Ok(None)` until the buffer holds a
//! complete frame.
//!
//! ```text
//! +OK\r\n                 simple string
//! -ERR message\r\n        error
//! :42\r\n                 integer
//! $5\r\nhello\r\n         bulk string ($-1 is nil)
//! *2\r\n:1\r\n:2\r\n      array (*-1 is nil)
//! ```

use crate::error::{ClientError, Result};

const CRLF: &[u8] = b"\r\n";

/// Largest bulk string a store may send.
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Array capacity reserved up front; longer arrays grow as they parse.
const PREALLOC_ITEMS: i64 = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Frame>>),
}

impl Frame {
    pub fn into_integer(self) -> Result<i64> {
        match self {
            Frame::Integer(n) => Ok(n),
            other => Err(unexpected("integer", &other)),
        }
    }

    /// Simple strings and non-nil bulk strings, as text.
    pub fn into_text(self) -> Result<String> {
        match self {
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(Some(bytes)) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            other => Err(unexpected("string", &other)),
        }
    }

    pub fn into_optional_bytes(self) -> Result<Option<Vec<u8>>> {
        match self {
            Frame::Bulk(bytes) => Ok(bytes),
            other => Err(unexpected("bulk string", &other)),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Frame::Simple(_) => "simple string",
            Frame::Error(_) => "error",
            Frame::Integer(_) => "integer",
            Frame::Bulk(_) => "bulk string",
            Frame::Array(_) => "array",
        }
    }
}

fn unexpected(expected: &str, got: &Frame) -> ClientError {
    ClientError::protocol(format!("expected {expected} reply, got {}", got.kind()))
}

/// Encode a command as an array of bulk strings.
pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + args.iter().map(|a| a.as_ref().len() + 16).sum::<usize>());
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        let arg = arg.as_ref();
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(CRLF);
    }
    out
}

/// Parse one frame from the front of `buf`.
///
/// Returns the frame and the number of bytes it used, or `None` if more
/// input is needed.
pub fn parse(buf: &[u8]) -> Result<Option<(Frame, usize)>> {
    parse_at(buf, 0)
}

fn parse_at(buf: &[u8], pos: usize) -> Result<Option<(Frame, usize)>> {
    let Some(&tag) = buf.get(pos) else {
        return Ok(None);
    };
    let Some((line, next)) = read_line(buf, pos + 1) else {
        return Ok(None);
    };

    let frame = match tag {
        b'+' => Frame::Simple(text(line)),
        b'-' => Frame::Error(text(line)),
        b':' => Frame::Integer(number(line)?),
        b'$' => {
            let len = number(line)?;
            if len < 0 {
                return Ok(Some((Frame::Bulk(None), next)));
            }
            let len = usize::try_from(len)
                .ok()
                .filter(|len| *len <= MAX_BULK_LEN)
                .ok_or_else(|| ClientError::protocol(format!("bulk length {len} out of range")))?;
            let end = next
                .checked_add(len)
                .ok_or_else(|| ClientError::protocol("bulk length overflows the buffer"))?;
            if buf.len() < end + CRLF.len() {
                return Ok(None);
            }
            if &buf[end..end + CRLF.len()] != CRLF {
                return Err(ClientError::protocol("bulk string not terminated by CRLF"));
            }
            return Ok(Some((Frame::Bulk(Some(buf[next..end].to_vec())), end + CRLF.len())));
        }
        b'*' => {
            let count = number(line)?;
            if count < 0 {
                return Ok(Some((Frame::Array(None), next)));
            }
            let mut items = Vec::with_capacity(count.min(PREALLOC_ITEMS) as usize);
            let mut cursor = next;
            for _ in 0..count {
                match parse_at(buf, cursor)? {
                    Some((item, after)) => {
                        items.push(item);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }
            return Ok(Some((Frame::Array(Some(items)), cursor)));
        }
        other => {
            return Err(ClientError::protocol(format!(
                "unexpected frame type byte 0x{other:02x}"
            )));
        }
    };

    Ok(Some((frame, next)))
}

/// The line starting at `start`, without its CRLF, and the offset after it.
fn read_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(start..)?;
    let idx = rest.windows(CRLF.len()).position(|w| w == CRLF)?;
    Some((&rest[..idx], start + idx + CRLF.len()))
}

fn text(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

fn number(line: &[u8]) -> Result<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ClientError::protocol(format!("invalid integer '{}'", text(line))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &[u8]) -> Frame {
        let (frame, used) = parse(input).unwrap().expect("complete frame");
        assert_eq!(used, input.len());
        frame
    }

    #[test]
    fn encodes_bulk_array() {
        assert_eq!(
            encode_command(&["SET", "k", "hello"]),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$5\r\nhello\r\n".to_vec()
        );
    }

    #[test]
    fn parses_scalars() {
        assert_eq!(parse_all(b"+OK\r\n"), Frame::Simple("OK".into()));
        assert_eq!(
            parse_all(b"-ERR no such key\r\n"),
            Frame::Error("ERR no such key".into())
        );
        assert_eq!(parse_all(b":-12\r\n"), Frame::Integer(-12));
        assert_eq!(parse_all(b"$5\r\nhe\r\no\r\n"), Frame::Bulk(Some(b"he\r\no".to_vec())));
        assert_eq!(parse_all(b"$-1\r\n"), Frame::Bulk(None));
        assert_eq!(parse_all(b"$0\r\n\r\n"), Frame::Bulk(Some(Vec::new())));
    }

    #[test]
    fn parses_nested_arrays() {
        assert_eq!(
            parse_all(b"*2\r\n:1\r\n*1\r\n$1\r\na\r\n"),
            Frame::Array(Some(vec![
                Frame::Integer(1),
                Frame::Array(Some(vec![Frame::Bulk(Some(b"a".to_vec()))])),
            ]))
        );
        assert_eq!(parse_all(b"*-1\r\n"), Frame::Array(None));
    }

    #[test]
    fn incomplete_input_needs_more() {
        for partial in [&b""[..], b"+OK", b"$5\r\nhel", b"*2\r\n:1\r\n", b"$3\r\nabc"] {
            assert!(parse(partial).unwrap().is_none(), "{partial:?}");
        }
    }

    #[test]
    fn reports_consumed_length_for_pipelined_replies() {
        let buf = b":1\r\n+OK\r\n";
        let (first, used) = parse(buf).unwrap().unwrap();
        assert_eq!(first, Frame::Integer(1));
        let (second, _) = parse(&buf[used..]).unwrap().unwrap();
        assert_eq!(second, Frame::Simple("OK".into()));
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(parse(b"!oops\r\n"), Err(ClientError::Protocol(_))));
        assert!(matches!(parse(b":abc\r\n"), Err(ClientError::Protocol(_))));
        assert!(matches!(parse(b"$2\r\nabcd\r\n"), Err(ClientError::Protocol(_))));
    }

    #[test]
    fn hostile_lengths_are_bounded() {
        let huge = format!("${}\r\nab", i64::MAX);
        assert!(matches!(parse(huge.as_bytes()), Err(ClientError::Protocol(_))));

        let oversized = format!("${}\r\n", MAX_BULK_LEN + 1);
        assert!(matches!(parse(oversized.as_bytes()), Err(ClientError::Protocol(_))));

        // A huge count is only a promise; parsing waits for the items.
        let many = format!("*{}\r\n:1\r\n", i64::MAX);
        assert!(parse(many.as_bytes()).unwrap().is_none());
    }

    #[test]
    fn typed_accessors() {
        assert_eq!(Frame::Integer(3).into_integer().unwrap(), 3);
        assert_eq!(Frame::Simple("string".into()).into_text().unwrap(), "string");
        assert!(Frame::Simple("OK".into()).into_integer().is_err());
        assert_eq!(Frame::Bulk(None).into_optional_bytes().unwrap(), None);
    }
}

use std::io::{self, Read};

use crate::net::telnet::TelnetFilter;

pub const MAX_LINE_LEN: usize = 512;

/// Blocking line reader over a telnet stream. Lines come back without their
/// terminator and contain printable ASCII only.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    filter: TelnetFilter,
    buf: Vec<u8>,
    replies: Vec<u8>,
    max_line_len: usize,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            filter: TelnetFilter::new(),
            buf: Vec::with_capacity(256),
            replies: Vec::new(),
            max_line_len: MAX_LINE_LEN,
        }
    }

    pub fn max_line_len(mut self, max: usize) -> Self {
        self.max_line_len = max.max(1);
        self
    }

    /// Negotiation refusals collected while reading.
    pub fn take_replies(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.replies)
    }

    /// `Ok(None)` on clean EOF. An overlong line is `InvalidData`.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(end) = self.buf.iter().position(|byte| *byte == b'\n') {
                if end > self.max_line_len {
                    return Err(line_too_long());
                }
                let line: Vec<u8> = self.buf.drain(..=end).take(end).collect();
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            if self.buf.len() > self.max_line_len {
                return Err(line_too_long());
            }

            let read = match self.inner.read(&mut chunk) {
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            if read == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "eof while reading line",
                ));
            }
            let filtered = self.filter.feed(&chunk[..read]);
            self.replies.extend_from_slice(&filtered.replies);
            for byte in filtered.data {
                match byte {
                    b'\n' | b'\t' | b' '..=b'~' => self.buf.push(byte),
                    0x08 | 0x7f => {
                        if self.buf.last().map_or(false, |last| *last != b'\n') {
                            self.buf.pop();
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

fn line_too_long() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "line too long")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_crlf_and_lf_lines() {
        let mut reader = LineReader::new(Cursor::new(b"hello\r\nworld\n\n".to_vec()));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("hello"));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("world"));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some(""));
        assert_eq!(reader.read_line().unwrap(), None);
    }

    #[test]
    fn drops_non_ascii_and_applies_backspace() {
        let mut input = b"caf\xc3\xa9 ok\n".to_vec();
        input.extend_from_slice(b"lookx\x08\n");
        let mut reader = LineReader::new(Cursor::new(input));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("caf ok"));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("look"));
    }

    #[test]
    fn overlong_line_is_rejected() {
        let mut reader = LineReader::new(Cursor::new(vec![b'a'; 2048])).max_line_len(16);
        let err = reader.read_line().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn partial_line_at_eof_is_an_error() {
        let mut reader = LineReader::new(Cursor::new(b"unfinished".to_vec()));
        let err = reader.read_line().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn negotiation_replies_are_collected() {
        let mut reader = LineReader::new(Cursor::new(vec![255, 253, 1, b'h', b'i', b'\n']));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("hi"));
        assert_eq!(reader.take_replies(), vec![255, 252, 1]);
        assert!(reader.take_replies().is_empty());
    }
}

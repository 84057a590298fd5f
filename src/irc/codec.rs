//! Line codec for the IRC connection.

use std::io;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Longest line accepted from the server (IRCv3 tags included).
const MAX_LINE_LENGTH: usize = 8191;

/// Frames CRLF (or bare LF) terminated lines; invalid UTF-8 is replaced.
#[derive(Debug, Default)]
pub struct IrcCodec {
    /// Where to resume searching for a newline.
    next_index: usize,
}

fn line_from_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for IrcCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let start = self.next_index.min(src.len());
            let Some(offset) = src[start..].iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_LINE_LENGTH {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("IRC line exceeds {} bytes", MAX_LINE_LENGTH),
                    ));
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let end = start + offset;
            if end > MAX_LINE_LENGTH {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("IRC line exceeds {} bytes", MAX_LINE_LENGTH),
                ));
            }
            let raw = src.split_to(end + 1);
            self.next_index = 0;

            let line = line_from_bytes(&raw[..end]);
            if !line.is_empty() {
                return Ok(Some(line));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let raw = src.split_to(src.len());
        let line = line_from_bytes(&raw);
        Ok(Some(line).filter(|l| !l.is_empty()))
    }
}

impl Encoder<String> for IrcCodec {
    type Error = io::Error;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // a stray line break would let relayed text inject commands
        let line: String = line.chars().filter(|c| *c != '\r' && *c != '\n').collect();
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_crlf_and_lf() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::from(&b"PING :a\r\nPING :b\nPART"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :a".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :b".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b" #chat\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PART #chat".to_string()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_skips_blank_lines() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::from(&b"\r\n\r\nPING :x\r\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :x".to_string()));
    }

    #[test]
    fn test_decode_invalid_utf8_is_lossy() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::from(&b"PRIVMSG #chat :caf\xe9\r\n"[..]);
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert!(line.starts_with("PRIVMSG #chat :caf"));
        assert!(line.ends_with('\u{FFFD}'));
    }

    #[test]
    fn test_decode_rejects_overlong_line() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::from(vec![b'a'; MAX_LINE_LENGTH + 1].as_slice());
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_decode_rejects_overlong_terminated_line() {
        let mut codec = IrcCodec::default();
        let mut line = vec![b'a'; MAX_LINE_LENGTH + 1];
        line.extend_from_slice(b"\r\n");
        let mut buf = BytesMut::from(line.as_slice());
        assert!(codec.decode(&mut buf).is_err());

        // the longest allowed line still decodes
        let mut codec = IrcCodec::default();
        let mut line = vec![b'a'; MAX_LINE_LENGTH];
        line.push(b'\n');
        let mut buf = BytesMut::from(line.as_slice());
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some("a".repeat(MAX_LINE_LENGTH))
        );
    }

    #[test]
    fn test_decode_eof_flushes_partial_line() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::from(&b"ERROR :Closing link"[..]);
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap(),
            Some("ERROR :Closing link".to_string())
        );
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_encode_strips_line_breaks() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode("PRIVMSG #chat :hi\r\nQUIT".to_string(), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"PRIVMSG #chat :hiQUIT\r\n");
    }
}

//! Newline-delimited framing for Stratum messages

use crate::Error;
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Splits the byte stream into trimmed text lines and writes one line per message.
///
/// Bytes after the last newline stay buffered until more data arrives.
/// Invalid UTF-8 is replaced rather than rejected, so a garbled line only
/// fails later at JSON decoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineCodec;

impl Decoder for LineCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Error> {
        while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
            let frame = buf.split_to(pos + 1);
            let line = String::from_utf8_lossy(&frame[..pos]);
            let line = line.trim();
            if !line.is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Error> {
        match self.decode(buf)? {
            Some(line) => Ok(Some(line)),
            None => {
                // Unterminated trailing data is never dispatched.
                buf.clear();
                Ok(None)
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = Error;

    fn encode(&mut self, line: String, buf: &mut BytesMut) -> Result<(), Error> {
        buf.reserve(line.len() + 1);
        buf.put_slice(line.as_bytes());
        buf.put_u8(b'\n');
        Ok(())
    }
}

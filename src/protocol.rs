//! Length-prefixed wire framing.
//!
//! Every message, in either direction, is sent as:
//!
//! ```text
//! +----------------+---------------------+
//! | length (4B BE) | payload (length B)  |
//! +----------------+---------------------+
//! ```
//!
//! The length header is always **big-endian** (network byte order) on both
//! the write and the read path. There is no type tag, checksum or compression;
//! payload bytes are opaque. An empty payload is a valid message.
//!
//! There is no maximum message size beyond what the header can express. A
//! frame is fully buffered before it is delivered, so a peer announcing a
//! huge length can make the receiver allocate up to that much memory; bound
//! message sizes at the application level when peers are untrusted.

use crate::error::Error;
use bytes::{BufMut, Bytes, BytesMut};
use std::io::{self, Read, Write};

/// Size of the length header in bytes.
pub const HEADER_LEN: usize = 4;

/// Largest payload a frame can carry.
pub const MAX_PAYLOAD_LEN: usize = u32::MAX as usize;

// Initial allocation cap for a frame body; larger bodies grow as bytes arrive.
const READ_CHUNK: usize = 64 * 1024;

/// Build one frame: header and payload in a single buffer.
///
/// Writing both in one call keeps a small message in one TCP segment when
/// Nagle's algorithm is disabled.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, Error> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::MessageTooLarge { len: payload.len() });
    }

    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.extend_from_slice(payload);
    Ok(frame.freeze())
}

/// Decode the payload length from a header.
pub fn decode_header(header: [u8; HEADER_LEN]) -> usize {
    u32::from_be_bytes(header) as usize
}

/// Write one frame, blocking until it is fully handed to the writer.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), Error> {
    let frame = encode_frame(payload)?;
    writer.write_all(&frame)?;
    Ok(())
}

/// Read exactly `len` bytes.
///
/// Issues as many reads as needed. Returns `Ok(None)` if the stream reaches
/// end-of-file before `len` bytes arrived.
pub fn read_exactly<R: Read>(reader: &mut R, len: usize) -> io::Result<Option<Vec<u8>>> {
    let mut buf = Vec::with_capacity(len.min(READ_CHUNK));
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;

    if buf.len() < len {
        return Ok(None);
    }
    Ok(Some(buf))
}

/// Read one frame.
///
/// Returns `Ok(None)` on a clean end-of-file at a frame boundary. A stream
/// that ends in the middle of a frame is an `UnexpectedEof` error.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Bytes>, Error> {
    let Some(header) = read_exactly(reader, HEADER_LEN)? else {
        return Ok(None);
    };

    let mut raw = [0u8; HEADER_LEN];
    raw.copy_from_slice(&header);
    let len = decode_header(raw);

    match read_exactly(reader, len)? {
        Some(payload) => Ok(Some(Bytes::from(payload))),
        None => Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("stream ended inside a {len} byte frame"),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_is_big_endian() {
        let frame = encode_frame(b"hello").unwrap();
        assert_eq!(&frame[..HEADER_LEN], &[0, 0, 0, 5]);
        assert_eq!(&frame[HEADER_LEN..], b"hello");
        assert_eq!(decode_header([0, 1, 0, 0]), 65536);
    }

    #[test]
    fn test_read_consecutive_frames() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"first").unwrap();
        write_frame(&mut wire, b"").unwrap();
        write_frame(&mut wire, b"third").unwrap();

        let mut reader = Cursor::new(wire);
        assert_eq!(read_frame(&mut reader).unwrap().unwrap(), &b"first"[..]);
        assert!(read_frame(&mut reader).unwrap().unwrap().is_empty());
        assert_eq!(read_frame(&mut reader).unwrap().unwrap(), &b"third"[..]);
        assert!(read_frame(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_large_frame() {
        let payload = vec![0xABu8; 100_000];
        let mut wire = Vec::new();
        write_frame(&mut wire, &payload).unwrap();

        let mut reader = Cursor::new(wire);
        let decoded = read_frame(&mut reader).unwrap().unwrap();
        assert_eq!(decoded.len(), 100_000);
        assert!(decoded.iter().all(|b| *b == 0xAB));
    }

    #[test]
    fn test_eof_inside_header() {
        let mut reader = Cursor::new(vec![0u8, 0]);
        assert!(read_frame(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_eof_inside_payload() {
        let mut wire = encode_frame(b"truncated").unwrap().to_vec();
        wire.truncate(wire.len() - 3);

        let mut reader = Cursor::new(wire);
        match read_frame(&mut reader) {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected UnexpectedEof, got {other:?}"),
        }
    }

    #[test]
    fn test_read_exactly_across_short_reads() {
        // A reader that hands out one byte per call.
        struct Trickle(Cursor<Vec<u8>>);
        impl Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let n = buf.len().min(1);
                self.0.read(&mut buf[..n])
            }
        }

        let mut reader = Trickle(Cursor::new(b"abcdef".to_vec()));
        let chunk = read_exactly(&mut reader, 4).unwrap().unwrap();
        assert_eq!(&chunk[..], b"abcd");
        assert!(read_exactly(&mut reader, 4).unwrap().is_none());
    }
}

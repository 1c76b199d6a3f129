//! Length-prefixed framing for the control socket.
//!
//! Each frame is a big-endian `u32` byte count followed by that many bytes of
//! UTF-8 JSON.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::Event;

/// Upper bound on a single frame body.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("control connection closed before a frame arrived")]
    Closed,

    #[error("truncated frame: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },

    #[error("frame of {actual} bytes exceeds the {max} byte limit")]
    TooLarge { actual: usize, max: usize },

    #[error("control connection I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("cannot decode frame body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Reads until `buf` is full or the stream ends. Returns the number of bytes read.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Reads one complete frame body.
pub fn read_frame(reader: &mut impl Read) -> Result<Vec<u8>, FrameError> {
    let mut header = [0_u8; HEADER_LEN];
    match fill(reader, &mut header)? {
        0 => return Err(FrameError::Closed),
        HEADER_LEN => {}
        received => {
            return Err(FrameError::Truncated {
                expected: HEADER_LEN,
                received,
            })
        }
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge {
            actual: len,
            max: MAX_FRAME_BYTES,
        });
    }

    let mut body = vec![0_u8; len];
    let received = fill(reader, &mut body)?;
    if received < len {
        return Err(FrameError::Truncated {
            expected: len,
            received,
        });
    }
    Ok(body)
}

pub fn write_frame(writer: &mut impl Write, body: &[u8]) -> Result<(), FrameError> {
    if body.len() > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge {
            actual: body.len(),
            max: MAX_FRAME_BYTES,
        });
    }
    let len = body.len() as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(body)?;
    writer.flush()?;
    Ok(())
}

pub fn read_event(reader: &mut impl Read) -> Result<Event, FrameError> {
    let body = read_frame(reader)?;
    Ok(Event::from_json(&body)?)
}

pub fn write_event(writer: &mut impl Write, event: &Event) -> Result<(), FrameError> {
    let body = event.to_json()?;
    write_frame(writer, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out at most `chunk` bytes per read call.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        chunk: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let limit = buf.len().min(self.chunk);
            self.data.read(&mut buf[..limit])
        }
    }

    #[test]
    fn short_reads_are_reassembled() {
        let mut wire = Vec::new();
        write_event(&mut wire, &Event::FailedToPrepare("disk full".into())).unwrap();

        let mut reader = Trickle {
            data: Cursor::new(wire),
            chunk: 1,
        };
        let event = read_event(&mut reader).unwrap();
        assert_eq!(event, Event::FailedToPrepare("disk full".into()));
    }

    #[test]
    fn empty_stream_reports_closed() {
        let mut reader = Cursor::new(Vec::new());
        assert!(matches!(read_frame(&mut reader), Err(FrameError::Closed)));
    }

    #[test]
    fn partial_header_is_truncated() {
        let mut reader = Cursor::new(vec![0_u8, 0]);
        assert!(matches!(
            read_frame(&mut reader),
            Err(FrameError::Truncated {
                expected: 4,
                received: 2
            })
        ));
    }

    #[test]
    fn oversized_length_is_rejected_before_allocating() {
        let mut reader = Cursor::new(u32::MAX.to_be_bytes().to_vec());
        assert!(matches!(
            read_frame(&mut reader),
            Err(FrameError::TooLarge { .. })
        ));
    }

    #[test]
    fn garbage_body_fails_to_decode() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"not json").unwrap();
        let mut reader = Cursor::new(wire);
        assert!(matches!(read_event(&mut reader), Err(FrameError::Decode(_))));
    }
}

//! Length-prefixed framing.
//!
//! Every message on the wire is `[u32 little-endian length][payload]`, where the
//! payload is a protobuf encoded [`Greeting`] or [`Command`]. The codec knows
//! nothing about what the messages mean.
use std::io::{Read, Write};

use log::trace;
use prost::Message;

use super::{Command, Greeting, transport::TransportError};

pub const LENGTH_PREFIX_SIZE: usize = size_of::<u32>();

/// Largest inbound payload accepted unless configured otherwise (64 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

const INITIAL_CAPACITY: usize = 8 * 1024;

/// Read buffers grown past this are shrunk back before the next frame.
const RETAINED_CAPACITY: usize = 1024 * 1024;

mod sealed {
    pub trait Sealed {}
}

/// Messages the codec is able to frame. Only [`Greeting`] and [`Command`] qualify.
pub trait WireMessage: Message + Default + sealed::Sealed {
    const NAME: &'static str;
}

impl sealed::Sealed for Greeting {}
impl WireMessage for Greeting {
    const NAME: &'static str = "greeting";
}

impl sealed::Sealed for Command {}
impl WireMessage for Command {
    const NAME: &'static str = "command";
}

/// Encodes `message` into a complete frame, prefix included.
pub fn encode<M: WireMessage>(message: &M) -> Result<Vec<u8>, TransportError> {
    let len = message.encoded_len();
    let prefix = u32::try_from(len).map_err(|_| TransportError::FrameTooLarge {
        size: len as u64,
        limit: u64::from(u32::MAX),
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + len);
    frame.extend_from_slice(&prefix.to_le_bytes());
    message.encode(&mut frame)?;
    Ok(frame)
}

/// Writes `message` as one frame with a single `write_all`.
pub fn write_message<M, W>(writer: &mut W, message: &M) -> Result<(), TransportError>
where
    M: WireMessage,
    W: Write + ?Sized,
{
    let frame = encode(message)?;
    trace!("sending {} frame of {} bytes", M::NAME, frame.len());
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Reads frames into one buffer that is reused for the lifetime of a connection.
///
/// A payload returned by [`FrameReader::read_frame`] borrows the reader, so it
/// cannot outlive the next read.
#[derive(Debug)]
pub struct FrameReader {
    buffer: Vec<u8>,
    max_frame_size: u32,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameReader {
    pub fn new(max_frame_size: u32) -> Self {
        Self {
            buffer: Vec::with_capacity(INITIAL_CAPACITY),
            max_frame_size,
        }
    }

    /// Reads exactly one frame and returns its payload.
    ///
    /// Short reads surface as [`TransportError::Io`]; the stream is not usable
    /// afterwards since the frame boundary is lost.
    pub fn read_frame<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
    ) -> Result<&[u8], TransportError> {
        self.reset();

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        reader.read_exact(&mut prefix)?;
        let len = u32::from_le_bytes(prefix);
        if len > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: u64::from(len),
                limit: u64::from(self.max_frame_size),
            });
        }

        self.buffer.resize(len as usize, 0);
        reader.read_exact(&mut self.buffer)?;
        trace!("received frame of {len} bytes");
        Ok(&self.buffer)
    }

    pub fn read_message<M, R>(&mut self, reader: &mut R) -> Result<M, TransportError>
    where
        M: WireMessage,
        R: Read + ?Sized,
    {
        let payload = self.read_frame(reader)?;
        Ok(M::decode(payload)?)
    }

    /// Drops whatever the last frame left in the buffer and gives back memory a
    /// large frame made it grow to.
    pub fn reset(&mut self) {
        self.buffer.clear();
        if self.buffer.capacity() > RETAINED_CAPACITY {
            trace!("shrinking read buffer from {} bytes", self.buffer.capacity());
            self.buffer.shrink_to(INITIAL_CAPACITY);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use super::*;
    use crate::protocol::{CommandType, FieldValue, Point, Series};

    #[test]
    fn prefix_is_little_endian_payload_length() {
        let greeting = Greeting::startup("influx-rs", "root", "debug");
        let payload = greeting.encode_to_vec();
        let frame = encode(&greeting).unwrap();

        let len = u32::from_le_bytes(frame[..4].try_into().unwrap());
        assert_eq!(len as usize, payload.len());
        assert_eq!(&frame[4..], payload.as_slice());
    }

    #[test]
    fn empty_message_has_zero_length_frame() {
        let frame = encode(&Command::default()).unwrap();
        assert_eq!(frame, vec![0, 0, 0, 0]);
    }

    #[test]
    fn greeting_frame_round_trip() {
        let greeting = Greeting::authentication("secret");
        let mut stream = Cursor::new(Vec::new());
        write_message(&mut stream, &greeting).unwrap();
        stream.set_position(0);

        let mut reader = FrameReader::default();
        let payload = reader.read_frame(&mut stream).unwrap();
        assert_eq!(payload, greeting.encode_to_vec().as_slice());
    }

    #[test]
    fn command_frame_round_trip() {
        let command = Command::write_series(vec![
            Series::new("cpu", ["value"]).with_point(Point::new(vec![FieldValue::from(0.5)])),
        ]);
        let bytes = encode(&command).unwrap();

        let mut reader = FrameReader::default();
        let decoded: Command = reader.read_message(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded, command);
        assert_eq!(decoded.kind(), Some(CommandType::WriteSeries));
    }

    #[test]
    fn payload_split_across_many_reads() {
        // Yields one byte per read call.
        struct Trickle<'a>(&'a [u8]);
        impl Read for Trickle<'_> {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0.is_empty() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0[0];
                self.0 = &self.0[1..];
                Ok(1)
            }
        }

        let command = Command::databases(
            CommandType::ListDatabase,
            vec!["a".into(), "b".into(), "c".into()],
        );
        let bytes = encode(&command).unwrap();

        let mut reader = FrameReader::default();
        let decoded: Command = reader.read_message(&mut Trickle(&bytes)).unwrap();
        assert_eq!(decoded.database_names(), ["a", "b", "c"]);
    }

    #[test]
    fn consecutive_frames_reuse_buffer() {
        let mut bytes = encode(&Greeting::authentication_ok()).unwrap();
        bytes.extend(encode(&Greeting::command_ready()).unwrap());
        let mut stream = bytes.as_slice();

        let mut reader = FrameReader::default();
        let first: Greeting = reader.read_message(&mut stream).unwrap();
        let second: Greeting = reader.read_message(&mut stream).unwrap();

        assert_eq!(first, Greeting::authentication_ok());
        assert_eq!(second, Greeting::command_ready());
        assert!(stream.is_empty());
    }

    #[test]
    fn short_payload_is_transport_error() {
        let mut bytes = encode(&Greeting::startup("a", "b", "c")).unwrap();
        bytes.truncate(bytes.len() - 2);

        let mut reader = FrameReader::default();
        let err = reader.read_frame(&mut bytes.as_slice()).unwrap_err();
        match err {
            TransportError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn large_frame_does_not_pin_buffer() {
        let big = Command::query(&"x".repeat(2 * RETAINED_CAPACITY));
        let mut bytes = encode(&big).unwrap();
        bytes.extend(encode(&Greeting::command_ready()).unwrap());
        let mut stream = bytes.as_slice();

        let mut reader = FrameReader::default();
        let first: Command = reader.read_message(&mut stream).unwrap();
        assert_eq!(first, big);
        assert!(reader.buffer.capacity() > RETAINED_CAPACITY);

        let second: Greeting = reader.read_message(&mut stream).unwrap();
        assert_eq!(second, Greeting::command_ready());
        assert!(reader.buffer.capacity() <= RETAINED_CAPACITY);
    }

    #[test]
    fn encoded_frame_is_sized_exactly() {
        let command = Command::databases(CommandType::ListDatabase, vec!["debug".into()]);
        let frame = encode(&command).unwrap();
        assert_eq!(frame.len(), LENGTH_PREFIX_SIZE + command.encoded_len());
        assert_eq!(frame.capacity(), frame.len());
    }

    #[test]
    fn short_prefix_is_transport_error() {
        let mut reader = FrameReader::default();
        let res = reader.read_frame(&mut &[1u8, 0][..]);
        assert!(matches!(res, Err(TransportError::Io(_))));
    }

    #[test]
    fn oversized_frame_is_rejected_before_reading_payload() {
        let mut reader = FrameReader::new(16);
        let mut bytes = 17u32.to_le_bytes().to_vec();
        bytes.extend([0u8; 17]);

        let res = reader.read_frame(&mut bytes.as_slice());
        assert!(matches!(
            res,
            Err(TransportError::FrameTooLarge { size: 17, limit: 16 })
        ));
    }

    #[test]
    fn garbage_payload_is_decode_error() {
        let bytes = [2u8, 0, 0, 0, 0xff, 0xff];
        let mut reader = FrameReader::default();

        let res: Result<Greeting, _> = reader.read_message(&mut &bytes[..]);
        assert!(matches!(res, Err(TransportError::Decode(_))));
    }
}

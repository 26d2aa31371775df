//! In-memory transports for exercising the handshake and session without sockets.
use std::{
    io::{self, Cursor, Read, Write},
    sync::{Arc, Mutex},
};

use super::{Transport, frame};

impl Transport for Cursor<Vec<u8>> {}

/// Replays pre-recorded server bytes and records everything the client writes.
pub(crate) struct ScriptedStream {
    incoming: Cursor<Vec<u8>>,
    outgoing: Arc<Mutex<Vec<u8>>>,
    reads: Arc<Mutex<usize>>,
}

/// Shared view of what a [`ScriptedStream`] saw, usable after the stream moved.
#[derive(Clone)]
pub(crate) struct Recorder {
    outgoing: Arc<Mutex<Vec<u8>>>,
    reads: Arc<Mutex<usize>>,
}

impl ScriptedStream {
    pub(crate) fn new(incoming: Vec<u8>) -> (Self, Recorder) {
        let outgoing = Arc::new(Mutex::new(Vec::new()));
        let reads = Arc::new(Mutex::new(0));
        let recorder = Recorder {
            outgoing: Arc::clone(&outgoing),
            reads: Arc::clone(&reads),
        };

        (
            Self {
                incoming: Cursor::new(incoming),
                outgoing,
                reads,
            },
            recorder,
        )
    }
}

impl Recorder {
    pub(crate) fn written(&self) -> Vec<u8> {
        self.outgoing.lock().unwrap().clone()
    }

    /// Number of complete frames handed to the client so far.
    pub(crate) fn frames_read(&self) -> usize {
        *self.reads.lock().unwrap()
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.incoming.read(buf)?;
        // Frame bodies are read with a single read_exact right after the prefix;
        // counting reads that finish on a frame boundary counts frames.
        if n > 0 && frame_boundary(self.incoming.get_ref(), self.incoming.position()) {
            *self.reads.lock().unwrap() += 1;
        }
        Ok(n)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outgoing.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for ScriptedStream {}

fn frame_boundary(data: &[u8], position: u64) -> bool {
    let mut offset = 0usize;
    while offset + 4 <= data.len() {
        let len = u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;
        offset += 4 + len;
        if offset as u64 == position {
            return true;
        }
        if offset as u64 > position {
            return false;
        }
    }
    false
}

/// Toy "encryption" standing in for TLS: every byte is XOR-ed in both directions.
pub(crate) struct XorStream<T> {
    pub(crate) inner: T,
}

pub(crate) const XOR_KEY: u8 = 0x5a;

impl<T: Read> Read for XorStream<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        buf[..n].iter_mut().for_each(|b| *b ^= XOR_KEY);
        Ok(n)
    }
}

impl<T: Write> Write for XorStream<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let masked: Vec<u8> = buf.iter().map(|b| b ^ XOR_KEY).collect();
        self.inner.write_all(&masked)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<T: Read + Write + Send> Transport for XorStream<T> {}

pub(crate) fn xor(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().map(|b| b ^ XOR_KEY).collect()
}

/// Concatenates the frames of `messages` as a server would send them.
pub(crate) fn frames<M: frame::WireMessage>(messages: &[M]) -> Vec<u8> {
    messages
        .iter()
        .flat_map(|m| frame::encode(m).unwrap())
        .collect()
}

/// Splits a byte log back into decoded messages of one type.
pub(crate) fn decode_all<M: frame::WireMessage>(mut bytes: &[u8]) -> Vec<M> {
    let mut reader = frame::FrameReader::default();
    let mut out = Vec::new();
    while !bytes.is_empty() {
        out.push(reader.read_message(&mut bytes).unwrap());
    }
    out
}

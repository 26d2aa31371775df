use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
};

use log::{debug, trace};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to decode message: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("failed to encode message: {0}")]
    Encode(#[from] prost::EncodeError),
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: u64, limit: u64 },
    #[error("transport already released")]
    Closed,
}

/// Byte stream a connection runs over.
///
/// Implemented for plain sockets and for the TLS stream that replaces them after an
/// upgrade. `shutdown` is called once when the connection is closed.
pub trait Transport: Read + Write + Send {
    fn shutdown(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl Transport for TcpStream {
    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

#[cfg(unix)]
impl Transport for std::os::unix::net::UnixStream {
    fn shutdown(&mut self) -> io::Result<()> {
        std::os::unix::net::UnixStream::shutdown(self, Shutdown::Both)
    }
}

/// Owner of the connection's byte stream.
///
/// The stream can be swapped exactly in place (plain to TLS) with
/// [`TransportHandle::replace_with`]; the previous stream is moved into the
/// replacement, so nothing can reach it afterwards.
pub struct TransportHandle {
    stream: Option<Box<dyn Transport>>,
}

impl TransportHandle {
    pub fn new<T: Transport + 'static>(stream: T) -> Self {
        Self {
            stream: Some(Box::new(stream)),
        }
    }

    pub fn stream(&mut self) -> Result<&mut (dyn Transport + 'static), TransportError> {
        self.stream.as_deref_mut().ok_or(TransportError::Closed)
    }

    /// Hands the current stream to `upgrade` and installs whatever it returns.
    ///
    /// On failure the old stream is gone as well and the handle stays released.
    pub fn replace_with<F, E>(&mut self, upgrade: F) -> Result<(), E>
    where
        F: FnOnce(Box<dyn Transport>) -> Result<Box<dyn Transport>, E>,
        E: From<TransportError>,
    {
        let current = self.stream.take().ok_or(TransportError::Closed)?;
        self.stream = Some(upgrade(current)?);
        debug!("transport replaced");
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.stream.is_none()
    }

    pub fn release(&mut self) -> Result<(), TransportError> {
        match self.stream.take() {
            Some(mut stream) => {
                trace!("releasing transport");
                stream.shutdown()?;
                Ok(())
            }
            None => Err(TransportError::Closed),
        }
    }
}

//! Command session.
//!
//! A [`Connection`] is only handed out once the handshake has finished, so every
//! method here can assume the server is ready for [`Command`] frames. Each call
//! sends exactly one request frame and reads its response(s) before returning;
//! nothing is pipelined and nothing is retried.
use std::net::TcpStream;

use log::{debug, info, trace, warn};

use crate::{
    config::{ClientConfig, Target},
    error::{ClientError, SeriesError},
    protocol::{
        Command, CommandType, FrameReader, HandshakeObserver, HandshakeParams, LogObserver,
        RustlsUpgrader, Series, TlsUpgrade, Transport, TransportHandle, frame, handshake,
    },
};

/// An authenticated session with the server.
///
/// All operations take `&mut self`: a connection serves one caller at a time.
pub struct Connection {
    transport: TransportHandle,
    frames: FrameReader,
    target: Target,
    database: String,
}

impl Connection {
    /// Opens the configured socket and runs the handshake over it.
    pub fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        info!("connecting to {}", config.target);
        let upgrader = RustlsUpgrader::new(config.tls.clone(), config.server_name());

        match &config.target {
            Target::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))?;
                stream.set_nodelay(true)?;
                stream.set_read_timeout(config.read_timeout)?;
                stream.set_write_timeout(config.write_timeout)?;
                Self::establish(stream, config, &upgrader, &mut LogObserver)
            }
            #[cfg(unix)]
            Target::Unix(path) => {
                let stream = std::os::unix::net::UnixStream::connect(path)?;
                stream.set_read_timeout(config.read_timeout)?;
                stream.set_write_timeout(config.write_timeout)?;
                Self::establish(stream, config, &upgrader, &mut LogObserver)
            }
            #[cfg(not(unix))]
            Target::Unix(_) => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "unix domain sockets are not available on this platform",
            )
            .into()),
        }
    }

    /// Runs the handshake over an already connected stream.
    pub fn establish<T, U>(
        stream: T,
        config: &ClientConfig,
        upgrader: &U,
        observer: &mut dyn HandshakeObserver,
    ) -> Result<Self, ClientError>
    where
        T: Transport + 'static,
        U: TlsUpgrade + ?Sized,
    {
        let mut transport = TransportHandle::new(stream);
        let mut frames = FrameReader::new(config.max_frame_size);
        let params = HandshakeParams {
            agent: &config.agent,
            user: &config.credentials.user,
            password: &config.credentials.password,
            database: &config.credentials.database,
        };

        handshake::perform(&mut transport, &mut frames, &params, upgrader, observer)?;

        Ok(Self {
            transport,
            frames,
            target: config.target.clone(),
            database: config.credentials.database.clone(),
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Database selected during the handshake.
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn list_databases(&mut self) -> Result<Vec<String>, ClientError> {
        let response = self.round_trip(&Command::request(CommandType::ListDatabase))?;
        Ok(response
            .database
            .map(|databases| databases.name)
            .unwrap_or_default())
    }

    /// `true` once the server answered.
    pub fn ping(&mut self) -> Result<bool, ClientError> {
        self.round_trip(&Command::request(CommandType::Ping))?;
        Ok(true)
    }

    pub fn create_database(&mut self, name: &str) -> Result<(), ClientError> {
        self.round_trip(&Command::database(CommandType::CreateDatabase, name))?;
        Ok(())
    }

    pub fn drop_database(&mut self, name: &str) -> Result<(), ClientError> {
        self.round_trip(&Command::database(CommandType::DropDatabase, name))?;
        Ok(())
    }

    /// Validates `series` and writes it. Nothing is sent if validation fails.
    pub fn write_series(&mut self, series: Vec<Series>) -> Result<(), ClientError> {
        validate_series(&series)?;

        let points: usize = series.iter().map(|s| s.points.len()).sum();
        debug!("writing {} series, {points} points", series.len());
        self.round_trip(&Command::write_series(series))?;
        Ok(())
    }

    /// Sends `text` and returns the stream of response frames.
    ///
    /// The iterator ends after the frame whose `continue` flag is unset. Dropping
    /// it early reads and discards the rest of the responses, so the next command
    /// on this connection sees its own reply.
    pub fn query(&mut self, text: &str) -> Result<QueryResponses<'_>, ClientError> {
        debug!("query: {text}");
        self.send(&Command::query(text))?;
        Ok(QueryResponses {
            conn: self,
            done: false,
        })
    }

    /// Sends CLOSE and releases the transport. Failures are logged, never returned:
    /// the peer may already be gone.
    pub fn close(mut self) {
        if let Err(e) = self.send(&Command::request(CommandType::Close)) {
            warn!("close request not delivered: {e}");
        }
        if let Err(e) = self.transport.release() {
            warn!("failed to shut down transport: {e}");
        }
        info!("connection to {} closed", self.target);
    }

    fn send(&mut self, request: &Command) -> Result<(), ClientError> {
        trace!("request: {request:?}");
        frame::write_message(self.transport.stream()?, request)?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Command, ClientError> {
        let response: Command = self.frames.read_message(self.transport.stream()?)?;
        trace!("response: {response:?}");
        Ok(response)
    }

    fn round_trip(&mut self, request: &Command) -> Result<Command, ClientError> {
        self.send(request)?;
        self.receive()
    }
}

/// Response frames of a query, ending with the first one that has `continue`
/// unset. Stops after the first error.
pub struct QueryResponses<'a> {
    conn: &'a mut Connection,
    done: bool,
}

impl Iterator for QueryResponses<'_> {
    type Item = Result<Command, ClientError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let res = self.conn.receive();
        self.done = match &res {
            Ok(response) => !response.has_more(),
            Err(_) => true,
        };
        Some(res)
    }
}

impl Drop for QueryResponses<'_> {
    fn drop(&mut self) {
        let mut skipped = 0usize;
        while !self.done {
            match self.conn.receive() {
                Ok(response) => {
                    skipped += 1;
                    self.done = !response.has_more();
                }
                Err(e) => {
                    warn!("failed to drain unread query responses: {e}");
                    self.done = true;
                }
            }
        }
        if skipped > 0 {
            debug!("discarded {skipped} unread query responses");
        }
    }
}

/// Checks the write invariants: at least one series, each with at least one field
/// and one point, and every point carrying one value per field.
pub fn validate_series(series: &[Series]) -> Result<(), SeriesError> {
    if series.is_empty() {
        return Err(SeriesError::EmptySeriesList);
    }

    for s in series {
        let expected = s.fields.len();
        if expected == 0 {
            return Err(SeriesError::EmptyFieldList {
                series: s.series_name().to_string(),
            });
        }
        if s.points.is_empty() {
            return Err(SeriesError::EmptyPointList {
                series: s.series_name().to_string(),
            });
        }

        for (index, point) in s.points.iter().enumerate() {
            let actual = point.values.len();
            if actual != expected {
                return Err(SeriesError::FieldCountMismatch {
                    series: s.series_name().to_string(),
                    index,
                    expected,
                    actual,
                });
            }
        }
    }

    Ok(())
}

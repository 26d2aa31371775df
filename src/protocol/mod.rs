//! Client side of the server's binary wire protocol.
//!
//! This module holds everything needed to talk to the server below the level of
//! individual database commands: the message definitions, the framing codec, the
//! transport abstraction and the connection handshake.
//!
//! # Overview
//!
//! A connection goes through two phases. First the [`handshake`] exchanges
//! [`Greeting`] messages to announce the client, optionally upgrade the stream to
//! TLS and authenticate. Once the server reports `COMMAND_READY`, only [`Command`]
//! messages are exchanged, one request frame followed by one or more response
//! frames.
//!
//! # Key Components
//!
//! - [`frame`]: Length-prefixed codec shared by both phases.
//! - [`TransportHandle`]: Owner of the byte stream; swapped in place on TLS upgrade.
//! - [`handshake`]: State machine driving the greeting exchange.
//! - [`TlsUpgrade`]: Seam for wrapping the stream in TLS, implemented by
//!   [`RustlsUpgrader`].
//!
//! # Binary Format
//!
//! - Each frame is a `u32` little-endian payload length followed by the payload.
//! - Payloads are proto2 protobuf messages; see [`message`].
//! - There is no version negotiation beyond the greeting exchange itself.
//!
//! # See Also
//!
//! - [`Connection`](crate::Connection): Command session built on top of this module.
pub mod frame;
pub mod handshake;
pub mod message;
pub mod tls;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use frame::{DEFAULT_MAX_FRAME_SIZE, FrameReader, WireMessage};
pub use handshake::{
    HandshakeError, HandshakeEvent, HandshakeObserver, HandshakeParams, HandshakeState,
    LogObserver,
};
pub use message::{
    AuthMethod, Command, CommandType, CompressType, FieldValue, Greeting, GreetingType, Point,
    Series, SslMode,
};
pub use tls::{RustlsUpgrader, TlsError, TlsUpgrade};
pub use transport::{Transport, TransportError, TransportHandle};

use thiserror::Error;

use crate::protocol::{HandshakeError, TransportError};

/// Request-shape violations caught before a series write touches the wire.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SeriesError {
    #[error("at least 1 series required")]
    EmptySeriesList,

    #[error("series '{series}' requires at least 1 field")]
    EmptyFieldList { series: String },

    #[error("series '{series}' requires at least 1 point")]
    EmptyPointList { series: String },

    #[error(
        "series '{series}' declares {expected} fields but point {index} carries {actual} values"
    )]
    FieldCountMismatch {
        series: String,
        index: usize,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("invalid series: {0}")]
    Series(#[from] SeriesError),
}

impl From<std::io::Error> for ClientError {
    fn from(value: std::io::Error) -> Self {
        ClientError::Transport(value.into())
    }
}

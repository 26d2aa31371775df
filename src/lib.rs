pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;

pub use cli::{CommandError, ShellCommand, prompt};
pub use client::{Connection, QueryResponses, validate_series};
pub use config::{
    CertificateVerification, ClientConfig, ClientIdentity, Credentials, Target, TlsConfig,
};
pub use error::{ClientError, SeriesError};
pub use protocol::{Command, CommandType, FieldValue, Point, Series};

//! Connection settings.
//!
//! A [`ClientConfig`] names where to connect, who to authenticate as and how the
//! transport should behave. Everything except the target and credentials has a
//! default, adjustable through the `with_*` builders.
use std::{fmt, path::PathBuf, time::Duration};

use crate::protocol::DEFAULT_MAX_FRAME_SIZE;

/// Agent string announced in the startup greeting.
pub const DEFAULT_AGENT: &str = concat!("influx-wire/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_CERT_PATH: &str = "certs/client.pem";
pub const DEFAULT_KEY_PATH: &str = "certs/client.key";

/// Where the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl Target {
    /// Host name presented during a TLS upgrade when none is configured.
    pub fn default_server_name(&self) -> &str {
        match self {
            Target::Tcp { host, .. } => host,
            Target::Unix(_) => "localhost",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Tcp { host, port } => write!(f, "{host}:{port}"),
            Target::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Credentials {
    pub fn new(user: &str, password: &str, database: &str) -> Self {
        Self {
            user: user.to_string(),
            password: password.to_string(),
            database: database.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// How the server certificate is checked during a TLS upgrade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CertificateVerification {
    /// Chain and host name are verified against the configured CA file, or the
    /// bundled web PKI roots when none is given.
    #[default]
    Strict,
    /// Any server certificate is accepted. Handshake signatures are still checked,
    /// but the peer is not authenticated.
    SkipVerification,
}

/// Client certificate and key presented to the server, both PEM encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            cert: PathBuf::from(DEFAULT_CERT_PATH),
            key: PathBuf::from(DEFAULT_KEY_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub identity: Option<ClientIdentity>,
    pub verification: CertificateVerification,
    pub ca_file: Option<PathBuf>,
    pub server_name: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            identity: Some(ClientIdentity::default()),
            verification: CertificateVerification::Strict,
            ca_file: None,
            server_name: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub target: Target,
    pub credentials: Credentials,
    pub agent: String,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub max_frame_size: u32,
    pub tls: TlsConfig,
}

impl ClientConfig {
    pub fn new(target: Target, credentials: Credentials) -> Self {
        Self {
            target,
            credentials,
            agent: DEFAULT_AGENT.to_string(),
            read_timeout: None,
            write_timeout: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            tls: TlsConfig::default(),
        }
    }

    pub fn tcp(host: &str, port: u16, credentials: Credentials) -> Self {
        Self::new(
            Target::Tcp {
                host: host.to_string(),
                port,
            },
            credentials,
        )
    }

    pub fn unix(path: impl Into<PathBuf>, credentials: Credentials) -> Self {
        Self::new(Target::Unix(path.into()), credentials)
    }

    pub fn with_agent(mut self, agent: &str) -> Self {
        self.agent = agent.to_string();
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_max_frame_size(mut self, size: u32) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn server_name(&self) -> &str {
        self.tls
            .server_name
            .as_deref()
            .unwrap_or_else(|| self.target.default_server_name())
    }
}

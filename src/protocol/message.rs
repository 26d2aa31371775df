//! Protobuf messages exchanged with the server.
//!
//! Two top-level messages travel over the wire: [`Greeting`] during the handshake
//! and [`Command`] afterwards. Both are proto2 messages, so every scalar is
//! optional on the wire and modelled as an `Option` here.
//!
//! Enumerated fields are stored as raw `i32` values, the way `prost` represents
//! them; use the typed accessors ([`Greeting::kind`], [`Command::kind`], ...) to
//! read them back. Unknown values read back as `None`.
use std::fmt;

use prost::{Enumeration, Message};

/// Kind of a handshake message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum GreetingType {
    StartupMessage = 0,
    StartupResponse = 1,
    SslUpgrade = 2,
    Authentication = 3,
    AuthenticationOk = 4,
    MessageOption = 5,
    CommandReady = 6,
}

/// Authentication scheme offered by the server in its startup response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum AuthMethod {
    CleartextPassword = 0,
    Md5Password = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum CompressType {
    Plain = 0,
    Snappy = 1,
}

/// Whether the server insists on an in-band TLS upgrade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum SslMode {
    None = 0,
    Required = 1,
}

/// Kind of a post-handshake request or response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum CommandType {
    ListDatabase = 0,
    WriteSeries = 1,
    Query = 2,
    Close = 3,
    Ping = 4,
    CreateDatabase = 5,
    DropDatabase = 6,
}

/// Handshake-phase message.
#[derive(Clone, PartialEq, Message)]
pub struct Greeting {
    #[prost(enumeration = "GreetingType", optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub agent: Option<Vec<u8>>,
    #[prost(message, optional, tag = "3")]
    pub authentication: Option<Authentication>,
    #[prost(message, optional, tag = "4")]
    pub config: Option<Configuration>,
}

#[derive(Clone, PartialEq, Message)]
#[prost(skip_debug)]
pub struct Authentication {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub name: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub password: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub database: Option<Vec<u8>>,
    #[prost(enumeration = "AuthMethod", optional, tag = "4")]
    pub method: Option<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Configuration {
    #[prost(enumeration = "CompressType", optional, tag = "1")]
    pub compress_type: Option<i32>,
    #[prost(enumeration = "SslMode", optional, tag = "2")]
    pub ssl: Option<i32>,
}

/// Post-handshake request or response.
#[derive(Clone, PartialEq, Message)]
pub struct Command {
    #[prost(enumeration = "CommandType", optional, tag = "1")]
    pub r#type: Option<i32>,
    /// Set on query responses; `false` marks the last frame of a result.
    #[prost(bool, optional, tag = "2")]
    pub r#continue: Option<bool>,
    #[prost(message, optional, tag = "3")]
    pub query: Option<QueryText>,
    #[prost(message, optional, tag = "4")]
    pub database: Option<Databases>,
    #[prost(message, optional, tag = "5")]
    pub series: Option<SeriesList>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryText {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub query: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Databases {
    #[prost(string, repeated, tag = "1")]
    pub name: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SeriesList {
    #[prost(message, repeated, tag = "1")]
    pub series: Vec<Series>,
}

/// Named time series: a header of field names and rows of values.
#[derive(Clone, PartialEq, Message)]
pub struct Series {
    #[prost(message, repeated, tag = "1")]
    pub points: Vec<Point>,
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    #[prost(string, repeated, tag = "3")]
    pub fields: Vec<String>,
}

/// One row of a [`Series`]; `values[i]` belongs to `fields[i]`.
#[derive(Clone, PartialEq, Message)]
pub struct Point {
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<FieldValue>,
    #[prost(int64, optional, tag = "2")]
    pub timestamp: Option<i64>,
    #[prost(uint64, optional, tag = "3")]
    pub sequence_number: Option<u64>,
}

/// A single column value. Exactly one member is expected to be set.
#[derive(Clone, PartialEq, Message)]
pub struct FieldValue {
    #[prost(string, optional, tag = "1")]
    pub string_value: Option<String>,
    #[prost(double, optional, tag = "3")]
    pub double_value: Option<f64>,
    #[prost(bool, optional, tag = "4")]
    pub bool_value: Option<bool>,
    #[prost(int64, optional, tag = "5")]
    pub int64_value: Option<i64>,
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = |bytes: &Option<Vec<u8>>| {
            bytes
                .as_deref()
                .map(|b| String::from_utf8_lossy(b).into_owned())
        };

        f.debug_struct("Authentication")
            .field("name", &text(&self.name))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &text(&self.database))
            .field("method", &self.auth_method())
            .finish()
    }
}

impl Greeting {
    fn of_type(kind: GreetingType) -> Self {
        Self {
            r#type: Some(kind as i32),
            ..Default::default()
        }
    }

    /// First message of every handshake.
    pub fn startup(agent: &str, user: &str, database: &str) -> Self {
        Self {
            agent: Some(agent.as_bytes().to_vec()),
            authentication: Some(Authentication {
                name: Some(user.as_bytes().to_vec()),
                database: Some(database.as_bytes().to_vec()),
                ..Default::default()
            }),
            config: Some(Configuration {
                compress_type: Some(CompressType::Plain as i32),
                ssl: None,
            }),
            ..Self::of_type(GreetingType::StartupMessage)
        }
    }

    pub fn startup_response(ssl: SslMode, method: AuthMethod) -> Self {
        Self {
            authentication: Some(Authentication {
                method: Some(method as i32),
                ..Default::default()
            }),
            config: Some(Configuration {
                compress_type: Some(CompressType::Plain as i32),
                ssl: Some(ssl as i32),
            }),
            ..Self::of_type(GreetingType::StartupResponse)
        }
    }

    pub fn ssl_upgrade() -> Self {
        Self::of_type(GreetingType::SslUpgrade)
    }

    pub fn authentication(password: &str) -> Self {
        Self {
            authentication: Some(Authentication {
                password: Some(password.as_bytes().to_vec()),
                ..Default::default()
            }),
            ..Self::of_type(GreetingType::Authentication)
        }
    }

    pub fn authentication_ok() -> Self {
        Self::of_type(GreetingType::AuthenticationOk)
    }

    pub fn message_option() -> Self {
        Self::of_type(GreetingType::MessageOption)
    }

    pub fn command_ready() -> Self {
        Self::of_type(GreetingType::CommandReady)
    }

    pub fn kind(&self) -> Option<GreetingType> {
        self.r#type.and_then(|v| GreetingType::try_from(v).ok())
    }

    pub fn requires_ssl(&self) -> bool {
        self.config
            .as_ref()
            .and_then(|c| c.ssl)
            .is_some_and(|v| v == SslMode::Required as i32)
    }
}

impl Authentication {
    /// `None` when the field is absent, `Some(Err(raw))` for values this client
    /// does not know.
    pub fn auth_method(&self) -> Option<Result<AuthMethod, i32>> {
        self.method
            .map(|raw| AuthMethod::try_from(raw).map_err(|_| raw))
    }
}

impl Command {
    pub fn request(kind: CommandType) -> Self {
        Self {
            r#type: Some(kind as i32),
            ..Default::default()
        }
    }

    pub fn query(text: &str) -> Self {
        Self {
            query: Some(QueryText {
                query: Some(text.as_bytes().to_vec()),
            }),
            ..Self::request(CommandType::Query)
        }
    }

    /// CREATEDATABASE / DROPDATABASE style request naming a single database.
    pub fn database(kind: CommandType, name: &str) -> Self {
        Self::databases(kind, vec![name.to_string()])
    }

    pub fn databases(kind: CommandType, names: Vec<String>) -> Self {
        Self {
            database: Some(Databases { name: names }),
            ..Self::request(kind)
        }
    }

    pub fn write_series(series: Vec<Series>) -> Self {
        Self {
            series: Some(SeriesList { series }),
            ..Self::request(CommandType::WriteSeries)
        }
    }

    /// Builds a response frame; `more` is the `continue` flag.
    pub fn response(kind: CommandType, more: bool) -> Self {
        Self {
            r#continue: Some(more),
            ..Self::request(kind)
        }
    }

    pub fn kind(&self) -> Option<CommandType> {
        self.r#type.and_then(|v| CommandType::try_from(v).ok())
    }

    /// `true` when another response frame follows this one.
    pub fn has_more(&self) -> bool {
        self.r#continue.unwrap_or(false)
    }

    pub fn database_names(&self) -> &[String] {
        self.database
            .as_ref()
            .map(|d| d.name.as_slice())
            .unwrap_or_default()
    }

    pub fn query_text(&self) -> Option<String> {
        self.query
            .as_ref()
            .and_then(|q| q.query.as_deref())
            .map(|q| String::from_utf8_lossy(q).into_owned())
    }

    pub fn series_list(&self) -> &[Series] {
        self.series
            .as_ref()
            .map(|s| s.series.as_slice())
            .unwrap_or_default()
    }
}

impl Series {
    pub fn new<I, S>(name: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            points: Vec::new(),
            name: Some(name.to_string()),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_point(mut self, point: Point) -> Self {
        self.points.push(point);
        self
    }

    pub fn series_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

impl Point {
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self {
            values,
            timestamp: None,
            sequence_number: None,
        }
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self {
            double_value: Some(value),
            ..Default::default()
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self {
            int64_value: Some(value),
            ..Default::default()
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self {
            bool_value: Some(value),
            ..Default::default()
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self {
            string_value: Some(value),
            ..Default::default()
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        value.to_string().into()
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(v) = &self.string_value {
            write!(f, "{v:?}")
        } else if let Some(v) = self.double_value {
            write!(f, "{v}")
        } else if let Some(v) = self.bool_value {
            write!(f, "{v}")
        } else if let Some(v) = self.int64_value {
            write!(f, "{v}")
        } else {
            f.write_str("null")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_carries_identity_and_plain_compression() {
        let greeting = Greeting::startup("influx-rs", "root", "debug");
        let auth = greeting.authentication.as_ref().unwrap();

        assert_eq!(greeting.kind(), Some(GreetingType::StartupMessage));
        assert_eq!(auth.name.as_deref(), Some(&b"root"[..]));
        assert_eq!(auth.database.as_deref(), Some(&b"debug"[..]));
        assert!(auth.password.is_none());
        assert_eq!(
            greeting.config.unwrap().compress_type,
            Some(CompressType::Plain as i32)
        );
    }

    #[test]
    fn authentication_debug_hides_password() {
        let greeting = Greeting::authentication("hunter2");
        let out = format!("{greeting:?}");

        assert!(!out.contains("hunter2"));
        assert!(out.contains("<redacted>"));
    }

    #[test]
    fn unknown_enum_values_read_as_none() {
        let greeting = Greeting {
            r#type: Some(42),
            ..Default::default()
        };
        assert_eq!(greeting.kind(), None);

        let auth = Authentication {
            method: Some(9),
            ..Default::default()
        };
        assert_eq!(auth.auth_method(), Some(Err(9)));
    }

    #[test]
    fn startup_response_ssl_flag() {
        let plain = Greeting::startup_response(SslMode::None, AuthMethod::CleartextPassword);
        let tls = Greeting::startup_response(SslMode::Required, AuthMethod::CleartextPassword);

        assert!(!plain.requires_ssl());
        assert!(tls.requires_ssl());
        assert!(!Greeting::command_ready().requires_ssl());
    }

    #[test]
    fn command_accessors() {
        let create = Command::database(CommandType::CreateDatabase, "metrics");
        assert_eq!(create.kind(), Some(CommandType::CreateDatabase));
        assert_eq!(create.database_names(), ["metrics".to_string()]);

        let query = Command::query("select * from cpu");
        assert_eq!(query.query_text().as_deref(), Some("select * from cpu"));
        assert!(!query.has_more());

        assert!(Command::response(CommandType::Query, true).has_more());
    }

    #[test]
    fn field_value_display() {
        assert_eq!(FieldValue::from(3.5).to_string(), "3.5");
        assert_eq!(FieldValue::from(7_i64).to_string(), "7");
        assert_eq!(FieldValue::from(true).to_string(), "true");
        assert_eq!(FieldValue::from("up").to_string(), "\"up\"");
        assert_eq!(FieldValue::default().to_string(), "null");
    }
}

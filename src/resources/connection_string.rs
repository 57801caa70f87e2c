//! Connection parameters for a PostgreSQL instance
//!
//! [`ConnectionString`] renders to libpq's `key=value` format. Its `Debug`
//! output never contains the password.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// PostgreSQL's well-known port, omitted when rendering
pub const DEFAULT_PORT: u16 = 5432;

/// Maintenance database used when an instance does not name one
pub const DEFAULT_DATABASE: &str = "postgres";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStringError {
    #[error("The port '{0}' is not a valid port (0-65535)")]
    InvalidPort(String),

    #[error("Unknown ssl mode '{0}'")]
    InvalidSslMode(String),
}

/// libpq `sslmode` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    #[default]
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Allow => "allow",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }

    /// Whether a TLS session is attempted at all
    pub fn uses_tls(&self) -> bool {
        !matches!(self, SslMode::Disable)
    }

    /// Whether the server certificate must chain to a configured CA
    pub fn verifies_certificate(&self) -> bool {
        matches!(self, SslMode::VerifyCa | SslMode::VerifyFull)
    }
}

impl FromStr for SslMode {
    type Err = ConnectionStringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            // "none" is accepted for manifests written against older releases
            "" | "none" | "disable" => Ok(SslMode::Disable),
            "allow" => Ok(SslMode::Allow),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            _ => Err(ConnectionStringError::InvalidSslMode(s.to_string())),
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to open a session against one database of an instance
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: SslMode,
    /// PEM bundle used for `verify-ca` and `verify-full`
    pub ca_cert: Option<String>,
}

impl ConnectionString {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
        ssl_mode: SslMode,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            database: database.into(),
            ssl_mode,
            ca_cert: None,
        }
    }

    pub fn with_ca_cert(mut self, ca_cert: Option<String>) -> Self {
        self.ca_cert = ca_cert;
        self
    }

    /// Parse a textual port, rejecting anything outside 0..=65535
    pub fn parse_port(value: &str) -> Result<u16, ConnectionStringError> {
        let port: i64 = value
            .trim()
            .parse()
            .map_err(|_| ConnectionStringError::InvalidPort(value.to_string()))?;
        u16::try_from(port).map_err(|_| ConnectionStringError::InvalidPort(value.to_string()))
    }

    /// A copy pointing at another database; `self` is left untouched
    pub fn for_database(&self, database: &str) -> Self {
        let mut copy = self.clone();
        copy.database = database.to_string();
        copy
    }

    /// Driver configuration for tokio-postgres
    ///
    /// Certificate verification is not expressed here; it lives in the TLS
    /// connector chosen for the ssl mode.
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.username)
            .password(&self.password)
            .dbname(&self.database)
            .connect_timeout(CONNECT_TIMEOUT)
            .application_name("postgres-controller")
            .ssl_mode(match self.ssl_mode {
                SslMode::Disable => tokio_postgres::config::SslMode::Disable,
                SslMode::Allow | SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
                SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
                    tokio_postgres::config::SslMode::Require
                }
            });
        config
    }
}

fn write_pair(parts: &mut Vec<String>, key: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if needs_quotes {
        let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
        parts.push(format!("{}='{}'", key, escaped));
    } else {
        parts.push(format!("{}={}", key, value));
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(6);
        write_pair(&mut parts, "host", &self.host);
        if self.port != DEFAULT_PORT {
            parts.push(format!("port={}", self.port));
        }
        write_pair(&mut parts, "user", &self.username);
        write_pair(&mut parts, "password", &self.password);
        write_pair(&mut parts, "dbname", &self.database);
        write_pair(&mut parts, "sslmode", self.ssl_mode.as_str());
        f.write_str(parts.join(" ").trim())
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .field("ca_cert", &self.ca_cert.as_ref().map(|_| "<pem>"))
            .finish()
    }
}

//! Connection manager for PostgreSQL instances
//!
//! [`PostgresSessions`] owns a deadpool pool bound to the instance's
//! maintenance database and opens short-lived sessions against other
//! databases on demand. The pool is closed by a background task once the
//! owning cancellation token fires.

use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use rustls::pki_types::{CertificateDer, ServerName};
use thiserror::Error;
use tokio_postgres::NoTls;
use tokio_postgres::types::ToSql;
use tokio_postgres_rustls::MakeRustlsConnect;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::resources::connection_string::{ConnectionString, SslMode};

/// Boxed driver error carried through the SQL layer
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while connecting to PostgreSQL
#[derive(Error, Debug)]
pub enum PostgresClientError {
    #[error("Connection failed: {0}")]
    Connection(#[from] tokio_postgres::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Connection pool could not be built: {0}")]
    PoolBuild(#[from] deadpool_postgres::BuildError),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("Connection to instance {0} is closed")]
    Closed(String),
}

/// Result type for PostgreSQL client operations
pub type PostgresClientResult<T> = Result<T, PostgresClientError>;

/// One open session; every statement is auto-committed on its own
#[async_trait]
pub trait SqlSession: Send + Sync {
    /// Run a statement without parameters
    async fn execute(&self, sql: &str) -> Result<(), BoxError>;

    /// Run a query whose first column of the single row is a boolean
    async fn query_bool(&self, sql: &str, params: &[&str]) -> Result<bool, BoxError>;

    /// Run a query returning at most one row with a text column
    async fn query_text(&self, sql: &str, params: &[&str]) -> Result<Option<String>, BoxError>;
}

/// Source of sessions for one instance
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Session on the maintenance database, taken from the pool
    async fn instance_session(&self) -> PostgresClientResult<Box<dyn SqlSession>>;

    /// Fresh session on `database`, closed when dropped
    async fn database_session(&self, database: &str)
    -> PostgresClientResult<Box<dyn SqlSession>>;

    /// Whether the pooled connection is still usable
    fn is_open(&self) -> bool;
}

fn bind<'a>(params: &'a [&'a str]) -> Vec<&'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

async fn client_execute(client: &tokio_postgres::Client, sql: &str) -> Result<(), BoxError> {
    client.batch_execute(sql).await?;
    Ok(())
}

async fn client_query_bool(
    client: &tokio_postgres::Client,
    sql: &str,
    params: &[&str],
) -> Result<bool, BoxError> {
    let row = client.query_one(sql, &bind(params)).await?;
    Ok(row.try_get::<_, bool>(0)?)
}

async fn client_query_text(
    client: &tokio_postgres::Client,
    sql: &str,
    params: &[&str],
) -> Result<Option<String>, BoxError> {
    match client.query_opt(sql, &bind(params)).await? {
        Some(row) => Ok(row.try_get::<_, Option<String>>(0)?),
        None => Ok(None),
    }
}

/// Session checked out of the instance pool
struct PooledSession(Object);

impl PooledSession {
    fn client(&self) -> &tokio_postgres::Client {
        &self.0
    }
}

#[async_trait]
impl SqlSession for PooledSession {
    async fn execute(&self, sql: &str) -> Result<(), BoxError> {
        client_execute(self.client(), sql).await
    }

    async fn query_bool(&self, sql: &str, params: &[&str]) -> Result<bool, BoxError> {
        client_query_bool(self.client(), sql, params).await
    }

    async fn query_text(&self, sql: &str, params: &[&str]) -> Result<Option<String>, BoxError> {
        client_query_text(self.client(), sql, params).await
    }
}

/// Dedicated connection to one database; dropping the client ends it
struct DirectSession(tokio_postgres::Client);

#[async_trait]
impl SqlSession for DirectSession {
    async fn execute(&self, sql: &str) -> Result<(), BoxError> {
        client_execute(&self.0, sql).await
    }

    async fn query_bool(&self, sql: &str, params: &[&str]) -> Result<bool, BoxError> {
        client_query_bool(&self.0, sql, params).await
    }

    async fn query_text(&self, sql: &str, params: &[&str]) -> Result<Option<String>, BoxError> {
        client_query_text(&self.0, sql, params).await
    }
}

/// TLS mode for PostgreSQL connections
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Plain TCP
    Disabled,
    /// TLS without certificate verification (`allow`, `prefer`, `require`)
    RequireUnverified,
    /// TLS with CA certificate verification (`verify-ca`, `verify-full`)
    RequireVerified {
        /// PEM-encoded CA certificate
        ca_cert_pem: String,
    },
}

impl TlsMode {
    pub fn for_connection(connection: &ConnectionString) -> PostgresClientResult<Self> {
        match connection.ssl_mode {
            SslMode::Disable => Ok(TlsMode::Disabled),
            SslMode::Allow | SslMode::Prefer | SslMode::Require => Ok(TlsMode::RequireUnverified),
            SslMode::VerifyCa | SslMode::VerifyFull => match &connection.ca_cert {
                Some(pem) => Ok(TlsMode::RequireVerified {
                    ca_cert_pem: pem.clone(),
                }),
                None => Err(PostgresClientError::TlsConfig(format!(
                    "sslmode {} requires a CA certificate",
                    connection.ssl_mode
                ))),
            },
        }
    }
}

/// Sessions for one PostgreSQL instance
pub struct PostgresSessions {
    name: String,
    connection: ConnectionString,
    tls: Option<MakeRustlsConnect>,
    pool: Pool,
}

impl PostgresSessions {
    /// Build the pool, verify that a connection can be made, and arrange for
    /// the pool to be closed once `shutdown` is cancelled.
    pub async fn connect(
        name: &str,
        connection: &ConnectionString,
        pool_size: usize,
        shutdown: CancellationToken,
    ) -> PostgresClientResult<Self> {
        let tls_mode = TlsMode::for_connection(connection)?;
        let tls = match &tls_mode {
            TlsMode::Disabled => None,
            mode => Some(build_tls_connector(mode)?),
        };

        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let pg_config = connection.to_pg_config();
        let manager = match &tls {
            Some(tls) => Manager::from_config(pg_config, tls.clone(), manager_config),
            None => Manager::from_config(pg_config, NoTls, manager_config),
        };
        let pool = Pool::builder(manager).max_size(pool_size.max(1)).build()?;

        // Fail fast so the caller can report the instance as unreachable
        drop(pool.get().await?);

        let watched = pool.clone();
        let instance = name.to_string();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            watched.close();
            debug!(instance = %instance, "Closed PostgreSQL connection pool");
        });

        debug!(
            instance = %name,
            host = %connection.host,
            database = %connection.database,
            ssl_mode = %connection.ssl_mode,
            "PostgreSQL connection established"
        );

        Ok(Self {
            name: name.to_string(),
            connection: connection.clone(),
            tls,
            pool,
        })
    }

    pub fn connection_string(&self) -> &ConnectionString {
        &self.connection
    }
}

#[async_trait]
impl SessionProvider for PostgresSessions {
    async fn instance_session(&self) -> PostgresClientResult<Box<dyn SqlSession>> {
        if self.pool.is_closed() {
            return Err(PostgresClientError::Closed(self.name.clone()));
        }
        let client = self.pool.get().await?;
        Ok(Box::new(PooledSession(client)))
    }

    async fn database_session(
        &self,
        database: &str,
    ) -> PostgresClientResult<Box<dyn SqlSession>> {
        let config = self.connection.for_database(database).to_pg_config();
        let client = match &self.tls {
            Some(tls) => {
                let (client, connection) = config.connect(tls.clone()).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        trace!(error = %e, "PostgreSQL TLS connection closed");
                    }
                });
                client
            }
            None => {
                let (client, connection) = config.connect(NoTls).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        trace!(error = %e, "PostgreSQL connection closed");
                    }
                });
                client
            }
        };
        Ok(Box::new(DirectSession(client)))
    }

    fn is_open(&self) -> bool {
        !self.pool.is_closed()
    }
}

// =============================================================================
// TLS Configuration
// =============================================================================

/// Parse PEM-encoded certificates into DER format
pub fn parse_pem_certificates(
    pem_data: &str,
) -> PostgresClientResult<Vec<CertificateDer<'static>>> {
    let mut certs = Vec::new();
    let mut reader = std::io::BufReader::new(pem_data.as_bytes());

    for cert in rustls_pemfile::certs(&mut reader) {
        match cert {
            Ok(cert) => certs.push(cert),
            Err(e) => {
                return Err(PostgresClientError::InvalidCertificate(format!(
                    "Failed to parse certificate: {}",
                    e
                )));
            }
        }
    }

    if certs.is_empty() {
        return Err(PostgresClientError::InvalidCertificate(
            "No certificates found in PEM data".to_string(),
        ));
    }

    Ok(certs)
}

/// Build a rustls TLS connector for PostgreSQL
pub fn build_tls_connector(tls_mode: &TlsMode) -> PostgresClientResult<MakeRustlsConnect> {
    match tls_mode {
        TlsMode::Disabled => Err(PostgresClientError::TlsConfig(
            "Cannot build TLS connector for disabled TLS mode".to_string(),
        )),
        TlsMode::RequireUnverified => {
            let config = rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth();

            Ok(MakeRustlsConnect::new(config))
        }
        TlsMode::RequireVerified { ca_cert_pem } => {
            let mut root_store = rustls::RootCertStore::empty();
            for cert in parse_pem_certificates(ca_cert_pem)? {
                root_store.add(cert).map_err(|e| {
                    PostgresClientError::InvalidCertificate(format!("Failed to add CA cert: {}", e))
                })?;
            }

            let config = rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            Ok(MakeRustlsConnect::new(config))
        }
    }
}

/// Accepts any server certificate, matching libpq's `require` semantics
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

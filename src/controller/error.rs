//! Error types shared by the controllers

use std::time::Duration;

use thiserror::Error;

use crate::controller::context::Settings;
use crate::crd::PropertyError;
use crate::resources::postgres_client::PostgresClientError;
use crate::resources::sql::SqlError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Unable to resolve instance property: {0}")]
    Property(#[from] PropertyError),

    #[error(transparent)]
    Sql(#[from] SqlError),

    #[error("Unable to connect to instance {instance}: {source}")]
    Connection {
        instance: String,
        #[source]
        source: PostgresClientError,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("PgInstance {namespace}/{name} not found")]
    InstanceNotFound { namespace: String, name: String },

    #[error("Database {0} does not exists")]
    DatabaseNotFound(String),

    #[error("Schema {schema} does not exist in database {database}")]
    SchemaNotFound { schema: String, database: String },

    #[error("Unable to create extensions: {}", format_extension_failures(.0))]
    ExtensionsMissing(Vec<(String, SqlError)>),

    #[error("Failed to update finalizers: {0}")]
    FinalizerUpdate(#[source] kube::Error),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),
}

fn format_extension_failures(failures: &[(String, SqlError)]) -> String {
    failures
        .iter()
        .map(|(extension, error)| format!("{extension}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Delay before the failed reconcile is retried
    pub fn requeue_after(&self, settings: &Settings) -> Duration {
        match self {
            Error::FinalizerUpdate(_) => settings.finalizer_retry_delay,
            _ => settings.retry_delay,
        }
    }

    /// Whether retrying without a spec change will fail the same way
    ///
    /// Only used for logging; permanent errors are retried like any other.
    pub fn is_permanent(&self) -> bool {
        match self {
            Error::Property(e) => {
                !matches!(e, PropertyError::Kube(_) | PropertyError::NotFound { .. })
            }
            Error::Sql(e) => e.is_illegal_argument(),
            Error::ExtensionsMissing(failures) => {
                failures.iter().all(|(_, e)| e.is_illegal_argument())
            }
            Error::MissingObjectKey(_) | Error::Serialization(_) => true,
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! PgInstance CRD definition
//!
//! A PgInstance describes how to reach a PostgreSQL server as its
//! administrative role. Databases and users refer to it by name.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::condition::{Condition, Conditions, HasConditions};
use crate::crd::property::{PgProperty, PropertyError};
use crate::resources::connection_string::{
    ConnectionString, ConnectionStringError, DEFAULT_DATABASE, DEFAULT_PORT, SslMode,
};
use crate::resources::store::ObjectStore;

/// PgInstance is the Schema for the pginstances API
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "postgres.brose.bike",
    version = "v1",
    kind = "PgInstance",
    plural = "pginstances",
    shortname = "pgi",
    namespaced,
    status = "PgInstanceStatus",
    printcolumn = r#"{"name":"Connected", "type":"string", "jsonPath":".status.conditions[?(@.type==\"postgres.brose.bike/connected\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PgInstanceSpec {
    /// Hostname of the server
    #[serde(default)]
    pub host: PgProperty,

    /// Port of the server, defaults to 5432
    #[serde(default)]
    pub port: PgProperty,

    /// Administrative role used to create, update and delete databases and users
    #[serde(default)]
    pub username: PgProperty,

    /// Password of the administrative role
    #[serde(default)]
    pub password: PgProperty,

    /// Maintenance database used for the pooled connection, defaults to `postgres`
    #[serde(default)]
    pub database: PgProperty,

    /// libpq ssl mode, defaults to `disable`
    #[serde(default)]
    pub ssl_mode: PgProperty,

    /// PEM-encoded CA bundle, required for `verify-ca` and `verify-full`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PgProperty>,
}

/// Status of a PgInstance
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PgInstanceStatus {
    /// Current connection state
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    #[schemars(with = "Vec<Condition>")]
    pub conditions: Conditions,
}

/// Reference from a database or user to its PgInstance
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRef {
    /// Name of the PgInstance
    pub name: String,

    /// Namespace of the PgInstance (defaults to the referring resource's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl InstanceRef {
    /// Namespace to look the instance up in
    pub fn namespace_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(fallback)
    }
}

impl PgInstanceSpec {
    /// Resolve every property into a connection string
    ///
    /// `namespace` is the instance's own namespace; referenced ConfigMaps and
    /// Secrets are read from there.
    pub async fn connection_string(
        &self,
        store: &dyn ObjectStore,
        namespace: &str,
    ) -> Result<ConnectionString, PropertyError> {
        let host = self.host.resolve(store, namespace, "host").await?;
        let port = self
            .port
            .resolve_or(store, namespace, "port", &DEFAULT_PORT.to_string())
            .await?;
        let port = ConnectionString::parse_port(&port).map_err(|e| PropertyError::InvalidValue {
            property: "port".to_string(),
            reason: e.to_string(),
        })?;
        let username = self.username.resolve(store, namespace, "username").await?;
        let password = self.password.resolve(store, namespace, "password").await?;
        let database = self
            .database
            .resolve_or(store, namespace, "database", DEFAULT_DATABASE)
            .await?;
        let ssl_mode: SslMode = self
            .ssl_mode
            .resolve_or(store, namespace, "sslMode", SslMode::default().as_str())
            .await?
            .parse()
            .map_err(|e: ConnectionStringError| PropertyError::InvalidValue {
                property: "sslMode".to_string(),
                reason: e.to_string(),
            })?;
        let ca_cert = match &self.ca_cert {
            Some(property) if property.is_set() => {
                Some(property.resolve(store, namespace, "caCert").await?)
            }
            _ => None,
        };

        Ok(
            ConnectionString::new(host, port, username, password, database, ssl_mode)
                .with_ca_cert(ca_cert),
        )
    }
}

impl HasConditions for PgInstance {
    fn conditions(&self) -> Option<&Conditions> {
        self.status.as_ref().map(|s| &s.conditions)
    }

    fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.status.get_or_insert_with(Default::default).conditions
    }
}

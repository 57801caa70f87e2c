//! PgDatabase CRD definition
//!
//! A PgDatabase declares one database on a PgInstance. The database is
//! named after the resource. Creating a PgDatabase will:
//! - create the database if it is missing
//! - install the listed extensions
//! - converge schema and default privileges for the listed roles
//! - optionally revoke the `public` privileges and drop the `public` schema

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::condition::{Condition, Conditions, HasConditions};
use crate::crd::pg_instance::InstanceRef;

/// PgDatabase is the Schema for the pgdatabases API
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "postgres.brose.bike",
    version = "v1",
    kind = "PgDatabase",
    plural = "pgdatabases",
    shortname = "pgdb",
    namespaced,
    status = "PgDatabaseStatus",
    printcolumn = r#"{"name":"Instance", "type":"string", "jsonPath":".spec.instance.name"}"#,
    printcolumn = r#"{"name":"Exists", "type":"string", "jsonPath":".status.conditions[?(@.type==\"postgres.brose.bike/database-exists\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PgDatabaseSpec {
    /// The PgInstance hosting this database
    pub instance: InstanceRef,

    /// What happens to the database when the resource is deleted
    #[serde(default)]
    pub deletion: DeletionPolicy,

    /// Extensions to install in the database
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,

    /// Privilege blocks, one per schema
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_privileges: Vec<SchemaPrivileges>,

    /// Handling of privileges granted to `public`
    #[serde(default)]
    pub public_privileges: PublicPrivileges,

    /// Handling of the `public` schema
    #[serde(default)]
    pub public_schema: PublicSchema,
}

/// Deletion behaviour
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct DeletionPolicy {
    /// Drop the database when the resource is deleted
    #[serde(default)]
    pub drop: bool,

    /// Keep the resource until the database has been dropped by other means
    #[serde(default)]
    pub wait: bool,
}

/// Privileges of a set of roles on one schema and its objects
///
/// Every list is applied as a full replacement: roles end up with exactly
/// the listed privileges, both on existing objects and as default
/// privileges for objects created later.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchemaPrivileges {
    /// Schema name; the schema must already exist
    pub name: String,

    /// Roles receiving the privileges
    #[serde(default)]
    pub roles: Vec<String>,

    /// Privileges on the schema itself (e.g. USAGE, CREATE)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub privileges: Vec<String>,

    /// Privileges on tables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub table_privileges: Vec<String>,

    /// Privileges on sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequence_privileges: Vec<String>,

    /// Privileges on functions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_privileges: Vec<String>,

    /// Privileges on types (default privileges only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_privileges: Vec<String>,
}

impl SchemaPrivileges {
    /// Privileges per object class that exists both for default privileges
    /// and as `ALL <class> IN SCHEMA`
    pub fn object_privileges(&self) -> [(&'static str, &[String]); 3] {
        [
            ("TABLES", &self.table_privileges),
            ("SEQUENCES", &self.sequence_privileges),
            ("FUNCTIONS", &self.function_privileges),
        ]
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct PublicPrivileges {
    /// Revoke every privilege `public` holds on the database and its `public` schema
    #[serde(default)]
    pub revoke: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct PublicSchema {
    /// Drop the `public` schema if it exists
    #[serde(default)]
    pub drop: bool,
}

/// Status of a PgDatabase
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PgDatabaseStatus {
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    #[schemars(with = "Vec<Condition>")]
    pub conditions: Conditions,
}

impl HasConditions for PgDatabase {
    fn conditions(&self) -> Option<&Conditions> {
        self.status.as_ref().map(|s| &s.conditions)
    }

    fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.status.get_or_insert_with(Default::default).conditions
    }
}

//! PgUser CRD definition
//!
//! A PgUser declares a login role named after the resource, the Secret its
//! credentials are published in, and the databases it is attached to.

use kube::CustomResource;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::condition::{Condition, Conditions, HasConditions};
use crate::crd::pg_instance::InstanceRef;

/// PgUser is the Schema for the pgusers API
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "postgres.brose.bike",
    version = "v1",
    kind = "PgUser",
    plural = "pgusers",
    shortname = "pgu",
    namespaced,
    status = "PgUserStatus",
    printcolumn = r#"{"name":"Instance", "type":"string", "jsonPath":".spec.instance.name"}"#,
    printcolumn = r#"{"name":"Secret", "type":"string", "jsonPath":".spec.secret.name"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PgUserSpec {
    /// The PgInstance hosting the login role
    pub instance: InstanceRef,

    /// Secret receiving the credentials (defaults to the resource name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<UserSecretRef>,

    /// Databases the role is attached to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub databases: Vec<DatabaseAttachment>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct UserSecretRef {
    pub name: String,
}

/// The role's relationship with one database
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct DatabaseAttachment {
    /// Database name on the instance
    pub name: String,

    /// Make the role the owner of the database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<bool>,

    /// Database privileges (CONNECT, CREATE, TEMPLATE, TEMPORARY); ignored for owners
    #[serde(default)]
    pub privileges: Vec<String>,
}

impl DatabaseAttachment {
    pub fn is_owner(&self) -> bool {
        self.owner.unwrap_or(false)
    }
}

/// Status of a PgUser
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PgUserStatus {
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    #[schemars(with = "Vec<Condition>")]
    pub conditions: Conditions,
}

impl PgUser {
    /// Name of the credential Secret
    pub fn secret_name(&self) -> String {
        self.spec
            .secret
            .as_ref()
            .map(|s| s.name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.name_any())
    }
}

impl HasConditions for PgUser {
    fn conditions(&self) -> Option<&Conditions> {
        self.status.as_ref().map(|s| &s.conditions)
    }

    fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.status.get_or_insert_with(Default::default).conditions
    }
}

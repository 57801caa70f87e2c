//! Common helpers for objects the operator creates
//!
//! Owner references, labels and the field manager shared by every object
//! written on behalf of a custom resource.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

/// Operator field manager name for server-side apply
pub const FIELD_MANAGER: &str = "postgres-controller";

/// API group of every custom resource
pub const API_GROUP: &str = "postgres.brose.bike";

/// Controller owner reference pointing at `owner`
///
/// Objects carrying it are garbage collected with their owner.
pub fn owner_reference<K>(owner: &K) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: owner.name_any(),
        uid: owner.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Labels for objects created on behalf of a PgUser
pub fn user_labels(user_name: &str, instance_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), user_name.to_string()),
        (
            "app.kubernetes.io/component".to_string(),
            "credentials".to_string(),
        ),
        (
            "app.kubernetes.io/managed-by".to_string(),
            FIELD_MANAGER.to_string(),
        ),
        (format!("{API_GROUP}/pguser"), user_name.to_string()),
        (format!("{API_GROUP}/pginstance"), instance_name.to_string()),
    ])
}

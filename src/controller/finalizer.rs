//! Finalizer helpers

use kube::Resource;

use crate::controller::error::{Error, Result};
use crate::resources::store::ResourceStore;

pub const DATABASE_FINALIZER: &str = "postgres.brose.bike/pgdatabase";
pub const USER_FINALIZER: &str = "postgres.brose.bike/pgloginrole";

pub fn has_finalizer<K: Resource>(resource: &K, finalizer: &str) -> bool {
    resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|name| name == finalizer))
}

pub fn is_deleting<K: Resource>(resource: &K) -> bool {
    resource.meta().deletion_timestamp.is_some()
}

/// Append `finalizer`, keeping any other finalizer in place
pub async fn add_finalizer<K: Resource>(
    store: &dyn ResourceStore<K>,
    resource: &K,
    finalizer: &str,
) -> Result<()> {
    let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
    finalizers.push(finalizer.to_string());
    store
        .patch_finalizers(resource, &finalizers)
        .await
        .map_err(Error::FinalizerUpdate)
}

/// Drop `finalizer`, keeping any other finalizer in place
pub async fn remove_finalizer<K: Resource>(
    store: &dyn ResourceStore<K>,
    resource: &K,
    finalizer: &str,
) -> Result<()> {
    let finalizers: Vec<String> = resource
        .meta()
        .finalizers
        .iter()
        .flatten()
        .filter(|name| name.as_str() != finalizer)
        .cloned()
        .collect();
    store
        .patch_finalizers(resource, &finalizers)
        .await
        .map_err(Error::FinalizerUpdate)
}

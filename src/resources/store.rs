//! Kubernetes-side collaborators of the reconcilers
//!
//! Reconcilers never talk to an `Api` directly; they go through
//! [`ResourceStore`] for the custom resources and [`ObjectStore`] for
//! ConfigMaps and Secrets. [`KubeStore`] implements both on a [`Client`].

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::crd::HasConditions;
use crate::resources::common::FIELD_MANAGER;

/// Reads and patches one kind of custom resource
#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    /// Fetch the current version; `None` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> kube::Result<Option<K>>;

    /// Write the resource's conditions to its status subresource
    async fn patch_status(&self, resource: &K) -> kube::Result<()>;

    /// Replace the finalizer list
    async fn patch_finalizers(&self, resource: &K, finalizers: &[String]) -> kube::Result<()>;
}

/// Reads ConfigMaps and Secrets, and manages credential Secrets
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn config_map(&self, namespace: &str, name: &str) -> kube::Result<Option<ConfigMap>>;

    async fn secret(&self, namespace: &str, name: &str) -> kube::Result<Option<Secret>>;

    /// Create or update a Secret by server-side apply
    async fn apply_secret(&self, secret: &Secret) -> kube::Result<()>;

    /// Delete a Secret; a missing Secret is not an error
    async fn delete_secret(&self, namespace: &str, name: &str) -> kube::Result<()>;
}

/// [`ResourceStore`] and [`ObjectStore`] backed by the API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl<K> ResourceStore<K> for KubeStore
where
    K: Resource<Scope = NamespaceResourceScope>
        + HasConditions
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
    <K as Resource>::DynamicType: Default,
{
    async fn get(&self, namespace: &str, name: &str) -> kube::Result<Option<K>> {
        self.api::<K>(namespace).get_opt(name).await
    }

    async fn patch_status(&self, resource: &K) -> kube::Result<()> {
        let namespace = resource.namespace().unwrap_or_default();
        let conditions = resource.conditions().cloned().unwrap_or_default();
        let patch = json!({
            "status": {
                "conditions": conditions
            }
        });
        self.api::<K>(&namespace)
            .patch_status(
                &resource.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }

    async fn patch_finalizers(&self, resource: &K, finalizers: &[String]) -> kube::Result<()> {
        let namespace = resource.namespace().unwrap_or_default();
        let patch = json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        self.api::<K>(&namespace)
            .patch(
                &resource.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn config_map(&self, namespace: &str, name: &str) -> kube::Result<Option<ConfigMap>> {
        self.api::<ConfigMap>(namespace).get_opt(name).await
    }

    async fn secret(&self, namespace: &str, name: &str) -> kube::Result<Option<Secret>> {
        self.api::<Secret>(namespace).get_opt(name).await
    }

    async fn apply_secret(&self, secret: &Secret) -> kube::Result<()> {
        let namespace = secret.namespace().unwrap_or_default();
        self.api::<Secret>(&namespace)
            .patch(
                &secret.name_any(),
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(secret),
            )
            .await?;
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> kube::Result<()> {
        match self
            .api::<Secret>(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                debug!(name = %name, namespace = %namespace, "Secret already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

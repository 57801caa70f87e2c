//! Instance properties that may come from a literal, a ConfigMap or a Secret
//!
//! Properties are resolved every time they are used; nothing is cached.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resources::store::ObjectStore;

/// Errors raised while resolving a [`PgProperty`]
#[derive(Error, Debug)]
pub enum PropertyError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("The entry '{key}' was not found in {kind} {name}")]
    MapEntryNotFound {
        kind: &'static str,
        name: String,
        key: String,
    },

    #[error("The property '{0}' has no value")]
    MissingPropertyValue(String),

    #[error("The property '{property}' has an invalid value: {reason}")]
    InvalidValue { property: String, reason: String },

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// Selects a key of a ConfigMap or Secret in the resource's namespace
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct KeySelector {
    /// Name of the referenced object
    pub name: String,
    /// Key within the object's data
    pub key: String,
}

/// A value given literally or by reference
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PgProperty {
    /// The value for this property
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Selects a key of a ConfigMap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_key_ref: Option<KeySelector>,

    /// Selects a key of a Secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<KeySelector>,
}

impl PgProperty {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn from_config_map(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            config_map_key_ref: Some(KeySelector {
                name: name.into(),
                key: key.into(),
            }),
            ..Default::default()
        }
    }

    pub fn from_secret(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            secret_key_ref: Some(KeySelector {
                name: name.into(),
                key: key.into(),
            }),
            ..Default::default()
        }
    }

    /// Whether any source is configured
    pub fn is_set(&self) -> bool {
        self.value.as_deref().is_some_and(|v| !v.is_empty())
            || self.config_map_key_ref.is_some()
            || self.secret_key_ref.is_some()
    }

    /// Resolve the property; a literal wins over a ConfigMap over a Secret
    pub async fn resolve(
        &self,
        store: &dyn ObjectStore,
        namespace: &str,
        property: &str,
    ) -> Result<String, PropertyError> {
        if let Some(value) = self.value.as_deref().filter(|v| !v.is_empty()) {
            return Ok(value.to_string());
        }

        if let Some(selector) = &self.config_map_key_ref {
            let config_map = store
                .config_map(namespace, &selector.name)
                .await?
                .ok_or_else(|| PropertyError::NotFound {
                    kind: "ConfigMap",
                    namespace: namespace.to_string(),
                    name: selector.name.clone(),
                })?;
            return config_map
                .data
                .as_ref()
                .and_then(|data| data.get(&selector.key))
                .cloned()
                .ok_or_else(|| PropertyError::MapEntryNotFound {
                    kind: "ConfigMap",
                    name: selector.name.clone(),
                    key: selector.key.clone(),
                });
        }

        if let Some(selector) = &self.secret_key_ref {
            let secret = store
                .secret(namespace, &selector.name)
                .await?
                .ok_or_else(|| PropertyError::NotFound {
                    kind: "Secret",
                    namespace: namespace.to_string(),
                    name: selector.name.clone(),
                })?;
            if let Some(value) = secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(&selector.key))
            {
                return Ok(value.clone());
            }
            return secret
                .data
                .as_ref()
                .and_then(|data| data.get(&selector.key))
                .map(|bytes| String::from_utf8_lossy(&bytes.0).to_string())
                .ok_or_else(|| PropertyError::MapEntryNotFound {
                    kind: "Secret",
                    name: selector.name.clone(),
                    key: selector.key.clone(),
                });
        }

        Err(PropertyError::MissingPropertyValue(property.to_string()))
    }

    /// Like [`resolve`](Self::resolve), but an unset property yields `default`
    ///
    /// Every other failure is propagated.
    pub async fn resolve_or(
        &self,
        store: &dyn ObjectStore,
        namespace: &str,
        property: &str,
        default: &str,
    ) -> Result<String, PropertyError> {
        match self.resolve(store, namespace, property).await {
            Err(PropertyError::MissingPropertyValue(_)) => Ok(default.to_string()),
            other => other,
        }
    }
}

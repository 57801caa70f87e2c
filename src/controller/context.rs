//! Shared reconcile context
//!
//! A [`Context`] bundles the collaborators one controller needs: the store
//! for its own kind, the PgInstance store, ConfigMap/Secret access and the
//! factory handing out capability handles. Everything is behind a trait so
//! tests can substitute in-memory fakes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::runtime::controller::Action;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::OperatorConfig;
use crate::controller::error::{Error, Result};
use crate::crd::{InstanceRef, PgDatabase, PgInstance, PgUser};
use crate::health::HealthState;
use crate::resources::connection_string::ConnectionString;
use crate::resources::pg_api::{ConnectorFactory, DatabaseApiFactory, RoleApiFactory};
use crate::resources::store::{ObjectStore, ResourceStore};

/// Timing knobs of the reconcile loop
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub retry_delay: Duration,
    pub finalizer_retry_delay: Duration,
    /// `None` waits for the next change once converged
    pub resync_interval: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&OperatorConfig::default())
    }
}

impl From<&OperatorConfig> for Settings {
    fn from(config: &OperatorConfig) -> Self {
        Self {
            retry_delay: config.retry_delay,
            finalizer_retry_delay: config.finalizer_retry_delay,
            resync_interval: config.resync_interval,
        }
    }
}

impl Settings {
    /// Action returned once a resource is converged
    pub fn converged(&self) -> Action {
        match self.resync_interval {
            Some(interval) => Action::requeue(interval),
            None => Action::await_change(),
        }
    }
}

pub struct Context<K, F: ?Sized> {
    pub resources: Arc<dyn ResourceStore<K>>,
    pub instances: Arc<dyn ResourceStore<PgInstance>>,
    pub objects: Arc<dyn ObjectStore>,
    pub factory: Arc<F>,
    pub settings: Settings,
    /// Cancelled on shutdown; every reconcile derives a child token from it
    pub shutdown: CancellationToken,
    pub health: Option<Arc<HealthState>>,
}

pub type InstanceContext = Context<PgInstance, dyn ConnectorFactory>;
pub type DatabaseContext = Context<PgDatabase, dyn DatabaseApiFactory>;
pub type UserContext = Context<PgUser, dyn RoleApiFactory>;

impl<K, F: ?Sized> Context<K, F> {
    pub fn new(
        resources: Arc<dyn ResourceStore<K>>,
        instances: Arc<dyn ResourceStore<PgInstance>>,
        objects: Arc<dyn ObjectStore>,
        factory: Arc<F>,
    ) -> Self {
        Self {
            resources,
            instances,
            objects,
            factory,
            settings: Settings::default(),
            shutdown: CancellationToken::new(),
            health: None,
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_health(mut self, health: Option<Arc<HealthState>>) -> Self {
        self.health = health;
        self
    }

    /// Fetch the referenced PgInstance and resolve its connection string
    ///
    /// Returns the instance's name alongside, for logging and pool naming.
    pub async fn resolve_instance(
        &self,
        reference: &InstanceRef,
        namespace: &str,
    ) -> Result<(String, ConnectionString)> {
        let instance_namespace = reference.namespace_or(namespace);
        let instance = self
            .instances
            .get(instance_namespace, &reference.name)
            .await?
            .ok_or_else(|| Error::InstanceNotFound {
                namespace: instance_namespace.to_string(),
                name: reference.name.clone(),
            })?;
        let connection = instance
            .spec
            .connection_string(self.objects.as_ref(), instance_namespace)
            .await?;
        debug!(instance = %reference.name, namespace = %instance_namespace, "Resolved instance");
        Ok((format!("{instance_namespace}/{}", reference.name), connection))
    }

    /// Record metrics for a finished reconcile
    pub(crate) fn record(&self, kind: &str, namespace: &str, name: &str, start: Instant, ok: bool) {
        let Some(health) = &self.health else {
            return;
        };
        health
            .metrics
            .record_reconcile(kind, namespace, name, start.elapsed().as_secs_f64());
        if ok {
            health.touch();
        } else {
            health.metrics.record_error(kind, namespace, name);
        }
    }
}

pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod resources;

pub use config::{ConfigError, OperatorConfig};
pub use controller::{
    Context, DatabaseContext, Error, InstanceContext, Result, Settings, UserContext,
    database_error_policy, instance_error_policy, reconcile_database, reconcile_instance,
    reconcile_user, user_error_policy,
};
pub use crd::{PgDatabase, PgInstance, PgUser};
pub use health::{HealthState, Metrics};

use std::fmt::Debug;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::Controller;
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::resources::store::{KubeStore, ResourceStore};

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Build a reconcile context backed by the API server
///
/// `factory` hands out the PostgreSQL capability handles; pass a
/// [`resources::PostgresApiFactory`] outside of tests.
pub fn kube_context<K, F>(
    client: Client,
    factory: Arc<F>,
    config: &OperatorConfig,
    shutdown: CancellationToken,
    health: Option<Arc<HealthState>>,
) -> Context<K, F>
where
    F: ?Sized,
    KubeStore: ResourceStore<K>,
    K: 'static,
{
    let store = Arc::new(KubeStore::new(client));
    Context::new(store.clone(), store.clone(), store, factory)
        .with_settings(Settings::from(config))
        .with_shutdown(shutdown)
        .with_health(health)
}

fn log_result<K, E>(kind: &'static str, result: std::result::Result<(ObjectRef<K>, Action), E>)
where
    K: Resource,
    E: Debug,
{
    match result {
        Ok((obj, _action)) => tracing::debug!(kind, name = %obj.name, "Reconciled"),
        Err(e) => tracing::warn!(kind, error = ?e, "Reconciliation error"),
    }
}

/// Run the PgInstance controller with optional namespace scoping.
///
/// When `namespace` is `Some(ns)`, only watches resources in that namespace.
/// When `namespace` is `None`, watches resources cluster-wide.
pub async fn run_instance_controller_scoped(
    client: Client,
    ctx: Arc<InstanceContext>,
    namespace: Option<&str>,
) {
    tracing::info!(
        scope = namespace.unwrap_or("cluster-wide"),
        "Starting controller for PgInstance resources"
    );

    let instances: Api<PgInstance> = scoped_api(client, namespace);
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(instances, watcher_config)
        .run(reconcile_instance, instance_error_policy, ctx)
        .for_each(|result| async move { log_result("PgInstance", result) })
        .await;

    tracing::info!("PgInstance controller stream ended");
}

/// Run the PgDatabase controller with optional namespace scoping.
pub async fn run_database_controller_scoped(
    client: Client,
    ctx: Arc<DatabaseContext>,
    namespace: Option<&str>,
) {
    tracing::info!(
        scope = namespace.unwrap_or("cluster-wide"),
        "Starting controller for PgDatabase resources"
    );

    let databases: Api<PgDatabase> = scoped_api(client, namespace);
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(databases, watcher_config)
        .run(reconcile_database, database_error_policy, ctx)
        .for_each(|result| async move { log_result("PgDatabase", result) })
        .await;

    tracing::info!("PgDatabase controller stream ended");
}

/// Run the PgUser controller with optional namespace scoping.
///
/// Also watches the credential Secrets owned by PgUsers, so a deleted or
/// edited Secret is restored.
pub async fn run_user_controller_scoped(
    client: Client,
    ctx: Arc<UserContext>,
    namespace: Option<&str>,
) {
    tracing::info!(
        scope = namespace.unwrap_or("cluster-wide"),
        "Starting controller for PgUser resources"
    );

    let users: Api<PgUser> = scoped_api(client.clone(), namespace);
    let secrets: Api<Secret> = scoped_api(client, namespace);
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(users, watcher_config.clone())
        .owns(secrets, watcher_config)
        .run(reconcile_user, user_error_policy, ctx)
        .for_each(|result| async move { log_result("PgUser", result) })
        .await;

    tracing::info!("PgUser controller stream ended");
}

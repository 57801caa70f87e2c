//! In-memory stand-ins for the Kubernetes stores and PostgreSQL
//!
//! - [`MemoryStore`] / [`MemoryObjects`]: the resource and object stores
//! - [`FakePostgres`] / [`FakeFactory`]: a stateful instance behind the capability traits
//! - [`RecordingSessions`]: a session provider logging the exact SQL that runs

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::error::ErrorResponse;
use kube::{Resource, ResourceExt};
use tokio_util::sync::CancellationToken;

use postgres_controller::controller::{Context, DatabaseContext, InstanceContext, UserContext};
use postgres_controller::crd::{HasConditions, PgInstance};
use postgres_controller::resources::pg_api::{
    Connector, ConnectorFactory, DatabaseApi, DatabaseApiFactory, DatabaseHandle, RoleApi,
    RoleApiFactory, SchemaApi, UserHandle,
};
use postgres_controller::resources::postgres_client::{
    BoxError, PostgresClientError, PostgresClientResult, SessionProvider, SqlSession,
};
use postgres_controller::resources::sql::{SqlError, SqlResult};
use postgres_controller::resources::{ConnectionString, ObjectStore, ResourceStore};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

pub fn not_found(name: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("\"{name}\" not found"),
        reason: "NotFound".to_string(),
        code: 404,
    })
}

// =============================================================================
// Kubernetes stores
// =============================================================================

/// Custom resources kept in memory
///
/// Removing the last finalizer of a resource that is being deleted removes
/// it, like the API server does.
pub struct MemoryStore<K> {
    objects: Mutex<BTreeMap<Key, K>>,
    status_writes: AtomicUsize,
    finalizer_writes: AtomicUsize,
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            status_writes: AtomicUsize::new(0),
            finalizer_writes: AtomicUsize::new(0),
        }
    }
}

impl<K: Resource + Clone> MemoryStore<K> {
    pub fn with(objects: impl IntoIterator<Item = K>) -> Self {
        let store = Self::default();
        for object in objects {
            store.insert(object);
        }
        store
    }

    pub fn insert(&self, object: K) {
        let k = key(&object.namespace().unwrap_or_default(), &object.name_any());
        self.objects.lock().unwrap().insert(k, object);
    }

    pub fn current(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    pub fn finalizer_writes(&self) -> usize {
        self.finalizer_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<K> ResourceStore<K> for MemoryStore<K>
where
    K: Resource + HasConditions + Clone + Send + Sync,
{
    async fn get(&self, namespace: &str, name: &str) -> kube::Result<Option<K>> {
        Ok(self.current(namespace, name))
    }

    async fn patch_status(&self, resource: &K) -> kube::Result<()> {
        let name = resource.name_any();
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get_mut(&key(&resource.namespace().unwrap_or_default(), &name))
            .ok_or_else(|| not_found(&name))?;
        *stored.conditions_mut() = resource.conditions().cloned().unwrap_or_default();
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn patch_finalizers(&self, resource: &K, finalizers: &[String]) -> kube::Result<()> {
        let name = resource.name_any();
        let k = key(&resource.namespace().unwrap_or_default(), &name);
        let mut objects = self.objects.lock().unwrap();
        let stored = objects.get_mut(&k).ok_or_else(|| not_found(&name))?;
        stored.meta_mut().finalizers = Some(finalizers.to_vec());
        self.finalizer_writes.fetch_add(1, Ordering::SeqCst);
        if finalizers.is_empty() && stored.meta().deletion_timestamp.is_some() {
            objects.remove(&k);
        }
        Ok(())
    }
}

/// ConfigMaps and Secrets kept in memory
#[derive(Default)]
pub struct MemoryObjects {
    config_maps: Mutex<BTreeMap<Key, ConfigMap>>,
    secrets: Mutex<BTreeMap<Key, Secret>>,
    applied: AtomicUsize,
    deleted: Mutex<Vec<Key>>,
}

impl MemoryObjects {
    pub fn with_config_map(self, config_map: ConfigMap) -> Self {
        let k = key(&config_map.namespace().unwrap_or_default(), &config_map.name_any());
        self.config_maps.lock().unwrap().insert(k, config_map);
        self
    }

    pub fn with_secret(self, secret: Secret) -> Self {
        let k = key(&secret.namespace().unwrap_or_default(), &secret.name_any());
        self.secrets.lock().unwrap().insert(k, secret);
        self
    }

    pub fn stored_secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn applied(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjects {
    async fn config_map(&self, namespace: &str, name: &str) -> kube::Result<Option<ConfigMap>> {
        Ok(self
            .config_maps
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned())
    }

    async fn secret(&self, namespace: &str, name: &str) -> kube::Result<Option<Secret>> {
        Ok(self.stored_secret(namespace, name))
    }

    async fn apply_secret(&self, secret: &Secret) -> kube::Result<()> {
        let k = key(&secret.namespace().unwrap_or_default(), &secret.name_any());
        self.secrets.lock().unwrap().insert(k, secret.clone());
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> kube::Result<()> {
        self.secrets.lock().unwrap().remove(&key(namespace, name));
        self.deleted.lock().unwrap().push(key(namespace, name));
        Ok(())
    }
}

// =============================================================================
// PostgreSQL instance
// =============================================================================

/// What a [`FakePostgres`] holds; tests read and seed it directly
#[derive(Default, Debug)]
pub struct PgState {
    /// database -> owner
    pub databases: BTreeMap<String, String>,
    /// role -> last password set
    pub roles: BTreeMap<String, Option<String>>,
    /// (database, extension)
    pub extensions: BTreeSet<(String, String)>,
    /// (database, schema)
    pub schemas: BTreeSet<(String, String)>,
    /// (database, schema) the administrative role may not use
    pub unusable_schemas: BTreeSet<(String, String)>,
    /// (database, role) -> privileges
    pub database_privileges: BTreeMap<(String, String), Vec<String>>,
    /// (database, schema, role) -> privileges
    pub schema_privileges: BTreeMap<(String, String, String), Vec<String>>,
    /// (database, schema, role, object type) -> privileges
    pub default_privileges: BTreeMap<(String, String, String, String), Vec<String>>,
    /// (database, schema, role, object type) -> privileges
    pub object_privileges: BTreeMap<(String, String, String, String), Vec<String>>,
    /// Extensions whose creation fails
    pub broken_extensions: BTreeSet<String>,
    /// Every mutating call, in order
    pub calls: Vec<String>,
}

impl PgState {
    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// A PostgreSQL instance simulated in memory
pub struct FakePostgres {
    admin: String,
    state: Mutex<PgState>,
}

impl Default for FakePostgres {
    fn default() -> Self {
        Self::new(super::fixtures::ADMIN)
    }
}

impl FakePostgres {
    pub fn new(admin: &str) -> Self {
        let mut state = PgState::default();
        state.roles.insert(admin.to_string(), None);
        state
            .databases
            .insert("postgres".to_string(), admin.to_string());
        Self {
            admin: admin.to_string(),
            state: Mutex::new(state),
        }
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, PgState> {
        self.state.lock().unwrap()
    }

    pub fn with_database(self, name: &str, owner: &str) -> Self {
        {
            let mut state = self.state();
            state.databases.insert(name.to_string(), owner.to_string());
            state
                .schemas
                .insert((name.to_string(), "public".to_string()));
        }
        self
    }

    pub fn with_role(self, name: &str) -> Self {
        self.state().roles.insert(name.to_string(), None);
        self
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }
}

/// Capability handle over a [`FakePostgres`]
pub struct FakeHandle {
    pg: Arc<FakePostgres>,
    connection: ConnectionString,
}

impl FakeHandle {
    pub fn new(pg: Arc<FakePostgres>, connection: ConnectionString) -> Self {
        Self { pg, connection }
    }

    fn require_database(&self, database: &str) -> SqlResult<()> {
        if self.pg.state().databases.contains_key(database) {
            Ok(())
        } else {
            Err(SqlError::NotFound {
                kind: "Database",
                name: database.to_string(),
            })
        }
    }
}

fn owned(privileges: &[String]) -> Vec<String> {
    privileges.to_vec()
}

#[async_trait]
impl Connector for FakeHandle {
    fn connection_string(&self) -> &ConnectionString {
        &self.connection
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn test_connection(&self) -> SqlResult<()> {
        self.pg.record("test_connection".to_string());
        Ok(())
    }
}

#[async_trait]
impl DatabaseApi for FakeHandle {
    async fn database_exists(&self, database: &str) -> SqlResult<bool> {
        Ok(self.pg.state().databases.contains_key(database))
    }

    async fn create_database(&self, database: &str) -> SqlResult<()> {
        self.pg.record(format!("create_database {database}"));
        let mut state = self.pg.state();
        state
            .databases
            .insert(database.to_string(), self.pg.admin.clone());
        state
            .schemas
            .insert((database.to_string(), "public".to_string()));
        Ok(())
    }

    async fn delete_database(&self, database: &str) -> SqlResult<()> {
        self.pg.record(format!("delete_database {database}"));
        self.pg.state().databases.remove(database);
        Ok(())
    }

    async fn database_owner(&self, database: &str) -> SqlResult<String> {
        self.pg
            .state()
            .databases
            .get(database)
            .cloned()
            .ok_or_else(|| SqlError::NotFound {
                kind: "Database",
                name: database.to_string(),
            })
    }

    async fn update_database_owner(&self, database: &str, owner: &str) -> SqlResult<()> {
        self.require_database(database)?;
        self.pg
            .record(format!("update_database_owner {database} {owner}"));
        self.pg
            .state()
            .databases
            .insert(database.to_string(), owner.to_string());
        Ok(())
    }

    async fn reset_database_owner(&self, database: &str) -> SqlResult<()> {
        self.require_database(database)?;
        self.pg.record(format!("reset_database_owner {database}"));
        let admin = self.pg.admin.clone();
        self.pg
            .state()
            .databases
            .insert(database.to_string(), admin);
        Ok(())
    }

    async fn update_database_privileges(
        &self,
        database: &str,
        role: &str,
        privileges: &[String],
    ) -> SqlResult<()> {
        self.pg.record(format!(
            "update_database_privileges {database} {role} {}",
            privileges.join(",")
        ));
        self.pg.state().database_privileges.insert(
            (database.to_string(), role.to_string()),
            owned(privileges),
        );
        Ok(())
    }

    async fn extension_exists(&self, database: &str, extension: &str) -> SqlResult<bool> {
        Ok(self
            .pg
            .state()
            .extensions
            .contains(&(database.to_string(), extension.to_string())))
    }

    async fn create_extension(&self, database: &str, extension: &str) -> SqlResult<()> {
        self.pg
            .record(format!("create_extension {database} {extension}"));
        let mut state = self.pg.state();
        if state.broken_extensions.contains(extension) {
            return Err(SqlError::NotFound {
                kind: "Extension",
                name: extension.to_string(),
            });
        }
        state
            .extensions
            .insert((database.to_string(), extension.to_string()));
        Ok(())
    }
}

#[async_trait]
impl SchemaApi for FakeHandle {
    async fn schema_exists(&self, database: &str, schema: &str) -> SqlResult<bool> {
        Ok(self
            .pg
            .state()
            .schemas
            .contains(&(database.to_string(), schema.to_string())))
    }

    async fn create_schema(&self, database: &str, schema: &str) -> SqlResult<()> {
        self.pg.record(format!("create_schema {database} {schema}"));
        self.pg
            .state()
            .schemas
            .insert((database.to_string(), schema.to_string()));
        Ok(())
    }

    async fn delete_schema(&self, database: &str, schema: &str) -> SqlResult<()> {
        self.pg.record(format!("delete_schema {database} {schema}"));
        self.pg
            .state()
            .schemas
            .remove(&(database.to_string(), schema.to_string()));
        Ok(())
    }

    async fn is_schema_usable(&self, database: &str, schema: &str) -> SqlResult<bool> {
        Ok(!self
            .pg
            .state()
            .unusable_schemas
            .contains(&(database.to_string(), schema.to_string())))
    }

    async fn make_schema_usable(&self, database: &str, schema: &str) -> SqlResult<()> {
        self.pg
            .record(format!("make_schema_usable {database} {schema}"));
        self.pg
            .state()
            .unusable_schemas
            .remove(&(database.to_string(), schema.to_string()));
        Ok(())
    }

    async fn update_schema_privileges(
        &self,
        database: &str,
        schema: &str,
        role: &str,
        privileges: &[String],
    ) -> SqlResult<()> {
        self.pg.record(format!(
            "update_schema_privileges {database} {schema} {role} {}",
            privileges.join(",")
        ));
        self.pg.state().schema_privileges.insert(
            (database.to_string(), schema.to_string(), role.to_string()),
            owned(privileges),
        );
        Ok(())
    }

    async fn update_default_privileges(
        &self,
        database: &str,
        schema: &str,
        role: &str,
        object_type: &str,
        privileges: &[String],
    ) -> SqlResult<()> {
        self.pg.record(format!(
            "update_default_privileges {database} {schema} {role} {object_type} {}",
            privileges.join(",")
        ));
        self.pg.state().default_privileges.insert(
            (
                database.to_string(),
                schema.to_string(),
                role.to_string(),
                object_type.to_string(),
            ),
            owned(privileges),
        );
        Ok(())
    }

    async fn update_privileges_on_all_objects(
        &self,
        database: &str,
        schema: &str,
        role: &str,
        object_type: &str,
        privileges: &[String],
    ) -> SqlResult<()> {
        self.pg.record(format!(
            "update_privileges_on_all_objects {database} {schema} {role} {object_type} {}",
            privileges.join(",")
        ));
        self.pg.state().object_privileges.insert(
            (
                database.to_string(),
                schema.to_string(),
                role.to_string(),
                object_type.to_string(),
            ),
            owned(privileges),
        );
        Ok(())
    }

    async fn delete_all_privileges_on_schema(
        &self,
        database: &str,
        schema: &str,
        role: &str,
    ) -> SqlResult<()> {
        self.pg.record(format!(
            "delete_all_privileges_on_schema {database} {schema} {role}"
        ));
        self.pg.state().schema_privileges.remove(&(
            database.to_string(),
            schema.to_string(),
            role.to_string(),
        ));
        Ok(())
    }
}

#[async_trait]
impl RoleApi for FakeHandle {
    async fn role_exists(&self, role: &str) -> SqlResult<bool> {
        Ok(self.pg.state().roles.contains_key(role))
    }

    async fn create_role(&self, role: &str) -> SqlResult<()> {
        self.pg.record(format!("create_role {role}"));
        self.pg.state().roles.insert(role.to_string(), None);
        Ok(())
    }

    async fn delete_role(&self, role: &str) -> SqlResult<()> {
        self.pg.record(format!("delete_role {role}"));
        let admin = self.pg.admin.clone();
        let mut state = self.pg.state();
        state.roles.remove(role);
        for owner in state.databases.values_mut() {
            if owner == role {
                *owner = admin.clone();
            }
        }
        Ok(())
    }

    async fn update_password(&self, role: &str, password: &str) -> SqlResult<()> {
        self.pg.record(format!("update_password {role}"));
        self.pg
            .state()
            .roles
            .insert(role.to_string(), Some(password.to_string()));
        Ok(())
    }
}

/// Hands out [`FakeHandle`]s, or refuses to connect
pub struct FakeFactory {
    pg: Arc<FakePostgres>,
    refuse: AtomicBool,
    opened: Mutex<Vec<String>>,
}

impl FakeFactory {
    pub fn new(pg: Arc<FakePostgres>) -> Self {
        Self {
            pg,
            refuse: AtomicBool::new(false),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// A factory whose instance is unreachable
    pub fn unreachable(pg: Arc<FakePostgres>) -> Self {
        let factory = Self::new(pg);
        factory.refuse.store(true, Ordering::SeqCst);
        factory
    }

    /// Instances a handle was opened for, as `namespace/name`
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    fn open(&self, instance: &str, connection: &ConnectionString) -> PostgresClientResult<FakeHandle> {
        self.opened.lock().unwrap().push(instance.to_string());
        if self.refuse.load(Ordering::SeqCst) {
            return Err(PostgresClientError::Closed(instance.to_string()));
        }
        Ok(FakeHandle::new(self.pg.clone(), connection.clone()))
    }
}

#[async_trait]
impl ConnectorFactory for FakeFactory {
    async fn connector(
        &self,
        instance: &str,
        connection: &ConnectionString,
        _cancel: CancellationToken,
    ) -> PostgresClientResult<Box<dyn Connector>> {
        Ok(Box::new(self.open(instance, connection)?))
    }
}

#[async_trait]
impl DatabaseApiFactory for FakeFactory {
    async fn database_api(
        &self,
        instance: &str,
        connection: &ConnectionString,
        _cancel: CancellationToken,
    ) -> PostgresClientResult<Box<dyn DatabaseHandle>> {
        Ok(Box::new(self.open(instance, connection)?))
    }
}

#[async_trait]
impl RoleApiFactory for FakeFactory {
    async fn role_api(
        &self,
        instance: &str,
        connection: &ConnectionString,
        _cancel: CancellationToken,
    ) -> PostgresClientResult<Box<dyn UserHandle>> {
        Ok(Box::new(self.open(instance, connection)?))
    }
}

// =============================================================================
// Reconcile contexts
// =============================================================================

/// Everything a reconciler test needs to seed and inspect
pub struct Harness<K> {
    pub resources: Arc<MemoryStore<K>>,
    pub instances: Arc<MemoryStore<PgInstance>>,
    pub objects: Arc<MemoryObjects>,
    pub pg: Arc<FakePostgres>,
    pub factory: Arc<FakeFactory>,
}

impl<K> Harness<K>
where
    K: Resource + HasConditions + Clone + Send + Sync + 'static,
{
    pub fn new(resource: K, pg: FakePostgres) -> Self {
        let pg = Arc::new(pg);
        Self {
            resources: Arc::new(MemoryStore::with([resource])),
            instances: Arc::new(MemoryStore::with([super::fixtures::PgInstanceBuilder::new(
                super::fixtures::INSTANCE,
                super::fixtures::NAMESPACE,
            )
            .build()])),
            objects: Arc::new(MemoryObjects::default()),
            factory: Arc::new(FakeFactory::new(pg.clone())),
            pg,
        }
    }

    pub fn unreachable(mut self) -> Self {
        self.factory = Arc::new(FakeFactory::unreachable(self.pg.clone()));
        self
    }

    pub fn with_objects(mut self, objects: MemoryObjects) -> Self {
        self.objects = Arc::new(objects);
        self
    }

    pub fn without_instances(mut self) -> Self {
        self.instances = Arc::new(MemoryStore::default());
        self
    }

    fn context<F: ?Sized>(&self, factory: Arc<F>) -> Context<K, F> {
        Context::new(
            self.resources.clone(),
            self.instances.clone(),
            self.objects.clone(),
            factory,
        )
    }
}

impl Harness<PgInstance> {
    pub fn instance_context(&self) -> Arc<InstanceContext> {
        Arc::new(self.context(self.factory.clone() as Arc<dyn ConnectorFactory>))
    }
}

impl Harness<postgres_controller::crd::PgDatabase> {
    pub fn database_context(&self) -> Arc<DatabaseContext> {
        Arc::new(self.context(self.factory.clone() as Arc<dyn DatabaseApiFactory>))
    }
}

impl Harness<postgres_controller::crd::PgUser> {
    pub fn user_context(&self) -> Arc<UserContext> {
        Arc::new(self.context(self.factory.clone() as Arc<dyn RoleApiFactory>))
    }
}

// =============================================================================
// Recorded SQL
// =============================================================================

/// Shared log and scripted answers behind [`RecordingSessions`]
#[derive(Default, Debug)]
pub struct SqlScript {
    /// Statements in execution order
    pub executed: Vec<String>,
    /// Databases sessions were opened on; `None` for the instance pool
    pub sessions: Vec<Option<String>>,
    /// Boolean answers keyed by a fragment of the query; unmatched is `false`
    pub bools: Vec<(String, bool)>,
    /// Text answers keyed by a fragment of the query; unmatched is `None`
    pub texts: Vec<(String, String)>,
    /// Statements containing this fragment fail
    pub fail_on: Option<String>,
}

/// Session provider that records every statement instead of running it
#[derive(Clone, Default)]
pub struct RecordingSessions(pub Arc<Mutex<SqlScript>>);

impl RecordingSessions {
    pub fn answer_bool(self, fragment: &str, value: bool) -> Self {
        self.0
            .lock()
            .unwrap()
            .bools
            .push((fragment.to_string(), value));
        self
    }

    pub fn answer_text(self, fragment: &str, value: &str) -> Self {
        self.0
            .lock()
            .unwrap()
            .texts
            .push((fragment.to_string(), value.to_string()));
        self
    }

    pub fn failing_on(self, fragment: &str) -> Self {
        self.0.lock().unwrap().fail_on = Some(fragment.to_string());
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.0.lock().unwrap().executed.clone()
    }

    pub fn sessions(&self) -> Vec<Option<String>> {
        self.0.lock().unwrap().sessions.clone()
    }
}

struct RecordingSession(Arc<Mutex<SqlScript>>);

#[async_trait]
impl SqlSession for RecordingSession {
    async fn execute(&self, sql: &str) -> Result<(), BoxError> {
        let mut script = self.0.lock().unwrap();
        script.executed.push(sql.to_string());
        match &script.fail_on {
            Some(fragment) if sql.contains(fragment.as_str()) => {
                Err("permission denied".into())
            }
            _ => Ok(()),
        }
    }

    async fn query_bool(&self, sql: &str, _params: &[&str]) -> Result<bool, BoxError> {
        let script = self.0.lock().unwrap();
        Ok(script
            .bools
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .is_some_and(|(_, value)| *value))
    }

    async fn query_text(&self, sql: &str, _params: &[&str]) -> Result<Option<String>, BoxError> {
        let script = self.0.lock().unwrap();
        Ok(script
            .texts
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, value)| value.clone()))
    }
}

#[async_trait]
impl SessionProvider for RecordingSessions {
    async fn instance_session(&self) -> PostgresClientResult<Box<dyn SqlSession>> {
        self.0.lock().unwrap().sessions.push(None);
        Ok(Box::new(RecordingSession(self.0.clone())))
    }

    async fn database_session(
        &self,
        database: &str,
    ) -> PostgresClientResult<Box<dyn SqlSession>> {
        self.0
            .lock()
            .unwrap()
            .sessions
            .push(Some(database.to_string()));
        Ok(Box::new(RecordingSession(self.0.clone())))
    }

    fn is_open(&self) -> bool {
        true
    }
}

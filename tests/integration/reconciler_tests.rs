//! Reconcilers driving a live server through the real factory

use std::sync::Arc;

use kube::runtime::controller::Action;
use tokio_util::sync::CancellationToken;

use postgres_controller::controller::{DATABASE_FINALIZER, USER_FINALIZER, condition_types};
use postgres_controller::crd::{PgDatabase, PgInstance, PgUser};
use postgres_controller::resources::PostgresApiFactory;
use postgres_controller::resources::pg_api::{
    DatabaseApi, DatabaseApiFactory, RoleApi, RoleApiFactory,
};
use postgres_controller::resources::secret::PASSWORD_KEY;
use postgres_controller::{
    Context, DatabaseContext, UserContext, reconcile_database, reconcile_user,
};

use crate::common::*;
use crate::{connect, test_instance, unique_name};

struct Live<K> {
    resources: Arc<MemoryStore<K>>,
    objects: Arc<MemoryObjects>,
    instances: Arc<MemoryStore<PgInstance>>,
    factory: Arc<PostgresApiFactory>,
    shutdown: CancellationToken,
}

impl<K> Live<K>
where
    K: kube::Resource + postgres_controller::crd::HasConditions + Clone + Send + Sync + 'static,
{
    fn new(resource: K) -> Self {
        Self {
            resources: Arc::new(MemoryStore::with([resource])),
            objects: Arc::new(MemoryObjects::default()),
            instances: Arc::new(MemoryStore::with([test_instance(INSTANCE)])),
            factory: Arc::new(PostgresApiFactory::new(2)),
            shutdown: CancellationToken::new(),
        }
    }

    fn context<F: ?Sized>(&self, factory: Arc<F>) -> Arc<Context<K, F>> {
        Arc::new(
            Context::new(
                self.resources.clone(),
                self.instances.clone(),
                self.objects.clone(),
                factory,
            )
            .with_shutdown(self.shutdown.clone()),
        )
    }
}

impl Live<PgDatabase> {
    fn database_context(&self) -> Arc<DatabaseContext> {
        self.context(self.factory.clone() as Arc<dyn DatabaseApiFactory>)
    }
}

impl Live<PgUser> {
    fn user_context(&self) -> Arc<UserContext> {
        self.context(self.factory.clone() as Arc<dyn RoleApiFactory>)
    }
}

/// Mark the stored resource as being deleted
fn start_deletion<K: kube::Resource + Clone>(store: &MemoryStore<K>, name: &str) -> K {
    let mut resource = store.current(NAMESPACE, name).unwrap();
    resource.meta_mut().deletion_timestamp = Some(
        k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now()),
    );
    store.insert(resource.clone());
    resource
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_database_create_and_drop() {
    let name = unique_name("it_pgdb");
    let database = PgDatabaseBuilder::new(&name, NAMESPACE)
        .with_extensions(&["plpgsql"])
        .revoking_public_privileges()
        .dropping_public_schema()
        .with_deletion(true, false)
        .build();
    let live = Live::new(database.clone());

    let action = reconcile_database(Arc::new(database.clone()), live.database_context())
        .await
        .unwrap();
    assert_ne!(action, Action::await_change());

    let stored = live.resources.current(NAMESPACE, &name).unwrap();
    let conditions = stored.status.unwrap().conditions;
    assert_eq!(conditions.status_of(condition_types::DATABASE_EXISTS), Some(true));
    assert_eq!(conditions.status_of(condition_types::EXTENSIONS_INSTALLED), Some(true));
    assert_eq!(
        stored.metadata.finalizers,
        Some(vec![DATABASE_FINALIZER.to_string()])
    );

    // A second pass must be a no-op on the server
    reconcile_database(Arc::new(database), live.database_context())
        .await
        .unwrap();

    let deleting = start_deletion(&live.resources, &name);
    reconcile_database(Arc::new(deleting), live.database_context())
        .await
        .unwrap();
    assert!(live.resources.current(NAMESPACE, &name).is_none());

    let check = CancellationToken::new();
    let api = connect(&check).await;
    assert!(!api.database_exists(&name).await.unwrap());
    check.cancel();
    live.shutdown.cancel();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_user_owns_database() {
    let check = CancellationToken::new();
    let api = connect(&check).await;
    let database = unique_name("it_userdb");
    api.create_database(&database).await.unwrap();

    let role = unique_name("it_user");
    let user = PgUserBuilder::new(&role, NAMESPACE).owning(&database).build();
    let live = Live::new(user.clone());

    reconcile_user(Arc::new(user), live.user_context())
        .await
        .unwrap();

    assert!(api.role_exists(&role).await.unwrap());
    assert_eq!(api.database_owner(&database).await.unwrap(), role);
    let secret = live.objects.stored_secret(NAMESPACE, &role).unwrap();
    assert!(secret_value(&secret, PASSWORD_KEY).is_some());
    let stored = live.resources.current(NAMESPACE, &role).unwrap();
    assert_eq!(
        stored.metadata.finalizers,
        Some(vec![USER_FINALIZER.to_string()])
    );

    let deleting = start_deletion(&live.resources, &role);
    reconcile_user(Arc::new(deleting), live.user_context())
        .await
        .unwrap();
    assert!(!api.role_exists(&role).await.unwrap());
    assert_eq!(
        api.database_owner(&database).await.unwrap(),
        crate::test_connection().username
    );

    api.delete_database(&database).await.unwrap();
    check.cancel();
    live.shutdown.cancel();
}

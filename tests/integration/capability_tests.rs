//! Capability surface against a live server

use tokio_util::sync::CancellationToken;

use postgres_controller::resources::pg_api::{Connector, DatabaseApi, RoleApi, SchemaApi};

use crate::{connect, test_connection, unique_name};

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_connection_and_pool_shutdown() {
    let shutdown = CancellationToken::new();
    let api = connect(&shutdown).await;

    api.test_connection().await.unwrap();
    assert!(api.is_connected());

    shutdown.cancel();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(!api.is_connected());
    assert!(api.test_connection().await.is_err());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_database_lifecycle() {
    let shutdown = CancellationToken::new();
    let api = connect(&shutdown).await;
    let database = unique_name("it_db");

    assert!(!api.database_exists(&database).await.unwrap());
    api.create_database(&database).await.unwrap();
    assert!(api.database_exists(&database).await.unwrap());
    assert_eq!(
        api.database_owner(&database).await.unwrap(),
        test_connection().username
    );

    assert!(api.extension_exists(&database, "plpgsql").await.unwrap());
    assert!(api.schema_exists(&database, "public").await.unwrap());
    api.create_schema(&database, "reporting").await.unwrap();
    assert!(api.is_schema_usable(&database, "reporting").await.unwrap());
    api.update_schema_privileges(&database, "reporting", "public", &strings(&["USAGE"]))
        .await
        .unwrap();
    api.update_default_privileges(&database, "reporting", "public", "TABLES", &strings(&["SELECT"]))
        .await
        .unwrap();
    api.update_privileges_on_all_objects(&database, "reporting", "public", "TABLES", &[])
        .await
        .unwrap();
    api.delete_all_privileges_on_schema(&database, "reporting", "public")
        .await
        .unwrap();
    api.delete_schema(&database, "reporting").await.unwrap();
    assert!(!api.schema_exists(&database, "reporting").await.unwrap());

    api.delete_database(&database).await.unwrap();
    assert!(!api.database_exists(&database).await.unwrap());
    shutdown.cancel();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_role_ownership_round_trip() {
    let shutdown = CancellationToken::new();
    let api = connect(&shutdown).await;
    let admin = test_connection().username;
    let database = unique_name("it_owned");
    let role = unique_name("it_role");

    api.create_database(&database).await.unwrap();
    api.create_role(&role).await.unwrap();
    assert!(api.role_exists(&role).await.unwrap());
    api.update_password(&role, "it's a secret").await.unwrap();

    api.update_database_owner(&database, &role).await.unwrap();
    assert_eq!(api.database_owner(&database).await.unwrap(), role);

    api.reset_database_owner(&database).await.unwrap();
    assert_eq!(api.database_owner(&database).await.unwrap(), admin);

    api.update_database_privileges(&database, &role, &strings(&["CONNECT", "TEMPORARY"]))
        .await
        .unwrap();

    api.delete_role(&role).await.unwrap();
    assert!(!api.role_exists(&role).await.unwrap());
    api.delete_database(&database).await.unwrap();
    shutdown.cancel();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_illegal_privilege_is_rejected_before_sql() {
    let shutdown = CancellationToken::new();
    let api = connect(&shutdown).await;

    let err = api
        .update_database_privileges("postgres", "public", &strings(&["CONNECT; DROP DATABASE postgres"]))
        .await
        .unwrap_err();
    assert!(err.is_illegal_argument());
    assert!(api.database_exists("postgres").await.unwrap());
    shutdown.cancel();
}

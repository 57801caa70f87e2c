//! Capability surfaces over a PostgreSQL instance
//!
//! Controllers depend on the narrow traits defined here ([`Connector`],
//! [`DatabaseApi`], [`SchemaApi`], [`RoleApi`]) and obtain implementations
//! through factory traits, so convergence logic can run against fakes.
//! [`PostgresApi`] implements every capability on top of a
//! [`SessionProvider`].
//!
//! Privilege updates are full replacements: everything is revoked, then
//! exactly the declared list is granted. Statements the administrative role
//! has no right to run are wrapped in [`run_as`].

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::resources::connection_string::ConnectionString;
use crate::resources::postgres_client::{
    PostgresClientResult, PostgresSessions, SessionProvider, SqlSession,
};
use crate::resources::sql::{
    BULK_OBJECT_TYPES, DATABASE_PRIVILEGES, OBJECT_PRIVILEGES, OBJECT_TYPES, SqlError, SqlResult,
    Statement, query_bool, query_text, validate_token, validate_tokens,
};

const IS_MEMBER: &str = "SELECT pg_has_role($1, $2, 'member')";
const DATABASE_EXISTS: &str =
    "SELECT EXISTS(SELECT 1 FROM pg_catalog.pg_database WHERE datname = $1)";
const DATABASE_OWNER: &str = "SELECT pg_catalog.pg_get_userbyid(d.datdba) FROM pg_catalog.pg_database AS d WHERE d.datname = $1";
const EXTENSION_EXISTS: &str =
    "SELECT EXISTS(SELECT 1 FROM pg_catalog.pg_extension WHERE extname = $1)";
const ROLE_EXISTS: &str = "SELECT EXISTS(SELECT 1 FROM pg_catalog.pg_user WHERE usename = $1)";
const SCHEMA_EXISTS: &str =
    "SELECT EXISTS(SELECT 1 FROM pg_catalog.pg_namespace WHERE nspname = $1)";
const SCHEMA_OWNER: &str = "SELECT pg_catalog.pg_get_userbyid(n.nspowner) FROM pg_catalog.pg_namespace AS n WHERE n.nspname = $1";
const SCHEMA_USABLE: &str = "SELECT has_schema_privilege(current_user, $1, 'USAGE')";

/// Connection test surface
#[async_trait]
pub trait Connector: Send + Sync {
    fn connection_string(&self) -> &ConnectionString;

    fn is_connected(&self) -> bool;

    /// Round-trip a trivial query
    async fn test_connection(&self) -> SqlResult<()>;
}

/// Database existence, ownership, privileges and extensions
#[async_trait]
pub trait DatabaseApi: Send + Sync {
    async fn database_exists(&self, database: &str) -> SqlResult<bool>;
    async fn create_database(&self, database: &str) -> SqlResult<()>;
    async fn delete_database(&self, database: &str) -> SqlResult<()>;
    async fn database_owner(&self, database: &str) -> SqlResult<String>;
    /// Transfer ownership to `owner`, elevating to `owner` for the duration
    async fn update_database_owner(&self, database: &str, owner: &str) -> SqlResult<()>;
    /// Hand ownership back to the administrative role
    async fn reset_database_owner(&self, database: &str) -> SqlResult<()>;
    async fn update_database_privileges(
        &self,
        database: &str,
        role: &str,
        privileges: &[String],
    ) -> SqlResult<()>;
    async fn extension_exists(&self, database: &str, extension: &str) -> SqlResult<bool>;
    async fn create_extension(&self, database: &str, extension: &str) -> SqlResult<()>;
}

/// Schemas and the privileges on them and their objects
#[async_trait]
pub trait SchemaApi: Send + Sync {
    async fn schema_exists(&self, database: &str, schema: &str) -> SqlResult<bool>;
    async fn create_schema(&self, database: &str, schema: &str) -> SqlResult<()>;
    async fn delete_schema(&self, database: &str, schema: &str) -> SqlResult<()>;
    /// Whether the connecting role has `USAGE` on the schema
    async fn is_schema_usable(&self, database: &str, schema: &str) -> SqlResult<bool>;
    async fn make_schema_usable(&self, database: &str, schema: &str) -> SqlResult<()>;
    async fn update_schema_privileges(
        &self,
        database: &str,
        schema: &str,
        role: &str,
        privileges: &[String],
    ) -> SqlResult<()>;
    async fn update_default_privileges(
        &self,
        database: &str,
        schema: &str,
        role: &str,
        object_type: &str,
        privileges: &[String],
    ) -> SqlResult<()>;
    async fn update_privileges_on_all_objects(
        &self,
        database: &str,
        schema: &str,
        role: &str,
        object_type: &str,
        privileges: &[String],
    ) -> SqlResult<()>;
    async fn delete_all_privileges_on_schema(
        &self,
        database: &str,
        schema: &str,
        role: &str,
    ) -> SqlResult<()>;
}

/// Login roles
#[async_trait]
pub trait RoleApi: Send + Sync {
    async fn role_exists(&self, role: &str) -> SqlResult<bool>;
    async fn create_role(&self, role: &str) -> SqlResult<()>;
    /// Reassign and drop everything the role owns, then drop the role
    async fn delete_role(&self, role: &str) -> SqlResult<()>;
    async fn update_password(&self, role: &str, password: &str) -> SqlResult<()>;
}

/// What the database controller needs
pub trait DatabaseHandle: Connector + DatabaseApi + SchemaApi {}

impl<T: Connector + DatabaseApi + SchemaApi + ?Sized> DatabaseHandle for T {}

/// What the user controller needs
pub trait UserHandle: Connector + RoleApi + DatabaseApi {}

impl<T: Connector + RoleApi + DatabaseApi + ?Sized> UserHandle for T {}

/// Opens a connection-test handle for an instance
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    async fn connector(
        &self,
        instance: &str,
        connection: &ConnectionString,
        cancel: CancellationToken,
    ) -> PostgresClientResult<Box<dyn Connector>>;
}

/// Opens a database-handling handle for an instance
#[async_trait]
pub trait DatabaseApiFactory: Send + Sync {
    async fn database_api(
        &self,
        instance: &str,
        connection: &ConnectionString,
        cancel: CancellationToken,
    ) -> PostgresClientResult<Box<dyn DatabaseHandle>>;
}

/// Opens a role-handling handle for an instance
#[async_trait]
pub trait RoleApiFactory: Send + Sync {
    async fn role_api(
        &self,
        instance: &str,
        connection: &ConnectionString,
        cancel: CancellationToken,
    ) -> PostgresClientResult<Box<dyn UserHandle>>;
}

/// Run `body` while `me` is a member of `role`
///
/// Membership is granted only if `me` is not already a member and revoked
/// afterwards only if it was granted here, whatever `body` returned. An
/// error from `body` takes precedence over an error from the revoke.
pub async fn run_as<T, F>(session: &dyn SqlSession, me: &str, role: &str, body: F) -> SqlResult<T>
where
    F: Future<Output = SqlResult<T>>,
{
    let is_member = query_bool(session, IS_MEMBER, &[me, role]).await?;
    if !is_member {
        debug!(role = %role, member = %me, "Temporarily granting role membership");
        Statement::new("GRANT {} TO {}")
            .ident(role)
            .ident(me)
            .execute(session)
            .await?;
    }

    let result = body.await;

    if is_member {
        return result;
    }
    let revoked = Statement::new("REVOKE {} FROM {}")
        .ident(role)
        .ident(me)
        .execute(session)
        .await;
    match (result, revoked) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(revoke_error)) => Err(revoke_error),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(revoke_error)) => {
            warn!(role = %role, member = %me, error = %revoke_error, "Failed to revoke temporary role membership");
            Err(error)
        }
    }
}

/// Full-replace grant: revoke everything, then grant the declared list
async fn replace_privileges(
    session: &dyn SqlSession,
    revoke: Statement,
    grant: Option<Statement>,
) -> SqlResult<()> {
    revoke.execute(session).await?;
    if let Some(grant) = grant {
        grant.execute(session).await?;
    }
    Ok(())
}

/// Every capability, backed by real sessions
pub struct PostgresApi<P = PostgresSessions> {
    connection: ConnectionString,
    sessions: P,
}

impl<P: SessionProvider> PostgresApi<P> {
    pub fn new(connection: ConnectionString, sessions: P) -> Self {
        Self {
            connection,
            sessions,
        }
    }

    /// The administrative role every statement runs as
    fn admin(&self) -> &str {
        &self.connection.username
    }

    async fn instance(&self) -> SqlResult<Box<dyn SqlSession>> {
        self.sessions
            .instance_session()
            .await
            .map_err(|e| SqlError::Session {
                database: self.connection.database.clone(),
                source: Box::new(e),
            })
    }

    async fn on_database(&self, database: &str) -> SqlResult<Box<dyn SqlSession>> {
        self.sessions
            .database_session(database)
            .await
            .map_err(|e| SqlError::Session {
                database: database.to_string(),
                source: Box::new(e),
            })
    }
}

impl PostgresApi<PostgresSessions> {
    /// Open a pooled connection to an instance
    pub async fn connect(
        instance: &str,
        connection: &ConnectionString,
        pool_size: usize,
        cancel: CancellationToken,
    ) -> PostgresClientResult<Self> {
        let sessions = PostgresSessions::connect(instance, connection, pool_size, cancel).await?;
        Ok(Self::new(connection.clone(), sessions))
    }
}

#[async_trait]
impl<P: SessionProvider> Connector for PostgresApi<P> {
    fn connection_string(&self) -> &ConnectionString {
        &self.connection
    }

    fn is_connected(&self) -> bool {
        self.sessions.is_open()
    }

    async fn test_connection(&self) -> SqlResult<()> {
        let session = self.instance().await?;
        Statement::new("SELECT 1").execute(session.as_ref()).await
    }
}

#[async_trait]
impl<P: SessionProvider> DatabaseApi for PostgresApi<P> {
    async fn database_exists(&self, database: &str) -> SqlResult<bool> {
        let session = self.instance().await?;
        query_bool(session.as_ref(), DATABASE_EXISTS, &[database]).await
    }

    async fn create_database(&self, database: &str) -> SqlResult<()> {
        let session = self.instance().await?;
        Statement::new("CREATE DATABASE {}")
            .ident(database)
            .execute(session.as_ref())
            .await
    }

    async fn delete_database(&self, database: &str) -> SqlResult<()> {
        let session = self.instance().await?;
        Statement::new("DROP DATABASE {}")
            .ident(database)
            .execute(session.as_ref())
            .await
    }

    async fn database_owner(&self, database: &str) -> SqlResult<String> {
        let session = self.instance().await?;
        query_text(session.as_ref(), DATABASE_OWNER, &[database])
            .await?
            .ok_or_else(|| SqlError::NotFound {
                kind: "Database",
                name: database.to_string(),
            })
    }

    async fn update_database_owner(&self, database: &str, owner: &str) -> SqlResult<()> {
        let session = self.instance().await?;
        let session = session.as_ref();
        let alter = Statement::new("ALTER DATABASE {} OWNER TO {}")
            .ident(database)
            .ident(owner);
        run_as(session, self.admin(), owner, alter.execute(session)).await
    }

    async fn reset_database_owner(&self, database: &str) -> SqlResult<()> {
        let current = self.database_owner(database).await?;
        let session = self.instance().await?;
        let session = session.as_ref();
        let alter = Statement::new("ALTER DATABASE {} OWNER TO {}")
            .ident(database)
            .ident(self.admin());
        run_as(session, self.admin(), &current, alter.execute(session)).await
    }

    async fn update_database_privileges(
        &self,
        database: &str,
        role: &str,
        privileges: &[String],
    ) -> SqlResult<()> {
        validate_tokens("privileges", privileges, DATABASE_PRIVILEGES)?;
        let session = self.instance().await?;
        let revoke = Statement::new("REVOKE ALL ON DATABASE {} FROM {}")
            .ident(database)
            .ident(role);
        let grant = (!privileges.is_empty()).then(|| {
            Statement::new("GRANT {} ON DATABASE {} TO {}")
                .keyword(privileges.join(", "))
                .ident(database)
                .ident(role)
        });
        replace_privileges(session.as_ref(), revoke, grant).await
    }

    async fn extension_exists(&self, database: &str, extension: &str) -> SqlResult<bool> {
        let session = self.on_database(database).await?;
        query_bool(session.as_ref(), EXTENSION_EXISTS, &[extension]).await
    }

    async fn create_extension(&self, database: &str, extension: &str) -> SqlResult<()> {
        let session = self.on_database(database).await?;
        Statement::new("CREATE EXTENSION {}")
            .ident(extension)
            .execute(session.as_ref())
            .await
    }
}

#[async_trait]
impl<P: SessionProvider> SchemaApi for PostgresApi<P> {
    async fn schema_exists(&self, database: &str, schema: &str) -> SqlResult<bool> {
        let session = self.on_database(database).await?;
        query_bool(session.as_ref(), SCHEMA_EXISTS, &[schema]).await
    }

    async fn create_schema(&self, database: &str, schema: &str) -> SqlResult<()> {
        let session = self.on_database(database).await?;
        Statement::new("CREATE SCHEMA {}")
            .ident(schema)
            .execute(session.as_ref())
            .await
    }

    async fn delete_schema(&self, database: &str, schema: &str) -> SqlResult<()> {
        let session = self.on_database(database).await?;
        Statement::new("DROP SCHEMA {}")
            .ident(schema)
            .execute(session.as_ref())
            .await
    }

    async fn is_schema_usable(&self, database: &str, schema: &str) -> SqlResult<bool> {
        let session = self.on_database(database).await?;
        query_bool(session.as_ref(), SCHEMA_USABLE, &[schema]).await
    }

    async fn make_schema_usable(&self, database: &str, schema: &str) -> SqlResult<()> {
        let session = self.on_database(database).await?;
        let session = session.as_ref();
        let owner = query_text(session, SCHEMA_OWNER, &[schema])
            .await?
            .ok_or_else(|| SqlError::NotFound {
                kind: "Schema",
                name: schema.to_string(),
            })?;
        let grant = Statement::new("GRANT USAGE ON SCHEMA {} TO {}")
            .ident(schema)
            .ident(self.admin());
        run_as(session, self.admin(), &owner, grant.execute(session)).await
    }

    async fn update_schema_privileges(
        &self,
        database: &str,
        schema: &str,
        role: &str,
        privileges: &[String],
    ) -> SqlResult<()> {
        validate_tokens("privileges", privileges, OBJECT_PRIVILEGES)?;
        let session = self.on_database(database).await?;
        let revoke = Statement::new("REVOKE ALL ON SCHEMA {} FROM {}")
            .ident(schema)
            .ident(role);
        let grant = (!privileges.is_empty()).then(|| {
            Statement::new("GRANT {} ON SCHEMA {} TO {}")
                .keyword(privileges.join(", "))
                .ident(schema)
                .ident(role)
        });
        replace_privileges(session.as_ref(), revoke, grant).await
    }

    async fn update_default_privileges(
        &self,
        database: &str,
        schema: &str,
        role: &str,
        object_type: &str,
        privileges: &[String],
    ) -> SqlResult<()> {
        validate_token("typeName", object_type, OBJECT_TYPES)?;
        validate_tokens("privileges", privileges, OBJECT_PRIVILEGES)?;
        let session = self.on_database(database).await?;
        let revoke = Statement::new("ALTER DEFAULT PRIVILEGES IN SCHEMA {} REVOKE ALL ON {} FROM {}")
            .ident(schema)
            .keyword(object_type)
            .ident(role);
        let grant = (!privileges.is_empty()).then(|| {
            Statement::new("ALTER DEFAULT PRIVILEGES IN SCHEMA {} GRANT {} ON {} TO {}")
                .ident(schema)
                .keyword(privileges.join(", "))
                .keyword(object_type)
                .ident(role)
        });
        replace_privileges(session.as_ref(), revoke, grant).await
    }

    async fn update_privileges_on_all_objects(
        &self,
        database: &str,
        schema: &str,
        role: &str,
        object_type: &str,
        privileges: &[String],
    ) -> SqlResult<()> {
        validate_token("typeName", object_type, BULK_OBJECT_TYPES)?;
        validate_tokens("privileges", privileges, OBJECT_PRIVILEGES)?;
        let session = self.on_database(database).await?;
        let revoke = Statement::new("REVOKE ALL ON ALL {} IN SCHEMA {} FROM {}")
            .keyword(object_type)
            .ident(schema)
            .ident(role);
        let grant = (!privileges.is_empty()).then(|| {
            Statement::new("GRANT {} ON ALL {} IN SCHEMA {} TO {}")
                .keyword(privileges.join(", "))
                .keyword(object_type)
                .ident(schema)
                .ident(role)
        });
        replace_privileges(session.as_ref(), revoke, grant).await
    }

    async fn delete_all_privileges_on_schema(
        &self,
        database: &str,
        schema: &str,
        role: &str,
    ) -> SqlResult<()> {
        let session = self.on_database(database).await?;
        Statement::new("REVOKE ALL ON SCHEMA {} FROM {}")
            .ident(schema)
            .ident(role)
            .execute(session.as_ref())
            .await
    }
}

#[async_trait]
impl<P: SessionProvider> RoleApi for PostgresApi<P> {
    async fn role_exists(&self, role: &str) -> SqlResult<bool> {
        let session = self.instance().await?;
        query_bool(session.as_ref(), ROLE_EXISTS, &[role]).await
    }

    async fn create_role(&self, role: &str) -> SqlResult<()> {
        let session = self.instance().await?;
        Statement::new("CREATE USER {}")
            .ident(role)
            .execute(session.as_ref())
            .await
    }

    async fn delete_role(&self, role: &str) -> SqlResult<()> {
        let session = self.instance().await?;
        let session = session.as_ref();
        let admin = self.admin();
        run_as(session, admin, role, async {
            Statement::new("REASSIGN OWNED BY {} TO {}")
                .ident(role)
                .ident(admin)
                .execute(session)
                .await?;
            Statement::new("DROP OWNED BY {}")
                .ident(role)
                .execute(session)
                .await
        })
        .await?;
        Statement::new("DROP USER {}")
            .ident(role)
            .execute(session)
            .await
    }

    async fn update_password(&self, role: &str, password: &str) -> SqlResult<()> {
        let session = self.instance().await?;
        Statement::new("ALTER USER {} WITH PASSWORD {} LOGIN")
            .ident(role)
            .secret(password)
            .execute(session.as_ref())
            .await
    }
}

/// Factory handing out [`PostgresApi`] handles backed by real pools
#[derive(Clone, Debug)]
pub struct PostgresApiFactory {
    pool_size: usize,
}

impl PostgresApiFactory {
    pub fn new(pool_size: usize) -> Self {
        Self { pool_size }
    }

    async fn open(
        &self,
        instance: &str,
        connection: &ConnectionString,
        cancel: CancellationToken,
    ) -> PostgresClientResult<PostgresApi> {
        PostgresApi::connect(instance, connection, self.pool_size, cancel).await
    }
}

impl Default for PostgresApiFactory {
    fn default() -> Self {
        Self::new(4)
    }
}

#[async_trait]
impl ConnectorFactory for PostgresApiFactory {
    async fn connector(
        &self,
        instance: &str,
        connection: &ConnectionString,
        cancel: CancellationToken,
    ) -> PostgresClientResult<Box<dyn Connector>> {
        Ok(Box::new(self.open(instance, connection, cancel).await?))
    }
}

#[async_trait]
impl DatabaseApiFactory for PostgresApiFactory {
    async fn database_api(
        &self,
        instance: &str,
        connection: &ConnectionString,
        cancel: CancellationToken,
    ) -> PostgresClientResult<Box<dyn DatabaseHandle>> {
        Ok(Box::new(self.open(instance, connection, cancel).await?))
    }
}

#[async_trait]
impl RoleApiFactory for PostgresApiFactory {
    async fn role_api(
        &self,
        instance: &str,
        connection: &ConnectionString,
        cancel: CancellationToken,
    ) -> PostgresClientResult<Box<dyn UserHandle>> {
        Ok(Box::new(self.open(instance, connection, cancel).await?))
    }
}

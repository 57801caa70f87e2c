//! Reconciler for PgDatabase resources
//!
//! Convergence runs in a fixed order and stops at the first failing step:
//! 1. create the database if it is missing
//! 2. install missing extensions
//! 3. converge schema and default privileges, block by block
//! 4. revoke `public` privileges if requested
//! 5. drop the `public` schema if requested
//! 6. add the finalizer
//!
//! Every step is idempotent, so a retried cycle simply starts over.

use std::sync::Arc;
use std::time::Instant;

use kube::ResourceExt;
use kube::runtime::controller::Action;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::controller::context::DatabaseContext;
use crate::controller::error::{Error, Result};
use crate::controller::finalizer::{
    DATABASE_FINALIZER, add_finalizer, has_finalizer, is_deleting, remove_finalizer,
};
use crate::controller::status::{NO_MESSAGE, StatusTracker, condition_types, reasons};
use crate::crd::{PgDatabase, SchemaPrivileges};
use crate::resources::pg_api::DatabaseHandle;

const KIND: &str = "PgDatabase";
const PUBLIC: &str = "public";

#[instrument(skip(database, ctx), fields(name = %database.name_any(), namespace = database.namespace().unwrap_or_default()))]
pub async fn reconcile_database(
    database: Arc<PgDatabase>,
    ctx: Arc<DatabaseContext>,
) -> Result<Action> {
    let start = Instant::now();
    let name = database.name_any();
    let namespace = database
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;

    let result = reconcile(&ctx, &namespace, &name).await;
    ctx.record(KIND, &namespace, &name, start, result.is_ok());
    result
}

async fn reconcile(ctx: &DatabaseContext, namespace: &str, name: &str) -> Result<Action> {
    let cancel = ctx.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    let Some(database) = ctx.resources.get(namespace, name).await? else {
        info!("Deleted PgDatabase");
        return Ok(Action::await_change());
    };
    let instance = database.spec.instance.name.clone();
    debug!(instance = %instance, "Reconciling database");
    let mut status = StatusTracker::new(ctx.resources.as_ref(), database);

    let api = match connect(ctx, status.resource(), namespace, cancel).await {
        Ok(api) => {
            status
                .set(
                    condition_types::CONNECTED,
                    true,
                    reasons::CONNECTION_SUCCEEDED,
                    NO_MESSAGE,
                )
                .await?;
            api
        }
        Err(e) => {
            error!(instance = %instance, error = %e, "Unable to connect");
            if let Err(status_error) = status
                .set(
                    condition_types::CONNECTED,
                    false,
                    reasons::CONNECTION_FAILED,
                    &e.to_string(),
                )
                .await
            {
                error!(error = %status_error, "Unable to update condition");
            }
            return Err(e);
        }
    };
    let api = api.as_ref();

    if is_deleting(status.resource()) {
        return finalize(ctx, &mut status, api).await;
    }

    converge_database(&mut status, api, name).await?;
    converge_extensions(&mut status, api, name).await?;
    converge_default_privileges(api, name, &status.resource().spec.default_privileges).await?;
    if status.resource().spec.public_privileges.revoke {
        revoke_public_privileges(api, name).await?;
    }
    if status.resource().spec.public_schema.drop {
        drop_public_schema(api, name).await?;
    }

    if !has_finalizer(status.resource(), DATABASE_FINALIZER) {
        add_finalizer(ctx.resources.as_ref(), status.resource(), DATABASE_FINALIZER).await?;
    }

    info!(instance = %instance, "Processed database");
    Ok(ctx.settings.converged())
}

async fn connect(
    ctx: &DatabaseContext,
    database: &PgDatabase,
    namespace: &str,
    cancel: CancellationToken,
) -> Result<Box<dyn DatabaseHandle>> {
    let (instance, connection) = ctx
        .resolve_instance(&database.spec.instance, namespace)
        .await?;
    ctx.factory
        .database_api(&instance, &connection, cancel)
        .await
        .map_err(|source| Error::Connection { instance, source })
}

/// Drop or wait for the database, then release the finalizer
async fn finalize(
    ctx: &DatabaseContext,
    status: &mut StatusTracker<'_, PgDatabase>,
    api: &dyn DatabaseHandle,
) -> Result<Action> {
    let name = status.resource().name_any();
    let deletion = status.resource().spec.deletion.clone();

    if deletion.drop {
        if api.database_exists(&name).await? {
            api.delete_database(&name).await?;
            info!(database = %name, "Dropped database");
        }
        status
            .set(
                condition_types::DATABASE_EXISTS,
                false,
                reasons::DATABASE_MISSING,
                "Database was deleted",
            )
            .await?;
    }

    if deletion.wait && api.database_exists(&name).await? {
        info!(database = %name, "Database still exists, waiting for database to be dropped");
        return Ok(Action::requeue(ctx.settings.retry_delay));
    }

    if has_finalizer(status.resource(), DATABASE_FINALIZER) {
        remove_finalizer(ctx.resources.as_ref(), status.resource(), DATABASE_FINALIZER).await?;
        info!("Removed finalizer, database resource can now be deleted");
    }
    Ok(Action::await_change())
}

async fn converge_database(
    status: &mut StatusTracker<'_, PgDatabase>,
    api: &dyn DatabaseHandle,
    name: &str,
) -> Result<()> {
    if !api.database_exists(name).await? {
        api.create_database(name).await?;
        info!(database = %name, "Created database");
    }
    status
        .set(
            condition_types::DATABASE_EXISTS,
            true,
            reasons::DATABASE_EXISTS,
            NO_MESSAGE,
        )
        .await?;
    Ok(())
}

/// Install every missing extension
///
/// A failing extension does not stop the loop; the failures are reported
/// together once all extensions were tried.
async fn converge_extensions(
    status: &mut StatusTracker<'_, PgDatabase>,
    api: &dyn DatabaseHandle,
    database: &str,
) -> Result<()> {
    let extensions = status.resource().spec.extensions.clone();
    let mut failures = Vec::new();

    for extension in &extensions {
        let installed = match api.extension_exists(database, extension).await {
            Ok(true) => Ok(()),
            Ok(false) => api.create_extension(database, extension).await.map(|()| {
                info!(database = %database, extension = %extension, "Created extension");
            }),
            Err(e) => Err(e),
        };
        if let Err(e) = installed {
            warn!(database = %database, extension = %extension, error = %e, "Unable to create extension");
            status
                .set(
                    condition_types::EXTENSIONS_INSTALLED,
                    false,
                    &reasons::missing_extension(extension),
                    &format!("The database extension {extension} cannot be created\n{e}"),
                )
                .await?;
            failures.push((extension.clone(), e));
        }
    }

    if !failures.is_empty() {
        return Err(Error::ExtensionsMissing(failures));
    }
    status
        .set(
            condition_types::EXTENSIONS_INSTALLED,
            true,
            reasons::ALL_EXTENSIONS_PRESENT,
            NO_MESSAGE,
        )
        .await?;
    Ok(())
}

async fn converge_default_privileges(
    api: &dyn DatabaseHandle,
    database: &str,
    blocks: &[SchemaPrivileges],
) -> Result<()> {
    for block in blocks {
        let schema = block.name.as_str();
        if !api.schema_exists(database, schema).await? {
            return Err(Error::SchemaNotFound {
                schema: schema.to_string(),
                database: database.to_string(),
            });
        }
        if !api.is_schema_usable(database, schema).await? {
            api.make_schema_usable(database, schema).await?;
            debug!(database = %database, schema = %schema, "Granted schema usage to the administrative role");
        }

        for role in &block.roles {
            api.update_schema_privileges(database, schema, role, &block.privileges)
                .await?;
            for (object_type, privileges) in block.object_privileges() {
                api.update_default_privileges(database, schema, role, object_type, privileges)
                    .await?;
                api.update_privileges_on_all_objects(
                    database,
                    schema,
                    role,
                    object_type,
                    privileges,
                )
                .await?;
            }
            api.update_default_privileges(database, schema, role, "TYPES", &block.type_privileges)
                .await?;
            debug!(database = %database, schema = %schema, role = %role, "Updated privileges");
        }
    }
    Ok(())
}

async fn revoke_public_privileges(api: &dyn DatabaseHandle, database: &str) -> Result<()> {
    api.update_database_privileges(database, PUBLIC, &[]).await?;
    if api.schema_exists(database, PUBLIC).await? {
        api.delete_all_privileges_on_schema(database, PUBLIC, PUBLIC)
            .await?;
    }
    debug!(database = %database, "Revoked public privileges");
    Ok(())
}

async fn drop_public_schema(api: &dyn DatabaseHandle, database: &str) -> Result<()> {
    if api.schema_exists(database, PUBLIC).await? {
        api.delete_schema(database, PUBLIC).await?;
        info!(database = %database, "Dropped public schema");
    }
    Ok(())
}

pub fn database_error_policy(
    database: Arc<PgDatabase>,
    error: &Error,
    ctx: Arc<DatabaseContext>,
) -> Action {
    let delay = error.requeue_after(&ctx.settings);
    if error.is_permanent() {
        error!(name = %database.name_any(), error = %error, delay = ?delay, "Database reconciliation failed, fix the resource to recover");
    } else {
        warn!(name = %database.name_any(), error = %error, delay = ?delay, "Database reconciliation failed");
    }
    Action::requeue(delay)
}

//! Reconciler for PgUser resources
//!
//! Convergence order:
//! 1. create the login role if it is missing
//! 2. create or refresh the credential Secret
//! 3. push the password into the role
//! 4. converge ownership and privileges of every attached database
//! 5. add the finalizer

use std::sync::Arc;
use std::time::Instant;

use kube::ResourceExt;
use kube::runtime::controller::Action;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::controller::context::UserContext;
use crate::controller::error::{Error, Result};
use crate::controller::finalizer::{
    USER_FINALIZER, add_finalizer, has_finalizer, is_deleting, remove_finalizer,
};
use crate::controller::status::{NO_MESSAGE, StatusTracker, condition_types, reasons};
use crate::crd::{DatabaseAttachment, PgUser};
use crate::resources::pg_api::UserHandle;
use crate::resources::secret::{credentials_secret, generate_password, read_password};

const KIND: &str = "PgUser";

#[instrument(skip(user, ctx), fields(name = %user.name_any(), namespace = user.namespace().unwrap_or_default()))]
pub async fn reconcile_user(user: Arc<PgUser>, ctx: Arc<UserContext>) -> Result<Action> {
    let start = Instant::now();
    let name = user.name_any();
    let namespace = user
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;

    let result = reconcile(&ctx, &namespace, &name).await;
    ctx.record(KIND, &namespace, &name, start, result.is_ok());
    result
}

async fn reconcile(ctx: &UserContext, namespace: &str, name: &str) -> Result<Action> {
    let cancel = ctx.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    let Some(user) = ctx.resources.get(namespace, name).await? else {
        info!("Deleted PgUser");
        return Ok(Action::await_change());
    };
    let instance = user.spec.instance.name.clone();
    debug!(instance = %instance, "Reconciling user");
    let mut status = StatusTracker::new(ctx.resources.as_ref(), user);

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
        return finalize(ctx, &mut status, api, namespace).await;
    }

    if !api.role_exists(name).await? {
        api.create_role(name).await?;
        info!(role = %name, "Created login role");
    }
    status
        .set(
            condition_types::LOGIN_ROLE_EXISTS,
            true,
            reasons::LOGIN_ROLE_EXISTS,
            NO_MESSAGE,
        )
        .await?;

    let password = apply_secret(ctx, status.resource(), api, namespace).await?;
    api.update_password(name, &password).await?;
    debug!(role = %name, "Updated login role password");

    match converge_attachments(api, name, &status.resource().spec.databases).await {
        Ok(()) => {
            status
                .set(
                    condition_types::DATABASE_ATTACHMENTS_READY,
                    true,
                    reasons::ATTACHMENTS_CONVERGED,
                    NO_MESSAGE,
                )
                .await?;
        }
        Err(e) => {
            if let Err(status_error) = status
                .set(
                    condition_types::DATABASE_ATTACHMENTS_READY,
                    false,
                    reasons::ATTACHMENT_FAILED,
                    &e.to_string(),
                )
                .await
            {
                error!(error = %status_error, "Unable to update condition");
            }
            return Err(e);
        }
    }

    if !has_finalizer(status.resource(), USER_FINALIZER) {
        add_finalizer(ctx.resources.as_ref(), status.resource(), USER_FINALIZER).await?;
    }

    info!(instance = %instance, "Processed user");
    Ok(ctx.settings.converged())
}

async fn connect(
    ctx: &UserContext,
    user: &PgUser,
    namespace: &str,
    cancel: CancellationToken,
) -> Result<Box<dyn UserHandle>> {
    let (instance, connection) = ctx.resolve_instance(&user.spec.instance, namespace).await?;
    ctx.factory
        .role_api(&instance, &connection, cancel)
        .await
        .map_err(|source| Error::Connection { instance, source })
}

/// Write the credential Secret and return the password it holds
///
/// An existing password is kept; a new one is generated only when the
/// Secret, or its password entry, does not exist yet.
async fn apply_secret(
    ctx: &UserContext,
    user: &PgUser,
    api: &dyn UserHandle,
    namespace: &str,
) -> Result<String> {
    let secret_name = user.secret_name();
    let existing = ctx.objects.secret(namespace, &secret_name).await?;
    let password = match existing.as_ref().and_then(read_password) {
        Some(password) => password,
        None => {
            info!(secret = %secret_name, "Generating password for login role");
            generate_password()
        }
    };

    let secret = credentials_secret(user, api.connection_string(), &password);
    ctx.objects.apply_secret(&secret).await?;
    debug!(secret = %secret_name, "Applied credential secret");
    Ok(password)
}

async fn converge_attachments(
    api: &dyn UserHandle,
    role: &str,
    attachments: &[DatabaseAttachment],
) -> Result<()> {
    for attachment in attachments {
        let database = attachment.name.as_str();
        if !api.database_exists(database).await? {
            return Err(Error::DatabaseNotFound(database.to_string()));
        }

        let owner = api.database_owner(database).await?;
        let is_owner = owner == role;
        if attachment.is_owner() && !is_owner {
            api.update_database_owner(database, role).await?;
            info!(database = %database, owner = %role, "Transferred database ownership");
        } else if is_owner && !attachment.is_owner() {
            api.reset_database_owner(database).await?;
            info!(database = %database, previous_owner = %role, "Reset database ownership");
        }

        if !attachment.is_owner() {
            api.update_database_privileges(database, role, &attachment.privileges)
                .await?;
            debug!(database = %database, role = %role, "Updated database privileges");
        }
    }
    Ok(())
}

/// Drop the role and its Secret, then release the finalizer
async fn finalize(
    ctx: &UserContext,
    status: &mut StatusTracker<'_, PgUser>,
    api: &dyn UserHandle,
    namespace: &str,
) -> Result<Action> {
    let role = status.resource().name_any();

    if api.role_exists(&role).await? {
        api.delete_role(&role).await?;
        info!(role = %role, "Dropped login role");
    }
    status
        .set(
            condition_types::LOGIN_ROLE_EXISTS,
            false,
            reasons::LOGIN_ROLE_DELETED,
            NO_MESSAGE,
        )
        .await?;

    let secret_name = status.resource().secret_name();
    ctx.objects.delete_secret(namespace, &secret_name).await?;
    debug!(secret = %secret_name, "Deleted credential secret");

    if has_finalizer(status.resource(), USER_FINALIZER) {
        remove_finalizer(ctx.resources.as_ref(), status.resource(), USER_FINALIZER).await?;
        info!("Removed finalizer, user resource can now be deleted");
    }
    Ok(Action::await_change())
}

pub fn user_error_policy(user: Arc<PgUser>, error: &Error, ctx: Arc<UserContext>) -> Action {
    let delay = error.requeue_after(&ctx.settings);
    if error.is_permanent() {
        error!(name = %user.name_any(), error = %error, delay = ?delay, "User reconciliation failed, fix the resource to recover");
    } else {
        warn!(name = %user.name_any(), error = %error, delay = ?delay, "User reconciliation failed");
    }
    Action::requeue(delay)
}

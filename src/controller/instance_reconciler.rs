//! Reconciler for PgInstance resources
//!
//! An instance owns no PostgreSQL objects; reconciling it only tests the
//! connection and reports the outcome in the `connected` condition.

use std::sync::Arc;
use std::time::Instant;

use kube::ResourceExt;
use kube::runtime::controller::Action;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::controller::context::InstanceContext;
use crate::controller::error::{Error, Result};
use crate::controller::status::{NO_MESSAGE, StatusTracker, condition_types, reasons};
use crate::crd::PgInstance;
use crate::resources::pg_api::Connector;

const KIND: &str = "PgInstance";

#[instrument(skip(instance, ctx), fields(name = %instance.name_any(), namespace = instance.namespace().unwrap_or_default()))]
pub async fn reconcile_instance(
    instance: Arc<PgInstance>,
    ctx: Arc<InstanceContext>,
) -> Result<Action> {
    let start = Instant::now();
    let name = instance.name_any();
    let namespace = instance
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;

    let result = reconcile(&ctx, &namespace, &name).await;
    ctx.record(KIND, &namespace, &name, start, result.is_ok());
    result
}

async fn reconcile(ctx: &InstanceContext, namespace: &str, name: &str) -> Result<Action> {
    let cancel = ctx.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    let Some(instance) = ctx.resources.get(namespace, name).await? else {
        debug!("PgInstance no longer exists");
        return Ok(Action::await_change());
    };
    debug!("Reconciling instance");
    let mut status = StatusTracker::new(ctx.resources.as_ref(), instance);

    let connected = connect(ctx, status.resource(), namespace, name, cancel).await;
    if let Some(health) = &ctx.health {
        health
            .metrics
            .set_instance_connected(namespace, name, connected.is_ok());
    }
    match connected {
        Ok(()) => {
            status
                .set(
                    condition_types::CONNECTED,
                    true,
                    reasons::CONNECTION_SUCCEEDED,
                    NO_MESSAGE,
                )
                .await?;
            info!("Processed instance");
            Ok(ctx.settings.converged())
        }
        Err(e) => {
            warn!(error = %e, "Unable to connect to instance");
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
            Err(e)
        }
    }
}

async fn connect(
    ctx: &InstanceContext,
    instance: &PgInstance,
    namespace: &str,
    name: &str,
    cancel: CancellationToken,
) -> Result<()> {
    let connection = instance
        .spec
        .connection_string(ctx.objects.as_ref(), namespace)
        .await?;
    let instance_id = format!("{namespace}/{name}");
    let connector: Box<dyn Connector> = ctx
        .factory
        .connector(&instance_id, &connection, cancel)
        .await
        .map_err(|source| Error::Connection {
            instance: instance_id.clone(),
            source,
        })?;
    connector.test_connection().await?;
    debug!(host = %connector.connection_string().host, "Connection test succeeded");
    Ok(())
}

pub fn instance_error_policy(
    instance: Arc<PgInstance>,
    error: &Error,
    ctx: Arc<InstanceContext>,
) -> Action {
    let delay = error.requeue_after(&ctx.settings);
    if error.is_permanent() {
        error!(name = %instance.name_any(), error = %error, delay = ?delay, "Instance reconciliation failed, fix the resource to recover");
    } else {
        warn!(name = %instance.name_any(), error = %error, delay = ?delay, "Instance reconciliation failed");
    }
    Action::requeue(delay)
}

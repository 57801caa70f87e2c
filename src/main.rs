use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use postgres_controller::health::{HealthState, run_health_server};
use postgres_controller::resources::PostgresApiFactory;
use postgres_controller::resources::pg_api::{
    ConnectorFactory, DatabaseApiFactory, RoleApiFactory,
};
use postgres_controller::{
    DatabaseContext, InstanceContext, OperatorConfig, UserContext, kube_context,
    run_database_controller_scoped, run_instance_controller_scoped, run_user_controller_scoped,
};

/// Grace period for in-flight reconciliations to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install the TLS crypto provider before any TLS operations
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
        && rustls::crypto::CryptoProvider::get_default().is_none()
    {
        return Err("Failed to install rustls crypto provider and no provider is available".into());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("postgres_controller=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .init();

    let config = OperatorConfig::from_env()?;
    info!(
        namespace = config.namespace.as_deref().unwrap_or("cluster-wide"),
        pool_max_size = config.pool_max_size,
        "Starting postgres-controller"
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let health_state = Arc::new(HealthState::new());
    let shutdown = CancellationToken::new();

    let health_handle = {
        let health_state = health_state.clone();
        let address = config.health_address;
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, address, shutdown).await {
                error!(error = %e, "Health server error");
            }
        })
    };

    let factory = Arc::new(PostgresApiFactory::new(config.pool_max_size));
    let namespace = config.namespace.clone();

    let instance_ctx: Arc<InstanceContext> = Arc::new(kube_context(
        client.clone(),
        factory.clone() as Arc<dyn ConnectorFactory>,
        &config,
        shutdown.clone(),
        Some(health_state.clone()),
    ));
    let database_ctx: Arc<DatabaseContext> = Arc::new(kube_context(
        client.clone(),
        factory.clone() as Arc<dyn DatabaseApiFactory>,
        &config,
        shutdown.clone(),
        Some(health_state.clone()),
    ));
    let user_ctx: Arc<UserContext> = Arc::new(kube_context(
        client.clone(),
        factory as Arc<dyn RoleApiFactory>,
        &config,
        shutdown.clone(),
        Some(health_state.clone()),
    ));

    let instance_handle = {
        let client = client.clone();
        let namespace = namespace.clone();
        tokio::spawn(async move {
            run_instance_controller_scoped(client, instance_ctx, namespace.as_deref()).await;
        })
    };
    let database_handle = {
        let client = client.clone();
        let namespace = namespace.clone();
        tokio::spawn(async move {
            run_database_controller_scoped(client, database_ctx, namespace.as_deref()).await;
        })
    };
    let user_handle = tokio::spawn(async move {
        run_user_controller_scoped(client, user_ctx, namespace.as_deref()).await;
    });

    health_state.set_ready(true).await;

    tokio::select! {
        result = instance_handle => {
            if let Err(e) = result {
                error!(error = %e, "Instance controller task panicked");
            }
        }
        result = database_handle => {
            if let Err(e) = result {
                error!(error = %e, "Database controller task panicked");
            }
        }
        result = user_handle => {
            if let Err(e) = result {
                error!(error = %e, "User controller task panicked");
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!(error = %e, "Health server task panicked");
            }
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            health_state.set_ready(false).await;
            info!("Marked operator as not ready");

            info!(
                grace_period_secs = SHUTDOWN_GRACE_PERIOD_SECS,
                "Waiting for in-flight reconciliations to complete"
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;
        }
    }

    // Closes every connection pool still open
    shutdown.cancel();

    info!("Operator stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

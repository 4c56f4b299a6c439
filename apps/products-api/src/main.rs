//! Products API - REST server and inventory workers

use axum_helpers::{JwtAuth, RequiredRole, ShutdownCoordinator, create_app, health_router};
use core_config::FromEnv;
use core_config::tracing::{init_tracing, install_color_eyre};
use database::postgres::{self, run_migrations};
use eyre::WrapErr;
use migration::Migrator;
use products_api::api;
use products_api::config::Config;
use products_api::state::AppState;
use products_api::worker::spawn_inventory_workers;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    install_color_eyre();

    let config = Config::from_env().wrap_err("Failed to load configuration")?;
    init_tracing(&config.environment);

    info!(
        name = config.app.name,
        version = config.app.version,
        environment = ?config.environment,
        "Starting Products API"
    );

    stream_worker::init_metrics().wrap_err("Failed to install metrics recorder")?;

    let db = postgres::connect_from_config_with_retry(config.postgres.clone(), None)
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;

    if config.run_migrations {
        run_migrations::<Migrator>(&db, config.app.name)
            .await
            .wrap_err("Failed to run migrations")?;
    }

    let redis = database::redis::connect_from_config_with_retry(&config.redis, None)
        .await
        .wrap_err("Failed to connect to Redis")?;

    let state = AppState::new(config.clone(), db, redis);
    let coordinator = ShutdownCoordinator::new();

    let mut workers = if config.inventory.enabled {
        let client = database::redis::client_from_config(&config.redis)
            .wrap_err("Invalid Redis configuration")?;
        spawn_inventory_workers(
            &client,
            &state.redis,
            &state.catalog,
            &config.inventory,
            coordinator.subscribe(),
        )
        .await
        .wrap_err("Failed to start inventory workers")?
    } else {
        warn!("Inventory workers disabled");
        Default::default()
    };

    let router = products_api::build_api(
        state.catalog.clone(),
        JwtAuth::new(&config.jwt),
        RequiredRole::new(&config.privileged_role),
        config.server.request_timeout,
    )?
    .merge(health_router(config.app))
    .merge(api::health::router(state.clone()));

    let served = create_app(router, &config.server, coordinator.clone()).await;

    // The server may also stop on its own error; workers follow either way.
    coordinator.shutdown();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Inventory worker failed"),
            Err(e) => error!(error = %e, "Inventory worker panicked"),
        }
    }

    info!("Closing database connections");
    if let Err(e) = state.db.clone().close().await {
        warn!(error = %e, "Failed to close PostgreSQL pool cleanly");
    }

    served.wrap_err("Server error")?;
    info!("Products API shutdown complete");
    Ok(())
}

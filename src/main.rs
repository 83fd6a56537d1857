//! Worksage plan upgrade service binary.

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use worksage::adapters::auth::{JwtConfig, JwtSessionValidator};
use worksage::adapters::http::{api_router, AuthState, PlansAppState};
use worksage::adapters::khalti::{KhaltiConfig, KhaltiGateway};
use worksage::adapters::postgres::{PostgresUpgradeRecordStore, PostgresUserPlanStore};
use worksage::adapters::ExpirySweeper;
use worksage::application::handlers::upgrade::{
    ExpireStaleUpgradesHandler, UpgradeSettings, VerifyAndApplyHandler,
};
use worksage::config::{AppConfig, ConfigError, ValidationError};
use worksage::ports::{PaymentError, PaymentGateway, UpgradeRecordStore, UserPlanStore};

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Payment gateway setup failed: {0}")]
    Gateway(#[from] PaymentError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        tracing::error!(error = %e, "Worksage exited with error");
        eprintln!("worksage: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = AppConfig::load()?;
    init_tracing(&config);
    config.validate()?;

    tracing::info!(
        environment = %config.server.environment,
        sandbox = config.payment.is_sandbox(),
        "Configuration loaded"
    );

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;
    if config.database.run_migrations {
        sqlx::migrate!().run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let records: Arc<dyn UpgradeRecordStore> =
        Arc::new(PostgresUpgradeRecordStore::new(pool.clone()));
    let plans: Arc<dyn UserPlanStore> = Arc::new(PostgresUserPlanStore::new(pool.clone()));
    let gateway: Arc<dyn PaymentGateway> = Arc::new(KhaltiGateway::new(
        KhaltiConfig::new(
            config.payment.khalti_secret_key.clone(),
            config.payment.khalti_base_url.clone(),
        )
        .with_timeout(config.payment.gateway_timeout()),
    )?);

    let mut jwt =
        JwtConfig::new(config.auth.jwt_secret.clone()).with_leeway(config.auth.leeway_secs);
    if let Some(issuer) = &config.auth.jwt_issuer {
        jwt = jwt.with_issuer(issuer.clone());
    }
    let validator: AuthState = Arc::new(JwtSessionValidator::new(jwt));

    let settings = UpgradeSettings {
        prices: config.payment.price_table()?,
        return_url: config.payment.return_url.clone(),
        website_url: config.payment.website_url.clone(),
        ttl_minutes: config.payment.upgrade_ttl_minutes,
    };
    let state = PlansAppState::new(records.clone(), plans.clone(), gateway.clone(), settings);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::new(
        ExpireStaleUpgradesHandler::new(
            records.clone(),
            VerifyAndApplyHandler::new(records, plans, gateway),
        ),
        config.payment.sweep_interval(),
    );
    let sweeper_task = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    let app = api_router(state, validator, &config.server);
    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Worksage listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper_task.await {
        tracing::warn!(error = %e, "Expiry sweeper task ended abnormally");
    }
    close_pool(pool).await;

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if config.is_production() {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            // Without a signal handler the server runs until killed
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await
        }
    }
}

async fn close_pool(pool: PgPool) {
    pool.close().await;
    tracing::info!("Database pool closed");
}

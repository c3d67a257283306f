//! ALF Billing server.
//!
//! Serves the subscription API under `/api` and runs the daily trial sweep.
//!
//! ## Endpoints
//!
//! - `/api/subscriptions/*` - Facility subscription management
//! - `POST /api/webhooks/stripe` - Processor webhooks
//! - `GET /health` - Liveness probe

use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use sqlx::PgPool;
use tokio::signal;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use alf_billing::adapters::events::InMemoryEventBus;
use alf_billing::adapters::http::{billing_router, BillingAppState};
use alf_billing::adapters::postgres::{
    PostgresBillingCatalog, PostgresFacilityDirectory, PostgresPaymentMethodStore,
    PostgresReconciliationStore, PostgresSubscriptionRepository,
};
use alf_billing::adapters::scheduler::{TrialSweepRunner, TrialSweepRunnerConfig};
use alf_billing::adapters::stripe::StripeGateway;
use alf_billing::application::handlers::{
    SubscriptionActivityRecorder, SweepExpiredTrialsHandler, ACTIVITY_EVENT_TYPES,
};
use alf_billing::config::{AppConfig, ServerConfig};
use alf_billing::ports::EventSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    config.validate().context("validating configuration")?;

    init_tracing(&config.server);
    tracing::info!(
        environment = ?config.server.environment,
        port = config.server.port,
        "starting ALF billing"
    );

    // Database
    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await
        .context("connecting to database")?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("running migrations")?;
        tracing::info!("database migrations applied");
    }

    // Adapters
    let gateway = StripeGateway::new(config.payment.gateway_config())
        .context("building payment gateway")?;
    let state = app_state(&config, pool, Arc::new(gateway));

    // Background trial sweep
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep = TrialSweepRunner::new(
        Arc::new(SweepExpiredTrialsHandler::new(
            state.subscriptions.clone(),
            state.event_publisher.clone(),
        )),
        TrialSweepRunnerConfig::default().with_interval(config.billing.sweep_interval()),
    );
    let sweep_task = tokio::spawn(async move { sweep.run(shutdown_rx).await });

    // HTTP
    let app = build_router(state, &config.server);
    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweep_task.await {
        tracing::error!(error = %e, "trial sweep task failed");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(server.log_level.clone()));

    if server.is_production() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn app_state(config: &AppConfig, pool: PgPool, gateway: Arc<StripeGateway>) -> BillingAppState {
    let events = Arc::new(InMemoryEventBus::dispatch_only());
    events.subscribe_all(
        &ACTIVITY_EVENT_TYPES,
        Arc::new(SubscriptionActivityRecorder::new()),
    );

    BillingAppState {
        subscriptions: Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
        reconciliation_store: Arc::new(PostgresReconciliationStore::new(pool.clone())),
        catalog: Arc::new(PostgresBillingCatalog::new(pool.clone())),
        facilities: Arc::new(PostgresFacilityDirectory::new(pool.clone())),
        payment_methods: Arc::new(PostgresPaymentMethodStore::new(pool)),
        gateway,
        webhook_verifier: Arc::new(config.payment.webhook_verifier()),
        event_publisher: events,
        trial_length_days: config.billing.trial_length_days,
    }
}

fn build_router(state: BillingAppState, server: &ServerConfig) -> Router {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", billing_router())
        .layer(TimeoutLayer::new(server.request_timeout()))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

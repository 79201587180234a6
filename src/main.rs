use anyhow::Result;
use dj_x402::{
    config::Config,
    handlers::{router, AppState},
    providers::build_verifier,
    services::{
        AuditTrail, ChallengeBuilder, ConfirmationStore, PaymentService, SystemClock,
        VerificationOrchestrator,
    },
    storage::Storage,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting x402 payment service v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    // Initialize services
    let storage = Storage::open(config.redis_url.as_deref()).await;
    let verifier = build_verifier(&config)?;
    let clock = Arc::new(SystemClock);
    let audit = AuditTrail::new(storage.audit.clone(), clock.clone());

    let builder = ChallengeBuilder::new(config.challenge_settings(), clock.clone(), audit.clone());
    let orchestrator = VerificationOrchestrator::new(
        verifier,
        ConfirmationStore::new(storage.confirmations.clone()),
        audit,
        clock,
    )
    .with_clock_skew(config.clock_skew_secs);

    let payments = Arc::new(PaymentService::new(
        builder,
        storage.challenges.clone(),
        orchestrator,
    ));

    // Build router
    let app = router(AppState::new(payments, storage.redis.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl+c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down gracefully...");
}

//! Lightward rooms - multi-party conversations with an AI participant
//!
//! A Rust backend coordinating room creation (resolution, payment holds,
//! arrival) and the turn-taking conversation that follows, across every
//! device sharing the room's records.

mod api;
mod claim;
mod config;
mod db;
mod lifecycle;
mod llm;
mod payment;
mod reconcile;
mod resolver;
mod room;
mod runtime;
mod store;

use api::{create_router, AppState};
use claim::AtomicClaim;
use config::Config;
use db::Database;
use llm::{CompletionOracle, CompletionService, HttpCompletionService, LoggingCompletionService};
use payment::{PaymentProcessor, StripePaymentProcessor, UnconfiguredPaymentProcessor};
use resolver::DirectoryResolver;
use runtime::{RoomManager, Services};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lightward_rooms=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), device_id = %config.device_id, "Opening database");
    let db = Database::open(&config.db_path)?;
    let store = Arc::new(db.clone());

    let payments: Arc<dyn PaymentProcessor> = match config.stripe.clone() {
        Some(stripe) => Arc::new(StripePaymentProcessor::new(stripe)?),
        None => {
            tracing::warn!("No payment processor configured. Set STRIPE_API_KEY.");
            Arc::new(UnconfiguredPaymentProcessor)
        }
    };

    let http = HttpCompletionService::new(config.completion_url.clone(), config.api_key.clone())?;
    let completion: Arc<dyn CompletionService> = Arc::new(LoggingCompletionService::new(Arc::new(http)));
    tracing::info!(url = %config.completion_url, "Completion service configured");

    let mut claim = AtomicClaim::new(store.clone());
    if let Some(ttl) = config.claim_ttl {
        claim = claim.with_claim_ttl(chrono::Duration::from_std(ttl)?);
    }

    let services = Services {
        device_id: config.device_id.clone(),
        records: store.clone(),
        messages: store,
        resolver: Arc::new(DirectoryResolver::new(db.clone(), config.local_user_id.clone())),
        payments,
        oracle: Arc::new(CompletionOracle::new(completion.clone())),
        completion,
        claim,
    };

    // Pick up rooms left mid-flight by the last run
    let rooms = RoomManager::new(services);
    rooms.resume_all().await?;

    let state = AppState::new(rooms, db, config.local_user_id.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Lightward rooms server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

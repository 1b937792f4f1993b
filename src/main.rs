use anyhow::Context;
use axum::{
    routing::{get, post, put},
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
};
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tower_sessions::{MemoryStore, SessionManagerLayer};
use tower_sessions::cookie::SameSite;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use sisyphus::{
    clock::{Clock, SystemClock},
    config::Config,
    handlers,
    middleware,
    scheduler::{self, PurgeCoordinator},
    services::RedisService,
    state::AppState,
};

fn build_router(state: AppState) -> Router {
    // Session store setup
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_name("session");
    let max_body_size = state.config.server.max_body_size;

    Router::new()
        .route("/health", get(handlers::health_check))

        // Auth routes
        .route("/api/auth/register", post(handlers::handle_register))
        .route("/api/auth/login", post(handlers::handle_login))
        .route("/api/auth/logout", post(handlers::handle_logout))
        .route("/api/auth/me", get(handlers::get_current_user))

        // User routes
        .route("/api/users/profile", get(handlers::get_profile).put(handlers::update_profile))
        .route("/api/users/reset-time", put(handlers::update_reset_time))
        .route("/api/users/account", axum::routing::delete(handlers::delete_account))

        // Task routes
        .route("/api/tasks", get(handlers::list_tasks).post(handlers::create_task))
        .route("/api/tasks/categories", get(handlers::list_categories))
        .route("/api/tasks/overdue", get(handlers::list_overdue_tasks))
        .route("/api/tasks/purge-completed", post(handlers::purge_completed_tasks))
        .route(
            "/api/tasks/:task_id",
            get(handlers::get_task).put(handlers::update_task).delete(handlers::delete_task),
        )
        .route("/api/tasks/:task_id/toggle", post(handlers::toggle_task))
        .route("/api/tasks/bulk/delete", axum::routing::delete(handlers::bulk_delete_tasks))
        .route("/api/tasks/bulk/complete", post(handlers::bulk_complete_tasks))
        .route("/api/tasks/bulk/priority", put(handlers::bulk_update_priority))

        // Reset scheduler routes, admin accounts only
        .route("/api/admin/purge", post(handlers::run_purge))
        .route("/api/admin/purge/schedule", post(handlers::schedule_purge))
        .route("/api/admin/purge/:user_id", post(handlers::run_purge_for_user))
        .route("/api/admin/purge/:user_id/state", get(handlers::purge_state_for_user))

        // Add middleware
        .layer(from_fn(middleware::require_auth))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(session_layer),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize Redis client
    let redis_client = Arc::new(
        redis::Client::open(config.redis.url.as_str()).context("Invalid Redis URL")?,
    );
    let redis_service = RedisService::new(redis_client);
    let store = Arc::new(redis_service.clone());

    let coordinator = Arc::new(PurgeCoordinator::new(
        store.clone(),
        config.scheduler.storage_timeout(),
        config.scheduler.max_concurrent_users,
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // `sisyphus purge` runs one batch and exits
    if std::env::args().nth(1).as_deref() == Some("purge") {
        tracing::info!("Starting task purge...");
        let summary = coordinator.run_once(clock.now()).await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        tracing::info!("Task purge completed");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let trigger = scheduler::build_trigger(&config.scheduler, coordinator.clone(), store);
    let tick_loop = scheduler::spawn_tick_loop(
        trigger,
        clock.clone(),
        config.scheduler.tick_interval(),
        cancel.clone(),
    );

    let address = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState {
        redis_service,
        config,
        coordinator,
        clock,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!("Server running on {}", address);

    let shutdown = cancel.clone();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    cancel.cancel();
    tick_loop.await.context("Tick loop panicked")?;
    Ok(())
}

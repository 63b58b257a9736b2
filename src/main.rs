// Weather Cache API v0.1
use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod db;
mod errors;
mod routes;
mod services;
mod settings;
#[cfg(test)]
mod test_support;

use config::AppConfig;
use services::events::event_channel;
use services::facade::ForecastFacade;
use services::fetcher::HttpForecastFetcher;
use services::scheduler::Scheduler;
use services::sync::SyncCoordinator;
use settings::SettingsHandle;

/// Weather Cache API OpenAPI document.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Weather Cache API",
        version = "0.1.0",
        description = "Local daily weather forecast cache. Refreshes the forecast for one \
            configured location from a remote provider in the background, validates it, \
            and serves the last good copy without waiting on the network.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Forecasts", description = "Cached forecast retrieval and change events"),
        (name = "Sync", description = "Background sync status and manual refresh"),
        (name = "Settings", description = "Forecast location and refresh settings"),
    ),
    paths(
        routes::health::health_check,
        routes::forecasts::list_forecasts,
        routes::forecasts::get_forecast_for_date,
        routes::forecasts::forecast_events,
        routes::sync::get_sync_status,
        routes::sync::trigger_sync,
        routes::settings::get_settings,
        routes::settings::update_location,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::forecasts::DailyForecast,
            routes::forecasts::ForecastListResponse,
            routes::settings::SettingsResponse,
            routes::settings::UpdateLocationRequest,
            routes::settings::UpdateLocationResponse,
            services::conditions::ConditionIcon,
            services::events::ForecastEvent,
            services::sync::SyncState,
            services::sync::SyncStatus,
            services::sync::SyncOutcome,
            services::sync::SyncReport,
            services::sync::TriggerReason,
            settings::Location,
            errors::FailureReason,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_cache=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    // Open the cache database and run migrations
    let pool = db::connect(&config.database_url)
        .await
        .expect("Failed to open cache database");

    tracing::info!("Database migrations completed");

    // Forecast provider client
    let fetcher = HttpForecastFetcher::new(
        &config.forecast_url_template,
        &config.user_agent,
        config.http_timeout,
    )
    .expect("Failed to build forecast HTTP client");

    // Sync core
    let settings = SettingsHandle::new(config.sync_settings());
    let sync = SyncCoordinator::new(pool.clone(), Arc::new(fetcher), settings, event_channel());
    let facade = ForecastFacade::new(sync.clone());

    tracing::info!("Forecast location: {}", config.location);

    // Background triggers: periodic due-check and location changes
    let scheduler = Scheduler::start(sync.clone(), config.sync_check_interval);

    // CORS: expose X-Forecast-Stale to browser clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
        ])
        .allow_headers(Any)
        .expose_headers([axum::http::HeaderName::from_static("x-forecast-stale")]);

    // Build router
    // Forecast routes read through the facade; sync and settings routes use
    // the coordinator directly.
    let forecast_routes = Router::new()
        .route("/api/v1/forecasts", get(routes::forecasts::list_forecasts))
        .route(
            "/api/v1/forecasts/events",
            get(routes::forecasts::forecast_events),
        )
        .route(
            "/api/v1/forecasts/:date",
            get(routes::forecasts::get_forecast_for_date),
        )
        .with_state(facade);

    let sync_routes = Router::new()
        .route("/api/v1/sync/status", get(routes::sync::get_sync_status))
        .route("/api/v1/sync", post(routes::sync::trigger_sync))
        .route("/api/v1/settings", get(routes::settings::get_settings))
        .route(
            "/api/v1/settings/location",
            put(routes::settings::update_location),
        )
        .with_state(sync);

    // Health check uses SqlitePool to verify DB connectivity
    let health_routes = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .with_state(pool.clone());

    let app = Router::new()
        .merge(health_routes)
        .merge(forecast_routes)
        .merge(sync_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server terminated unexpectedly");

    scheduler.shutdown().await;
    pool.close().await;
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        // Without a signal handler, run until killed
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

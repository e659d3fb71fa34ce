// Chiller Advisor API v0.1
use axum::http::Method;
use axum::routing::{get, post, put};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod db;
mod errors;
mod helpers;
mod routes;
mod services;

use config::AppConfig;
use routes::analysis::AnalysisState;
use routes::scheduler::SchedulerState;
use services::ai::OpenRouterClient;
use services::analysis::AnalysisService;
use services::dashboard::Dashboard;
use services::notify::{FanoutSink, LogSink, SharedSink, WebhookSink};
use services::reminders::ReminderTable;
use services::scheduler::{ChainFeed, HostKind, ReminderHost};
use services::store::{MemoryStore, Namespaced, PgStore, SharedStore};
use services::weather_chain::WeatherChain;

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 2;

/// Chiller Advisor API — OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Chiller Advisor API",
        version = "0.1.0",
        description = "Decision support for a chilled-water plant. Derives outdoor \
            enthalpy from a fallback chain of weather sources, maps it to operating \
            rules, warns about rule changes in the coming hours, resolves electricity \
            tariffs and reminds the operator to review the plant on a fixed schedule.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Weather", description = "Current weather, forecast, alerts and history"),
        (name = "Pricing", description = "Electricity tariff lookup"),
        (name = "Analysis", description = "Chiller load analysis and history"),
        (name = "Settings", description = "Runtime settings"),
        (name = "Scheduler", description = "Reminder hosts and test notifications"),
    ),
    paths(
        routes::health::health_check,
        routes::weather::get_weather,
        routes::weather::refresh_weather,
        routes::weather::get_alerts,
        routes::weather::get_weather_history,
        routes::pricing::get_current_pricing,
        routes::pricing::get_pricing_preview,
        routes::pricing::get_pricing_schedule,
        routes::analysis::run_analysis,
        routes::analysis::get_analysis_history,
        routes::analysis::clear_analysis_history,
        routes::analysis::set_api_key,
        routes::analysis::reset_api_key,
        routes::scheduler::get_scheduler_status,
        routes::scheduler::send_test_notification,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::weather::WeatherResponse,
            routes::weather::AlertsResponse,
            routes::weather::HistoryItem,
            routes::pricing::CurrentPricingResponse,
            routes::analysis::ApiKeyRequest,
            routes::analysis::ApiKeyStatus,
            routes::scheduler::SchedulerStatusResponse,
            services::analysis::AnalysisRequest,
            services::analysis::AnalysisResult,
            services::analysis::AnalysisHistoryEntry,
            services::pricing::HourlyPrice,
            services::pricing::PricingPeriod,
            services::scheduler::HostStatus,
            services::notify::Notification,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    // Initialize tracing; LOG_FORMAT=json switches to structured output
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chiller_advisor=debug,tower_http=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    let config = AppConfig::from_env();
    let offset = config.local_offset();

    // Durable store: PostgreSQL when configured, process memory otherwise
    let (store, pool): (SharedStore, _) = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(DB_POOL_MAX_CONNECTIONS)
                .min_connections(DB_POOL_MIN_CONNECTIONS)
                .connect(url)
                .await
                .expect("Failed to connect to database");

            sqlx::migrate!()
                .run(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations completed");

            let pg = PgStore::new(pool);
            let pool = pg.pool().clone();
            (Arc::new(pg) as SharedStore, Some(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            (Arc::new(MemoryStore::new()) as SharedStore, None)
        }
    };
    let fg_store: SharedStore = Arc::new(Namespaced::new(
        store.clone(),
        HostKind::Foreground.namespace(),
    ));
    let bg_store: SharedStore = Arc::new(Namespaced::new(
        store,
        HostKind::Background.namespace(),
    ));

    // Notification sinks
    let mut sinks: Vec<SharedSink> = vec![Arc::new(LogSink)];
    if let Some(url) = &config.notify_webhook_url {
        tracing::info!("Notifications also delivered to webhook");
        sinks.push(Arc::new(WebhookSink::new(url, &config.user_agent)));
    }
    let sink: SharedSink = Arc::new(FanoutSink::new(sinks));

    // Foreground: dashboard state, analysis and reminder host
    let dashboard = Arc::new(Dashboard::new(
        WeatherChain::from_config(&config),
        fg_store.clone(),
        offset,
    ));
    let analysis = Arc::new(AnalysisService::new(
        Arc::new(OpenRouterClient::new(&config.openrouter_url, &config.user_agent)),
        config.ai_models.clone(),
        fg_store.clone(),
        config.openrouter_api_key.clone(),
    ));
    let foreground = Arc::new(ReminderHost::new(
        HostKind::Foreground,
        ReminderTable::foreground(),
        fg_store,
        sink.clone(),
        dashboard.clone(),
    ));

    let shutdown = CancellationToken::new();
    let refresh_every = Duration::from_secs(config.forecast_refresh_secs);
    let mut tasks = services::scheduler::spawn_foreground(
        foreground.clone(),
        dashboard.clone(),
        refresh_every,
        offset,
        &shutdown,
    );
    let mut statuses = vec![foreground.status()];

    // Background: its own chain instance and namespace
    let background = if config.background_scheduler {
        let feed = Arc::new(ChainFeed::new(WeatherChain::from_config(&config), refresh_every));
        let host = Arc::new(ReminderHost::new(
            HostKind::Background,
            ReminderTable::background(),
            bg_store,
            sink,
            feed,
        ));
        tasks.push(services::scheduler::spawn_background(
            host.clone(),
            Duration::from_secs(config.background_wake_secs),
            offset,
            &shutdown,
        ));
        statuses.push(host.status());
        Some(host)
    } else {
        tracing::info!("Background scheduler disabled");
        None
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    // Build router; each group carries only the state it needs
    let health_routes = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .with_state(pool);

    let weather_routes = Router::new()
        .route("/api/v1/weather", get(routes::weather::get_weather))
        .route(
            "/api/v1/weather/refresh",
            post(routes::weather::refresh_weather),
        )
        .route("/api/v1/weather/alerts", get(routes::weather::get_alerts))
        .route(
            "/api/v1/weather/history",
            get(routes::weather::get_weather_history),
        )
        .with_state(dashboard.clone());

    let pricing_routes = Router::new()
        .route(
            "/api/v1/pricing/current",
            get(routes::pricing::get_current_pricing),
        )
        .route(
            "/api/v1/pricing/preview",
            get(routes::pricing::get_pricing_preview),
        )
        .route(
            "/api/v1/pricing/schedule",
            get(routes::pricing::get_pricing_schedule),
        )
        .with_state(offset);

    let analysis_routes = Router::new()
        .route("/api/v1/analysis", post(routes::analysis::run_analysis))
        .route(
            "/api/v1/analysis/history",
            get(routes::analysis::get_analysis_history)
                .delete(routes::analysis::clear_analysis_history),
        )
        .route(
            "/api/v1/settings/api-key",
            put(routes::analysis::set_api_key).delete(routes::analysis::reset_api_key),
        )
        .with_state(AnalysisState {
            analysis,
            dashboard: dashboard.clone(),
        });

    let scheduler_routes = Router::new()
        .route(
            "/api/v1/scheduler/status",
            get(routes::scheduler::get_scheduler_status),
        )
        .route(
            "/api/v1/notifications/test",
            post(routes::scheduler::send_test_notification),
        )
        .with_state(SchedulerState {
            foreground,
            background,
            dashboard,
        });

    let app = Router::new()
        .merge(health_routes)
        .merge(weather_routes)
        .merge(pricing_routes)
        .merge(analysis_routes)
        .merge(scheduler_routes)
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
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await
        .expect("Server terminated unexpectedly");

    services::scheduler::shutdown_all(tasks, &statuses).await;
}

//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{db::DbAdapter, llm::OpenAiCompatibleBackend},
    config::Config,
    error::ApiError,
    web::{router, state::AppState, ApiDoc},
};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    Method,
};
use axum::Router;
use nutrition_core::{
    AiGateway, GatewayConfig, NutritionResolver, SettingsHandle, SharedFoodIndex, SystemClock,
    UserSettings,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Load Settings & Build the Gateway ---
    let defaults = UserSettings {
        daily_token_budget: config.daily_token_budget,
        ..Default::default()
    };
    let settings = Arc::new(
        SettingsHandle::load(db_adapter.clone(), config.settings_user_id, defaults).await?,
    );
    let env_credentials = config.credentials.resolve().len();
    info!(
        user_id = %config.settings_user_id,
        env_credentials,
        "Settings loaded"
    );

    let backend = Arc::new(OpenAiCompatibleBackend::new(config.ai_api_base.clone()));
    let gateway = Arc::new(AiGateway::new(
        backend,
        settings,
        Arc::new(SystemClock),
        config.credentials.clone(),
        GatewayConfig {
            default_model: config.default_model.clone(),
            ..Default::default()
        },
    ));
    if !gateway.is_available() {
        info!("No usable AI credential yet; AI-backed endpoints will answer 503");
    }

    let resolver = Arc::new(NutritionResolver::new(
        gateway.clone(),
        SharedFoodIndex::new(db_adapter.clone()),
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        gateway,
        resolver,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let app = Router::new()
        .merge(router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

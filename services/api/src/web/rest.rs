//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use nutrition_core::{
    calculate_health_impact, FoodSource, GenerationRequest, NutritionCacheEntry, PortError,
    SharedFoodInput,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};

/// Default and maximum page size of the request log endpoint.
const DEFAULT_REQUEST_LIMIT: usize = 20;
const MAX_REQUEST_LIMIT: usize = 100;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        lookup_food_handler,
        analyze_food_handler,
        cache_user_food_handler,
        analyze_meal_handler,
        health_impact_handler,
        search_shared_foods_handler,
        add_shared_food_handler,
        ai_status_handler,
        recent_requests_handler,
        generate_handler,
        generate_json_handler,
        add_credential_handler,
        remove_credential_handler,
        set_credential_enabled_handler,
        reset_usage_handler,
        set_budget_handler,
    ),
    components(
        schemas(
            AnalyzeFoodPayload,
            UserFoodPayload,
            AnalyzeMealPayload,
            SharedFoodPayload,
            GeneratePayload,
            AddCredentialPayload,
            CredentialEnabledPayload,
            BudgetPayload,
            AiStatusResponse,
            CredentialCreatedResponse,
        )
    ),
    tags(
        (name = "Nutrition Gateway API", description = "Cache-first nutrition lookups backed by a resilient generative AI gateway.")
    )
)]
pub struct ApiDoc;

/// Builds the API router over the shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/foods/analyze", post(analyze_food_handler))
        .route("/foods/user", post(cache_user_food_handler))
        .route("/foods/{name}", get(lookup_food_handler))
        .route("/meals/analyze", post(analyze_meal_handler))
        .route("/health-impact", get(health_impact_handler))
        .route("/shared-foods", post(add_shared_food_handler))
        .route("/shared-foods/search", get(search_shared_foods_handler))
        .route("/ai/status", get(ai_status_handler))
        .route("/ai/requests", get(recent_requests_handler))
        .route("/ai/generate", post(generate_handler))
        .route("/ai/generate-json", post(generate_json_handler))
        .route("/ai/credentials", post(add_credential_handler))
        .route("/ai/credentials/{index}", delete(remove_credential_handler))
        .route(
            "/ai/credentials/{index}/enabled",
            put(set_credential_enabled_handler),
        )
        .route("/ai/usage/reset", post(reset_usage_handler))
        .route("/ai/budget", put(set_budget_handler))
        .with_state(state)
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct AnalyzeFoodPayload {
    name: String,
}

/// A food entered by hand. It overrides every other source on later lookups.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserFoodPayload {
    name: String,
    calories: f64,
    #[serde(default)]
    sugar: f64,
    #[serde(default)]
    protein: f64,
    #[serde(default)]
    carbs: f64,
    #[serde(default)]
    fat: f64,
    #[serde(default)]
    fiber: f64,
    serving_size: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct AnalyzeMealPayload {
    description: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SharedFoodPayload {
    name: String,
    emoji: Option<String>,
    calories: f64,
    #[serde(default)]
    sugar: f64,
    #[serde(default)]
    protein: f64,
    #[serde(default)]
    carbs: f64,
    #[serde(default)]
    fat: f64,
    #[serde(default)]
    fiber: f64,
    serving_size: Option<String>,
    category: Option<String>,
}

/// A raw generation request.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePayload {
    prompt: String,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    system_instruction: Option<String>,
    /// Name recorded in the request log. Defaults to `api`.
    feature: Option<String>,
}

impl GeneratePayload {
    fn into_request(self) -> GenerationRequest {
        let mut request = GenerationRequest::new(self.prompt)
            .feature(self.feature.unwrap_or_else(|| "api".to_string()));
        request.model = self.model;
        request.max_tokens = self.max_tokens;
        request.temperature = self.temperature;
        request.system_instruction = self.system_instruction;
        request
    }
}

#[derive(Deserialize, ToSchema)]
pub struct AddCredentialPayload {
    secret: String,
    label: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CredentialEnabledPayload {
    enabled: bool,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BudgetPayload {
    daily_token_budget: u64,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HealthImpactQuery {
    /// Meal health score between 1 and 10.
    score: f64,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    q: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecentRequestsQuery {
    limit: Option<usize>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AiStatusResponse {
    available: bool,
    tokens_today: u64,
    daily_limit: u64,
    remaining: u64,
    percentage: f64,
    lifetime_tokens: u64,
}

#[derive(Serialize, ToSchema)]
pub struct CredentialCreatedResponse {
    index: usize,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn port_error_response(context: &str, e: PortError) -> (StatusCode, String) {
    match e {
        PortError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
        PortError::Unexpected(msg) => (StatusCode::BAD_REQUEST, msg),
        other => {
            error!("{}: {:?}", context, other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{} failed", context),
            )
        }
    }
}

/// The status for an AI-backed operation that produced nothing.
fn ai_failure(app_state: &AppState, what: &str) -> (StatusCode, String) {
    if app_state.gateway.is_available() {
        (
            StatusCode::BAD_GATEWAY,
            format!("The AI backend could not {}", what),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "AI is unavailable: no usable credential or daily budget exhausted".to_string(),
        )
    }
}

//=========================================================================================
// Food and Meal Handlers
//=========================================================================================

/// Resolve a food from the local cache and curated table only.
#[utoipa::path(
    get,
    path = "/foods/{name}",
    params(("name" = String, Path, description = "Food name, any casing or spacing.")),
    responses(
        (status = 200, description = "Nutrition entry found", body = Object),
        (status = 404, description = "Not known locally")
    )
)]
pub async fn lookup_food_handler(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .resolver
        .lookup_food(&name)
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("'{}' is not cached", name)))
}

/// Resolve a food, asking the AI backend on a cache miss.
#[utoipa::path(
    post,
    path = "/foods/analyze",
    request_body = AnalyzeFoodPayload,
    responses(
        (status = 200, description = "Nutrition entry", body = Object),
        (status = 400, description = "Empty food name"),
        (status = 502, description = "The backend produced no usable answer"),
        (status = 503, description = "AI unavailable")
    )
)]
pub async fn analyze_food_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<AnalyzeFoodPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if payload.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "name is required".to_string()));
    }
    match app_state.resolver.analyze_food(&payload.name).await {
        Some(entry) => Ok(Json(entry)),
        None => Err(ai_failure(&app_state, "analyze this food")),
    }
}

/// Store a hand-entered food in the local cache.
#[utoipa::path(
    post,
    path = "/foods/user",
    request_body = UserFoodPayload,
    responses(
        (status = 201, description = "Food stored", body = Object),
        (status = 400, description = "Empty food name")
    )
)]
pub async fn cache_user_food_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<UserFoodPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let entry = NutritionCacheEntry {
        name: payload.name.trim().to_string(),
        calories: payload.calories,
        sugar: payload.sugar,
        protein: payload.protein,
        carbs: payload.carbs,
        fat: payload.fat,
        fiber: payload.fiber,
        source: FoodSource::User,
        timestamp: Utc::now(),
        serving_size: payload
            .serving_size
            .unwrap_or_else(|| "1 serving".to_string()),
    };
    match app_state.resolver.cache_user_food(entry).await {
        Some(stored) => Ok((StatusCode::CREATED, Json(stored))),
        None => Err((StatusCode::BAD_REQUEST, "name is required".to_string())),
    }
}

/// Break a free-text meal into items with totals, a health score and advice.
#[utoipa::path(
    post,
    path = "/meals/analyze",
    request_body = AnalyzeMealPayload,
    responses(
        (status = 200, description = "Meal analysis", body = Object),
        (status = 400, description = "Empty description"),
        (status = 502, description = "The backend produced no usable answer"),
        (status = 503, description = "AI unavailable")
    )
)]
pub async fn analyze_meal_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<AnalyzeMealPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if payload.description.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "description is required".to_string(),
        ));
    }
    match app_state.resolver.analyze_meal(&payload.description).await {
        Some(analysis) => Ok(Json(analysis)),
        None => Err(ai_failure(&app_state, "analyze this meal")),
    }
}

/// Convert a meal health score into HP and mana deltas.
#[utoipa::path(
    get,
    path = "/health-impact",
    params(HealthImpactQuery),
    responses(
        (status = 200, description = "HP and mana impact", body = Object),
        (status = 400, description = "Score is not a finite number")
    )
)]
pub async fn health_impact_handler(
    Query(query): Query<HealthImpactQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if !query.score.is_finite() {
        return Err((StatusCode::BAD_REQUEST, "score must be a number".to_string()));
    }
    Ok(Json(calculate_health_impact(query.score)))
}

//=========================================================================================
// Shared Food Index Handlers
//=========================================================================================

/// Search the shared food index by keyword and name prefix.
#[utoipa::path(
    get,
    path = "/shared-foods/search",
    params(SearchQuery),
    responses((status = 200, description = "Matching foods, keyword matches first", body = Object))
)]
pub async fn search_shared_foods_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    Json(app_state.resolver.search_shared_foods(&query.q).await)
}

/// Offer a food to the shared index. Write failures are logged, not returned.
#[utoipa::path(
    post,
    path = "/shared-foods",
    request_body = SharedFoodPayload,
    responses(
        (status = 202, description = "Food accepted for the shared index"),
        (status = 400, description = "Empty food name")
    )
)]
pub async fn add_shared_food_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<SharedFoodPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if payload.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "name is required".to_string()));
    }
    let food = SharedFoodInput {
        name: payload.name,
        emoji: payload.emoji,
        calories: payload.calories,
        sugar: payload.sugar,
        protein: payload.protein,
        carbs: payload.carbs,
        fat: payload.fat,
        fiber: payload.fiber,
        serving_size: payload.serving_size,
        category: payload.category,
    };
    app_state.resolver.add_food_to_shared_index(&food).await;
    Ok(StatusCode::ACCEPTED)
}

//=========================================================================================
// AI Gateway Handlers
//=========================================================================================

/// Availability and today's token usage.
#[utoipa::path(
    get,
    path = "/ai/status",
    responses((status = 200, description = "Gateway status", body = AiStatusResponse))
)]
pub async fn ai_status_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let usage = app_state.gateway.token_stats();
    Json(AiStatusResponse {
        available: app_state.gateway.is_available(),
        tokens_today: usage.today,
        daily_limit: usage.limit,
        remaining: usage.remaining,
        percentage: usage.percentage,
        lifetime_tokens: usage.lifetime,
    })
}

/// The most recent dispatches, newest first.
#[utoipa::path(
    get,
    path = "/ai/requests",
    params(RecentRequestsQuery),
    responses((status = 200, description = "Request log entries", body = Object))
)]
pub async fn recent_requests_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<RecentRequestsQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_REQUEST_LIMIT)
        .min(MAX_REQUEST_LIMIT);
    Json(app_state.gateway.recent_requests(limit))
}

/// Run a raw text generation through the gateway.
#[utoipa::path(
    post,
    path = "/ai/generate",
    request_body = GeneratePayload,
    responses(
        (status = 200, description = "Generated text with the serving model and credential", body = Object),
        (status = 502, description = "Every credential failed"),
        (status = 503, description = "AI unavailable")
    )
)]
pub async fn generate_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<GeneratePayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match app_state.gateway.generate(payload.into_request()).await {
        Some(generation) => Ok(Json(generation)),
        None => Err(ai_failure(&app_state, "generate a reply")),
    }
}

/// Run a generation in JSON mode and return the parsed document.
#[utoipa::path(
    post,
    path = "/ai/generate-json",
    request_body = GeneratePayload,
    responses(
        (status = 200, description = "Parsed JSON document", body = Object),
        (status = 502, description = "Every credential failed or the reply was not JSON"),
        (status = 503, description = "AI unavailable")
    )
)]
pub async fn generate_json_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<GeneratePayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match app_state.gateway.generate_json(payload.into_request()).await {
        Some(value) => Ok(Json(value)),
        None => Err(ai_failure(&app_state, "produce a JSON reply")),
    }
}

//=========================================================================================
// Credential and Budget Handlers
//=========================================================================================

/// Add a user-managed credential to the pool.
#[utoipa::path(
    post,
    path = "/ai/credentials",
    request_body = AddCredentialPayload,
    responses(
        (status = 201, description = "Credential added", body = CredentialCreatedResponse),
        (status = 400, description = "Empty secret"),
        (status = 500, description = "Settings could not be saved")
    )
)]
pub async fn add_credential_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<AddCredentialPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let index = app_state
        .gateway
        .add_credential(&payload.secret, payload.label)
        .await
        .map_err(|e| port_error_response("Adding credential", e))?;
    info!(index, "User credential added");
    Ok((
        StatusCode::CREATED,
        Json(CredentialCreatedResponse { index }),
    ))
}

/// Remove a user-managed credential.
#[utoipa::path(
    delete,
    path = "/ai/credentials/{index}",
    params(("index" = usize, Path, description = "Position in the managed credential list.")),
    responses(
        (status = 204, description = "Credential removed"),
        (status = 404, description = "No credential at that index")
    )
)]
pub async fn remove_credential_handler(
    State(app_state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .gateway
        .remove_credential(index)
        .await
        .map_err(|e| port_error_response("Removing credential", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Enable or disable a user-managed credential.
#[utoipa::path(
    put,
    path = "/ai/credentials/{index}/enabled",
    params(("index" = usize, Path, description = "Position in the managed credential list.")),
    request_body = CredentialEnabledPayload,
    responses(
        (status = 204, description = "Credential updated"),
        (status = 404, description = "No credential at that index")
    )
)]
pub async fn set_credential_enabled_handler(
    State(app_state): State<Arc<AppState>>,
    Path(index): Path<usize>,
    Json(payload): Json<CredentialEnabledPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .gateway
        .set_credential_enabled(index, payload.enabled)
        .await
        .map_err(|e| port_error_response("Updating credential", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Zero today's token counters.
#[utoipa::path(
    post,
    path = "/ai/usage/reset",
    responses((status = 204, description = "Daily usage reset"))
)]
pub async fn reset_usage_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    app_state.gateway.reset_daily_usage().await;
    StatusCode::NO_CONTENT
}

/// Change the daily token budget.
#[utoipa::path(
    put,
    path = "/ai/budget",
    request_body = BudgetPayload,
    responses((status = 204, description = "Budget updated"))
)]
pub async fn set_budget_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<BudgetPayload>,
) -> impl IntoResponse {
    app_state
        .gateway
        .set_daily_budget(payload.daily_token_budget)
        .await;
    StatusCode::NO_CONTENT
}

use application::InventoryApp;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use config::Config;
use domain::{CreateOutcome, DomainError, NewProduct, ProductPatch, MAX_PRODUCTS};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct AppState {
    inventory_app: Arc<InventoryApp>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Storekeeper API Server");
    info!("Using database: {}", config.database_path);

    let inventory_app = Arc::new(InventoryApp::start(&config.database_path).await?);
    let app = router(AppState { inventory_app });

    let bind_address = config.api_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("API Server listening on http://{}", bind_address);
    info!("   GET    /api/catalog          - Catalog snapshot");
    info!("   POST   /api/catalog/refresh  - Re-read the catalog");
    info!("   GET    /api/products?q=term  - List or search products");
    info!("   POST   /api/products         - Create a product");
    info!("   GET    /api/products/:id     - Product details");
    info!("   PATCH  /api/products/:id     - Edit a product");
    info!("   DELETE /api/products/:id     - Delete a product");

    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/catalog", get(get_catalog))
        .route("/api/catalog/refresh", post(refresh_catalog))
        .route("/api/products", get(list_products).post(create_product))
        .route(
            "/api/products/:id",
            get(get_product).patch(update_product).delete(delete_product),
        )
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Limit rejections have their own response; everything else maps here.
fn error_response(e: DomainError) -> Response {
    let status = match &e {
        DomainError::ValidationError(_) => StatusCode::BAD_REQUEST,
        DomainError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        DomainError::RepositoryError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = match &e {
        DomainError::RepositoryError(_) => {
            error!(error = %e, "Request failed");
            "Something went wrong. Please try again.".to_string()
        }
        _ => e.to_string(),
    };
    (status, Json(json!({ "error": message }))).into_response()
}

// Handler functions
async fn get_catalog(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.inventory_app.catalog_service.snapshot())
}

async fn refresh_catalog(State(state): State<AppState>) -> Response {
    let catalog = &state.inventory_app.catalog_service;
    match catalog.refresh().await {
        Ok(()) => Json(catalog.snapshot()).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let term = params.q.unwrap_or_default();
    match state.inventory_app.catalog_service.search(&term).await {
        Ok(products) => Json(products).into_response(),
        Err(e) => error_response(e),
    }
}

async fn create_product(
    State(state): State<AppState>,
    Json(mut payload): Json<NewProduct>,
) -> Response {
    payload.name = payload.name.trim().to_string();
    if let Err(e) = payload.validate() {
        return error_response(e);
    }

    match state.inventory_app.catalog_service.create(payload).await {
        Ok(CreateOutcome::Created { id }) => {
            (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
        }
        Ok(CreateOutcome::LimitReached) => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "Product Limit Reached",
                "message": format!(
                    "You can only keep {MAX_PRODUCTS} products. Delete a product to add a new one."
                ),
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_product(State(state): State<AppState>, Path(id): Path<i32>) -> Response {
    match state.inventory_app.catalog_service.get_product(id).await {
        Ok(product) => Json(product).into_response(),
        Err(e) => error_response(e),
    }
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(mut patch): Json<ProductPatch>,
) -> Response {
    patch.name = patch.name.map(|name| name.trim().to_string());
    if let Err(e) = patch.validate() {
        return error_response(e);
    }

    let catalog = &state.inventory_app.catalog_service;
    if let Err(e) = catalog.update(id, patch).await {
        return error_response(e);
    }
    match catalog.get_product(id).await {
        Ok(product) => Json(product).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_product(State(state): State<AppState>, Path(id): Path<i32>) -> Response {
    match state.inventory_app.catalog_service.delete(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

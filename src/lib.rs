//! Posync API Library
//!
//! Sync-and-approval backend for offline-first point-of-sale devices. Devices
//! push product and sale batches; the server reconciles them idempotently,
//! routes worker sales through admin approval, and moves stock only at the
//! moment a sale is approved.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use axum::{extract::State, response::Json, routing::get, routing::post, Router};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

// Common response wrapper
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// The versioned API surface. Authorization happens inside the handlers via
/// [`auth::authorize`], so the router stays a plain route table.
pub fn api_v1_routes() -> Router<AppState> {
    // Device sync: the only write path POS devices use
    let sync = Router::new()
        .route("/sync/products", post(handlers::sync::sync_products))
        .route("/sync/sales", post(handlers::sync::sync_sales));

    // Catalog reads for every actor, writes for admins
    let products = Router::new()
        .route(
            "/products",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
        .route(
            "/products/:id",
            get(handlers::products::get_product)
                .put(handlers::products::update_product)
                .delete(handlers::products::delete_product),
        );

    // Static segments before `/sales/:sale_id` so the bulk endpoints and the
    // report never get captured as a sale UUID.
    let sales = Router::new()
        .route("/sales", get(handlers::sales::list_sales))
        .route(
            "/sales/approve-all",
            post(handlers::approvals::approve_all_sales),
        )
        .route(
            "/sales/reject-all",
            post(handlers::approvals::reject_all_sales),
        )
        .route(
            "/sales/pending/report",
            get(handlers::approvals::pending_sales_report),
        )
        .route(
            "/sales/:sale_id",
            get(handlers::sales::get_sale).delete(handlers::sales::destroy_sale),
        )
        .route(
            "/sales/:sale_id/approve",
            post(handlers::approvals::approve_sale),
        )
        .route(
            "/sales/:sale_id/reject",
            post(handlers::approvals::reject_sale),
        )
        .route(
            "/sales/:sale_id/reactivate",
            post(handlers::approvals::reactivate_sale),
        );

    let users = Router::new()
        .route("/users", get(handlers::users::list_users))
        .route("/users/me", get(handlers::users::current_user));

    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(sync)
        .merge(products)
        .merge(sales)
        .merge(users)
}

async fn api_status(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let version = env!("CARGO_PKG_VERSION");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "service": "posync-api",
        "environment": state.config.environment,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    // Check database connectivity
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}

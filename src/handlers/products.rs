//! Catalog read and management endpoints.
//!
//! Reads are open to every authenticated actor of the business; writes go
//! through [`Capability::ManageCatalog`], which only admins hold. Devices
//! normally maintain the catalog through `/sync/products`; these endpoints
//! serve back-office tooling.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{authorize, Capability, RequestContext},
    entities::product,
    errors::ServiceError,
    services::products::{CreateProductRequest, UpdateProductRequest},
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListProductsQuery {
    /// RFC 3339 timestamp or unix seconds. Unparseable values degrade to a
    /// full pull rather than failing the request.
    pub updated_after: Option<String>,
}

/// List active products
#[utoipa::path(
    get,
    path = "/api/v1/products",
    summary = "List products",
    description = "Active products of the caller's business, ordered by local_id. \
        Pass updated_after for an incremental pull.",
    params(
        ("updated_after" = Option<String>, Query, description = "RFC 3339 timestamp or unix seconds; only products updated strictly after this instant are returned"),
    ),
    responses(
        (status = 200, description = "Products retrieved successfully", body = ApiResponse<Vec<product::Model>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<Vec<product::Model>>>, ServiceError> {
    authorize(&ctx, Capability::ViewProducts)?;

    let products = state
        .services
        .product
        .list(&ctx, query.updated_after.as_deref())
        .await?;
    Ok(Json(ApiResponse::success(products)))
}

/// Create a product directly
#[utoipa::path(
    post,
    path = "/api/v1/products",
    summary = "Create product",
    description = "Create a product without going through device sync. \
        The server assigns local_id when the body omits it.",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created successfully", body = ApiResponse<product::Model>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 409, description = "Duplicate local_id or QR code", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_product(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<product::Model>>), ServiceError> {
    authorize(&ctx, Capability::ManageCatalog)?;

    if let Err(validation_errors) = request.validate() {
        let errors: Vec<String> = validation_errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                let field = field.clone();
                errors.iter().map(move |error| {
                    format!(
                        "{}: {}",
                        field,
                        error.message.as_ref().unwrap_or(&"Invalid value".into())
                    )
                })
            })
            .collect();
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::validation_errors(errors)),
        ));
    }

    let created = state.services.product.create(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

/// Get product by ID
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    summary = "Get product",
    description = "Get a product by its server id",
    params(
        ("id" = Uuid, Path, description = "Server-side product id"),
    ),
    responses(
        (status = 200, description = "Product retrieved successfully", body = ApiResponse<product::Model>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<product::Model>>, ServiceError> {
    authorize(&ctx, Capability::ViewProducts)?;

    let found = state.services.product.get(&ctx, id).await?;
    Ok(Json(ApiResponse::success(found)))
}

/// Update product
#[utoipa::path(
    put,
    path = "/api/v1/products/{id}",
    summary = "Update product",
    description = "Partial update; omitted fields keep their value. Setting stock \
        here is an absolute restock, not an adjustment.",
    params(
        ("id" = Uuid, Path, description = "Server-side product id"),
    ),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated successfully", body = ApiResponse<product::Model>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Duplicate QR code", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: RequestContext,
    Json(request): Json<UpdateProductRequest>,
) -> Result<Json<ApiResponse<product::Model>>, ServiceError> {
    authorize(&ctx, Capability::ManageCatalog)?;

    let updated = state.services.product.update(&ctx, id, request).await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Deactivate product
#[utoipa::path(
    delete,
    path = "/api/v1/products/{id}",
    summary = "Deactivate product",
    description = "Soft delete. The row survives for historical sale items; the \
        product stops resolving for new sales and listings.",
    params(
        ("id" = Uuid, Path, description = "Server-side product id"),
    ),
    responses(
        (status = 200, description = "Product deactivated", body = ApiResponse<product::Model>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<product::Model>>, ServiceError> {
    authorize(&ctx, Capability::ManageCatalog)?;

    let deactivated = state.services.product.deactivate(&ctx, id).await?;
    Ok(Json(ApiResponse::success(deactivated)))
}

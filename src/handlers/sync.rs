//! Device sync endpoints.
//!
//! POS devices work offline and push their local state in batches. Both
//! endpoints are idempotent: replaying a batch after a lost response settles
//! on the same server state instead of duplicating rows.

use axum::{extract::State, Json};

use crate::{
    auth::{authorize, Capability, RequestContext},
    errors::ServiceError,
    services::products::{ProductSyncRequest, ProductSyncResponse},
    services::sales::{SaleSyncRequest, SaleSyncResponse},
    ApiResponse, AppState,
};

/// Push a batch of products from a device
#[utoipa::path(
    post,
    path = "/api/v1/sync/products",
    summary = "Sync products",
    description = "Reconcile a device's product batch, keyed by (business, local_id). \
        Replays update in place instead of duplicating.",
    request_body = ProductSyncRequest,
    responses(
        (status = 200, description = "Batch reconciled", body = ApiResponse<ProductSyncResponse>),
        (status = 400, description = "Invalid batch", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent sync conflict", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn sync_products(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<ProductSyncRequest>,
) -> Result<Json<ApiResponse<ProductSyncResponse>>, ServiceError> {
    authorize(&ctx, Capability::SyncProducts)?;

    let response = state.services.product.sync_batch(&ctx, request).await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Push a batch of sales from a device
#[utoipa::path(
    post,
    path = "/api/v1/sync/sales",
    summary = "Sync sales",
    description = "Reconcile a device's sale batch, keyed by client-generated UUID. \
        Worker sales arrive as pending; admin sales are approved and consume stock immediately.",
    request_body = SaleSyncRequest,
    responses(
        (status = 200, description = "Batch reconciled", body = ApiResponse<SaleSyncResponse>),
        (status = 400, description = "Invalid batch", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Referenced product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent sync conflict", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock for an immediate approval", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn sync_sales(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<SaleSyncRequest>,
) -> Result<Json<ApiResponse<SaleSyncResponse>>, ServiceError> {
    authorize(&ctx, Capability::SyncSales)?;

    let response = state.services.sale.sync_batch(&ctx, request).await?;
    Ok(Json(ApiResponse::success(response)))
}

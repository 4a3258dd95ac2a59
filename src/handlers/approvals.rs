//! Approval workflow endpoints.
//!
//! Everything here is gated on [`Capability::ApproveSales`] (or
//! [`Capability::ViewPendingReport`] for the read side), which workers do not
//! hold. Approval is the moment stock is consumed, so these are the endpoints
//! where an insufficient-stock refusal can surface.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    auth::{authorize, Capability, RequestContext},
    errors::ServiceError,
    services::approvals::{BulkApprovalResponse, BulkRejectionResponse},
    services::reports::PendingReport,
    services::sales::SaleView,
    ApiResponse, AppState,
};

/// Approve a pending sale
#[utoipa::path(
    post,
    path = "/api/v1/sales/{sale_id}/approve",
    summary = "Approve sale",
    description = "Approve one pending sale, decrementing stock for its items. \
        Fails without any change if a single item lacks stock.",
    params(
        ("sale_id" = Uuid, Path, description = "Client-generated sale UUID"),
    ),
    responses(
        (status = 200, description = "Sale approved", body = ApiResponse<SaleView>),
        (status = 400, description = "Sale is not pending", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Sale not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn approve_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<SaleView>>, ServiceError> {
    authorize(&ctx, Capability::ApproveSales)?;

    let approved = state.services.approval.approve(&ctx, sale_id).await?;
    Ok(Json(ApiResponse::success(approved)))
}

/// Approve every pending sale
#[utoipa::path(
    post,
    path = "/api/v1/sales/approve-all",
    summary = "Approve all pending sales",
    description = "All-or-nothing: one insufficient-stock refusal rolls back \
        every approval in the batch.",
    responses(
        (status = 200, description = "All pending sales approved", body = ApiResponse<BulkApprovalResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock, nothing approved", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn approve_all_sales(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<BulkApprovalResponse>>, ServiceError> {
    authorize(&ctx, Capability::ApproveSales)?;

    let result = state.services.approval.approve_all(&ctx).await?;
    Ok(Json(ApiResponse::success(result)))
}

/// Reject a pending sale
#[utoipa::path(
    post,
    path = "/api/v1/sales/{sale_id}/reject",
    summary = "Reject sale",
    description = "Reject one pending sale. Stock is untouched because nothing \
        was ever consumed for it.",
    params(
        ("sale_id" = Uuid, Path, description = "Client-generated sale UUID"),
    ),
    responses(
        (status = 200, description = "Sale rejected", body = ApiResponse<SaleView>),
        (status = 400, description = "Sale is not pending", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Sale not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn reject_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<SaleView>>, ServiceError> {
    authorize(&ctx, Capability::ApproveSales)?;

    let rejected = state.services.approval.reject(&ctx, sale_id).await?;
    Ok(Json(ApiResponse::success(rejected)))
}

/// Reject every pending sale
#[utoipa::path(
    post,
    path = "/api/v1/sales/reject-all",
    summary = "Reject all pending sales",
    description = "Flip every pending sale of the business to rejected and \
        return their UUIDs so devices can reconcile.",
    responses(
        (status = 200, description = "All pending sales rejected", body = ApiResponse<BulkRejectionResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn reject_all_sales(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<BulkRejectionResponse>>, ServiceError> {
    authorize(&ctx, Capability::ApproveSales)?;

    let result = state.services.approval.reject_all(&ctx).await?;
    Ok(Json(ApiResponse::success(result)))
}

/// Reactivate a deactivated sale
#[utoipa::path(
    post,
    path = "/api/v1/sales/{sale_id}/reactivate",
    summary = "Reactivate sale",
    description = "Bring a deactivated sale back to approved without touching \
        stock again. Rejected sales cannot come back through here.",
    params(
        ("sale_id" = Uuid, Path, description = "Client-generated sale UUID"),
    ),
    responses(
        (status = 200, description = "Sale reactivated", body = ApiResponse<SaleView>),
        (status = 400, description = "Sale is not deactivated", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Sale not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn reactivate_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<SaleView>>, ServiceError> {
    authorize(&ctx, Capability::ApproveSales)?;

    let reactivated = state.services.approval.reactivate(&ctx, sale_id).await?;
    Ok(Json(ApiResponse::success(reactivated)))
}

/// Pending sales rollup
#[utoipa::path(
    get,
    path = "/api/v1/sales/pending/report",
    summary = "Pending sales report",
    description = "Per-product quantities and amounts across every pending sale \
        of the business, plus the grand total awaiting approval.",
    responses(
        (status = 200, description = "Report computed", body = ApiResponse<PendingReport>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn pending_sales_report(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<PendingReport>>, ServiceError> {
    authorize(&ctx, Capability::ViewPendingReport)?;

    let report = state.services.report.pending_sales_report(&ctx).await?;
    Ok(Json(ApiResponse::success(report)))
}

//! Sale read and destroy endpoints.
//!
//! Approval-flow transitions live in [`super::approvals`]; this module covers
//! listing, single-sale lookup and the destructive path. Workers only ever see
//! their own sales; the service layer enforces it, the handlers just gate the
//! `include_inactive` widening behind [`Capability::ViewAllSales`].

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{authorize, Capability, RequestContext},
    errors::ServiceError,
    services::sales::SaleView,
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListSalesQuery {
    /// Widen the listing to rejected and deactivated sales. Admin only.
    #[serde(default)]
    pub include_inactive: bool,
}

/// List sales
#[utoipa::path(
    get,
    path = "/api/v1/sales",
    summary = "List sales",
    description = "Approved sales of the business, newest first. Workers see only \
        their own; include_inactive adds rejected and deactivated sales and \
        requires admin.",
    params(
        ("include_inactive" = Option<bool>, Query, description = "Also return rejected and deactivated sales (admin only)"),
    ),
    responses(
        (status = 200, description = "Sales retrieved successfully", body = ApiResponse<Vec<SaleView>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_sales(
    State(state): State<AppState>,
    Query(query): Query<ListSalesQuery>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<Vec<SaleView>>>, ServiceError> {
    authorize(&ctx, Capability::ViewSales)?;
    if query.include_inactive {
        authorize(&ctx, Capability::ViewAllSales)?;
    }

    let sales = state
        .services
        .sale
        .list(&ctx, query.include_inactive)
        .await?;
    Ok(Json(ApiResponse::success(sales)))
}

/// Get sale by UUID
#[utoipa::path(
    get,
    path = "/api/v1/sales/{sale_id}",
    summary = "Get sale",
    description = "Single sale with its items. Workers can only fetch sales they \
        created; anything else reads as not found.",
    params(
        ("sale_id" = Uuid, Path, description = "Client-generated sale UUID"),
    ),
    responses(
        (status = 200, description = "Sale retrieved successfully", body = ApiResponse<SaleView>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Sale not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<SaleView>>, ServiceError> {
    authorize(&ctx, Capability::ViewSales)?;

    let sale = state.services.sale.get(&ctx, sale_id).await?;
    Ok(Json(ApiResponse::success(sale)))
}

/// Destroy sale
#[utoipa::path(
    delete,
    path = "/api/v1/sales/{sale_id}",
    summary = "Destroy sale",
    description = "Pending sales become rejected; approved sales become \
        deactivated and their stock is restored. Already-inactive sales are \
        refused.",
    params(
        ("sale_id" = Uuid, Path, description = "Client-generated sale UUID"),
    ),
    responses(
        (status = 200, description = "Sale destroyed", body = ApiResponse<SaleView>),
        (status = 400, description = "Sale already inactive", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Sale not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn destroy_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<SaleView>>, ServiceError> {
    authorize(&ctx, Capability::ApproveSales)?;

    let destroyed = state.services.sale.destroy(&ctx, sale_id).await?;
    Ok(Json(ApiResponse::success(destroyed)))
}

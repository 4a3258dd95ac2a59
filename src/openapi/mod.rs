use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Posync API",
        version = "1.0.0",
        description = r#"
# Posync Point-of-Sale Backend

Sync-and-approval backend for offline-first point-of-sale devices. Devices
keep selling while disconnected and push their local products and sales in
batches; the server reconciles them idempotently, holds worker sales for
admin approval, and keeps per-product stock consistent under concurrent
approvals.

## Features

- **Product Sync**: Batch reconciliation keyed by per-business local ids
- **Sale Sync**: UUID-keyed sale ingestion; replays never duplicate
- **Approval Workflow**: Worker sales wait pending, admins approve or reject
- **Stock Ledger**: Stock moves only on approval, never below zero
- **Pending Report**: Per-product rollup of everything awaiting approval
- **Multi-tenant**: Every row and every query is scoped to one business

## Authentication

All endpoints require a JWT bearer token. The token's subject is the actor
id; role and business come from the actor's profile:

```
Authorization: Bearer <your-jwt-token>
```

## Error Handling

Errors share a single response shape with appropriate HTTP status codes:

```json
{
  "error": "Not Found",
  "message": "Product with local_id 17 not found",
  "timestamp": "2025-06-09T10:30:00.000Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Sync", description = "Device batch reconciliation endpoints"),
        (name = "Products", description = "Catalog read and management endpoints"),
        (name = "Sales", description = "Sale read and destroy endpoints"),
        (name = "Approvals", description = "Approval workflow endpoints"),
        (name = "Users", description = "User profile endpoints"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Sync
        crate::handlers::sync::sync_products,
        crate::handlers::sync::sync_sales,

        // Products
        crate::handlers::products::list_products,
        crate::handlers::products::create_product,
        crate::handlers::products::get_product,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,

        // Sales
        crate::handlers::sales::list_sales,
        crate::handlers::sales::get_sale,
        crate::handlers::sales::destroy_sale,

        // Approvals
        crate::handlers::approvals::approve_sale,
        crate::handlers::approvals::approve_all_sales,
        crate::handlers::approvals::reject_sale,
        crate::handlers::approvals::reject_all_sales,
        crate::handlers::approvals::reactivate_sale,
        crate::handlers::approvals::pending_sales_report,

        // Users
        crate::handlers::users::list_users,
        crate::handlers::users::current_user,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,

            // Catalog types
            crate::entities::product::Model,
            crate::services::products::ProductSyncRequest,
            crate::services::products::ProductSyncRecord,
            crate::services::products::ProductSyncResponse,
            crate::services::products::CreateProductRequest,
            crate::services::products::UpdateProductRequest,

            // Sale types
            crate::entities::sale::SaleState,
            crate::services::sales::SaleSyncRequest,
            crate::services::sales::SaleSyncRecord,
            crate::services::sales::SaleItemRecord,
            crate::services::sales::SaleSyncResponse,
            crate::services::sales::SaleView,
            crate::services::sales::SaleItemView,

            // Approval types
            crate::services::approvals::BulkApprovalResponse,
            crate::services::approvals::BulkRejectionResponse,
            crate::services::reports::PendingReport,
            crate::services::reports::PendingReportItem,

            // User types
            crate::entities::user_profile::UserRole,
            crate::handlers::users::UserProfileView,
            crate::handlers::users::BusinessView,
            crate::handlers::users::CurrentUserResponse,

            // Error types
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_covers_the_sync_surface() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Posync API"));
        assert!(json.contains("/api/v1/sync/products"));
        assert!(json.contains("/api/v1/sales/approve-all"));
        assert!(json.contains("/api/v1/sales/pending/report"));
    }
}

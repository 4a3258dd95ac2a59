mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use sea_orm::EntityTrait;
use serde_json::json;
use uuid::Uuid;

use common::TestApp;
use posync_api::entities::sale::{self, SaleState};

async fn push_sale(app: &TestApp, actor: Uuid, quantity: i32, total: &str) -> Uuid {
    let sale_uuid = Uuid::new_v4();
    app.request_json(
        Method::POST,
        "/api/v1/sync/sales",
        Some(actor),
        Some(json!({
            "sales": [{
                "uuid": sale_uuid,
                "total": total,
                "items": [
                    { "product_local_id": 1, "quantity": quantity, "total_price": total }
                ],
            }]
        })),
        StatusCode::OK,
    )
    .await;
    sale_uuid
}

async fn state_of(app: &TestApp, sale_uuid: Uuid) -> SaleState {
    sale::Entity::find_by_id(sale_uuid)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap()
        .state
}

#[tokio::test]
async fn destroying_an_approved_sale_restores_stock() {
    let app = TestApp::new().await;
    let product_id = app
        .seed_product(app.business_id, 1, "Espresso", "2.50".parse().unwrap(), 10)
        .await;
    let sale_uuid = push_sale(&app, app.admin_id, 2, "5.00").await;
    assert_eq!(app.stock_of(product_id).await, 8);

    let body = app
        .request_json(
            Method::DELETE,
            &format!("/api/v1/sales/{sale_uuid}"),
            Some(app.admin_id),
            None,
            StatusCode::OK,
        )
        .await;

    assert_eq!(body["data"]["state"], "Deactivated");
    assert_eq!(body["data"]["active"], false);
    assert_eq!(app.stock_of(product_id).await, 10);
}

#[tokio::test]
async fn destroying_a_pending_sale_rejects_it() {
    let app = TestApp::new().await;
    let product_id = app
        .seed_product(app.business_id, 1, "Espresso", "2.50".parse().unwrap(), 10)
        .await;
    let sale_uuid = push_sale(&app, app.worker_id, 2, "5.00").await;

    let body = app
        .request_json(
            Method::DELETE,
            &format!("/api/v1/sales/{sale_uuid}"),
            Some(app.admin_id),
            None,
            StatusCode::OK,
        )
        .await;

    // A pending sale never moved stock, so there is nothing to restore
    assert_eq!(body["data"]["state"], "Rejected");
    assert_eq!(app.stock_of(product_id).await, 10);
}

#[tokio::test]
async fn destroying_an_inactive_sale_is_refused() {
    let app = TestApp::new().await;
    app.seed_product(app.business_id, 1, "Espresso", "2.50".parse().unwrap(), 10)
        .await;
    let sale_uuid = push_sale(&app, app.admin_id, 2, "5.00").await;

    let uri = format!("/api/v1/sales/{sale_uuid}");
    app.request_json(Method::DELETE, &uri, Some(app.admin_id), None, StatusCode::OK)
        .await;
    app.request_json(
        Method::DELETE,
        &uri,
        Some(app.admin_id),
        None,
        StatusCode::BAD_REQUEST,
    )
    .await;
}

#[tokio::test]
async fn reactivation_does_not_consume_stock_again() {
    let app = TestApp::new().await;
    let product_id = app
        .seed_product(app.business_id, 1, "Espresso", "2.50".parse().unwrap(), 10)
        .await;
    let sale_uuid = push_sale(&app, app.admin_id, 2, "5.00").await;
    assert_eq!(app.stock_of(product_id).await, 8);

    app.request_json(
        Method::DELETE,
        &format!("/api/v1/sales/{sale_uuid}"),
        Some(app.admin_id),
        None,
        StatusCode::OK,
    )
    .await;
    assert_eq!(app.stock_of(product_id).await, 10);

    let body = app
        .request_json(
            Method::POST,
            &format!("/api/v1/sales/{sale_uuid}/reactivate"),
            Some(app.admin_id),
            None,
            StatusCode::OK,
        )
        .await;

    assert_eq!(body["data"]["state"], "Approved");
    assert_eq!(body["data"]["active"], true);
    // Reactivation restores the record, not the stock movement
    assert_eq!(app.stock_of(product_id).await, 10);
}

#[tokio::test]
async fn rejected_sales_cannot_be_reactivated() {
    let app = TestApp::new().await;
    app.seed_product(app.business_id, 1, "Espresso", "2.50".parse().unwrap(), 10)
        .await;
    let sale_uuid = push_sale(&app, app.worker_id, 1, "2.50").await;

    app.request_json(
        Method::POST,
        &format!("/api/v1/sales/{sale_uuid}/reject"),
        Some(app.admin_id),
        None,
        StatusCode::OK,
    )
    .await;

    app.request_json(
        Method::POST,
        &format!("/api/v1/sales/{sale_uuid}/reactivate"),
        Some(app.admin_id),
        None,
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_matches!(state_of(&app, sale_uuid).await, SaleState::Rejected);
}

#[tokio::test]
async fn destroying_a_sale_requires_an_admin() {
    let app = TestApp::new().await;
    app.seed_product(app.business_id, 1, "Espresso", "2.50".parse().unwrap(), 10)
        .await;
    let sale_uuid = push_sale(&app, app.worker_id, 1, "2.50").await;

    app.request_json(
        Method::DELETE,
        &format!("/api/v1/sales/{sale_uuid}"),
        Some(app.worker_id),
        None,
        StatusCode::FORBIDDEN,
    )
    .await;
    assert_matches!(state_of(&app, sale_uuid).await, SaleState::Pending);
}

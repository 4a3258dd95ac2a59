mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use rstest::rstest;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use serde_json::json;
use uuid::Uuid;

use common::{decimal, TestApp};
use posync_api::entities::sale::{self, SaleState};

/// Push one single-item sale for the product with local id 1 and return
/// its device uuid.
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
async fn approving_a_pending_sale_decrements_stock() {
    let app = TestApp::new().await;
    let product_id = app
        .seed_product(app.business_id, 1, "Espresso", "2.50".parse().unwrap(), 10)
        .await;
    let sale_uuid = push_sale(&app, app.worker_id, 2, "5.00").await;
    assert_eq!(app.stock_of(product_id).await, 10);

    let body = app
        .request_json(
            Method::POST,
            &format!("/api/v1/sales/{sale_uuid}/approve"),
            Some(app.admin_id),
            None,
            StatusCode::OK,
        )
        .await;

    assert_eq!(body["data"]["state"], "Approved");
    assert_eq!(body["data"]["pending_approval"], false);
    assert_eq!(app.stock_of(product_id).await, 8);
}

#[tokio::test]
async fn approving_twice_is_refused() {
    let app = TestApp::new().await;
    let product_id = app
        .seed_product(app.business_id, 1, "Espresso", "2.50".parse().unwrap(), 10)
        .await;
    let sale_uuid = push_sale(&app, app.worker_id, 2, "5.00").await;

    let uri = format!("/api/v1/sales/{sale_uuid}/approve");
    app.request_json(Method::POST, &uri, Some(app.admin_id), None, StatusCode::OK)
        .await;
    app.request_json(
        Method::POST,
        &uri,
        Some(app.admin_id),
        None,
        StatusCode::BAD_REQUEST,
    )
    .await;

    // The double-tap must not double the stock movement
    assert_eq!(app.stock_of(product_id).await, 8);
}

#[tokio::test]
async fn approval_without_stock_is_refused_and_the_sale_stays_pending() {
    let app = TestApp::new().await;
    let product_id = app
        .seed_product(app.business_id, 1, "Espresso", "2.50".parse().unwrap(), 1)
        .await;
    let sale_uuid = push_sale(&app, app.worker_id, 2, "5.00").await;

    app.request_json(
        Method::POST,
        &format!("/api/v1/sales/{sale_uuid}/approve"),
        Some(app.admin_id),
        None,
        StatusCode::UNPROCESSABLE_ENTITY,
    )
    .await;

    assert_eq!(app.stock_of(product_id).await, 1);
    assert_matches!(state_of(&app, sale_uuid).await, SaleState::Pending);
}

#[tokio::test]
async fn approval_rolls_back_every_item_when_one_lacks_stock() {
    let app = TestApp::new().await;
    let espresso_id = app
        .seed_product(app.business_id, 1, "Espresso", "2.50".parse().unwrap(), 10)
        .await;
    let tote_id = app
        .seed_product(app.business_id, 2, "Tote Bag", "12.00".parse().unwrap(), 1)
        .await;

    let sale_uuid = Uuid::new_v4();
    app.request_json(
        Method::POST,
        "/api/v1/sync/sales",
        Some(app.worker_id),
        Some(json!({
            "sales": [{
                "uuid": sale_uuid,
                "total": "29.00",
                "items": [
                    { "product_local_id": 1, "quantity": 2, "total_price": "5.00" },
                    { "product_local_id": 2, "quantity": 2, "total_price": "24.00" }
                ],
            }]
        })),
        StatusCode::OK,
    )
    .await;

    let body = app
        .request_json(
            Method::POST,
            &format!("/api/v1/sales/{sale_uuid}/approve"),
            Some(app.admin_id),
            None,
            StatusCode::UNPROCESSABLE_ENTITY,
        )
        .await;
    assert!(body["message"].as_str().unwrap().contains("Tote Bag"));

    // The espresso decrement happened inside the same transaction and must
    // have been unwound with it
    assert_eq!(app.stock_of(espresso_id).await, 10);
    assert_eq!(app.stock_of(tote_id).await, 1);
    assert_matches!(state_of(&app, sale_uuid).await, SaleState::Pending);
}

#[tokio::test]
async fn approve_all_is_all_or_nothing() {
    let app = TestApp::new().await;
    let product_id = app
        .seed_product(app.business_id, 1, "Espresso", "2.50".parse().unwrap(), 3)
        .await;
    let first = push_sale(&app, app.worker_id, 2, "5.00").await;
    let second = push_sale(&app, app.worker_id, 2, "5.00").await;

    // Three units cannot cover two sales of two units each; neither may land
    app.request_json(
        Method::POST,
        "/api/v1/sales/approve-all",
        Some(app.admin_id),
        None,
        StatusCode::UNPROCESSABLE_ENTITY,
    )
    .await;
    assert_eq!(app.stock_of(product_id).await, 3);
    assert_matches!(state_of(&app, first).await, SaleState::Pending);
    assert_matches!(state_of(&app, second).await, SaleState::Pending);

    // Restock, then the same batch goes through atomically
    app.request_json(
        Method::PUT,
        &format!("/api/v1/products/{product_id}"),
        Some(app.admin_id),
        Some(json!({ "stock": 4 })),
        StatusCode::OK,
    )
    .await;

    let body = app
        .request_json(
            Method::POST,
            "/api/v1/sales/approve-all",
            Some(app.admin_id),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(body["data"]["approved_count"], 2);
    let approved: Vec<String> = body["data"]["approved_uuids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert!(approved.contains(&first.to_string()));
    assert!(approved.contains(&second.to_string()));
    assert_eq!(app.stock_of(product_id).await, 0);
}

#[tokio::test]
async fn rejecting_a_sale_does_not_touch_stock() {
    let app = TestApp::new().await;
    let product_id = app
        .seed_product(app.business_id, 1, "Espresso", "2.50".parse().unwrap(), 10)
        .await;
    let sale_uuid = push_sale(&app, app.worker_id, 2, "5.00").await;

    let body = app
        .request_json(
            Method::POST,
            &format!("/api/v1/sales/{sale_uuid}/reject"),
            Some(app.admin_id),
            None,
            StatusCode::OK,
        )
        .await;

    assert_eq!(body["data"]["state"], "Rejected");
    assert_eq!(body["data"]["active"], false);
    assert_eq!(app.stock_of(product_id).await, 10);

    // Rejecting again is a state-machine violation
    app.request_json(
        Method::POST,
        &format!("/api/v1/sales/{sale_uuid}/reject"),
        Some(app.admin_id),
        None,
        StatusCode::BAD_REQUEST,
    )
    .await;
}

#[tokio::test]
async fn reject_all_returns_the_rejected_uuids() {
    let app = TestApp::new().await;
    app.seed_product(app.business_id, 1, "Espresso", "2.50".parse().unwrap(), 10)
        .await;
    let first = push_sale(&app, app.worker_id, 1, "2.50").await;
    let second = push_sale(&app, app.worker_id, 1, "2.50").await;

    let body = app
        .request_json(
            Method::POST,
            "/api/v1/sales/reject-all",
            Some(app.admin_id),
            None,
            StatusCode::OK,
        )
        .await;

    assert_eq!(body["data"]["rejected_count"], 2);
    let rejected: Vec<String> = body["data"]["rejected_uuids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert!(rejected.contains(&first.to_string()));
    assert!(rejected.contains(&second.to_string()));

    assert_matches!(state_of(&app, first).await, SaleState::Rejected);
    assert_matches!(state_of(&app, second).await, SaleState::Rejected);
}

#[rstest]
#[case::approve_one(Method::POST, "/api/v1/sales/00000000-0000-0000-0000-000000000000/approve")]
#[case::reject_one(Method::POST, "/api/v1/sales/00000000-0000-0000-0000-000000000000/reject")]
#[case::reactivate(Method::POST, "/api/v1/sales/00000000-0000-0000-0000-000000000000/reactivate")]
#[case::approve_all(Method::POST, "/api/v1/sales/approve-all")]
#[case::reject_all(Method::POST, "/api/v1/sales/reject-all")]
#[case::pending_report(Method::GET, "/api/v1/sales/pending/report")]
#[tokio::test]
async fn workers_cannot_run_approvals(#[case] method: Method, #[case] uri: &str) {
    let app = TestApp::new().await;
    app.request_json(method, uri, Some(app.worker_id), None, StatusCode::FORBIDDEN)
        .await;
}

#[tokio::test]
async fn approvals_are_scoped_to_the_callers_business() {
    let app = TestApp::new().await;
    app.seed_product(app.business_id, 1, "Espresso", "2.50".parse().unwrap(), 10)
        .await;
    let sale_uuid = push_sale(&app, app.worker_id, 1, "2.50").await;

    app.request_json(
        Method::POST,
        &format!("/api/v1/sales/{sale_uuid}/approve"),
        Some(app.other_admin_id),
        None,
        StatusCode::NOT_FOUND,
    )
    .await;

    // The other business's pending report does not leak the sale either
    let body = app
        .request_json(
            Method::GET,
            "/api/v1/sales/pending/report",
            Some(app.other_admin_id),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(body["data"]["pending_sales"], 0);
    assert_eq!(decimal(&body["data"]["total"]), dec!(0));
}

#[tokio::test]
async fn pending_report_groups_line_items_by_product() {
    let app = TestApp::new().await;
    app.seed_product(app.business_id, 1, "Espresso", "2.50".parse().unwrap(), 10)
        .await;
    push_sale(&app, app.worker_id, 2, "5.00").await;
    push_sale(&app, app.worker_id, 1, "2.50").await;

    let body = app
        .request_json(
            Method::GET,
            "/api/v1/sales/pending/report",
            Some(app.admin_id),
            None,
            StatusCode::OK,
        )
        .await;

    assert_eq!(body["data"]["pending_sales"], 2);
    assert_eq!(decimal(&body["data"]["total"]), dec!(7.50));
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1, "both sales roll up into one product line");
    assert_eq!(items[0]["product_name"], "Espresso");
    assert_eq!(items[0]["quantity_sold"], 3);
    assert_eq!(decimal(&items[0]["partial_amount"]), dec!(7.50));

    // Approving the backlog drains the report
    app.request_json(
        Method::POST,
        "/api/v1/sales/approve-all",
        Some(app.admin_id),
        None,
        StatusCode::OK,
    )
    .await;
    let body = app
        .request_json(
            Method::GET,
            "/api/v1/sales/pending/report",
            Some(app.admin_id),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(body["data"]["pending_sales"], 0);
    assert!(body["data"]["items"].as_array().unwrap().is_empty());
}

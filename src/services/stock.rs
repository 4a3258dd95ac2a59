//! Stock ledger: the single authority for product stock writes.
//!
//! Every mutation of `products.stock` in this crate goes through this module.
//! Decrements are conditional updates (`SET stock = stock - q WHERE stock >= q`)
//! so that two concurrent approvals of sales sharing a product cannot both pass
//! a stale stock check; the database serializes the row update and the loser
//! sees `rows_affected == 0`. Callers are expected to invoke these inside their
//! own transaction so a failed item rolls back the whole approval unit.

use crate::{
    entities::{
        product::{self, Entity as Product},
        sale_item,
    },
    errors::ServiceError,
};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::debug;
use uuid::Uuid;

/// Atomically subtracts `quantity` from the product's stock.
///
/// Fails with [`ServiceError::InsufficientStock`] when the current stock is
/// below `quantity`; the error message names the product so the operator can
/// restock or reject. Never persists a negative stock value.
pub async fn decrement<C>(
    conn: &C,
    business_id: i32,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "Stock adjustments require a positive quantity".to_string(),
        ));
    }

    let result = Product::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::BusinessId.eq(business_id))
        .filter(product::Column::Stock.gte(quantity))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        // Either the product is gone (or foreign) or the guard refused the
        // subtraction; re-read to tell the two apart.
        let existing = Product::find_by_id(product_id)
            .filter(product::Column::BusinessId.eq(business_id))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;

        return match existing {
            Some(p) => Err(ServiceError::InsufficientStock(format!(
                "Product '{}' has {} in stock, {} requested",
                p.name, p.stock, quantity
            ))),
            None => Err(ServiceError::NotFound(format!(
                "Product {} not found",
                product_id
            ))),
        };
    }

    debug!(%product_id, quantity, "stock decremented");
    Ok(())
}

/// Adds `quantity` back to the product's stock. Always succeeds for an
/// existing product; used when reversing an approved sale.
pub async fn increment<C>(
    conn: &C,
    business_id: i32,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "Stock adjustments require a positive quantity".to_string(),
        ));
    }

    let result = Product::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).add(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::BusinessId.eq(business_id))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        return Err(ServiceError::NotFound(format!(
            "Product {} not found",
            product_id
        )));
    }

    debug!(%product_id, quantity, "stock restored");
    Ok(())
}

/// Decrements stock for every line item of a sale. The first failing item
/// aborts the loop; the caller's transaction unwinds any decrements already
/// applied in this call.
pub async fn consume_for_items<C>(
    conn: &C,
    business_id: i32,
    items: &[sale_item::Model],
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    for item in items {
        decrement(conn, business_id, item.product_id, item.quantity).await?;
    }
    Ok(())
}

/// Restores stock for every line item of a sale.
pub async fn restore_for_items<C>(
    conn: &C,
    business_id: i32,
    items: &[sale_item::Model],
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    for item in items {
        increment(conn, business_id, item.product_id, item.quantity).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::business;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};

    async fn setup() -> (tempfile::TempDir, DatabaseConnection, i32, Uuid) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("stock.db").display()
        );
        let db = Database::connect(&url).await.unwrap();
        crate::db::run_migrations(&db).await.unwrap();

        let biz = business::ActiveModel {
            name: Set("Test Shop".to_string()),
            active: Set(true),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        let product_id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(product_id),
            business_id: Set(biz.id),
            local_id: Set(1),
            name: Set("Espresso".to_string()),
            description: Set(None),
            qr_code: Set(None),
            price: Set(dec!(2.50)),
            stock: Set(10),
            image_path: Set(None),
            active: Set(true),
            updated_at: Set(Utc::now()),
            created_at: Set(Utc::now()),
        }
        .insert(&db)
        .await
        .unwrap();

        (dir, db, biz.id, product_id)
    }

    async fn stock_of(db: &DatabaseConnection, id: Uuid) -> i32 {
        Product::find_by_id(id).one(db).await.unwrap().unwrap().stock
    }

    #[tokio::test]
    async fn decrement_refuses_overdraw() {
        let (_dir, db, biz, pid) = setup().await;

        let err = decrement(&db, biz, pid, 11).await.unwrap_err();
        match err {
            ServiceError::InsufficientStock(msg) => {
                assert!(msg.contains("Espresso"));
                assert!(msg.contains("10"));
            }
            other => panic!("expected InsufficientStock, got {:?}", other),
        }
        assert_eq!(stock_of(&db, pid).await, 10);
    }

    #[tokio::test]
    async fn decrement_and_increment_round_trip() {
        let (_dir, db, biz, pid) = setup().await;

        decrement(&db, biz, pid, 4).await.unwrap();
        assert_eq!(stock_of(&db, pid).await, 6);

        increment(&db, biz, pid, 4).await.unwrap();
        assert_eq!(stock_of(&db, pid).await, 10);
    }

    #[tokio::test]
    async fn foreign_business_cannot_touch_stock() {
        let (_dir, db, biz, pid) = setup().await;

        let err = decrement(&db, biz + 1, pid, 1).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(stock_of(&db, pid).await, 10);
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected() {
        let (_dir, db, biz, pid) = setup().await;

        let err = decrement(&db, biz, pid, 0).await.unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
        let err = increment(&db, biz, pid, -3).await.unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }
}

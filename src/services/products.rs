//! Product reconciliation and catalog management.
//!
//! Devices push product batches keyed by their own per-business `local_id`;
//! the reconciler upserts each record idempotently, last-write-wins, with the
//! device's `updated_at` taken as authoritative so incremental pulls stay
//! consistent. Lookups here are also the tenant boundary for products: a
//! foreign business's record resolves exactly like a missing one.

use crate::{
    auth::RequestContext,
    db::DbPool,
    entities::product::{self, Entity as Product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::images::ImageStore,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Resolves a device-local product id within one business, requiring the
/// product to be active. Inactive and cross-tenant rows both come back as
/// `NotFound`; the caller learns nothing about other tenants.
pub(crate) async fn resolve_active_by_local_id<C>(
    conn: &C,
    business_id: i32,
    local_id: i32,
) -> Result<product::Model, ServiceError>
where
    C: ConnectionTrait,
{
    Product::find()
        .filter(product::Column::BusinessId.eq(business_id))
        .filter(product::Column::LocalId.eq(local_id))
        .filter(product::Column::Active.eq(true))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Product with local id {} not found", local_id))
        })
}

/// Next free `local_id` for a business, `max + 1` over existing rows. Runs
/// inside the caller's insert transaction; a lost race on the unique index is
/// reported as a retry-safe conflict by the caller.
pub(crate) async fn next_local_id<C>(conn: &C, business_id: i32) -> Result<i32, ServiceError>
where
    C: ConnectionTrait,
{
    let current_max: Option<Option<i32>> = Product::find()
        .select_only()
        .column_as(product::Column::LocalId.max(), "max_local_id")
        .filter(product::Column::BusinessId.eq(business_id))
        .into_tuple()
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(current_max.flatten().unwrap_or(0) + 1)
}

/// Product reconciliation plus direct catalog CRUD.
#[derive(Clone)]
pub struct ProductService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    image_store: Arc<dyn ImageStore>,
}

impl ProductService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        image_store: Arc<dyn ImageStore>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            image_store,
        }
    }

    /// Reconciles a device's product batch. The whole batch is validated up
    /// front and rejected without any write on the first offending record;
    /// each record is then upserted keyed by `(business, local_id)`.
    ///
    /// Replaying the same batch is a no-op for record creation: existing rows
    /// are updated in place (last write wins, including `updated_at`).
    #[instrument(skip(self, request), fields(business_id = ctx.business_id, batch = request.products.len()))]
    pub async fn sync_batch(
        &self,
        ctx: &RequestContext,
        request: ProductSyncRequest,
    ) -> Result<ProductSyncResponse, ServiceError> {
        validate_batch(&request)?;

        let business_id = ctx.business_id;
        let mut reconciled = Vec::with_capacity(request.products.len());

        for record in &request.products {
            let pair = match self.upsert_once(business_id, record).await {
                Ok(pair) => pair,
                Err(err) if err.is_unique_violation() => {
                    // Lost a first-creation race; the winner's row is
                    // committed now, so the same record applies as an update.
                    debug!(
                        local_id = record.local_id,
                        "concurrent product creation detected, retrying as update"
                    );
                    match self.upsert_once(business_id, record).await {
                        Ok(pair) => pair,
                        Err(err) if err.is_unique_violation() => {
                            return Err(ServiceError::Conflict(format!(
                                "Duplicate key while reconciling product with local id {}",
                                record.local_id
                            )));
                        }
                        Err(err) => return Err(err),
                    }
                }
                Err(err) => return Err(err),
            };
            reconciled.push(pair);
        }

        for (model, created) in &reconciled {
            self.event_sender
                .send_or_log(Event::ProductSynced {
                    business_id,
                    product_id: model.id,
                    created: *created,
                })
                .await;
        }

        info!(count = reconciled.len(), "product batch reconciled");
        Ok(ProductSyncResponse {
            synced_count: reconciled.len(),
            sync_timestamp: Utc::now(),
            products: reconciled.into_iter().map(|(model, _)| model).collect(),
        })
    }

    /// One record's upsert in its own transaction. Insert races surface as a
    /// database unique-violation error for the caller to retry.
    async fn upsert_once(
        &self,
        business_id: i32,
        record: &ProductSyncRecord,
    ) -> Result<(product::Model, bool), ServiceError> {
        let record = record.clone();
        let images = Arc::clone(&self.image_store);
        let db = self.db_pool.as_ref();

        db.transaction::<_, (product::Model, bool), ServiceError>(move |txn| {
            Box::pin(async move {
                let existing = Product::find()
                    .filter(product::Column::BusinessId.eq(business_id))
                    .filter(product::Column::LocalId.eq(record.local_id))
                    .one(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                match existing {
                    Some(current) => {
                        let image_path =
                            attach_image(images.as_ref(), current.id, record.image_base64.as_deref())
                                .await;
                        let updated = apply_record(txn, current, &record, image_path).await?;
                        Ok((updated, false))
                    }
                    None => {
                        let id = Uuid::new_v4();
                        let image_path =
                            attach_image(images.as_ref(), id, record.image_base64.as_deref()).await;
                        let created = product::ActiveModel {
                            id: Set(id),
                            business_id: Set(business_id),
                            local_id: Set(record.local_id),
                            name: Set(record.name.trim().to_string()),
                            description: Set(normalize_opt_text(record.description.as_deref())),
                            qr_code: Set(normalize_opt_text(record.qr_code.as_deref())),
                            price: Set(record.price),
                            stock: Set(record.stock),
                            image_path: Set(image_path),
                            active: Set(record.active.unwrap_or(true)),
                            updated_at: Set(record.updated_at),
                            created_at: Set(Utc::now()),
                        }
                        .insert(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                        Ok((created, true))
                    }
                }
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
    }

    /// Active products for the actor's business, optionally restricted to
    /// those updated strictly after the given instant. The filter accepts
    /// RFC 3339 or integer Unix seconds; anything unparsable degrades to the
    /// full active set rather than erroring (devices with a bad saved cursor
    /// resync from scratch).
    #[instrument(skip(self), fields(business_id = ctx.business_id))]
    pub async fn list(
        &self,
        ctx: &RequestContext,
        updated_after: Option<&str>,
    ) -> Result<Vec<product::Model>, ServiceError> {
        let mut query = Product::find()
            .filter(product::Column::BusinessId.eq(ctx.business_id))
            .filter(product::Column::Active.eq(true));

        if let Some(raw) = updated_after {
            match parse_updated_after(raw) {
                Some(cutoff) => {
                    query = query.filter(product::Column::UpdatedAt.gt(cutoff));
                }
                None => {
                    debug!(raw, "unparsable updated_after filter, returning all active products");
                }
            }
        }

        query
            .order_by_asc(product::Column::LocalId)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Single product by server id, tenant-scoped.
    #[instrument(skip(self), fields(business_id = ctx.business_id))]
    pub async fn get(
        &self,
        ctx: &RequestContext,
        product_id: Uuid,
    ) -> Result<product::Model, ServiceError> {
        Product::find_by_id(product_id)
            .filter(product::Column::BusinessId.eq(ctx.business_id))
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Direct catalog create. Assigns `local_id = max + 1` for the business
    /// when the caller omits it, inside the insert transaction.
    #[instrument(skip(self, request), fields(business_id = ctx.business_id))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        request: CreateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(format!("Invalid product data: {}", e)))?;
        if request.price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Product price must be positive".to_string(),
            ));
        }
        if request.stock < 0 {
            return Err(ServiceError::ValidationError(
                "Product stock cannot be negative".to_string(),
            ));
        }

        let business_id = ctx.business_id;
        let images = Arc::clone(&self.image_store);
        let db = self.db_pool.as_ref();

        let created = db
            .transaction::<_, product::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let local_id = match request.local_id {
                        Some(explicit) => explicit,
                        None => next_local_id(txn, business_id).await?,
                    };
                    let id = Uuid::new_v4();
                    let image_path =
                        attach_image(images.as_ref(), id, request.image_base64.as_deref()).await;
                    let now = Utc::now();

                    product::ActiveModel {
                        id: Set(id),
                        business_id: Set(business_id),
                        local_id: Set(local_id),
                        name: Set(request.name.trim().to_string()),
                        description: Set(normalize_opt_text(request.description.as_deref())),
                        qr_code: Set(normalize_opt_text(request.qr_code.as_deref())),
                        price: Set(request.price),
                        stock: Set(request.stock),
                        image_path: Set(image_path),
                        active: Set(true),
                        updated_at: Set(now),
                        created_at: Set(now),
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })
            .map_err(|e| {
                if e.is_unique_violation() {
                    ServiceError::Conflict(
                        "Product local id or QR code already in use for this business".to_string(),
                    )
                } else {
                    e
                }
            })?;

        self.event_sender
            .send_or_log(Event::ProductCreated {
                business_id,
                product_id: created.id,
            })
            .await;
        info!(product_id = %created.id, local_id = created.local_id, "product created");
        Ok(created)
    }

    /// Partial update of catalog fields. Server time becomes the new
    /// `updated_at` so devices pick the change up on their next delta pull.
    #[instrument(skip(self, request), fields(business_id = ctx.business_id))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        product_id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        if let Some(ref name) = request.name {
            if name.trim().is_empty() {
                return Err(ServiceError::ValidationError(
                    "Product name cannot be empty".to_string(),
                ));
            }
        }
        if let Some(price) = request.price {
            if price <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Product price must be positive".to_string(),
                ));
            }
        }
        if let Some(stock) = request.stock {
            if stock < 0 {
                return Err(ServiceError::ValidationError(
                    "Product stock cannot be negative".to_string(),
                ));
            }
        }

        let current = self.get(ctx, product_id).await?;
        let image_path = match request.image_base64.as_deref() {
            Some(data) => attach_image(self.image_store.as_ref(), current.id, Some(data)).await,
            None => None,
        };

        let mut active_model: product::ActiveModel = current.into();
        if let Some(name) = request.name {
            active_model.name = Set(name.trim().to_string());
        }
        if let Some(description) = request.description {
            active_model.description = Set(normalize_opt_text(Some(&description)));
        }
        if let Some(qr_code) = request.qr_code {
            active_model.qr_code = Set(normalize_opt_text(Some(&qr_code)));
        }
        if let Some(price) = request.price {
            active_model.price = Set(price);
        }
        if let Some(stock) = request.stock {
            // Absolute restock by an operator; sale-driven arithmetic still
            // only happens in the stock ledger.
            active_model.stock = Set(stock);
        }
        if let Some(active) = request.active {
            active_model.active = Set(active);
        }
        if let Some(path) = image_path {
            active_model.image_path = Set(Some(path));
        }
        active_model.updated_at = Set(Utc::now());

        let updated = active_model
            .update(self.db_pool.as_ref())
            .await
            .map_err(|e| {
                let err = ServiceError::db_error(e);
                if err.is_unique_violation() {
                    ServiceError::Conflict(
                        "Product QR code already in use for this business".to_string(),
                    )
                } else {
                    err
                }
            })?;

        self.event_sender
            .send_or_log(Event::ProductUpdated {
                business_id: ctx.business_id,
                product_id: updated.id,
            })
            .await;
        info!(product_id = %updated.id, "product updated");
        Ok(updated)
    }

    /// Soft delete. Rows stay put for sale items that reference them; the
    /// product just stops resolving for new sales and listings.
    #[instrument(skip(self), fields(business_id = ctx.business_id))]
    pub async fn deactivate(
        &self,
        ctx: &RequestContext,
        product_id: Uuid,
    ) -> Result<product::Model, ServiceError> {
        let current = self.get(ctx, product_id).await?;

        let mut active_model: product::ActiveModel = current.into();
        active_model.active = Set(false);
        active_model.updated_at = Set(Utc::now());
        let updated = active_model
            .update(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        self.event_sender
            .send_or_log(Event::ProductDeactivated {
                business_id: ctx.business_id,
                product_id: updated.id,
            })
            .await;
        info!(product_id = %updated.id, "product deactivated");
        Ok(updated)
    }
}

/// Overwrites an existing row with the incoming record. Every mutable field
/// is replaced; whichever device wrote last wins.
async fn apply_record<C>(
    conn: &C,
    current: product::Model,
    record: &ProductSyncRecord,
    image_path: Option<String>,
) -> Result<product::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let mut active_model: product::ActiveModel = current.into();
    active_model.name = Set(record.name.trim().to_string());
    active_model.description = Set(normalize_opt_text(record.description.as_deref()));
    active_model.qr_code = Set(normalize_opt_text(record.qr_code.as_deref()));
    active_model.price = Set(record.price);
    active_model.stock = Set(record.stock);
    if let Some(active) = record.active {
        active_model.active = Set(active);
    }
    if let Some(path) = image_path {
        active_model.image_path = Set(Some(path));
    }
    // The device's clock is authoritative for sync records; incremental pulls
    // key off this column, so the server must not substitute its own time.
    active_model.updated_at = Set(record.updated_at);
    active_model.update(conn).await.map_err(ServiceError::db_error)
}

/// Best-effort image attach: a decode or write failure is logged and the
/// upsert continues without a path.
async fn attach_image(
    images: &dyn ImageStore,
    product_id: Uuid,
    payload: Option<&str>,
) -> Option<String> {
    let data = payload?;
    match images.store_png(product_id, data).await {
        Ok(path) => Some(path),
        Err(err) => {
            warn!(%product_id, error = %err, "image attach failed, product upsert continues without it");
            None
        }
    }
}

fn validate_batch(request: &ProductSyncRequest) -> Result<(), ServiceError> {
    if request.products.is_empty() {
        return Err(ServiceError::ValidationError(
            "Product batch must not be empty".to_string(),
        ));
    }
    for (idx, record) in request.products.iter().enumerate() {
        if record.name.trim().is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "Product at index {} has an empty name",
                idx
            )));
        }
        if record.price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Product at index {} has a non-positive price",
                idx
            )));
        }
        if record.stock < 0 {
            return Err(ServiceError::ValidationError(format!(
                "Product at index {} has negative stock",
                idx
            )));
        }
    }
    Ok(())
}

/// Whitespace-only optional text normalizes to absent.
fn normalize_opt_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_updated_after(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

/// Incoming sync batch. Field names mirror what devices already send.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProductSyncRequest {
    pub products: Vec<ProductSyncRecord>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProductSyncRecord {
    pub local_id: i32,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub qr_code: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub image_base64: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductSyncResponse {
    pub synced_count: usize,
    pub sync_timestamp: DateTime<Utc>,
    pub products: Vec<product::Model>,
}

/// Input for a direct catalog create.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[serde(default)]
    pub local_id: Option<i32>,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub qr_code: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub image_base64: Option<String>,
}

/// Input for a partial catalog update.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub stock: Option<i32>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub image_base64: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(local_id: i32, price: Decimal, stock: i32) -> ProductSyncRecord {
        ProductSyncRecord {
            local_id,
            name: "Espresso".to_string(),
            description: None,
            qr_code: None,
            price,
            stock,
            updated_at: Utc::now(),
            active: None,
            image_base64: None,
        }
    }

    #[test]
    fn whitespace_only_text_normalizes_to_absent() {
        assert_eq!(normalize_opt_text(Some("   ")), None);
        assert_eq!(normalize_opt_text(Some("")), None);
        assert_eq!(normalize_opt_text(None), None);
        assert_eq!(
            normalize_opt_text(Some("  QR-77 ")),
            Some("QR-77".to_string())
        );
    }

    #[test]
    fn updated_after_accepts_rfc3339_and_unix() {
        let iso = parse_updated_after("2026-02-01T10:30:00Z").unwrap();
        assert_eq!(iso.timestamp(), 1769941800);

        let unix = parse_updated_after("1769941800").unwrap();
        assert_eq!(unix, iso);

        assert!(parse_updated_after("last tuesday").is_none());
    }

    #[test]
    fn empty_batch_is_rejected() {
        let err = validate_batch(&ProductSyncRequest { products: vec![] }).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn bad_price_or_stock_rejects_the_whole_batch() {
        let batch = ProductSyncRequest {
            products: vec![record(1, dec!(2.50), 5), record(2, dec!(0), 5)],
        };
        let err = validate_batch(&batch).unwrap_err();
        assert!(err.to_string().contains("index 1"));

        let batch = ProductSyncRequest {
            products: vec![record(1, dec!(2.50), -1)],
        };
        assert!(validate_batch(&batch).is_err());

        let batch = ProductSyncRequest {
            products: vec![record(1, dec!(2.50), 0)],
        };
        assert!(validate_batch(&batch).is_ok());
    }
}

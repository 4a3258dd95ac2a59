//! Sale reconciliation, listing and the generic destroy path.
//!
//! A device pushes sales with client-generated uuids; the uuid is the primary
//! key, so replaying a push after a dropped response finds the committed row
//! and creates nothing. Stock is applied at most once per sale: immediately
//! inside the creation transaction when the creator is an admin, or at
//! approval time for worker-origin sales.

use crate::{
    auth::RequestContext,
    db::DbPool,
    entities::{
        product::{self, Entity as Product},
        sale::{self, Entity as Sale, SaleState},
        sale_item::{self, Entity as SaleItem},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{products, stock},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Absolute tolerance when comparing a sale's total against its item sum.
/// Devices round line totals independently, so the batch would otherwise
/// bounce on sub-cent drift.
const TOTAL_TOLERANCE: Decimal = dec!(0.01);

#[derive(Clone)]
pub struct SaleService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

struct SyncOutcome {
    sale: sale::Model,
    items: Vec<sale_item::Model>,
    created: bool,
}

impl SaleService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Reconciles a device's sale batch. Pure validation (totals, quantities,
    /// duplicate products) rejects the whole batch before any write; each
    /// sale then commits in its own transaction, so a replay after a failure
    /// part-way through finds the committed prefix and re-creates nothing.
    ///
    /// Worker-origin sales land in `Pending` with no stock effect; admin
    /// origin decrements stock inside the creation transaction and lands in
    /// `Approved`. Insufficient stock on the admin path fails that sale
    /// entirely, leaving no row behind.
    #[instrument(skip(self, request), fields(business_id = ctx.business_id, batch = request.sales.len()))]
    pub async fn sync_batch(
        &self,
        ctx: &RequestContext,
        request: SaleSyncRequest,
    ) -> Result<SaleSyncResponse, ServiceError> {
        validate_batch(&request)?;

        let business_id = ctx.business_id;
        let mut outcomes = Vec::with_capacity(request.sales.len());

        for record in &request.sales {
            let outcome = match self.sync_one(ctx, record).await {
                Ok(outcome) => outcome,
                Err(err) if err.is_unique_violation() => {
                    // Lost a first-creation race on the uuid; the winner's
                    // row is committed, so this replay resolves to it.
                    debug!(uuid = %record.uuid, "concurrent sale creation detected, retrying as replay");
                    match self.sync_one(ctx, record).await {
                        Ok(outcome) => outcome,
                        Err(err) if err.is_unique_violation() => {
                            return Err(ServiceError::Conflict(format!(
                                "Conflicting write for sale {}",
                                record.uuid
                            )));
                        }
                        Err(err) => return Err(err),
                    }
                }
                Err(err) => return Err(err),
            };
            outcomes.push(outcome);
        }

        for outcome in &outcomes {
            if !outcome.created {
                continue;
            }
            self.event_sender
                .send_or_log(Event::SaleSynced {
                    business_id,
                    sale_id: outcome.sale.id,
                    pending: outcome.sale.state == SaleState::Pending,
                })
                .await;
            if outcome.sale.state == SaleState::Approved {
                for item in &outcome.items {
                    self.event_sender
                        .send_or_log(Event::StockAdjusted {
                            business_id,
                            product_id: item.product_id,
                            delta: -item.quantity,
                        })
                        .await;
                }
            }
        }

        let sales: Vec<sale::Model> = outcomes.into_iter().map(|o| o.sale).collect();
        info!(count = sales.len(), "sale batch reconciled");
        let views = load_views(self.db_pool.as_ref(), business_id, sales).await?;
        Ok(SaleSyncResponse {
            synced_count: views.len(),
            sales: views,
        })
    }

    /// One sale's reconciliation in its own transaction.
    async fn sync_one(
        &self,
        ctx: &RequestContext,
        record: &SaleSyncRecord,
    ) -> Result<SyncOutcome, ServiceError> {
        let business_id = ctx.business_id;
        let actor_id = ctx.actor_id;
        let initial_state = if ctx.is_worker() {
            SaleState::Pending
        } else {
            SaleState::Approved
        };
        let record = record.clone();
        let db = self.db_pool.as_ref();

        db.transaction::<_, SyncOutcome, ServiceError>(move |txn| {
            Box::pin(async move {
                let existing = Sale::find_by_id(record.uuid)
                    .filter(sale::Column::BusinessId.eq(business_id))
                    .one(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                if let Some(sale) = existing {
                    // Replay of an already-reconciled sale: no new line
                    // items, no stock effect, the committed row answers.
                    return Ok(SyncOutcome {
                        sale,
                        items: Vec::new(),
                        created: false,
                    });
                }

                // Resolve every line item inside the tenant before writing
                // anything; a missing or inactive product fails the sale.
                let mut resolved = Vec::with_capacity(record.items.len());
                for item in &record.items {
                    let product = products::resolve_active_by_local_id(
                        txn,
                        business_id,
                        item.product_local_id,
                    )
                    .await?;
                    resolved.push((product, item));
                }

                let now = Utc::now();
                let sale = sale::ActiveModel {
                    id: Set(record.uuid),
                    business_id: Set(business_id),
                    total: Set(record.total),
                    state: Set(initial_state),
                    synced_from_device: Set(true),
                    created_by: Set(Some(actor_id)),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(txn)
                .await
                .map_err(ServiceError::db_error)?;

                let mut items = Vec::with_capacity(resolved.len());
                for (product, item) in &resolved {
                    let row = sale_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        sale_id: Set(sale.id),
                        product_id: Set(product.id),
                        quantity: Set(item.quantity),
                        total_price: Set(item.total_price),
                        created_at: Set(now),
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)?;
                    items.push(row);
                }

                if initial_state == SaleState::Approved {
                    stock::consume_for_items(txn, business_id, &items).await?;
                }

                Ok(SyncOutcome {
                    sale,
                    items,
                    created: true,
                })
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
    }

    /// Sales visible to the actor. The default view is approved sales only;
    /// `include_inactive` (admin) adds rejected and deactivated ones. Pending
    /// sales never show here, they live in the pending report. Workers are
    /// scoped to their own sales regardless of flags.
    #[instrument(skip(self), fields(business_id = ctx.business_id))]
    pub async fn list(
        &self,
        ctx: &RequestContext,
        include_inactive: bool,
    ) -> Result<Vec<SaleView>, ServiceError> {
        let mut states = vec![SaleState::Approved];
        if include_inactive {
            states.push(SaleState::Rejected);
            states.push(SaleState::Deactivated);
        }

        let mut query = Sale::find()
            .filter(sale::Column::BusinessId.eq(ctx.business_id))
            .filter(sale::Column::State.is_in(states));
        if ctx.is_worker() {
            query = query.filter(sale::Column::CreatedBy.eq(ctx.actor_id));
        }

        let sales = query
            .order_by_desc(sale::Column::CreatedAt)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        load_views(self.db_pool.as_ref(), ctx.business_id, sales).await
    }

    /// Single sale with items. Workers can only fetch their own; anyone
    /// else's sale reads exactly like a missing one.
    #[instrument(skip(self), fields(business_id = ctx.business_id))]
    pub async fn get(&self, ctx: &RequestContext, sale_id: Uuid) -> Result<SaleView, ServiceError> {
        let sale = Sale::find_by_id(sale_id)
            .filter(sale::Column::BusinessId.eq(ctx.business_id))
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Sale {} not found", sale_id)))?;

        if ctx.is_worker() && sale.created_by != Some(ctx.actor_id) {
            return Err(ServiceError::NotFound(format!("Sale {} not found", sale_id)));
        }

        let mut views = load_views(self.db_pool.as_ref(), ctx.business_id, vec![sale]).await?;
        views
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Failed to build sale view".to_string()))
    }

    /// Generic delete path. An approved sale hands its stock back before
    /// deactivating; note that a later reactivate does NOT take the stock
    /// again, so destroy-then-reactivate nets a stock increase. That
    /// asymmetry is the established device contract and is kept on purpose.
    ///
    /// Destroying a pending sale behaves like a reject: stock was never
    /// taken, none comes back, and the sale cannot be reactivated.
    #[instrument(skip(self), fields(business_id = ctx.business_id))]
    pub async fn destroy(
        &self,
        ctx: &RequestContext,
        sale_id: Uuid,
    ) -> Result<SaleView, ServiceError> {
        let business_id = ctx.business_id;
        let db = self.db_pool.as_ref();

        let (sale, restored_items) = db
            .transaction::<_, (sale::Model, Vec<sale_item::Model>), ServiceError>(move |txn| {
                Box::pin(async move {
                    let sale = Sale::find_by_id(sale_id)
                        .filter(sale::Column::BusinessId.eq(business_id))
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Sale {} not found", sale_id))
                        })?;

                    match sale.state {
                        SaleState::Pending => {
                            let mut active_model: sale::ActiveModel = sale.into();
                            active_model.state = Set(SaleState::Rejected);
                            active_model.updated_at = Set(Utc::now());
                            let sale = active_model
                                .update(txn)
                                .await
                                .map_err(ServiceError::db_error)?;
                            Ok((sale, Vec::new()))
                        }
                        SaleState::Approved => {
                            let items = SaleItem::find()
                                .filter(sale_item::Column::SaleId.eq(sale_id))
                                .all(txn)
                                .await
                                .map_err(ServiceError::db_error)?;
                            stock::restore_for_items(txn, business_id, &items).await?;

                            let mut active_model: sale::ActiveModel = sale.into();
                            active_model.state = Set(SaleState::Deactivated);
                            active_model.updated_at = Set(Utc::now());
                            let sale = active_model
                                .update(txn)
                                .await
                                .map_err(ServiceError::db_error)?;
                            Ok((sale, items))
                        }
                        SaleState::Rejected | SaleState::Deactivated => {
                            Err(ServiceError::InvalidOperation(format!(
                                "Sale {} is already inactive",
                                sale_id
                            )))
                        }
                    }
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        match sale.state {
            SaleState::Rejected => {
                self.event_sender
                    .send_or_log(Event::SaleRejected {
                        business_id,
                        sale_id,
                    })
                    .await;
            }
            _ => {
                self.event_sender
                    .send_or_log(Event::SaleDeactivated {
                        business_id,
                        sale_id,
                    })
                    .await;
                for item in &restored_items {
                    self.event_sender
                        .send_or_log(Event::StockAdjusted {
                            business_id,
                            product_id: item.product_id,
                            delta: item.quantity,
                        })
                        .await;
                }
            }
        }

        info!(%sale_id, state = %sale.state, "sale destroyed");
        let mut views = load_views(self.db_pool.as_ref(), business_id, vec![sale]).await?;
        views
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Failed to build sale view".to_string()))
    }
}

/// Builds API views for a set of sales: line items joined with their product
/// rows so devices get back the local ids they speak.
pub(crate) async fn load_views<C>(
    conn: &C,
    business_id: i32,
    sales: Vec<sale::Model>,
) -> Result<Vec<SaleView>, ServiceError>
where
    C: ConnectionTrait,
{
    if sales.is_empty() {
        return Ok(Vec::new());
    }

    let sale_ids: Vec<Uuid> = sales.iter().map(|s| s.id).collect();
    let items = SaleItem::find()
        .filter(sale_item::Column::SaleId.is_in(sale_ids))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let product_rows = if product_ids.is_empty() {
        Vec::new()
    } else {
        Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .filter(product::Column::BusinessId.eq(business_id))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?
    };
    let product_map: HashMap<Uuid, &product::Model> =
        product_rows.iter().map(|p| (p.id, p)).collect();

    let mut items_by_sale: HashMap<Uuid, Vec<SaleItemView>> = HashMap::new();
    for item in &items {
        let product = product_map.get(&item.product_id).ok_or_else(|| {
            ServiceError::InternalError(format!(
                "Sale item {} references missing product {}",
                item.id, item.product_id
            ))
        })?;
        items_by_sale
            .entry(item.sale_id)
            .or_default()
            .push(SaleItemView {
                product_id: product.id,
                product_local_id: product.local_id,
                product_name: product.name.clone(),
                quantity: item.quantity,
                total_price: item.total_price,
            });
    }

    Ok(sales
        .into_iter()
        .map(|sale| {
            let mut sale_items = items_by_sale.remove(&sale.id).unwrap_or_default();
            sale_items.sort_by_key(|i| i.product_local_id);
            SaleView::from_model(sale, sale_items)
        })
        .collect())
}

fn validate_batch(request: &SaleSyncRequest) -> Result<(), ServiceError> {
    if request.sales.is_empty() {
        return Err(ServiceError::ValidationError(
            "Sale batch must not be empty".to_string(),
        ));
    }
    for record in &request.sales {
        validate_record(record)?;
    }
    Ok(())
}

fn validate_record(record: &SaleSyncRecord) -> Result<(), ServiceError> {
    if record.total <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "Sale {} has a non-positive total",
            record.uuid
        )));
    }
    if record.items.is_empty() {
        return Err(ServiceError::ValidationError(format!(
            "Sale {} has no items",
            record.uuid
        )));
    }

    let mut seen = HashSet::new();
    for item in &record.items {
        if item.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Sale {} has a non-positive quantity for product local id {}",
                record.uuid, item.product_local_id
            )));
        }
        if item.total_price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Sale {} has a non-positive total for product local id {}",
                record.uuid, item.product_local_id
            )));
        }
        if !seen.insert(item.product_local_id) {
            return Err(ServiceError::ValidationError(format!(
                "Sale {} lists product local id {} more than once",
                record.uuid, item.product_local_id
            )));
        }
    }

    let item_sum: Decimal = record.items.iter().map(|i| i.total_price).sum();
    if (record.total - item_sum).abs() > TOTAL_TOLERANCE {
        return Err(ServiceError::ValidationError(format!(
            "Sale {} total {} does not match item sum {}",
            record.uuid, record.total, item_sum
        )));
    }
    Ok(())
}

/// Incoming sale batch; shape mirrors what devices send.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SaleSyncRequest {
    pub sales: Vec<SaleSyncRecord>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SaleSyncRecord {
    pub uuid: Uuid,
    pub total: Decimal,
    pub items: Vec<SaleItemRecord>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SaleItemRecord {
    pub product_local_id: i32,
    pub quantity: i32,
    pub total_price: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SaleSyncResponse {
    pub synced_count: usize,
    pub sales: Vec<SaleView>,
}

/// API projection of a sale. `pending_approval` and `active` are the legacy
/// boolean encoding derived from the state so existing devices keep working.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SaleView {
    pub uuid: Uuid,
    pub total: Decimal,
    pub state: SaleState,
    pub pending_approval: bool,
    pub active: bool,
    pub synced_from_device: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<SaleItemView>,
}

impl SaleView {
    pub fn from_model(sale: sale::Model, items: Vec<SaleItemView>) -> Self {
        Self {
            uuid: sale.id,
            total: sale.total,
            state: sale.state,
            pending_approval: sale.state.is_pending_approval(),
            active: sale.state.is_active(),
            synced_from_device: sale.synced_from_device,
            created_by: sale.created_by,
            created_at: sale.created_at,
            updated_at: sale.updated_at,
            items,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SaleItemView {
    pub product_id: Uuid,
    pub product_local_id: i32,
    pub product_name: String,
    pub quantity: i32,
    pub total_price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(total: Decimal, item_totals: &[Decimal]) -> SaleSyncRecord {
        SaleSyncRecord {
            uuid: Uuid::new_v4(),
            total,
            items: item_totals
                .iter()
                .enumerate()
                .map(|(idx, t)| SaleItemRecord {
                    product_local_id: idx as i32 + 1,
                    quantity: 1,
                    total_price: *t,
                })
                .collect(),
        }
    }

    #[test]
    fn total_outside_tolerance_is_rejected() {
        let rec = record(dec!(100.00), &[dec!(49.50), dec!(50.00)]);
        let err = validate_record(&rec).unwrap_err();
        assert!(err.to_string().contains("does not match item sum"));
    }

    #[test]
    fn total_within_tolerance_is_accepted() {
        let rec = record(dec!(100.005), &[dec!(50.00), dec!(50.00)]);
        assert!(validate_record(&rec).is_ok());

        let rec = record(dec!(100.00), &[dec!(50.00), dec!(50.00)]);
        assert!(validate_record(&rec).is_ok());
    }

    #[test]
    fn duplicate_products_in_one_sale_are_rejected() {
        let mut rec = record(dec!(20.00), &[dec!(10.00), dec!(10.00)]);
        rec.items[1].product_local_id = rec.items[0].product_local_id;
        let err = validate_record(&rec).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn empty_items_and_bad_quantities_are_rejected() {
        let mut rec = record(dec!(10.00), &[dec!(10.00)]);
        rec.items.clear();
        assert!(validate_record(&rec).is_err());

        let mut rec = record(dec!(10.00), &[dec!(10.00)]);
        rec.items[0].quantity = 0;
        assert!(validate_record(&rec).is_err());

        let rec = record(dec!(0), &[]);
        assert!(validate_record(&rec).is_err());
    }

    #[test]
    fn view_derives_legacy_booleans_from_state() {
        let sale = sale::Model {
            id: Uuid::new_v4(),
            business_id: 1,
            total: dec!(10.00),
            state: SaleState::Pending,
            synced_from_device: true,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let view = SaleView::from_model(sale.clone(), Vec::new());
        assert!(view.pending_approval);
        assert!(view.active);

        let deactivated = sale::Model {
            state: SaleState::Deactivated,
            ..sale
        };
        let view = SaleView::from_model(deactivated, Vec::new());
        assert!(!view.pending_approval);
        assert!(!view.active);
    }
}

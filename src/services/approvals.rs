//! Approval engine for pending sales.
//!
//! Worker-origin sales sit in `Pending` until an admin approves or rejects
//! them. Approval is the moment stock is committed: every line item's
//! decrement runs inside one transaction with the state flip, so an
//! insufficient item rolls the whole approval back. The bulk variant treats
//! the tenant's entire pending set as a single transaction; one starved
//! product aborts everything.
//!
//! Repeating an approve or reject on a sale that already left `Pending` is a
//! domain error, never a second stock application.

use crate::{
    auth::RequestContext,
    db::DbPool,
    entities::{
        sale::{self, Entity as Sale, SaleState},
        sale_item::{self, Entity as SaleItem},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::sales::{load_views, SaleView},
    services::stock,
};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionError,
    TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone)]
pub struct ApprovalService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl ApprovalService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Approves one pending sale, committing its stock decrement atomically
    /// with the state change. A sale in any other state is refused.
    #[instrument(skip(self), fields(business_id = ctx.business_id))]
    pub async fn approve(
        &self,
        ctx: &RequestContext,
        sale_id: Uuid,
    ) -> Result<SaleView, ServiceError> {
        let business_id = ctx.business_id;
        let db = self.db_pool.as_ref();

        let (sale, items) = db
            .transaction::<_, (sale::Model, Vec<sale_item::Model>), ServiceError>(move |txn| {
                Box::pin(async move {
                    let sale = find_for_update(txn, business_id, sale_id).await?;
                    if sale.state != SaleState::Pending {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Sale {} is not pending approval (state: {})",
                            sale_id, sale.state
                        )));
                    }

                    let items = SaleItem::find()
                        .filter(sale_item::Column::SaleId.eq(sale_id))
                        .all(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    stock::consume_for_items(txn, business_id, &items).await?;

                    let mut active_model: sale::ActiveModel = sale.into();
                    active_model.state = Set(SaleState::Approved);
                    active_model.updated_at = Set(Utc::now());
                    let sale = active_model
                        .update(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    Ok((sale, items))
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        self.emit_approval(business_id, sale.id, &items).await;
        info!(%sale_id, "sale approved");

        let mut views = load_views(self.db_pool.as_ref(), business_id, vec![sale]).await?;
        views
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Failed to build sale view".to_string()))
    }

    /// Approves every pending sale of the business in one all-or-nothing
    /// transaction. The first insufficient item aborts the batch; no sale is
    /// partially approved and no stock moves.
    #[instrument(skip(self), fields(business_id = ctx.business_id))]
    pub async fn approve_all(
        &self,
        ctx: &RequestContext,
    ) -> Result<BulkApprovalResponse, ServiceError> {
        let business_id = ctx.business_id;
        let db = self.db_pool.as_ref();

        let approved = db
            .transaction::<_, Vec<(sale::Model, Vec<sale_item::Model>)>, ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let pending = Sale::find()
                            .filter(sale::Column::BusinessId.eq(business_id))
                            .filter(sale::Column::State.eq(SaleState::Pending))
                            .order_by_asc(sale::Column::CreatedAt)
                            .all(txn)
                            .await
                            .map_err(ServiceError::db_error)?;

                        let mut approved = Vec::with_capacity(pending.len());
                        for sale in pending {
                            let items = SaleItem::find()
                                .filter(sale_item::Column::SaleId.eq(sale.id))
                                .all(txn)
                                .await
                                .map_err(ServiceError::db_error)?;
                            stock::consume_for_items(txn, business_id, &items).await?;

                            let mut active_model: sale::ActiveModel = sale.into();
                            active_model.state = Set(SaleState::Approved);
                            active_model.updated_at = Set(Utc::now());
                            let sale = active_model
                                .update(txn)
                                .await
                                .map_err(ServiceError::db_error)?;
                            approved.push((sale, items));
                        }
                        Ok(approved)
                    })
                },
            )
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        for (sale, items) in &approved {
            self.emit_approval(business_id, sale.id, items).await;
        }
        info!(count = approved.len(), "pending sales approved in bulk");

        Ok(BulkApprovalResponse {
            approved_count: approved.len(),
            approved_uuids: approved.into_iter().map(|(sale, _)| sale.id).collect(),
        })
    }

    /// Rejects one pending sale. No stock moves: a worker-origin sale never
    /// had its decrement applied, and the device is authoritative for
    /// reverting its own local copy.
    #[instrument(skip(self), fields(business_id = ctx.business_id))]
    pub async fn reject(
        &self,
        ctx: &RequestContext,
        sale_id: Uuid,
    ) -> Result<SaleView, ServiceError> {
        let business_id = ctx.business_id;
        let db = self.db_pool.as_ref();

        let sale = db
            .transaction::<_, sale::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let sale = find_for_update(txn, business_id, sale_id).await?;
                    if sale.state != SaleState::Pending {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Sale {} is not pending approval (state: {})",
                            sale_id, sale.state
                        )));
                    }

                    let mut active_model: sale::ActiveModel = sale.into();
                    active_model.state = Set(SaleState::Rejected);
                    active_model.updated_at = Set(Utc::now());
                    active_model.update(txn).await.map_err(ServiceError::db_error)
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        self.event_sender
            .send_or_log(Event::SaleRejected {
                business_id,
                sale_id,
            })
            .await;
        info!(%sale_id, "sale rejected");

        let mut views = load_views(self.db_pool.as_ref(), business_id, vec![sale]).await?;
        views
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Failed to build sale view".to_string()))
    }

    /// Rejects every pending sale, returning the affected uuids so devices
    /// can reconcile their local state.
    #[instrument(skip(self), fields(business_id = ctx.business_id))]
    pub async fn reject_all(
        &self,
        ctx: &RequestContext,
    ) -> Result<BulkRejectionResponse, ServiceError> {
        let business_id = ctx.business_id;
        let db = self.db_pool.as_ref();

        let rejected = db
            .transaction::<_, Vec<Uuid>, ServiceError>(move |txn| {
                Box::pin(async move {
                    let pending_ids: Vec<Uuid> = Sale::find()
                        .filter(sale::Column::BusinessId.eq(business_id))
                        .filter(sale::Column::State.eq(SaleState::Pending))
                        .order_by_asc(sale::Column::CreatedAt)
                        .all(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .into_iter()
                        .map(|s| s.id)
                        .collect();

                    if pending_ids.is_empty() {
                        return Ok(pending_ids);
                    }

                    Sale::update_many()
                        .col_expr(sale::Column::State, Expr::value(SaleState::Rejected))
                        .col_expr(sale::Column::UpdatedAt, Expr::value(Utc::now()))
                        .filter(sale::Column::Id.is_in(pending_ids.clone()))
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    Ok(pending_ids)
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        for sale_id in &rejected {
            self.event_sender
                .send_or_log(Event::SaleRejected {
                    business_id,
                    sale_id: *sale_id,
                })
                .await;
        }
        info!(count = rejected.len(), "pending sales rejected in bulk");

        Ok(BulkRejectionResponse {
            rejected_count: rejected.len(),
            rejected_uuids: rejected,
        })
    }

    /// Brings a deactivated (previously approved, then destroyed) sale back.
    /// Stock is NOT decremented again: the destroy path already restored it,
    /// and the reactivation contract has always been state-only. Rejected
    /// sales cannot come back through here.
    #[instrument(skip(self), fields(business_id = ctx.business_id))]
    pub async fn reactivate(
        &self,
        ctx: &RequestContext,
        sale_id: Uuid,
    ) -> Result<SaleView, ServiceError> {
        let business_id = ctx.business_id;
        let db = self.db_pool.as_ref();

        let sale = db
            .transaction::<_, sale::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let sale = find_for_update(txn, business_id, sale_id).await?;
                    if sale.state != SaleState::Deactivated {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Sale {} cannot be reactivated (state: {})",
                            sale_id, sale.state
                        )));
                    }

                    let mut active_model: sale::ActiveModel = sale.into();
                    active_model.state = Set(SaleState::Approved);
                    active_model.updated_at = Set(Utc::now());
                    active_model.update(txn).await.map_err(ServiceError::db_error)
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        self.event_sender
            .send_or_log(Event::SaleReactivated {
                business_id,
                sale_id,
            })
            .await;
        info!(%sale_id, "sale reactivated");

        let mut views = load_views(self.db_pool.as_ref(), business_id, vec![sale]).await?;
        views
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Failed to build sale view".to_string()))
    }

    async fn emit_approval(&self, business_id: i32, sale_id: Uuid, items: &[sale_item::Model]) {
        self.event_sender
            .send_or_log(Event::SaleApproved {
                business_id,
                sale_id,
            })
            .await;
        for item in items {
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

async fn find_for_update<C>(
    conn: &C,
    business_id: i32,
    sale_id: Uuid,
) -> Result<sale::Model, ServiceError>
where
    C: sea_orm::ConnectionTrait,
{
    Sale::find_by_id(sale_id)
        .filter(sale::Column::BusinessId.eq(business_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Sale {} not found", sale_id)))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkApprovalResponse {
    pub approved_count: usize,
    pub approved_uuids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkRejectionResponse {
    pub rejected_count: usize,
    pub rejected_uuids: Vec<Uuid>,
}

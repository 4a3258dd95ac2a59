//! Read-only rollup of pending sales for admin review.
//!
//! Groups every line item of the tenant's pending sales by product, summing
//! quantity and revenue, plus the grand total over the sales themselves. All
//! reads happen inside one transaction so a sale approved mid-scan is either
//! fully in or fully out, never half-counted.

use crate::{
    auth::RequestContext,
    db::DbPool,
    entities::{
        product::{self, Entity as Product},
        sale::{self, Entity as Sale, SaleState},
        sale_item::{self, Entity as SaleItem},
    },
    errors::ServiceError,
};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, EntityTrait, QueryFilter, TransactionError, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone)]
pub struct ReportService {
    db_pool: Arc<DbPool>,
}

impl ReportService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Per-product quantity/revenue rollup over all pending sales of the
    /// actor's business.
    #[instrument(skip(self), fields(business_id = ctx.business_id))]
    pub async fn pending_sales_report(
        &self,
        ctx: &RequestContext,
    ) -> Result<PendingReport, ServiceError> {
        let business_id = ctx.business_id;
        let db = self.db_pool.as_ref();

        type Snapshot = (
            Vec<(sale::Model, Vec<sale_item::Model>)>,
            Vec<product::Model>,
        );
        let (sales_with_items, products) = db
            .transaction::<_, Snapshot, ServiceError>(move |txn| {
                Box::pin(async move {
                    let sales_with_items = Sale::find()
                        .filter(sale::Column::BusinessId.eq(business_id))
                        .filter(sale::Column::State.eq(SaleState::Pending))
                        .find_with_related(SaleItem)
                        .all(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    let product_ids: Vec<Uuid> = sales_with_items
                        .iter()
                        .flat_map(|(_, items)| items.iter().map(|i| i.product_id))
                        .collect();
                    let products = if product_ids.is_empty() {
                        Vec::new()
                    } else {
                        Product::find()
                            .filter(product::Column::Id.is_in(product_ids))
                            .filter(product::Column::BusinessId.eq(business_id))
                            .all(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                    };

                    Ok((sales_with_items, products))
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        build_report(&sales_with_items, &products)
    }
}

fn build_report(
    sales_with_items: &[(sale::Model, Vec<sale_item::Model>)],
    products: &[product::Model],
) -> Result<PendingReport, ServiceError> {
    let name_map: HashMap<Uuid, &str> =
        products.iter().map(|p| (p.id, p.name.as_str())).collect();

    let mut rollup: HashMap<Uuid, PendingReportItem> = HashMap::new();
    let mut total = Decimal::ZERO;

    for (sale, items) in sales_with_items {
        total += sale.total;
        for item in items {
            let name = name_map.get(&item.product_id).ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Sale item {} references missing product {}",
                    item.id, item.product_id
                ))
            })?;
            let entry = rollup
                .entry(item.product_id)
                .or_insert_with(|| PendingReportItem {
                    product_id: item.product_id,
                    product_name: (*name).to_string(),
                    quantity_sold: 0,
                    partial_amount: Decimal::ZERO,
                });
            entry.quantity_sold += i64::from(item.quantity);
            entry.partial_amount += item.total_price;
        }
    }

    let mut items: Vec<PendingReportItem> = rollup.into_values().collect();
    items.sort_by(|a, b| {
        b.quantity_sold
            .cmp(&a.quantity_sold)
            .then_with(|| a.product_name.cmp(&b.product_name))
    });

    Ok(PendingReport {
        pending_sales: sales_with_items.len(),
        items,
        total,
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PendingReport {
    pub pending_sales: usize,
    pub items: Vec<PendingReportItem>,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PendingReportItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity_sold: i64,
    pub partial_amount: Decimal,
}

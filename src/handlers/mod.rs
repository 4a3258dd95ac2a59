pub mod approvals;
pub mod products;
pub mod sales;
pub mod sync;
pub mod users;

use std::sync::Arc;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    approvals::ApprovalService, images::ImageStore, products::ProductService,
    reports::ReportService, sales::SaleService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub product: ProductService,
    pub sale: SaleService,
    pub approval: ApprovalService,
    pub report: ReportService,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        image_store: Arc<dyn ImageStore>,
    ) -> Self {
        let product = ProductService::new(db_pool.clone(), event_sender.clone(), image_store);
        let sale = SaleService::new(db_pool.clone(), event_sender.clone());
        let approval = ApprovalService::new(db_pool.clone(), event_sender);
        let report = ReportService::new(db_pool);

        Self {
            product,
            sale,
            approval,
            report,
        }
    }
}

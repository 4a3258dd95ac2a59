// Sync-and-approval core
pub mod approvals;
pub mod products;
pub mod sales;
pub mod stock;

// Read-side reporting
pub mod reports;

// Media attachments
pub mod images;

pub mod business;
pub mod product;
pub mod sale;
pub mod sale_item;
pub mod user_profile;

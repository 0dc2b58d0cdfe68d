pub mod library;
pub mod models;
pub mod store;

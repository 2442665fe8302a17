pub mod models;
pub mod reconcile;
pub mod store;

pub use store::ResultStore;

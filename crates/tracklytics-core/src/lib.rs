pub mod aggregate;
pub mod analytics;
pub mod attribution;
pub mod buckets;
pub mod config;
pub mod error;
pub mod event;
pub mod period;
pub mod sessionize;
pub mod store;
pub mod visitor;

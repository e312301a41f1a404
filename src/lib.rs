pub mod catalog;
pub mod config;
pub mod engine;
pub mod facility;
pub mod horizon;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod pricing;
pub mod projector;
pub mod wal;

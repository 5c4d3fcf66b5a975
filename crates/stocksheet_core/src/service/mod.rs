//! Sync orchestration over store, bus, debouncer and view.

pub mod stock_service;

pub use stock_service::{ServiceError, ServiceResult, StockService, SyncConfig};

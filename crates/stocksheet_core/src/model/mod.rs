//! Domain models shared across store, bus, view and service layers.

pub mod record;

pub use record::{QuantityUpdate, StockRecord, UpdateKey};

//! Derived, transient views over the raw record cache.

pub mod aggregate;

pub use aggregate::{ItemEntry, ItemView, StockView};

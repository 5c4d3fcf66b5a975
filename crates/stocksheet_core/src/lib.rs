//! Client-side inventory core backed by a spreadsheet reached through a
//! remote script endpoint.
//!
//! The crate owns the sync client (callback-correlated reads,
//! fire-and-forget writes), the cross-instance change bus with its two
//! backends, the keyed update debouncer, and the aggregation view the UI
//! glue renders from.

pub mod bus;
pub mod debounce;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;
pub mod view;

pub use bus::{
    open_bus, BusError, BusResult, ChangeBus, ChangeNotification, ChannelBus, ChannelHub,
    MarkerBus, NotificationKind, CHANNEL_NAME, MARKER_KEY,
};
pub use debounce::Debouncer;
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::{QuantityUpdate, StockRecord, UpdateKey};
pub use service::{ServiceError, ServiceResult, StockService, SyncConfig};
pub use store::{
    RemoteStore, ScriptEndpointStore, StoreConfig, StoreError, StoreResult, WriteSent,
};
pub use view::{ItemEntry, ItemView, StockView};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

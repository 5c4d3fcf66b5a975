//! Cross-instance change notification bus.
//!
//! # Responsibility
//! - Define the `ChangeBus` seam used to tell other open instances that
//!   remote data changed.
//! - Select a backend at startup: in-process channel hub when one is
//!   available, shared marker slot otherwise.
//!
//! # Invariants
//! - A publisher never receives its own notification.
//! - Receipt of any notification means "reload everything"; no ordering
//!   or delivery guarantee is provided, reload is idempotent.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod channel;
pub mod marker;

pub use channel::{ChannelBus, ChannelHub};
pub use marker::MarkerBus;

/// Fixed pub/sub channel name shared by all instances of the UI.
pub const CHANNEL_NAME: &str = "stock_system_updates";

/// Fixed key of the shared marker slot used by the fallback backend.
pub const MARKER_KEY: &str = "stock_system_update";

pub type BusResult<T> = Result<T, BusError>;

#[derive(Debug)]
pub enum BusError {
    Db(rusqlite::Error),
    Encode(serde_json::Error),
    UnsupportedSlotVersion { db_version: u32, latest_supported: u32 },
    NoBackend,
}

impl Display for BusError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Encode(err) => write!(f, "notification encoding failed: {err}"),
            Self::UnsupportedSlotVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "marker slot schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::NoBackend => write!(f, "no change-bus backend available"),
        }
    }
}

impl Error for BusError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::UnsupportedSlotVersion { .. } => None,
            Self::NoBackend => None,
        }
    }
}

impl From<rusqlite::Error> for BusError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(value)
    }
}

impl From<serde_json::Error> for BusError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DataChanged,
}

/// Ephemeral cache-invalidation signal sent between instances.
///
/// Carries no diff payload; consumers respond with a full reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
}

impl ChangeNotification {
    pub fn data_changed() -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0);
        Self {
            kind: NotificationKind::DataChanged,
            timestamp_ms,
        }
    }
}

/// Pub/sub handle for "data changed" signals.
pub trait ChangeBus: Send + Sync {
    fn publish(&self, note: &ChangeNotification) -> BusResult<()>;

    /// Returns the next pending foreign notification, if any.
    fn try_recv(&self) -> Option<ChangeNotification>;

    /// Blocks up to `timeout` for the next foreign notification.
    fn recv_timeout(&self, timeout: Duration) -> Option<ChangeNotification>;

    fn backend_name(&self) -> &'static str;
}

impl std::fmt::Debug for dyn ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dyn ChangeBus(backend={})", self.backend_name())
    }
}

/// Opens a change bus, preferring the direct pub/sub backend.
///
/// # Contract
/// - With a hub available, attaches to it (`channel` backend).
/// - Otherwise opens the shared marker slot (`marker` backend).
/// - With neither, fails with `BusError::NoBackend`.
pub fn open_bus(
    hub: Option<&ChannelHub>,
    marker_db: Option<&Path>,
) -> BusResult<Box<dyn ChangeBus>> {
    if let Some(hub) = hub {
        log::info!(
            "event=bus_open module=bus status=ok backend=channel name={}",
            hub.name()
        );
        return Ok(Box::new(hub.attach()));
    }

    if let Some(path) = marker_db {
        let bus = MarkerBus::open(path)?;
        log::info!(
            "event=bus_open module=bus status=ok backend=marker path={}",
            path.display()
        );
        return Ok(Box::new(bus));
    }

    log::error!("event=bus_open module=bus status=error error_code=no_backend");
    Err(BusError::NoBackend)
}

#[cfg(test)]
mod tests {
    use super::{ChangeNotification, NotificationKind};

    #[test]
    fn notification_serializes_to_wire_shape() {
        let note = ChangeNotification {
            kind: NotificationKind::DataChanged,
            timestamp_ms: 42,
        };
        let encoded = serde_json::to_string(&note).expect("notification should encode");
        assert_eq!(encoded, r#"{"type":"data_changed","timestamp":42}"#);

        let decoded: ChangeNotification =
            serde_json::from_str(&encoded).expect("notification should decode");
        assert_eq!(decoded, note);
    }

    #[test]
    fn data_changed_stamps_current_time() {
        let note = ChangeNotification::data_changed();
        assert_eq!(note.kind, NotificationKind::DataChanged);
        assert!(note.timestamp_ms > 0);
    }
}

//! Remote store adapter contracts and HTTP implementation.
//!
//! # Responsibility
//! - Define the `RemoteStore` seam between the sync service and the
//!   remote script endpoint.
//! - Keep transport and wire-protocol details inside this boundary.
//!
//! # Invariants
//! - Reads are correlated: a load only accepts the response invoking the
//!   callback key issued for that load.
//! - Writes are fire-and-forget: success means "sent", never "applied".

use crate::model::{QuantityUpdate, StockRecord};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

mod callback;
pub mod protocol;
mod script_client;

pub use callback::{CallbackRegistry, LoadTicket};
pub use script_client::ScriptEndpointStore;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised at the remote store boundary.
#[derive(Debug)]
pub enum StoreError {
    Transport(reqwest::Error),
    /// Response body did not invoke the callback issued for this load.
    CallbackMismatch { expected: String },
    /// A newer load replaced this one before its response arrived.
    Superseded { callback: String },
    MalformedPayload(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "transport failure: {err}"),
            Self::CallbackMismatch { expected } => {
                write!(f, "response did not invoke expected callback `{expected}`")
            }
            Self::Superseded { callback } => {
                write!(f, "load `{callback}` was replaced by a newer load")
            }
            Self::MalformedPayload(message) => write!(f, "malformed payload: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            Self::CallbackMismatch { .. } => None,
            Self::Superseded { .. } => None,
            Self::MalformedPayload(_) => None,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value)
    }
}

/// Receipt for a fire-and-forget write.
///
/// The write channel cannot observe the remote outcome, so this type
/// deliberately asserts only that the request left this process. The
/// delayed reconcile reload is the sole correction mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSent;

/// Remote endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub endpoint_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl StoreConfig {
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Store interface between sync service and the remote sheet.
pub trait RemoteStore: Send + Sync {
    /// Fetches the full record set.
    fn load(&self) -> StoreResult<Vec<StockRecord>>;

    /// Appends one record; outcome beyond transport is unobservable.
    fn add(&self, record: &StockRecord) -> StoreResult<WriteSent>;

    /// Rewrites the quantity of one dated batch; same write contract.
    fn update(&self, update: &QuantityUpdate) -> StoreResult<WriteSent>;
}

#[cfg(test)]
mod tests {
    use super::StoreConfig;

    #[test]
    fn config_defaults_timeout() {
        let config = StoreConfig::new("https://example.test/exec");
        assert_eq!(config.timeout_ms, 10_000);

        let parsed: StoreConfig =
            serde_json::from_str(r#"{"endpoint_url": "https://example.test/exec"}"#)
                .expect("config without timeout should deserialize");
        assert_eq!(parsed.timeout(), config.timeout());
    }
}

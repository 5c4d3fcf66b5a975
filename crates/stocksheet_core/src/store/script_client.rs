//! HTTP implementation of `RemoteStore` against a script endpoint.
//!
//! # Responsibility
//! - Issue callback-correlated GET loads and fire-and-forget POST writes.
//! - Emit `store_*` logging events with duration and status.
//!
//! # Invariants
//! - Each load runs under a fresh callback key from the registry; a load
//!   replaced mid-flight never delivers records.
//! - Write responses are never inspected beyond transport success.

use crate::model::{QuantityUpdate, StockRecord};
use crate::store::{protocol, CallbackRegistry, RemoteStore, StoreConfig, StoreResult, WriteSent};
use log::{error, info};
use serde_json::Value;
use std::time::Instant;

pub struct ScriptEndpointStore {
    client: reqwest::blocking::Client,
    endpoint_url: String,
    registry: CallbackRegistry,
}

impl ScriptEndpointStore {
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint_url: config.endpoint_url.clone(),
            registry: CallbackRegistry::new(),
        })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    fn post_write(&self, action: &str, payload: &Value) -> StoreResult<WriteSent> {
        let started_at = Instant::now();
        match self.client.post(&self.endpoint_url).json(payload).send() {
            Ok(_response) => {
                // Response body and status are intentionally not inspected.
                info!(
                    "event=store_write module=store status=sent action={action} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(WriteSent)
            }
            Err(err) => {
                error!(
                    "event=store_write module=store status=error action={action} duration_ms={} error={err}",
                    started_at.elapsed().as_millis()
                );
                Err(err.into())
            }
        }
    }
}

impl RemoteStore for ScriptEndpointStore {
    fn load(&self) -> StoreResult<Vec<StockRecord>> {
        let started_at = Instant::now();
        let ticket = self.registry.begin();
        info!(
            "event=store_load module=store status=start callback={}",
            ticket.callback()
        );

        let body = self
            .client
            .get(&self.endpoint_url)
            .query(&[("callback", ticket.callback())])
            .send()
            .and_then(|response| response.text());

        let body = match body {
            Ok(body) => body,
            Err(err) => {
                error!(
                    "event=store_load module=store status=error callback={} duration_ms={} error={err}",
                    ticket.callback(),
                    started_at.elapsed().as_millis()
                );
                return Err(err.into());
            }
        };

        // A newer load may have replaced this one while the response was
        // in flight; its records must not reach the cache.
        self.registry.finish(&ticket)?;

        let payload = protocol::extract_payload(ticket.callback(), &body)?;
        let records = protocol::decode_rows(&payload)?;
        info!(
            "event=store_load module=store status=ok callback={} rows={} duration_ms={}",
            ticket.callback(),
            records.len(),
            started_at.elapsed().as_millis()
        );
        Ok(records)
    }

    fn add(&self, record: &StockRecord) -> StoreResult<WriteSent> {
        self.post_write("add", &protocol::add_payload(record))
    }

    fn update(&self, update: &QuantityUpdate) -> StoreResult<WriteSent> {
        self.post_write("update", &protocol::update_payload(update))
    }
}

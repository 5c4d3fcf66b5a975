//! Stock synchronization service.
//!
//! # Responsibility
//! - Own the local record cache and its derived view.
//! - Apply optimistic mutations, issue writes, publish notifications and
//!   schedule the reconcile reload.
//! - Drain reload triggers and foreign notifications on the caller's
//!   thread.
//!
//! # Invariants
//! - The cache is fully replaced on every successful reload; no local
//!   record is ever authoritative.
//! - Writes never propagate failure to callers; they are logged and the
//!   next reload reconciles the display.
//! - A reload scheduled by a write strictly follows that write. No
//!   ordering holds between a local optimistic update and a reload
//!   triggered by another instance; a stale remote read may clobber a
//!   pending optimistic value until the write lands.

use crate::bus::{ChangeBus, ChangeNotification};
use crate::debounce::Debouncer;
use crate::model::{QuantityUpdate, StockRecord, UpdateKey};
use crate::store::RemoteStore;
use crate::view::StockView;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Default quiet period before a coalesced quantity update is sent.
pub const DEBOUNCE_QUIET: Duration = Duration::from_millis(5000);

/// Default delay before the reconcile reload that follows a write.
pub const RECONCILE_DELAY: Duration = Duration::from_millis(1500);

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug)]
pub enum ServiceError {
    Store(crate::store::StoreError),
    Bus(crate::bus::BusError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Bus(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Bus(err) => Some(err),
        }
    }
}

impl From<crate::store::StoreError> for ServiceError {
    fn from(value: crate::store::StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<crate::bus::BusError> for ServiceError {
    fn from(value: crate::bus::BusError) -> Self {
        Self::Bus(value)
    }
}

/// Timing knobs for the sync loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub debounce_quiet: Duration,
    pub reconcile_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_quiet: DEBOUNCE_QUIET,
            reconcile_delay: RECONCILE_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReloadTrigger {
    Reconcile,
    Remote,
}

impl ReloadTrigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::Reconcile => "reconcile",
            Self::Remote => "remote",
        }
    }
}

/// Client-side orchestrator for one open instance of the inventory UI.
pub struct StockService<S: RemoteStore + 'static> {
    store: Arc<S>,
    bus: Arc<dyn ChangeBus>,
    records: Vec<StockRecord>,
    view: StockView,
    loaded_once: bool,
    debouncer: Debouncer<UpdateKey, QuantityUpdate>,
    reload_tx: Sender<ReloadTrigger>,
    reload_rx: Receiver<ReloadTrigger>,
    reconcile_delay: Duration,
}

impl<S: RemoteStore + 'static> StockService<S> {
    pub fn new(store: S, bus: Box<dyn ChangeBus>, config: SyncConfig) -> Self {
        let store = Arc::new(store);
        let bus: Arc<dyn ChangeBus> = Arc::from(bus);
        let (reload_tx, reload_rx) = channel();

        let debouncer = {
            let store = Arc::clone(&store);
            let bus = Arc::clone(&bus);
            let reload_tx = reload_tx.clone();
            let reconcile_delay = config.reconcile_delay;
            Debouncer::new(config.debounce_quiet, move |_key, update: QuantityUpdate| {
                issue_write(
                    store.update(&update).map(|_| ()),
                    "update",
                    &update.name,
                );
                publish_change(bus.as_ref());
                schedule_reload(reload_tx.clone(), reconcile_delay, ReloadTrigger::Reconcile);
            })
        };

        Self {
            store,
            bus,
            records: Vec::new(),
            view: StockView::default(),
            loaded_once: false,
            debouncer,
            reload_tx,
            reload_rx,
            reconcile_delay: config.reconcile_delay,
        }
    }

    pub fn view(&self) -> &StockView {
        &self.view
    }

    pub fn records(&self) -> &[StockRecord] {
        &self.records
    }

    pub fn loaded_once(&self) -> bool {
        self.loaded_once
    }

    /// Fetches the full record set and replaces the cache.
    ///
    /// # Errors
    /// Propagates store failures; the caller surfaces them only for the
    /// very first load (pump-driven reloads are always quiet).
    pub fn reload(&mut self) -> ServiceResult<usize> {
        match self.store.load() {
            Ok(records) => {
                self.records = records;
                self.view = StockView::build(&self.records);
                self.loaded_once = true;
                info!(
                    "event=reload module=service status=ok rows={} items={}",
                    self.records.len(),
                    self.view.len()
                );
                Ok(self.records.len())
            }
            Err(err) => {
                error!("event=reload module=service status=error error={err}");
                Err(err.into())
            }
        }
    }

    /// Optimistically appends `record`, sends the `add` write, notifies
    /// other instances and schedules the reconcile reload.
    pub fn add_item(&mut self, record: StockRecord) {
        info!(
            "event=add_item module=service name={} quantity={}",
            record.name, record.quantity
        );

        self.records.push(record.clone());
        self.view = StockView::build(&self.records);

        issue_write(self.store.add(&record).map(|_| ()), "add", &record.name);
        publish_change(self.bus.as_ref());
        schedule_reload(
            self.reload_tx.clone(),
            self.reconcile_delay,
            ReloadTrigger::Reconcile,
        );
    }

    /// Optimistically patches the cache and hands the update to the
    /// debouncer; only the last update per key in a quiet window is sent.
    pub fn update_quantity(&mut self, update: QuantityUpdate) {
        self.apply_optimistic(&update);
        self.view = StockView::build(&self.records);
        self.debouncer.submit(update.key(), update);
    }

    /// Drains due reconcile reloads and foreign notifications, reloading
    /// once per drained signal. Failures are logged and swallowed; the
    /// display degrades to stale rather than erroring.
    pub fn pump(&mut self) -> usize {
        let mut reloads = 0;

        while let Ok(trigger) = self.reload_rx.try_recv() {
            self.reload_quietly(trigger);
            reloads += 1;
        }

        while let Some(_note) = self.bus.try_recv() {
            self.reload_quietly(ReloadTrigger::Remote);
            reloads += 1;
        }

        reloads
    }

    /// Sends every pending debounced update immediately.
    pub fn flush_pending_updates(&self) {
        self.debouncer.flush();
    }

    fn reload_quietly(&mut self, trigger: ReloadTrigger) {
        info!(
            "event=reload module=service status=start trigger={}",
            trigger.as_str()
        );
        if let Err(err) = self.reload() {
            warn!(
                "event=reload module=service status=swallowed trigger={} error={err}",
                trigger.as_str()
            );
        }
    }

    // Patches the record the update targets: exact dated batch when the
    // update carries a complete date, first record with the name
    // otherwise. An unknown target is left to the reconcile reload.
    fn apply_optimistic(&mut self, update: &QuantityUpdate) {
        let position = if update.has_complete_date() {
            self.records.iter().position(|record| {
                record.name == update.name
                    && record.day == update.day
                    && record.month == update.month
                    && record.year == update.year
            })
        } else {
            None
        };
        let position =
            position.or_else(|| self.records.iter().position(|record| record.name == update.name));

        match position {
            Some(index) => self.records[index].quantity = update.quantity,
            None => {
                info!(
                    "event=optimistic_update module=service status=skipped name={}",
                    update.name
                );
            }
        }
    }
}

fn issue_write(outcome: Result<(), crate::store::StoreError>, action: &str, name: &str) {
    match outcome {
        Ok(()) => info!("event=write module=service status=sent action={action} name={name}"),
        // Write failures are never surfaced; the reconcile reload is the
        // only correction mechanism.
        Err(err) => warn!(
            "event=write module=service status=swallowed action={action} name={name} error={err}"
        ),
    }
}

fn publish_change(bus: &dyn ChangeBus) {
    if let Err(err) = bus.publish(&ChangeNotification::data_changed()) {
        warn!("event=bus_publish module=service status=swallowed error={err}");
    }
}

fn schedule_reload(tx: Sender<ReloadTrigger>, delay: Duration, trigger: ReloadTrigger) {
    thread::spawn(move || {
        thread::sleep(delay);
        let _ = tx.send(trigger);
    });
}

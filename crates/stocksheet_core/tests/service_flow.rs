use stocksheet_core::{
    ChannelHub, QuantityUpdate, RemoteStore, StockRecord, StockService, StoreError, StoreResult,
    SyncConfig, WriteSent, CHANNEL_NAME,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct MockState {
    records: Mutex<Vec<StockRecord>>,
    loads: AtomicUsize,
    adds: Mutex<Vec<StockRecord>>,
    updates: Mutex<Vec<QuantityUpdate>>,
    fail_loads: AtomicBool,
}

/// In-memory stand-in for the remote script endpoint.
#[derive(Clone, Default)]
struct MockStore {
    state: Arc<MockState>,
}

impl MockStore {
    fn serving(records: Vec<StockRecord>) -> Self {
        let store = Self::default();
        *store.state.records.lock().expect("records lock") = records;
        store
    }

    fn load_count(&self) -> usize {
        self.state.loads.load(Ordering::SeqCst)
    }

    fn fail_loads(&self, fail: bool) {
        self.state.fail_loads.store(fail, Ordering::SeqCst);
    }

    fn sent_updates(&self) -> Vec<QuantityUpdate> {
        self.state.updates.lock().expect("updates lock").clone()
    }

    fn sent_adds(&self) -> Vec<StockRecord> {
        self.state.adds.lock().expect("adds lock").clone()
    }
}

impl RemoteStore for MockStore {
    fn load(&self) -> StoreResult<Vec<StockRecord>> {
        self.state.loads.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::MalformedPayload("mock outage".to_string()));
        }
        Ok(self.state.records.lock().expect("records lock").clone())
    }

    fn add(&self, record: &StockRecord) -> StoreResult<WriteSent> {
        self.state
            .adds
            .lock()
            .expect("adds lock")
            .push(record.clone());
        Ok(WriteSent)
    }

    fn update(&self, update: &QuantityUpdate) -> StoreResult<WriteSent> {
        self.state
            .updates
            .lock()
            .expect("updates lock")
            .push(update.clone());
        Ok(WriteSent)
    }
}

fn service_on_hub(
    hub: &ChannelHub,
    store: MockStore,
    config: SyncConfig,
) -> StockService<MockStore> {
    let bus = stocksheet_core::open_bus(Some(hub), None).expect("channel backend should open");
    StockService::new(store, bus, config)
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        debounce_quiet: Duration::from_millis(30),
        reconcile_delay: Duration::from_millis(10),
    }
}

#[test]
fn optimistic_add_renders_before_any_reload() {
    let hub = ChannelHub::new(CHANNEL_NAME);
    let store = MockStore::default();
    let mut service = service_on_hub(&hub, store.clone(), SyncConfig::default());

    service.add_item(StockRecord::new("Rice", "01", "Jan", "2024", 0));

    assert!(service.view().get("Rice").is_some());
    assert_eq!(store.sent_adds().len(), 1);
    assert_eq!(store.load_count(), 0, "display precedes any reload");
}

#[test]
fn reload_fully_replaces_the_optimistic_cache() {
    let hub = ChannelHub::new(CHANNEL_NAME);
    let store = MockStore::serving(vec![StockRecord::new("Rice", "01", "Jan", "2024", 5)]);
    let mut service = service_on_hub(&hub, store.clone(), SyncConfig::default());

    service.add_item(StockRecord::new("Beans", "02", "Jan", "2024", 1));
    assert!(service.view().get("Beans").is_some());

    // The store never accepted the write; the reload silently reverts it.
    service.reload().expect("reload should succeed");
    assert!(service.view().get("Beans").is_none());
    assert!(service.view().get("Rice").is_some());
}

#[test]
fn first_load_error_propagates_then_later_load_recovers() {
    let hub = ChannelHub::new(CHANNEL_NAME);
    let store = MockStore::serving(vec![StockRecord::new("Rice", "01", "Jan", "2024", 5)]);
    store.fail_loads(true);
    let mut service = service_on_hub(&hub, store.clone(), SyncConfig::default());

    service
        .reload()
        .expect_err("very first load failure must be visible");
    assert!(!service.loaded_once());

    store.fail_loads(false);
    let rows = service.reload().expect("recovered load should succeed");
    assert_eq!(rows, 1);
    assert!(service.loaded_once());
}

#[test]
fn pump_swallows_reload_failures_and_keeps_stale_view() {
    let hub = ChannelHub::new(CHANNEL_NAME);
    let store = MockStore::serving(vec![StockRecord::new("Rice", "01", "Jan", "2024", 5)]);
    let mut service = service_on_hub(&hub, store.clone(), SyncConfig::default());
    let other_tab = hub.attach();

    service.reload().expect("initial load should succeed");
    store.fail_loads(true);

    use stocksheet_core::{ChangeBus, ChangeNotification};
    other_tab
        .publish(&ChangeNotification::data_changed())
        .expect("publish should succeed");

    let reloads = service.pump();
    assert_eq!(reloads, 1, "notification still triggers one reload");
    assert!(
        service.view().get("Rice").is_some(),
        "failed reload degrades to the stale view"
    );
}

#[test]
fn debounced_updates_coalesce_to_one_write_with_last_value() {
    let hub = ChannelHub::new(CHANNEL_NAME);
    let store = MockStore::serving(vec![StockRecord::new("Rice", "01", "Jan", "2024", 5)]);
    let mut service = service_on_hub(&hub, store.clone(), SyncConfig::default());
    service.reload().expect("initial load should succeed");

    for quantity in [6, 7, 8] {
        service.update_quantity(QuantityUpdate::new("Rice", quantity, "01", "Jan", "2024"));
    }

    // Optimistic display shows the last value before anything is sent.
    let rice = service.view().get("Rice").expect("Rice should render");
    assert_eq!(rice.total_quantity, 8);
    assert!(store.sent_updates().is_empty());

    service.flush_pending_updates();
    let sent = store.sent_updates();
    assert_eq!(sent.len(), 1, "one write per quiet window");
    assert_eq!(sent[0].quantity, 8, "the last value wins");
}

#[test]
fn updates_to_different_batches_both_fire() {
    let hub = ChannelHub::new(CHANNEL_NAME);
    let store = MockStore::serving(vec![
        StockRecord::new("Rice", "01", "Jan", "2024", 5),
        StockRecord::new("Rice", "15", "Feb", "2024", 3),
    ]);
    let mut service = service_on_hub(&hub, store.clone(), SyncConfig::default());
    service.reload().expect("initial load should succeed");

    service.update_quantity(QuantityUpdate::new("Rice", 6, "01", "Jan", "2024"));
    service.update_quantity(QuantityUpdate::new("Rice", 9, "15", "Feb", "2024"));

    // Both dated batches patched optimistically.
    assert_eq!(service.records()[0].quantity, 6);
    assert_eq!(service.records()[1].quantity, 9);

    service.flush_pending_updates();
    let mut quantities: Vec<u32> = store
        .sent_updates()
        .iter()
        .map(|update| update.quantity)
        .collect();
    quantities.sort_unstable();
    assert_eq!(quantities, [6, 9], "distinct keys never cancel each other");
}

#[test]
fn debounced_write_schedules_a_reconcile_reload() {
    let hub = ChannelHub::new(CHANNEL_NAME);
    let store = MockStore::serving(vec![StockRecord::new("Rice", "01", "Jan", "2024", 5)]);
    let mut service = service_on_hub(&hub, store.clone(), fast_config());
    service.reload().expect("initial load should succeed");
    let loads_before = store.load_count();

    service.update_quantity(QuantityUpdate::new("Rice", 6, "01", "Jan", "2024"));
    service.flush_pending_updates();

    thread::sleep(Duration::from_millis(80));
    let reloads = service.pump();
    assert!(reloads >= 1, "reconcile reload should come due");
    assert!(store.load_count() > loads_before);
}

#[test]
fn notification_reloads_the_other_tab_but_never_the_publisher() {
    let hub = ChannelHub::new(CHANNEL_NAME);
    let store_a = MockStore::serving(vec![StockRecord::new("Rice", "01", "Jan", "2024", 5)]);
    let store_b = MockStore::serving(vec![StockRecord::new("Rice", "01", "Jan", "2024", 5)]);
    let mut tab_a = service_on_hub(&hub, store_a.clone(), SyncConfig::default());
    let mut tab_b = service_on_hub(&hub, store_b.clone(), SyncConfig::default());

    tab_a.reload().expect("tab A initial load");
    tab_b.reload().expect("tab B initial load");
    let a_loads = store_a.load_count();
    let b_loads = store_b.load_count();

    tab_a.add_item(StockRecord::new("Beans", "02", "Jan", "2024", 1));

    assert_eq!(tab_b.pump(), 1, "exactly one reload in the other tab");
    assert_eq!(store_b.load_count(), b_loads + 1);

    // The publisher's own pump sees no notification (its reconcile
    // reload is not yet due with the default 1500 ms delay).
    assert_eq!(tab_a.pump(), 0);
    assert_eq!(store_a.load_count(), a_loads);
}

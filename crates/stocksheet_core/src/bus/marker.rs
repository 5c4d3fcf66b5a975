//! Shared marker slot backend.
//!
//! # Responsibility
//! - Publish notifications by writing a timestamped marker into a shared
//!   persistent key-value slot visible to all instances.
//! - Detect foreign markers by polling the slot revision.
//!
//! # Invariants
//! - Slot schema version is tracked via `PRAGMA user_version`.
//! - Every write bumps the revision, so repeated identical payloads are
//!   still detected.
//! - A published marker is cleared ~100 ms after being set, and only by
//!   its own writer.

use super::{BusError, BusResult, ChangeBus, ChangeNotification, MARKER_KEY};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const SLOT_SCHEMA_VERSION: u32 = 1;
const SLOT_SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS markers (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    writer TEXT NOT NULL,
    revision INTEGER NOT NULL
);";

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Delay before a writer clears its own marker.
pub const MARKER_CLEAR_DELAY: Duration = Duration::from_millis(100);

/// Change bus backed by a shared SQLite marker slot.
pub struct MarkerBus {
    path: PathBuf,
    writer_id: String,
    conn: Mutex<Connection>,
    rx: Mutex<Receiver<ChangeNotification>>,
    stop: Arc<AtomicBool>,
    poller: Option<JoinHandle<()>>,
}

impl MarkerBus {
    /// Opens the slot at `path`, creating its schema when missing, and
    /// starts the revision poller.
    pub fn open(path: impl AsRef<Path>) -> BusResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = open_slot_db(&path)?;
        let last_seen = read_marker(&conn)?.map(|marker| marker.revision).unwrap_or(0);

        let poller_conn = open_slot_db(&path)?;
        let writer_id = Uuid::new_v4().simple().to_string();
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = channel();

        let poller = spawn_poller(poller_conn, writer_id.clone(), last_seen, Arc::clone(&stop), tx);

        Ok(Self {
            path,
            writer_id,
            conn: Mutex::new(conn),
            rx: Mutex::new(rx),
            stop,
            poller: Some(poller),
        })
    }

    pub fn writer_id(&self) -> &str {
        &self.writer_id
    }

    fn spawn_clear(&self, revision: i64) {
        let path = self.path.clone();
        let writer_id = self.writer_id.clone();
        thread::spawn(move || {
            thread::sleep(MARKER_CLEAR_DELAY);
            match open_slot_db(&path) {
                Ok(conn) => {
                    let cleared = conn.execute(
                        "DELETE FROM markers WHERE key = ?1 AND writer = ?2 AND revision = ?3;",
                        params![MARKER_KEY, writer_id, revision],
                    );
                    if let Err(err) = cleared {
                        debug!("event=marker_clear module=bus status=error error={err}");
                    }
                }
                Err(err) => debug!("event=marker_clear module=bus status=error error={err}"),
            }
        });
    }
}

impl ChangeBus for MarkerBus {
    fn publish(&self, note: &ChangeNotification) -> BusResult<()> {
        let value = serde_json::to_string(note)?;
        // The revision must stay monotonic across clears, so a cleared
        // slot cannot hand a previously-seen revision to a later write.
        let revision = monotonic_revision();
        {
            let conn = lock_conn(&self.conn);
            conn.execute(
                "INSERT INTO markers (key, value, writer, revision)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    writer = excluded.writer,
                    revision = excluded.revision;",
                params![MARKER_KEY, value, self.writer_id, revision],
            )?;
        }

        info!("event=bus_publish module=bus backend=marker revision={revision}");
        self.spawn_clear(revision);
        Ok(())
    }

    fn try_recv(&self) -> Option<ChangeNotification> {
        lock_rx(&self.rx).try_recv().ok()
    }

    fn recv_timeout(&self, timeout: Duration) -> Option<ChangeNotification> {
        lock_rx(&self.rx).recv_timeout(timeout).ok()
    }

    fn backend_name(&self) -> &'static str {
        "marker"
    }
}

impl Drop for MarkerBus {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(poller) = self.poller.take() {
            let _ = poller.join();
        }
    }
}

struct Marker {
    revision: i64,
    writer: String,
    value: String,
}

fn spawn_poller(
    conn: Connection,
    writer_id: String,
    mut last_seen: i64,
    stop: Arc<AtomicBool>,
    tx: Sender<ChangeNotification>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        thread::sleep(POLL_INTERVAL);

        let marker = match read_marker(&conn) {
            Ok(marker) => marker,
            Err(err) => {
                warn!("event=marker_poll module=bus status=error error={err}");
                continue;
            }
        };

        let Some(marker) = marker else { continue };
        if marker.revision == last_seen {
            continue;
        }
        last_seen = marker.revision;

        // Own markers are invisible, matching direct pub/sub semantics.
        if marker.writer == writer_id {
            continue;
        }

        match serde_json::from_str::<ChangeNotification>(&marker.value) {
            Ok(note) => {
                if tx.send(note).is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!("event=marker_poll module=bus status=error error_code=bad_payload error={err}");
            }
        }
    })
}

fn monotonic_revision() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as i64)
        .unwrap_or(0)
}

fn open_slot_db(path: &Path) -> BusResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;

    let db_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if db_version > SLOT_SCHEMA_VERSION {
        return Err(BusError::UnsupportedSlotVersion {
            db_version,
            latest_supported: SLOT_SCHEMA_VERSION,
        });
    }
    if db_version < SLOT_SCHEMA_VERSION {
        conn.execute_batch(SLOT_SCHEMA_SQL)?;
        conn.execute_batch(&format!("PRAGMA user_version = {SLOT_SCHEMA_VERSION};"))?;
    }

    Ok(conn)
}

fn read_marker(conn: &Connection) -> BusResult<Option<Marker>> {
    let marker = conn
        .query_row(
            "SELECT revision, writer, value FROM markers WHERE key = ?1;",
            [MARKER_KEY],
            |row| {
                Ok(Marker {
                    revision: row.get(0)?,
                    writer: row.get(1)?,
                    value: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(marker)
}

fn lock_conn(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    match conn.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_rx(
    rx: &Mutex<Receiver<ChangeNotification>>,
) -> MutexGuard<'_, Receiver<ChangeNotification>> {
    match rx.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

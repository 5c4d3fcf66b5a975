//! In-process pub/sub backend.
//!
//! Direct analog of a named broadcast channel: every attached handle may
//! publish, and all other handles on the same hub receive the message.

use super::{BusResult, ChangeBus, ChangeNotification};
use log::debug;
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct HubState {
    members: HashMap<u64, Sender<ChangeNotification>>,
    next_id: u64,
}

/// Named hub connecting all in-process bus handles.
pub struct ChannelHub {
    name: String,
    state: Arc<Mutex<HubState>>,
}

impl ChannelHub {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(HubState::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member_count(&self) -> usize {
        lock_state(&self.state).members.len()
    }

    /// Attaches a new handle with its own delivery queue.
    pub fn attach(&self) -> ChannelBus {
        let (tx, rx) = channel();
        let mut state = lock_state(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        state.members.insert(id, tx);
        debug!(
            "event=bus_attach module=bus backend=channel name={} member={id}",
            self.name
        );
        ChannelBus {
            state: Arc::clone(&self.state),
            id,
            rx: Mutex::new(rx),
        }
    }
}

/// One attached instance on a `ChannelHub`.
pub struct ChannelBus {
    state: Arc<Mutex<HubState>>,
    id: u64,
    rx: Mutex<Receiver<ChangeNotification>>,
}

impl ChangeBus for ChannelBus {
    fn publish(&self, note: &ChangeNotification) -> BusResult<()> {
        let state = lock_state(&self.state);
        for (member, tx) in &state.members {
            if *member == self.id {
                continue;
            }
            // A dropped member is cleaned up by its own Drop; ignore here.
            let _ = tx.send(note.clone());
        }
        debug!(
            "event=bus_publish module=bus backend=channel members={}",
            state.members.len().saturating_sub(1)
        );
        Ok(())
    }

    fn try_recv(&self) -> Option<ChangeNotification> {
        lock_rx(&self.rx).try_recv().ok()
    }

    fn recv_timeout(&self, timeout: Duration) -> Option<ChangeNotification> {
        lock_rx(&self.rx).recv_timeout(timeout).ok()
    }

    fn backend_name(&self) -> &'static str {
        "channel"
    }
}

impl Drop for ChannelBus {
    fn drop(&mut self) {
        lock_state(&self.state).members.remove(&self.id);
    }
}

fn lock_state(state: &Mutex<HubState>) -> MutexGuard<'_, HubState> {
    match state.lock() {
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

#[cfg(test)]
mod tests {
    use super::ChannelHub;
    use crate::bus::{ChangeBus, ChangeNotification, CHANNEL_NAME};

    #[test]
    fn publisher_does_not_receive_own_message() {
        let hub = ChannelHub::new(CHANNEL_NAME);
        let publisher = hub.attach();
        let receiver = hub.attach();

        publisher
            .publish(&ChangeNotification::data_changed())
            .expect("publish should succeed");

        assert!(receiver.try_recv().is_some());
        assert!(receiver.try_recv().is_none());
        assert!(publisher.try_recv().is_none());
    }

    #[test]
    fn all_other_members_receive() {
        let hub = ChannelHub::new(CHANNEL_NAME);
        let publisher = hub.attach();
        let first = hub.attach();
        let second = hub.attach();

        publisher
            .publish(&ChangeNotification::data_changed())
            .expect("publish should succeed");

        assert!(first.try_recv().is_some());
        assert!(second.try_recv().is_some());
    }

    #[test]
    fn detached_members_are_removed() {
        let hub = ChannelHub::new(CHANNEL_NAME);
        let publisher = hub.attach();
        {
            let _transient = hub.attach();
            assert_eq!(hub.member_count(), 2);
        }
        assert_eq!(hub.member_count(), 1);

        publisher
            .publish(&ChangeNotification::data_changed())
            .expect("publish after detach should succeed");
    }
}

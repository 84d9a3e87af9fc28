//! Change notifications for dictionary streams.
//!
//! Each watched dictionary has a broadcast channel. A notification carries no payload; the
//! stream handler reloads the full state, so a lagging listener only skips stale states.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 16;

#[derive(Default)]
pub struct ChangeHub {
    channels: Mutex<HashMap<Uuid, broadcast::Sender<()>>>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, dictionary_id: Uuid) -> broadcast::Receiver<()> {
        self.lock()
            .entry(dictionary_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Wake every listener of a dictionary. Channels without listeners are dropped.
    pub fn notify(&self, dictionary_id: Uuid) {
        let mut channels = self.lock();
        if let Some(sender) = channels.get(&dictionary_id) {
            if sender.send(()).is_err() {
                channels.remove(&dictionary_id);
            }
        }
    }

    /// End every stream of a dictionary.
    pub fn close(&self, dictionary_id: Uuid) {
        self.lock().remove(&dictionary_id);
    }

    pub fn listener_count(&self, dictionary_id: Uuid) -> usize {
        self.lock()
            .get(&dictionary_id)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, broadcast::Sender<()>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;
    use tokio_test::{assert_pending, assert_ready_ok, task};

    #[tokio::test]
    async fn listeners_are_woken() {
        let hub = ChangeHub::new();
        let id = Uuid::new_v4();
        let mut first = hub.subscribe(id);
        let mut second = hub.subscribe(id);

        hub.notify(id);
        assert!(first.recv().await.is_ok());
        assert!(second.recv().await.is_ok());
        assert_eq!(hub.listener_count(id), 2);
    }

    #[test]
    fn other_dictionaries_are_not_woken() {
        let hub = ChangeHub::new();
        let id = Uuid::new_v4();
        let mut listener = hub.subscribe(id);
        let mut recv = task::spawn(listener.recv());

        assert_pending!(recv.poll());
        hub.notify(Uuid::new_v4());
        assert!(!recv.is_woken());

        hub.notify(id);
        assert!(recv.is_woken());
        assert_ready_ok!(recv.poll());
    }

    #[tokio::test]
    async fn close_ends_streams() {
        let hub = ChangeHub::new();
        let id = Uuid::new_v4();
        let mut listener = hub.subscribe(id);

        hub.close(id);
        assert_eq!(listener.recv().await, Err(RecvError::Closed));
        assert_eq!(hub.listener_count(id), 0);
    }

    #[test]
    fn abandoned_channels_are_pruned() {
        let hub = ChangeHub::new();
        let id = Uuid::new_v4();
        drop(hub.subscribe(id));

        hub.notify(id);
        assert!(hub.lock().is_empty());
    }
}

use log::debug;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::models::PollSnapshot;

/// Default per-subscriber buffer. A viewer that falls further behind than
/// this loses its oldest snapshots (it lags, it is never waited on).
const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Fan-out of statistics snapshots to live viewers, one broadcast channel
/// per poll.
///
/// Delivery is best-effort: a slow or gone subscriber only affects its own
/// receiver. Dropping a receiver is the unsubscribe; channels with no
/// remaining receivers are pruned on the next publish to that poll. The
/// map mutex is never held across an await.
pub struct UpdateHub {
    channels: Mutex<HashMap<i64, broadcast::Sender<PollSnapshot>>>,
    capacity: usize,
}

impl Default for UpdateHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl UpdateHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Open a live update stream for a poll. The receiver only sees
    /// snapshots published after this call; there is no replay.
    pub fn subscribe(&self, poll_id: i64) -> broadcast::Receiver<PollSnapshot> {
        let mut channels = self.channels.lock().expect("hub lock poisoned");
        let sender = channels
            .entry(poll_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        sender.subscribe()
    }

    /// Deliver a snapshot to every current subscriber of the poll.
    /// Returns the number of receivers reached; no subscribers is a no-op.
    pub fn publish(&self, poll_id: i64, snapshot: PollSnapshot) -> usize {
        let mut channels = self.channels.lock().expect("hub lock poisoned");
        let sent = match channels.get(&poll_id) {
            Some(sender) => sender.send(snapshot),
            None => return 0,
        };

        match sent {
            Ok(reached) => reached,
            Err(_) => {
                // Every receiver has been dropped; free the channel.
                debug!("Pruning subscriber channel for poll {poll_id}");
                channels.remove(&poll_id);
                0
            }
        }
    }

    /// Number of live subscribers for a poll.
    pub fn subscriber_count(&self, poll_id: i64) -> usize {
        let channels = self.channels.lock().expect("hub lock poisoned");
        channels
            .get(&poll_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

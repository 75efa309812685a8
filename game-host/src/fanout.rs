// Copyright 2026 DungeonGate Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Stream Fan-out + Subscriber Registry: one PTY's output copied to every
//! attached player/spectator stream, an arbitrary number of concurrent
//! subscribers each with its own bounded, drop-on-full mailbox so one slow
//! spectator can never back-pressure the player or other spectators.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use tokio::sync::mpsc;

use dungeongate_common::consts::SUBSCRIBER_QUEUE_CAPACITY;

pub type SubscriberId = u64;

/// One subscriber's outbound mailbox. The sender half is cloned into
/// `Fanout`'s subscriber map; the receiver half is handed back to
/// `Fanout::subscribe`'s caller to drain in its own pump task.
pub struct Subscription {
    pub id: SubscriberId,
    pub rx: mpsc::Receiver<Vec<u8>>,
}

struct SubscriberSlot {
    tx: mpsc::Sender<Vec<u8>>,
    /// `true` for the one subscriber allowed to also drive input (the
    /// player); spectators are fan-out-only and this is always `false` for
    /// them. Purely informational here — `session-bridge` is the one that
    /// enforces who may write, this just lets `spectator_count` exclude the
    /// player from its count per spec's "spectator_count" wire field.
    is_player: bool,
    /// The spectating user's id, carried over from the `Connect` frame that
    /// opened this subscription. `None` for the player slot and for any
    /// spectator slot whose frame predates identity tagging. Lets
    /// `RemoveSpectator` target and evict a specific spectator's live
    /// subscription rather than only bookkeeping membership.
    spectator_user_id: Option<i32>,
}

/// Broadcasts one PTY's byte stream to however many subscribers are
/// currently attached, and tracks which user ids currently hold a
/// spectator slot — the Subscriber Registry's membership half, as distinct
/// from the byte-delivery half above.
pub struct Fanout {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriberId, SubscriberSlot>>,
    spectators: Mutex<HashMap<i32, String>>,
}

impl Fanout {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Fanout {
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(HashMap::new()),
            spectators: Mutex::new(HashMap::new()),
        })
    }

    pub fn subscribe(&self, is_player: bool, spectator_user_id: Option<i32>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        self.subscribers.lock().unwrap().insert(id, SubscriberSlot { tx, is_player, spectator_user_id });
        Subscription { id, rx }
    }

    /// Idempotent: unsubscribing an id that's already gone (or was never
    /// present) is a no-op, matching spec's "Unsubscribe(id) — idempotent".
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.lock().unwrap().remove(&id);
    }

    /// `AddSpectator`: records `user_id` as a registered spectator of this
    /// session. Returns `false` if `user_id` is already registered (the
    /// caller is asked to join twice, e.g. a retried RPC) rather than
    /// silently doubling up the membership record.
    pub fn register_spectator(&self, user_id: i32, username: String) -> bool {
        use std::collections::hash_map::Entry;
        match self.spectators.lock().unwrap().entry(user_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(username);
                true
            }
        }
    }

    /// `RemoveSpectator`: drops `user_id`'s membership record and, if a live
    /// `StreamGameIO` attachment for that user is still subscribed, evicts
    /// it — its sender is removed, so the attachment's next `rx.recv()`
    /// observes `None` the same way a normal detach would, rather than
    /// lingering until the stream notices on its own. Returns whether
    /// `user_id` was a registered spectator.
    pub fn unregister_spectator(&self, user_id: i32) -> bool {
        let was_registered = self.spectators.lock().unwrap().remove(&user_id).is_some();
        self.subscribers.lock().unwrap().retain(|_, slot| slot.spectator_user_id != Some(user_id));
        was_registered
    }

    /// Registered spectator usernames, keyed by user id, for roster display.
    pub fn registered_spectators(&self) -> HashMap<i32, String> {
        self.spectators.lock().unwrap().clone()
    }

    /// Copies `bytes` to every current subscriber. Uses `try_send` so a
    /// subscriber whose mailbox is full gets this chunk dropped rather than
    /// stalling the broadcaster; the subscriber's own pump will simply see a
    /// gap, which for a terminal stream self-heals on the next full-screen
    /// repaint rather than corrupting state.
    pub fn broadcast(&self, bytes: &[u8]) {
        let subscribers = self.subscribers.lock().unwrap();
        for slot in subscribers.values() {
            let _ = slot.tx.try_send(bytes.to_vec());
        }
    }

    /// Drops every subscriber's sender, which turns each subscriber's next
    /// `rx.recv()` into `None` — the signal the Game I/O Proxy pump uses to
    /// tell a genuine "process exited" from an ordinary dropped chunk.
    /// Called once by the output pump when it observes EOF on the pty.
    pub fn close_all(&self) {
        self.subscribers.lock().unwrap().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Spectators are every subscriber that isn't the player attachment.
    pub fn spectator_count(&self) -> usize {
        self.subscribers.lock().unwrap().values().filter(|s| !s.is_player).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let fanout = Fanout::new();
        let mut a = fanout.subscribe(true, None);
        let mut b = fanout.subscribe(false, Some(7));

        fanout.broadcast(b"hello");

        assert_eq!(a.rx.recv().await.unwrap(), b"hello");
        assert_eq!(b.rx.recv().await.unwrap(), b"hello");
        assert_eq!(fanout.spectator_count(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let fanout = Fanout::new();
        let sub = fanout.subscribe(false, Some(1));
        fanout.unsubscribe(sub.id);
        fanout.unsubscribe(sub.id);
        assert_eq!(fanout.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn full_mailbox_drops_instead_of_blocking() {
        let fanout = Fanout::new();
        let sub = fanout.subscribe(false, None);
        for _ in 0..(SUBSCRIBER_QUEUE_CAPACITY + 10) {
            fanout.broadcast(b"x");
        }
        // The broadcaster never blocked getting here; the receiver still
        // has at most `SUBSCRIBER_QUEUE_CAPACITY` queued messages.
        drop(sub);
        assert_eq!(fanout.subscriber_count(), 1);
    }

    #[test]
    fn register_spectator_rejects_duplicate() {
        let fanout = Fanout::new();
        assert!(fanout.register_spectator(5, "alice".to_string()));
        assert!(!fanout.register_spectator(5, "alice".to_string()));
        assert_eq!(fanout.registered_spectators().len(), 1);
    }

    #[tokio::test]
    async fn unregister_spectator_evicts_live_subscription() {
        let fanout = Fanout::new();
        fanout.register_spectator(5, "alice".to_string());
        let mut sub = fanout.subscribe(false, Some(5));

        assert!(fanout.unregister_spectator(5));
        assert_eq!(fanout.subscriber_count(), 0);
        assert!(sub.rx.recv().await.is_none());
        assert!(fanout.registered_spectators().is_empty());
    }

    #[test]
    fn unregister_spectator_is_idempotent_for_unknown_user() {
        let fanout = Fanout::new();
        assert!(!fanout.unregister_spectator(99));
    }
}

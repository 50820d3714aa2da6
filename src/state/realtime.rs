use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dto::events::ServerEvent;

/// Ephemeral UI payload wrapped with its deduplication id.
#[derive(Debug, Clone)]
pub struct UiFrame {
    /// Monotonically increasing, timestamp-derived event id.
    pub id: u64,
    /// Serialized event payload.
    pub event: ServerEvent,
}

/// Broadcast channel pair for one game: authoritative state snapshots on one
/// lane, ephemeral UI events on the other.
struct GameChannel {
    state_tx: broadcast::Sender<ServerEvent>,
    ui_tx: broadcast::Sender<UiFrame>,
}

impl GameChannel {
    fn new(capacity: usize) -> Self {
        let (state_tx, _) = broadcast::channel(capacity);
        let (ui_tx, _) = broadcast::channel(capacity);
        Self { state_tx, ui_tx }
    }
}

/// Realtime sub-state carved out from [`AppState`](super::AppState): per-game
/// broadcast hubs plus the shared UI event id allocator.
pub struct RealtimeState {
    channels: DashMap<Uuid, GameChannel>,
    capacity: usize,
    last_event_id: AtomicU64,
}

impl RealtimeState {
    /// Build the realtime sub-tree with the given per-channel capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
            last_event_id: AtomicU64::new(0),
        }
    }

    /// Send an authoritative state event to every subscriber of `game_id`,
    /// ignoring delivery errors.
    pub fn broadcast_state(&self, game_id: Uuid, event: ServerEvent) {
        let channel = self
            .channels
            .entry(game_id)
            .or_insert_with(|| GameChannel::new(self.capacity));
        let _ = channel.state_tx.send(event);
    }

    /// Send an ephemeral UI event to every subscriber of `game_id`, returning
    /// the allocated event id.
    pub fn broadcast_ui(&self, game_id: Uuid, event: ServerEvent) -> u64 {
        let id = self.next_event_id();
        let channel = self
            .channels
            .entry(game_id)
            .or_insert_with(|| GameChannel::new(self.capacity));
        let _ = channel.ui_tx.send(UiFrame { id, event });
        id
    }

    /// Register a subscriber for both lanes of a game.
    pub fn subscribe(
        &self,
        game_id: Uuid,
    ) -> (
        broadcast::Receiver<ServerEvent>,
        broadcast::Receiver<UiFrame>,
    ) {
        let channel = self
            .channels
            .entry(game_id)
            .or_insert_with(|| GameChannel::new(self.capacity));
        (channel.state_tx.subscribe(), channel.ui_tx.subscribe())
    }

    /// Drop the channels of a finished game.
    pub fn remove(&self, game_id: Uuid) {
        self.channels.remove(&game_id);
    }

    /// Allocate a monotonically increasing event id seeded from wall-clock
    /// milliseconds, so ids stay ordered across process restarts.
    fn next_event_id(&self) -> u64 {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        self.last_event_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(last.max(now_ms).wrapping_add(1))
            })
            .map(|last| last.max(now_ms).wrapping_add(1))
            .unwrap_or(now_ms)
    }
}

/// Bounded ordered set of recently seen UI event ids, owned per viewing
/// session. Replays after reconnects are dropped; the oldest entry is trimmed
/// first once the bound is reached.
#[derive(Debug)]
pub struct RecentEvents {
    seen: VecDeque<u64>,
    capacity: usize,
}

impl RecentEvents {
    /// Build a ring remembering at most `capacity` ids.
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record `id`; returns `false` when it was already seen.
    pub fn observe(&mut self, id: u64) -> bool {
        if self.seen.contains(&id) {
            return false;
        }
        if self.seen.len() == self.capacity {
            self.seen.pop_front();
        }
        self.seen.push_back(id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_are_strictly_increasing() {
        let realtime = RealtimeState::new(4);
        let game_id = Uuid::new_v4();
        let first = realtime.broadcast_ui(game_id, ServerEvent::new(None, "a".into()));
        let second = realtime.broadcast_ui(game_id, ServerEvent::new(None, "b".into()));
        assert!(second > first);
    }

    #[test]
    fn recent_events_drop_replays() {
        let mut seen = RecentEvents::new(8);
        assert!(seen.observe(1));
        assert!(seen.observe(2));
        assert!(!seen.observe(1));
        assert!(!seen.observe(2));
    }

    #[test]
    fn recent_events_trim_oldest_first() {
        let mut seen = RecentEvents::new(2);
        assert!(seen.observe(1));
        assert!(seen.observe(2));
        assert!(seen.observe(3));
        // 1 aged out of the ring, so a very old replay slips through; that is
        // the accepted trade-off of the bounded set.
        assert!(seen.observe(1));
        assert!(!seen.observe(3));
    }

    #[tokio::test]
    async fn subscribers_receive_ui_frames() {
        let realtime = RealtimeState::new(4);
        let game_id = Uuid::new_v4();
        let (_state_rx, mut ui_rx) = realtime.subscribe(game_id);
        let id = realtime.broadcast_ui(game_id, ServerEvent::new(None, "cheers".into()));
        let frame = ui_rx.recv().await.unwrap();
        assert_eq!(frame.id, id);
        assert_eq!(frame.event.data, "cheers");
    }
}

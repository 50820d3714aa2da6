use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use uuid::Uuid;

use crate::{
    dto::events::ServerEvent,
    error::ServiceError,
    state::{SharedState, realtime::RecentEvents, realtime::UiFrame},
};

/// A viewer's subscription to one game: the authoritative state lane plus the
/// deduplicated ephemeral UI lane.
pub struct GameSubscription {
    state_rx: broadcast::Receiver<ServerEvent>,
    ui_rx: broadcast::Receiver<UiFrame>,
    seen: RecentEvents,
}

impl GameSubscription {
    /// Next authoritative state event, or `None` once the game is gone.
    ///
    /// Lagged messages are skipped: the following snapshot supersedes them.
    pub async fn next_state(&mut self) -> Option<ServerEvent> {
        loop {
            match self.state_rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Closed) => return None,
                Err(RecvError::Lagged(_)) => continue,
            }
        }
    }

    /// Next fresh UI event, or `None` once the game is gone.
    ///
    /// Replayed event ids (e.g. after a reconnect) are dropped via the
    /// subscription's bounded recent-event ring.
    pub async fn next_ui(&mut self) -> Option<ServerEvent> {
        loop {
            match self.ui_rx.recv().await {
                Ok(frame) => {
                    if self.seen.observe(frame.id) {
                        return Some(frame.event);
                    }
                }
                Err(RecvError::Closed) => return None,
                Err(RecvError::Lagged(_)) => continue,
            }
        }
    }

    /// Convert the state lane into a stream, dropping lagged slots.
    pub fn into_state_stream(self) -> impl tokio_stream::Stream<Item = ServerEvent> {
        BroadcastStream::new(self.state_rx).filter_map(|item| item.ok())
    }
}

/// Subscribe a viewer to an active game.
pub fn subscribe(state: &SharedState, game_id: Uuid) -> Result<GameSubscription, ServiceError> {
    // Reject subscriptions to games this process does not host.
    state.session(game_id)?;
    let (state_rx, ui_rx) = state.realtime().subscribe(game_id);
    Ok(GameSubscription {
        state_rx,
        ui_rx,
        seen: RecentEvents::new(state.config().recent_events_capacity),
    })
}

/// Publish a presentation-layer UI event onto a game's ephemeral lane.
///
/// Used for broadcasts the core does not originate itself, e.g. emoji
/// reactions; returns the allocated event id.
pub fn publish_ui_event<T: Serialize>(
    state: &SharedState,
    game_id: Uuid,
    event: &str,
    payload: &T,
) -> Result<u64, ServiceError> {
    state.session(game_id)?;
    let event = ServerEvent::json(Some(event.to_string()), payload)
        .map_err(|err| ServiceError::InvalidInput(format!("unserializable payload: {err}")))?;
    Ok(state.realtime().broadcast_ui(game_id, event))
}

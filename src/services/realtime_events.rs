use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::TeamSide,
    dto::{
        events::{
            CelebrationEvent, DrinkNoticeEvent, GameCompletedEvent, IslandCalledEvent,
            RedemptionPromptEvent, ServerEvent, StateChangedEvent,
        },
        game::GameSummary,
    },
    state::{SharedState, machine::CelebrationKind},
};

const EVENT_STATE_CHANGED: &str = "state.changed";
const EVENT_DRINK_NOTICE: &str = "drink.notice";
const EVENT_CELEBRATION: &str = "celebration";
const EVENT_REDEMPTION_PROMPT: &str = "redemption.prompt";
const EVENT_ISLAND_CALLED: &str = "island.called";
const EVENT_GAME_COMPLETED: &str = "game.completed";

/// Broadcast the authoritative post-transition snapshot of a game.
pub async fn broadcast_state_changed(state: &SharedState, game_id: Uuid) {
    let Ok(handle) = state.session(game_id) else {
        return;
    };
    let summary = {
        let session = handle.session.read().await;
        GameSummary::from(&*session)
    };
    let payload = StateChangedEvent { game: summary };
    match ServerEvent::json(Some(EVENT_STATE_CHANGED.to_string()), &payload) {
        Ok(event) => state.realtime().broadcast_state(game_id, event),
        Err(err) => warn!(event = EVENT_STATE_CHANGED, error = %err, "failed to serialize state payload"),
    }
}

/// Broadcast which player on the non-shooting team drinks.
pub fn broadcast_drink_notice(
    state: &SharedState,
    game_id: Uuid,
    team: TeamSide,
    player_id: Uuid,
    player_name: String,
) {
    let payload = DrinkNoticeEvent {
        game_id,
        team,
        player_id,
        player_name,
    };
    send_ui_event(state, game_id, EVENT_DRINK_NOTICE, &payload);
}

/// Broadcast a celebration overlay.
pub fn broadcast_celebration(
    state: &SharedState,
    game_id: Uuid,
    kind: CelebrationKind,
    team: TeamSide,
    player_id: Uuid,
    player_name: String,
) {
    let payload = CelebrationEvent {
        game_id,
        kind: kind.into(),
        team,
        player_id,
        player_name,
    };
    send_ui_event(state, game_id, EVENT_CELEBRATION, &payload);
}

/// Broadcast that a redemption counter-shot is underway.
pub fn broadcast_redemption_prompt(
    state: &SharedState,
    game_id: Uuid,
    winning_team: TeamSide,
    redemption_team: TeamSide,
) {
    let payload = RedemptionPromptEvent {
        game_id,
        winning_team,
        redemption_team,
    };
    send_ui_event(state, game_id, EVENT_REDEMPTION_PROMPT, &payload);
}

/// Broadcast an armed island call.
pub fn broadcast_island_called(
    state: &SharedState,
    game_id: Uuid,
    team: TeamSide,
    player_id: Uuid,
    player_name: String,
) {
    let payload = IslandCalledEvent {
        game_id,
        team,
        player_id,
        player_name,
    };
    send_ui_event(state, game_id, EVENT_ISLAND_CALLED, &payload);
}

/// Broadcast the final result of a completed game.
pub fn broadcast_game_completed(
    state: &SharedState,
    game_id: Uuid,
    winner: TeamSide,
    scores: [u8; 2],
) {
    let payload = GameCompletedEvent {
        game_id,
        winner,
        scores,
    };
    send_ui_event(state, game_id, EVENT_GAME_COMPLETED, &payload);
}

fn send_ui_event(state: &SharedState, game_id: Uuid, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => {
            state.realtime().broadcast_ui(game_id, event);
        }
        Err(err) => warn!(event, error = %err, "failed to serialize UI event payload"),
    }
}

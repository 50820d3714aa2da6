use serde::Serialize;
use uuid::Uuid;

use crate::{
    dao::models::TeamSide,
    dto::game::GameSummary,
    state::machine::CelebrationKind,
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across the realtime channels.
pub struct ServerEvent {
    /// Event name, when the stream distinguishes event types.
    pub event: Option<String>,
    /// Serialized payload.
    pub data: String,
}

impl ServerEvent {
    /// Build an event from a name and a raw data string.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize)]
/// Broadcast after every applied transition with the authoritative snapshot.
pub struct StateChangedEvent {
    /// Full game projection, including the state version.
    pub game: GameSummary,
}

/// Wire flavour of a celebration overlay.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CelebrationFlavor {
    /// A regular made shot.
    Hit,
    /// A made shot doubled by an island call.
    IslandHit,
    /// A caught shot.
    Catch,
    /// The game-winning moment.
    Victory,
}

impl From<CelebrationKind> for CelebrationFlavor {
    fn from(kind: CelebrationKind) -> Self {
        match kind {
            CelebrationKind::Hit => CelebrationFlavor::Hit,
            CelebrationKind::IslandHit => CelebrationFlavor::IslandHit,
            CelebrationKind::Catch => CelebrationFlavor::Catch,
            CelebrationKind::Victory => CelebrationFlavor::Victory,
        }
    }
}

#[derive(Debug, Serialize)]
/// Ephemeral celebration overlay event.
pub struct CelebrationEvent {
    /// Game the celebration belongs to.
    pub game_id: Uuid,
    /// Overlay flavour.
    pub kind: CelebrationFlavor,
    /// Celebrating side.
    pub team: TeamSide,
    /// Player at the centre of the celebration.
    pub player_id: Uuid,
    /// Display name of that player.
    pub player_name: String,
}

#[derive(Debug, Serialize)]
/// Ephemeral "someone drinks" banner event.
pub struct DrinkNoticeEvent {
    /// Game the notice belongs to.
    pub game_id: Uuid,
    /// Team that drinks.
    pub team: TeamSide,
    /// Player chosen by the team's drink rotation.
    pub player_id: Uuid,
    /// Display name of that player.
    pub player_name: String,
}

#[derive(Debug, Serialize)]
/// Ephemeral prompt shown while a redemption counter-shot is underway.
pub struct RedemptionPromptEvent {
    /// Game the prompt belongs to.
    pub game_id: Uuid,
    /// Team that reached the winning score.
    pub winning_team: TeamSide,
    /// Team playing the counter-shot.
    pub redemption_team: TeamSide,
}

#[derive(Debug, Serialize)]
/// Ephemeral announcement of an armed island call.
pub struct IslandCalledEvent {
    /// Game the call belongs to.
    pub game_id: Uuid,
    /// Calling player's side.
    pub team: TeamSide,
    /// Calling player.
    pub player_id: Uuid,
    /// Display name of that player.
    pub player_name: String,
}

#[derive(Debug, Serialize)]
/// Broadcast once when a game completes.
pub struct GameCompletedEvent {
    /// Completed game.
    pub game_id: Uuid,
    /// Winning side.
    pub winner: TeamSide,
    /// Final per-side scores.
    pub scores: [u8; 2],
}

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{GameEntity, PlayerStatsEntity, ScoreEventEntity};
use crate::dao::storage::StorageResult;

/// Delta applied to a player's persisted statistics row.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsDelta {
    /// Shots thrown to add.
    pub shots_attempted: u32,
    /// Made shots to add.
    pub shots_made: u32,
    /// Catches to add.
    pub catches: u32,
    /// Win flag to set, when known.
    pub won: Option<bool>,
    /// Final team score to set, when known.
    pub final_score: Option<u8>,
}

/// Abstraction over the persistence layer for games, the score ledger, and
/// player statistics.
pub trait GameStore: Send + Sync {
    /// Persist a freshly created game.
    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Overwrite an existing game with its latest snapshot.
    fn update_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Load a game by id.
    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>>;
    /// Append an immutable entry to the score ledger.
    fn append_score_event(&self, event: ScoreEventEntity)
    -> BoxFuture<'static, StorageResult<()>>;
    /// All ledger entries for a game, in append order.
    fn list_score_events(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ScoreEventEntity>>>;
    /// Merge a delta into a player's stats row, creating it when missing.
    fn upsert_player_stats(
        &self,
        game_id: Uuid,
        player_id: Uuid,
        delta: StatsDelta,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// All stats rows recorded for a game.
    fn list_player_stats(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerStatsEntity>>>;
    /// Cheap liveness probe used by the storage supervisor.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

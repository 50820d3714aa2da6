use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{TournamentMatchEntity, TournamentStatus};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for tournament brackets.
///
/// The advancement engine issues best-effort sequential writes through this
/// trait; none of the operations are transactional across calls.
pub trait BracketStore: Send + Sync {
    /// Load a match by id.
    fn find_match(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TournamentMatchEntity>>>;
    /// Overwrite a match with its latest snapshot.
    fn save_match(&self, entity: TournamentMatchEntity)
    -> BoxFuture<'static, StorageResult<()>>;
    /// All matches of a round, ordered by ascending `match_index`.
    ///
    /// An empty result means the round does not exist.
    fn list_matches_by_round(
        &self,
        tournament_id: Uuid,
        round: u32,
    ) -> BoxFuture<'static, StorageResult<Vec<TournamentMatchEntity>>>;
    /// Highest round number present in the bracket, if any match exists.
    fn max_round(&self, tournament_id: Uuid) -> BoxFuture<'static, StorageResult<Option<u32>>>;
    /// Record the tournament's lifecycle status.
    fn update_tournament_status(
        &self,
        tournament_id: Uuid,
        status: TournamentStatus,
    ) -> BoxFuture<'static, StorageResult<()>>;
}

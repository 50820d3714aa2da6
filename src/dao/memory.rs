use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    bracket_store::BracketStore,
    game_store::{GameStore, StatsDelta},
    models::{
        GameEntity, PlayerStatsEntity, ScoreEventEntity, TournamentMatchEntity, TournamentStatus,
    },
    storage::{StorageError, StorageResult},
};

/// In-memory implementation of [`GameStore`] and [`BracketStore`].
///
/// Backs the test suites and embedders that defer real persistence; all maps
/// are concurrent so the store can be shared freely across tasks.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    games: DashMap<Uuid, GameEntity>,
    events: DashMap<Uuid, Vec<ScoreEventEntity>>,
    stats: DashMap<(Uuid, Uuid), PlayerStatsEntity>,
    matches: DashMap<Uuid, TournamentMatchEntity>,
    tournaments: DashMap<Uuid, TournamentStatus>,
}

impl MemoryStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load a tournament match, as a bracket builder would.
    pub fn seed_match(&self, entity: TournamentMatchEntity) {
        self.inner.matches.insert(entity.id, entity);
    }

    /// Current status recorded for a tournament, if any.
    pub fn tournament_status(&self, tournament_id: Uuid) -> Option<TournamentStatus> {
        self.inner
            .tournaments
            .get(&tournament_id)
            .map(|entry| *entry.value())
    }
}

impl GameStore for MemoryStore {
    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.games.insert(game.id, game);
            Ok(())
        })
    }

    fn update_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            if !store.inner.games.contains_key(&game.id) {
                return Err(StorageError::NotFound { id: game.id });
            }
            store.inner.games.insert(game.id, game);
            Ok(())
        })
    }

    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.games.get(&id).map(|entry| entry.clone())) })
    }

    fn append_score_event(
        &self,
        event: ScoreEventEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .inner
                .events
                .entry(event.game_id)
                .or_default()
                .push(event);
            Ok(())
        })
    }

    fn list_score_events(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ScoreEventEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .events
                .get(&game_id)
                .map(|entry| entry.clone())
                .unwrap_or_default())
        })
    }

    fn upsert_player_stats(
        &self,
        game_id: Uuid,
        player_id: Uuid,
        delta: StatsDelta,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut row = store
                .inner
                .stats
                .entry((game_id, player_id))
                .or_insert_with(|| PlayerStatsEntity {
                    game_id,
                    player_id,
                    shots_attempted: 0,
                    shots_made: 0,
                    catches: 0,
                    won: false,
                    final_score: 0,
                });
            row.shots_attempted += delta.shots_attempted;
            row.shots_made += delta.shots_made;
            row.catches += delta.catches;
            if let Some(won) = delta.won {
                row.won = won;
            }
            if let Some(final_score) = delta.final_score {
                row.final_score = final_score;
            }
            Ok(())
        })
    }

    fn list_player_stats(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerStatsEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .stats
                .iter()
                .filter(|entry| entry.key().0 == game_id)
                .map(|entry| entry.value().clone())
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { Ok(()) })
    }
}

impl BracketStore for MemoryStore {
    fn find_match(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TournamentMatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.matches.get(&id).map(|entry| entry.clone())) })
    }

    fn save_match(
        &self,
        entity: TournamentMatchEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.matches.insert(entity.id, entity);
            Ok(())
        })
    }

    fn list_matches_by_round(
        &self,
        tournament_id: Uuid,
        round: u32,
    ) -> BoxFuture<'static, StorageResult<Vec<TournamentMatchEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut matches: Vec<TournamentMatchEntity> = store
                .inner
                .matches
                .iter()
                .filter(|entry| {
                    entry.tournament_id == tournament_id && entry.round == round
                })
                .map(|entry| entry.value().clone())
                .collect();
            matches.sort_by_key(|entity| entity.match_index);
            Ok(matches)
        })
    }

    fn max_round(&self, tournament_id: Uuid) -> BoxFuture<'static, StorageResult<Option<u32>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .matches
                .iter()
                .filter(|entry| entry.tournament_id == tournament_id)
                .map(|entry| entry.round)
                .max())
        })
    }

    fn update_tournament_status(
        &self,
        tournament_id: Uuid,
        status: TournamentStatus,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.tournaments.insert(tournament_id, status);
            Ok(())
        })
    }
}

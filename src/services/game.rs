//! Business logic driving a game session: bootstrap, shot recording, undo,
//! and completion. These helpers coordinate store persistence, in-memory
//! state updates, and state-machine transitions while honouring the
//! single-transition-at-a-time requirement.

use std::{sync::Arc, time::SystemTime};

use rand::seq::IndexedRandom;
use tracing::{debug, error, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        game_store::StatsDelta,
        models::{
            ScoreEventDetails, ScoreEventEntity, ScoreEventKind, TeamSide, TournamentLink,
        },
    },
    dto::game::{CreateGameRequest, GameSummary},
    error::ServiceError,
    services::{bracket, realtime_events},
    state::{
        GameHandle, SharedState,
        machine::{Effect, GameAction, GameState, LedgerDraft, TurnPhase},
        session::GameSession,
        transitions::run_transition_with_broadcast,
        undo::UndoWindow,
    },
};

/// Bootstrap a fresh game session and persist its initial snapshot.
pub async fn create_game(
    state: &SharedState,
    request: CreateGameRequest,
) -> Result<GameSummary, ServiceError> {
    request.validate()?;
    let store = state.require_game_store().await?;

    let mut teams = request.teams.into_iter();
    let (Some(team_one), Some(team_two)) = (teams.next(), teams.next()) else {
        return Err(ServiceError::InvalidInput(
            "a game requires exactly two teams".into(),
        ));
    };

    let tournament = request.tournament.map(|link| TournamentLink {
        tournament_id: link.tournament_id,
        match_id: link.match_id,
    });

    let session = GameSession::new(
        [team_one.into_team(), team_two.into_team()],
        request.cup_formation,
        tournament,
    );

    store.save_game(session.to_entity()).await?;

    let opening = stamp_event(
        session.id,
        session.machine.state(),
        LedgerDraft {
            kind: ScoreEventKind::GameStart,
            team: TeamSide::One,
            details: ScoreEventDetails::GameStart {
                cup_formation: request.cup_formation,
            },
        },
    );
    if let Err(err) = store.append_score_event(opening).await {
        warn!(game_id = %session.id, error = %err, "failed to append game_start event");
    }

    let summary = GameSummary::from(&session);
    state.insert_session(session);
    Ok(summary)
}

/// Load a persisted game into the active session registry.
///
/// Runs the corrupted-state check: a score that escaped the cap while the
/// game is still marked active force-completes it for the over-cap team.
pub async fn load_game(state: &SharedState, id: Uuid) -> Result<GameSummary, ServiceError> {
    let store = state.require_game_store().await?;
    let Some(entity) = store.find_game(id).await? else {
        return Err(ServiceError::NotFound(format!("game `{id}` not found")));
    };

    let session = GameSession::from_entity(entity);
    let corrupted = session.machine.state().corruption();
    let handle = state.insert_session(session);

    if let Some(side) = corrupted {
        error!(game_id = %id, team = ?side, "score exceeds the cup total on an active game; force-completing");
        apply_action(state, id, GameAction::Complete { winner: side }).await?;
    }

    let session = handle.session.read().await;
    Ok(GameSummary::from(&*session))
}

/// Read-only projection of an active game.
pub async fn game_summary(state: &SharedState, game_id: Uuid) -> Result<GameSummary, ServiceError> {
    let handle = state.session(game_id)?;
    let session = handle.session.read().await;
    Ok(GameSummary::from(&*session))
}

/// The game's score ledger in append order, for stat aggregation and for
/// reconstructing who drinks next.
pub async fn list_score_events(
    state: &SharedState,
    game_id: Uuid,
) -> Result<Vec<ScoreEventEntity>, ServiceError> {
    let store = state.require_game_store().await?;
    Ok(store.list_score_events(game_id).await?)
}

/// Record a made shot by the current shooter.
pub async fn record_hit(state: &SharedState, game_id: Uuid) -> Result<GameSummary, ServiceError> {
    apply_action(state, game_id, GameAction::Hit).await
}

/// Record a missed shot by the current shooter.
pub async fn record_miss(state: &SharedState, game_id: Uuid) -> Result<GameSummary, ServiceError> {
    apply_action(state, game_id, GameAction::Miss).await
}

/// Record the current shot as caught, crediting a randomly chosen player on
/// the defending team.
pub async fn record_catch(state: &SharedState, game_id: Uuid) -> Result<GameSummary, ServiceError> {
    let handle = state.session(game_id)?;
    let catcher = {
        let session = handle.session.read().await;
        let machine_state = session.machine.state();
        let TurnPhase::Turn { team, .. } = &machine_state.phase else {
            return Err(ServiceError::InvalidState(
                "catches are only possible during a normal turn".into(),
            ));
        };
        let defenders = &machine_state.rosters[team.opponent().index()];
        let mut rng = rand::rng();
        defenders
            .choose(&mut rng)
            .copied()
            .ok_or_else(|| ServiceError::InvalidState("defending roster is empty".into()))?
    };
    apply_action(state, game_id, GameAction::Catch { catcher }).await
}

/// Arm the once-per-game island call for a player.
pub async fn call_island(
    state: &SharedState,
    game_id: Uuid,
    player: Uuid,
) -> Result<GameSummary, ServiceError> {
    apply_action(state, game_id, GameAction::CallIsland { player }).await
}

/// Explicitly complete a game, e.g. on a forfeit. Idempotent.
pub async fn complete_game(
    state: &SharedState,
    game_id: Uuid,
    winner: TeamSide,
) -> Result<GameSummary, ServiceError> {
    apply_action(state, game_id, GameAction::Complete { winner }).await
}

/// Revert the most recent transition while its undo window is still open.
pub async fn undo(state: &SharedState, game_id: Uuid) -> Result<GameSummary, ServiceError> {
    let handle = state.session(game_id)?;
    {
        let mut slot = handle.undo.lock().await;
        match slot.take() {
            Some(window) if window.is_open() => {}
            _ => {
                return Err(ServiceError::InvalidState(
                    "the undo window is closed".into(),
                ));
            }
        }
    }
    apply_action(state, game_id, GameAction::Undo).await
}

/// Resume the undo countdown after the acting viewer dismissed a celebration
/// overlay.
pub async fn acknowledge_celebration(
    state: &SharedState,
    game_id: Uuid,
) -> Result<(), ServiceError> {
    let handle = state.session(game_id)?;
    let mut slot = handle.undo.lock().await;
    if let Some(window) = slot.as_mut() {
        window.resume();
    }
    Ok(())
}

/// Plan the action, persist its outcome, apply it, broadcast, and execute the
/// remaining effects.
async fn apply_action(
    state: &SharedState,
    game_id: Uuid,
    action: GameAction,
) -> Result<GameSummary, ServiceError> {
    let handle = state.session(game_id)?;

    let shared = state.clone();
    let (effects, _snapshot) =
        run_transition_with_broadcast(state, game_id, action, move |plan| async move {
            persist_plan(&shared, game_id, &plan.next, &plan.effects).await?;
            Ok(plan.effects)
        })
        .await?;

    execute_post_effects(state, game_id, &handle, effects).await;

    let session = handle.session.read().await;
    Ok(GameSummary::from(&*session))
}

/// Write the planned transition's outcome: ledger entries first, then the
/// game snapshot. Individual write failures are logged and non-fatal; the
/// next authoritative broadcast is the de-facto recovery path.
async fn persist_plan(
    state: &SharedState,
    game_id: Uuid,
    next: &GameState,
    effects: &[Effect],
) -> Result<(), ServiceError> {
    let store = state.require_game_store().await?;
    let handle = state.session(game_id)?;

    for effect in effects {
        match effect {
            Effect::Ledger(draft) => {
                let event = stamp_event(game_id, next, draft.clone());
                if let Err(err) = store.append_score_event(event).await {
                    warn!(game_id = %game_id, kind = ?draft.kind, error = %err, "failed to append score event");
                }
            }
            Effect::Persist => {
                let entity = {
                    let session = handle.session.read().await;
                    session.entity_with(next)
                };
                if let Err(err) = store.update_game(entity).await {
                    warn!(game_id = %game_id, error = %err, "failed to persist game snapshot");
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Execute the non-persistence effects of an applied transition.
async fn execute_post_effects(
    state: &SharedState,
    game_id: Uuid,
    handle: &Arc<GameHandle>,
    effects: Vec<Effect>,
) {
    let mut celebrated = false;

    for effect in effects {
        match effect {
            Effect::Ledger(_) | Effect::Persist => {}
            Effect::DrinkNotice { team, player_id } => {
                let player_name = lookup_name(handle, player_id).await;
                realtime_events::broadcast_drink_notice(
                    state,
                    game_id,
                    team,
                    player_id,
                    player_name,
                );
            }
            Effect::Celebration {
                kind,
                team,
                player_id,
            } => {
                let player_name = lookup_name(handle, player_id).await;
                realtime_events::broadcast_celebration(
                    state,
                    game_id,
                    kind,
                    team,
                    player_id,
                    player_name,
                );
                celebrated = true;
            }
            Effect::RedemptionPrompt {
                winning_team,
                redemption_team,
            } => {
                realtime_events::broadcast_redemption_prompt(
                    state,
                    game_id,
                    winning_team,
                    redemption_team,
                );
            }
            Effect::IslandCalled { player_id } => {
                let (team, player_name) = {
                    let session = handle.session.read().await;
                    (
                        session.machine.state().side_of(player_id),
                        session
                            .player_name(player_id)
                            .unwrap_or_default()
                            .to_string(),
                    )
                };
                if let Some(team) = team {
                    realtime_events::broadcast_island_called(
                        state,
                        game_id,
                        team,
                        player_id,
                        player_name,
                    );
                }
            }
            Effect::OpenUndoWindow => {
                // A fresh window discards the previous revert opportunity.
                let mut slot = handle.undo.lock().await;
                *slot = Some(UndoWindow::open(state.config().undo_window));
            }
            Effect::Completed { winner } => {
                finalize_completion(state, game_id, handle, winner).await;
            }
        }
    }

    if celebrated {
        // The overlay covers the acting viewer's screen; stop the countdown
        // until they dismiss it.
        let mut slot = handle.undo.lock().await;
        if let Some(window) = slot.as_mut() {
            window.pause();
        }
    }
}

/// Completion fan-out: final stats, result broadcast, bracket advancement.
async fn finalize_completion(
    state: &SharedState,
    game_id: Uuid,
    handle: &Arc<GameHandle>,
    winner: TeamSide,
) {
    {
        let mut slot = handle.undo.lock().await;
        slot.take();
    }

    let (scores, tallies, tournament, winner_bracket_id, hero) = {
        let session = handle.session.read().await;
        let machine_state = session.machine.state();
        let hero_index = machine_state.last_played[winner.index()].unwrap_or(0);
        let hero = machine_state.rosters[winner.index()]
            .get(hero_index)
            .copied();
        let rows: Vec<(Uuid, TeamSide, StatsDelta)> = TeamSide::both()
            .into_iter()
            .flat_map(|side| {
                machine_state.rosters[side.index()]
                    .iter()
                    .map(move |player_id| (*player_id, side))
            })
            .map(|(player_id, side)| {
                let tally = machine_state
                    .tallies
                    .get(&player_id)
                    .copied()
                    .unwrap_or_default();
                (
                    player_id,
                    side,
                    StatsDelta {
                        shots_attempted: tally.attempts,
                        shots_made: tally.hits,
                        catches: tally.catches,
                        won: Some(side == winner),
                        final_score: Some(machine_state.scores[side.index()]),
                    },
                )
            })
            .collect();
        (
            machine_state.scores,
            rows,
            session.tournament,
            session.team(winner).bracket_team_id,
            hero,
        )
    };

    match state.require_game_store().await {
        Ok(store) => {
            for (player_id, _side, delta) in &tallies {
                if let Err(err) = store.upsert_player_stats(game_id, *player_id, *delta).await {
                    warn!(game_id = %game_id, player_id = %player_id, error = %err, "failed to persist player stats");
                }
            }
        }
        Err(_) => warn!(game_id = %game_id, "skipping player stats persistence in degraded mode"),
    }

    realtime_events::broadcast_game_completed(state, game_id, winner, scores);
    if let Some(player_id) = hero {
        let player_name = lookup_name(handle, player_id).await;
        realtime_events::broadcast_celebration(
            state,
            game_id,
            crate::state::machine::CelebrationKind::Victory,
            winner,
            player_id,
            player_name,
        );
    }

    if let Some(link) = tournament {
        let Some(winner_team_id) = winner_bracket_id else {
            warn!(game_id = %game_id, "tournament game has no bracket team id for the winner; skipping advancement");
            return;
        };
        match bracket::advance(state, link.tournament_id, link.match_id, winner_team_id).await {
            Ok(outcome) => {
                debug!(game_id = %game_id, ?outcome, "bracket advanced");
            }
            Err(err) => {
                // Recoverable by re-triggering advancement; never fatal for
                // the game flow.
                warn!(game_id = %game_id, error = %err, "bracket advancement failed");
            }
        }
    }
}

async fn lookup_name(handle: &Arc<GameHandle>, player_id: Uuid) -> String {
    let session = handle.session.read().await;
    session
        .player_name(player_id)
        .unwrap_or_default()
        .to_string()
}

/// Stamp a ledger draft with identity, the post-transition score snapshot,
/// and the wall-clock time.
fn stamp_event(game_id: Uuid, next: &GameState, draft: LedgerDraft) -> ScoreEventEntity {
    ScoreEventEntity {
        id: Uuid::new_v4(),
        game_id,
        team: draft.team,
        kind: draft.kind,
        details: draft.details,
        scores: next.scores,
        cups_remaining: [
            next.cups_remaining(TeamSide::One),
            next.cups_remaining(TeamSide::Two),
        ],
        recorded_at: SystemTime::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            bracket_store::BracketStore,
            game_store::GameStore,
            memory::MemoryStore,
            models::{
                CupFormation, GameStatus, MatchStatus, TournamentMatchEntity, TournamentStatus,
            },
        },
        dto::game::{PlayerInput, TeamInput, TournamentLinkInput},
        state::AppState,
    };

    async fn match_of(store: &MemoryStore, id: Uuid) -> TournamentMatchEntity {
        store.find_match(id).await.unwrap().unwrap()
    }

    fn request(players_per_team: usize) -> CreateGameRequest {
        CreateGameRequest {
            teams: vec![team_input("Sharks", players_per_team), team_input("Jets", players_per_team)],
            cup_formation: CupFormation::Six,
            tournament: None,
        }
    }

    fn team_input(name: &str, players: usize) -> TeamInput {
        TeamInput {
            name: name.into(),
            players: (0..players)
                .map(|index| PlayerInput {
                    name: format!("{name}-{index}"),
                    user_id: None,
                })
                .collect(),
            bracket_team_id: None,
        }
    }

    async fn app_with_store() -> (SharedState, MemoryStore) {
        let state = AppState::new(AppConfig::default());
        let store = MemoryStore::new();
        state
            .install_stores(Arc::new(store.clone()), Arc::new(store.clone()))
            .await;
        (state, store)
    }

    #[tokio::test]
    async fn create_game_persists_snapshot_and_opening_event() {
        let (state, store) = app_with_store().await;
        let summary = create_game(&state, request(2)).await.unwrap();
        let game_id: Uuid = summary.id.parse().unwrap();

        let entity = store.find_game(game_id).await.unwrap().unwrap();
        assert_eq!(entity.status, GameStatus::Active);

        let events = store.list_score_events(game_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ScoreEventKind::GameStart);
    }

    #[tokio::test]
    async fn create_game_requires_a_store() {
        let state = AppState::new(AppConfig::default());
        let err = create_game(&state, request(1)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
    }

    #[tokio::test]
    async fn hits_accumulate_and_append_ledger_events() {
        let (state, store) = app_with_store().await;
        let summary = create_game(&state, request(2)).await.unwrap();
        let game_id: Uuid = summary.id.parse().unwrap();

        for _ in 0..3 {
            record_hit(&state, game_id).await.unwrap();
        }

        let summary = game_summary(&state, game_id).await.unwrap();
        assert_eq!(summary.teams[0].score, 3);
        assert_eq!(summary.teams[1].score, 0);
        assert_eq!(summary.current_team, TeamSide::One);
        assert_eq!(summary.version, 3);

        let events = store.list_score_events(game_id).await.unwrap();
        let hits = events
            .iter()
            .filter(|event| event.kind == ScoreEventKind::ShotHit)
            .count();
        assert_eq!(hits, 3);

        let persisted = store.find_game(game_id).await.unwrap().unwrap();
        assert_eq!(persisted.teams[0].score, 3);
    }

    #[tokio::test]
    async fn undo_reverts_the_latest_transition_inside_the_window() {
        let (state, _store) = app_with_store().await;
        let summary = create_game(&state, request(1)).await.unwrap();
        let game_id: Uuid = summary.id.parse().unwrap();

        record_hit(&state, game_id).await.unwrap();
        let summary = undo(&state, game_id).await.unwrap();
        assert_eq!(summary.teams[0].score, 0);
        assert_eq!(summary.current_team, TeamSide::One);

        // The revert consumed the window; a second undo is rejected.
        let err = undo(&state, game_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn catch_credits_the_defending_team() {
        let (state, _store) = app_with_store().await;
        let summary = create_game(&state, request(2)).await.unwrap();
        let game_id: Uuid = summary.id.parse().unwrap();

        let summary = record_catch(&state, game_id).await.unwrap();
        assert_eq!(summary.teams[0].score, 0);
        assert_eq!(summary.teams[1].score, 1);
        assert_eq!(summary.current_team, TeamSide::Two);
    }

    #[tokio::test]
    async fn completion_writes_player_stats() {
        let (state, store) = app_with_store().await;
        let summary = create_game(&state, request(1)).await.unwrap();
        let game_id: Uuid = summary.id.parse().unwrap();

        // Six hits enter redemption; the missed counter-shot ends the game.
        for _ in 0..6 {
            record_hit(&state, game_id).await.unwrap();
        }
        let summary = record_miss(&state, game_id).await.unwrap();
        assert_eq!(summary.status, GameStatus::Completed);
        assert_eq!(summary.winner, Some(TeamSide::One));

        let stats = store.list_player_stats(game_id).await.unwrap();
        assert_eq!(stats.len(), 2);
        let winner_row = stats.iter().find(|row| row.won).unwrap();
        assert_eq!(winner_row.shots_made, 6);
        assert_eq!(winner_row.final_score, 6);
    }

    #[tokio::test]
    async fn tournament_completion_advances_the_bracket() {
        let (state, store) = app_with_store().await;

        let tournament_id = Uuid::new_v4();
        let match_id = Uuid::new_v4();
        let sharks = Uuid::new_v4();
        let jets = Uuid::new_v4();
        store.seed_match(TournamentMatchEntity {
            id: match_id,
            tournament_id,
            round: 1,
            match_index: 0,
            team_a_id: Some(sharks),
            team_b_id: Some(jets),
            winner_team_id: None,
            status: MatchStatus::InProgress,
            game_id: None,
        });

        let mut request = request(1);
        request.teams[0].bracket_team_id = Some(sharks);
        request.teams[1].bracket_team_id = Some(jets);
        request.tournament = Some(TournamentLinkInput {
            tournament_id,
            match_id,
        });

        let summary = create_game(&state, request).await.unwrap();
        let game_id: Uuid = summary.id.parse().unwrap();

        for _ in 0..6 {
            record_hit(&state, game_id).await.unwrap();
        }
        record_miss(&state, game_id).await.unwrap();

        let decided = match_of(&store, match_id).await;
        assert_eq!(decided.status, MatchStatus::Complete);
        assert_eq!(decided.winner_team_id, Some(sharks));
        // A one-match bracket completes the tournament outright.
        assert_eq!(
            store.tournament_status(tournament_id),
            Some(TournamentStatus::Completed)
        );
    }

    #[tokio::test]
    async fn subscribers_receive_drink_notices() {
        let (state, _store) = app_with_store().await;
        let summary = create_game(&state, request(2)).await.unwrap();
        let game_id: Uuid = summary.id.parse().unwrap();

        let mut subscription =
            crate::services::realtime_service::subscribe(&state, game_id).unwrap();
        record_hit(&state, game_id).await.unwrap();

        let event = subscription.next_ui().await.unwrap();
        assert_eq!(event.event.as_deref(), Some("drink.notice"));
    }
}

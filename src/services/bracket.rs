//! Bracket advancement engine: consumes a completed tournament match, checks
//! whether its round is fully resolved, and seeds winners (and byes) into the
//! following rounds, or finalizes the tournament.
//!
//! Every step is a best-effort sequential write; a partial failure leaves the
//! bracket in a recoverable state and re-triggering advancement is idempotent
//! because only empty slots are ever filled.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        bracket_store::BracketStore,
        models::{MatchStatus, TournamentMatchEntity, TournamentStatus},
    },
    error::ServiceError,
    state::SharedState,
};

/// Result of one advancement pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Other matches of the round are still pending; nothing was seeded.
    RoundPending {
        /// Matches of the round already complete.
        completed: usize,
        /// Matches in the round overall.
        total: usize,
    },
    /// Winners were seeded into the next round (and byes beyond it).
    Seeded {
        /// Round that received the winners.
        round: u32,
        /// Slots filled in that round by this pass.
        placed: usize,
        /// Surplus winners placed one round further as byes.
        byes: usize,
    },
    /// The final round resolved and the tournament is complete.
    TournamentCompleted {
        /// Winner of the final match.
        champion: Uuid,
    },
    /// Surplus winners had no later round to land in.
    BracketExhausted {
        /// Winners left without a slot, in seeding order.
        unplaced: Vec<Uuid>,
    },
}

/// Advance the bracket after `winner_team_id` won `match_id`.
pub async fn advance(
    state: &SharedState,
    tournament_id: Uuid,
    match_id: Uuid,
    winner_team_id: Uuid,
) -> Result<AdvanceOutcome, ServiceError> {
    let store = state.require_bracket_store().await?;
    advance_with_store(store.as_ref(), tournament_id, match_id, winner_team_id).await
}

/// Advance the bracket against an explicit store handle.
pub async fn advance_with_store(
    store: &dyn BracketStore,
    tournament_id: Uuid,
    match_id: Uuid,
    winner_team_id: Uuid,
) -> Result<AdvanceOutcome, ServiceError> {
    let Some(mut entity) = store.find_match(match_id).await? else {
        return Err(ServiceError::NotFound(format!(
            "match `{match_id}` not found"
        )));
    };
    if entity.tournament_id != tournament_id {
        return Err(ServiceError::InvalidInput(format!(
            "match `{match_id}` does not belong to tournament `{tournament_id}`"
        )));
    }

    // Step 1: record the winner. A complete match is never un-completed;
    // hitting one again is the manual re-trigger recovery path.
    if entity.status != MatchStatus::Complete {
        entity.winner_team_id = Some(winner_team_id);
        entity.status = MatchStatus::Complete;
        store.save_match(entity.clone()).await?;
    } else if entity.winner_team_id != Some(winner_team_id) {
        return Err(ServiceError::InvalidState(format!(
            "match `{match_id}` is already complete with a different winner"
        )));
    }

    // Step 2: the round gates the seeding; round N+1 is never touched until
    // round N is fully resolved.
    let round = entity.round;
    let round_matches = store.list_matches_by_round(tournament_id, round).await?;
    let total = round_matches.len();
    let completed = round_matches
        .iter()
        .filter(|entry| entry.status == MatchStatus::Complete)
        .count();
    if completed < total {
        debug!(%tournament_id, round, completed, total, "round still pending");
        return Ok(AdvanceOutcome::RoundPending { completed, total });
    }

    // Winners in match_index order, the only tiebreaker.
    let winners: Vec<Uuid> = round_matches
        .iter()
        .filter_map(|entry| entry.winner_team_id)
        .collect();

    let next_round = store
        .list_matches_by_round(tournament_id, round + 1)
        .await?;
    if next_round.is_empty() {
        return finalize_tournament(store, tournament_id, round).await;
    }

    // Step 3: fill empty slots in match_index order, two winners per match.
    // Winners already sitting in a slot are skipped so re-running a partially
    // failed pass converges instead of double-seeding.
    let seeded: HashSet<Uuid> = next_round
        .iter()
        .flat_map(|entry| [entry.team_a_id, entry.team_b_id])
        .flatten()
        .collect();
    let mut pool: VecDeque<Uuid> = winners
        .into_iter()
        .filter(|winner| !seeded.contains(winner))
        .collect();

    let placed = fill_round(store, next_round, &mut pool).await?;

    // Step 5: surplus winners get a bye one round further, ahead of that
    // round's normal seeding.
    let mut byes = 0;
    if !pool.is_empty() {
        let bye_round = store
            .list_matches_by_round(tournament_id, round + 2)
            .await?;
        if bye_round.is_empty() {
            let unplaced: Vec<Uuid> = pool.into_iter().collect();
            warn!(
                %tournament_id,
                round,
                unplaced = unplaced.len(),
                "surplus winners have no later round to land in"
            );
            return Ok(AdvanceOutcome::BracketExhausted { unplaced });
        }
        let already: HashSet<Uuid> = bye_round
            .iter()
            .flat_map(|entry| [entry.team_a_id, entry.team_b_id])
            .flatten()
            .collect();
        pool.retain(|winner| !already.contains(winner));
        byes = fill_round(store, bye_round, &mut pool).await?;
        if !pool.is_empty() {
            let unplaced: Vec<Uuid> = pool.into_iter().collect();
            warn!(
                %tournament_id,
                round,
                unplaced = unplaced.len(),
                "bye round has no free slots left"
            );
            return Ok(AdvanceOutcome::BracketExhausted { unplaced });
        }
    }

    info!(%tournament_id, round = round + 1, placed, byes, "seeded next round");
    Ok(AdvanceOutcome::Seeded {
        round: round + 1,
        placed,
        byes,
    })
}

/// Assign pooled winners to the empty slots of `matches`, `team_a` before
/// `team_b`, in ascending `match_index` order. Filled slots are left alone.
async fn fill_round(
    store: &dyn BracketStore,
    matches: Vec<TournamentMatchEntity>,
    pool: &mut VecDeque<Uuid>,
) -> Result<usize, ServiceError> {
    let mut placed = 0;
    for mut entry in matches {
        if pool.is_empty() {
            break;
        }
        let mut filled = 0;
        if entry.team_a_id.is_none() {
            if let Some(winner) = pool.pop_front() {
                entry.team_a_id = Some(winner);
                filled += 1;
            }
        }
        if entry.team_b_id.is_none() {
            if let Some(winner) = pool.pop_front() {
                entry.team_b_id = Some(winner);
                filled += 1;
            }
        }
        if filled > 0 {
            placed += filled;
            store.save_match(entry).await?;
        }
    }
    Ok(placed)
}

/// Step 4: no next round exists, so this was the final; re-check that the
/// highest round is fully resolved before declaring the tournament complete.
async fn finalize_tournament(
    store: &dyn BracketStore,
    tournament_id: Uuid,
    round: u32,
) -> Result<AdvanceOutcome, ServiceError> {
    let Some(max_round) = store.max_round(tournament_id).await? else {
        return Err(ServiceError::NotFound(format!(
            "tournament `{tournament_id}` has no matches"
        )));
    };
    let final_matches = store
        .list_matches_by_round(tournament_id, max_round)
        .await?;
    let resolved = final_matches
        .iter()
        .filter(|entry| entry.status == MatchStatus::Complete && entry.winner_team_id.is_some())
        .count();
    if resolved < final_matches.len() {
        debug!(%tournament_id, max_round, "final round still pending");
        return Ok(AdvanceOutcome::RoundPending {
            completed: resolved,
            total: final_matches.len(),
        });
    }

    let Some(champion) = final_matches
        .first()
        .and_then(|entry| entry.winner_team_id)
    else {
        return Err(ServiceError::InvalidState(format!(
            "tournament `{tournament_id}` final round has no winner recorded"
        )));
    };

    store
        .update_tournament_status(tournament_id, TournamentStatus::Completed)
        .await?;
    info!(%tournament_id, round, %champion, "tournament completed");
    Ok(AdvanceOutcome::TournamentCompleted { champion })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::memory::MemoryStore;

    fn entry(
        tournament_id: Uuid,
        round: u32,
        match_index: u32,
        team_a_id: Option<Uuid>,
        team_b_id: Option<Uuid>,
    ) -> TournamentMatchEntity {
        TournamentMatchEntity {
            id: Uuid::new_v4(),
            tournament_id,
            round,
            match_index,
            team_a_id,
            team_b_id,
            winner_team_id: None,
            status: MatchStatus::Pending,
            game_id: None,
        }
    }

    async fn match_of(store: &MemoryStore, id: Uuid) -> TournamentMatchEntity {
        store.find_match(id).await.unwrap().unwrap()
    }

    /// Four teams, two rounds: the canonical single-elimination shape.
    fn four_team_bracket(
        store: &MemoryStore,
        tournament_id: Uuid,
        teams: [Uuid; 4],
    ) -> [TournamentMatchEntity; 3] {
        let semi_one = entry(tournament_id, 1, 0, Some(teams[0]), Some(teams[1]));
        let semi_two = entry(tournament_id, 1, 1, Some(teams[2]), Some(teams[3]));
        let final_match = entry(tournament_id, 2, 0, None, None);
        for seeded in [&semi_one, &semi_two, &final_match] {
            store.seed_match(seeded.clone());
        }
        [semi_one, semi_two, final_match]
    }

    #[tokio::test]
    async fn first_semi_final_leaves_the_next_round_empty() {
        let store = MemoryStore::new();
        let tournament_id = Uuid::new_v4();
        let teams = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let [semi_one, _semi_two, final_match] =
            four_team_bracket(&store, tournament_id, teams);

        let outcome = advance_with_store(&store, tournament_id, semi_one.id, teams[0])
            .await
            .unwrap();
        assert_eq!(
            outcome,
            AdvanceOutcome::RoundPending {
                completed: 1,
                total: 2
            }
        );

        let final_state = match_of(&store, final_match.id).await;
        assert_eq!(final_state.team_a_id, None);
        assert_eq!(final_state.team_b_id, None);
    }

    #[tokio::test]
    async fn resolving_the_round_seeds_winners_in_match_index_order() {
        let store = MemoryStore::new();
        let tournament_id = Uuid::new_v4();
        let teams = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let [semi_one, semi_two, final_match] =
            four_team_bracket(&store, tournament_id, teams);

        advance_with_store(&store, tournament_id, semi_one.id, teams[0])
            .await
            .unwrap();
        let outcome = advance_with_store(&store, tournament_id, semi_two.id, teams[2])
            .await
            .unwrap();
        assert_eq!(
            outcome,
            AdvanceOutcome::Seeded {
                round: 2,
                placed: 2,
                byes: 0
            }
        );

        let final_state = match_of(&store, final_match.id).await;
        assert_eq!(final_state.team_a_id, Some(teams[0]));
        assert_eq!(final_state.team_b_id, Some(teams[2]));
    }

    #[tokio::test]
    async fn completing_the_final_completes_the_tournament() {
        let store = MemoryStore::new();
        let tournament_id = Uuid::new_v4();
        let teams = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let [semi_one, semi_two, final_match] =
            four_team_bracket(&store, tournament_id, teams);

        advance_with_store(&store, tournament_id, semi_one.id, teams[0])
            .await
            .unwrap();
        advance_with_store(&store, tournament_id, semi_two.id, teams[2])
            .await
            .unwrap();
        let outcome = advance_with_store(&store, tournament_id, final_match.id, teams[2])
            .await
            .unwrap();
        assert_eq!(
            outcome,
            AdvanceOutcome::TournamentCompleted { champion: teams[2] }
        );
        assert_eq!(
            store.tournament_status(tournament_id),
            Some(TournamentStatus::Completed)
        );
    }

    #[tokio::test]
    async fn re_triggering_a_resolved_round_is_a_no_op() {
        let store = MemoryStore::new();
        let tournament_id = Uuid::new_v4();
        let teams = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let [semi_one, semi_two, final_match] =
            four_team_bracket(&store, tournament_id, teams);

        advance_with_store(&store, tournament_id, semi_one.id, teams[0])
            .await
            .unwrap();
        advance_with_store(&store, tournament_id, semi_two.id, teams[2])
            .await
            .unwrap();
        let outcome = advance_with_store(&store, tournament_id, semi_two.id, teams[2])
            .await
            .unwrap();
        assert_eq!(
            outcome,
            AdvanceOutcome::Seeded {
                round: 2,
                placed: 0,
                byes: 0
            }
        );

        let final_state = match_of(&store, final_match.id).await;
        assert_eq!(final_state.team_a_id, Some(teams[0]));
        assert_eq!(final_state.team_b_id, Some(teams[2]));
    }

    #[tokio::test]
    async fn a_complete_match_rejects_a_different_winner() {
        let store = MemoryStore::new();
        let tournament_id = Uuid::new_v4();
        let teams = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let [semi_one, ..] = four_team_bracket(&store, tournament_id, teams);

        advance_with_store(&store, tournament_id, semi_one.id, teams[0])
            .await
            .unwrap();
        let err = advance_with_store(&store, tournament_id, semi_one.id, teams[1])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn surplus_winner_receives_a_bye_into_the_following_round() {
        let store = MemoryStore::new();
        let tournament_id = Uuid::new_v4();
        let teams: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();

        // Three first-round matches funnel into a single two-slot match, so
        // one winner must skip ahead to round three.
        let quarter_one = entry(tournament_id, 1, 0, Some(teams[0]), Some(teams[1]));
        let quarter_two = entry(tournament_id, 1, 1, Some(teams[2]), Some(teams[3]));
        let quarter_three = entry(tournament_id, 1, 2, Some(teams[4]), Some(teams[5]));
        let semi = entry(tournament_id, 2, 0, None, None);
        let final_match = entry(tournament_id, 3, 0, None, None);
        for seeded in [&quarter_one, &quarter_two, &quarter_three, &semi, &final_match] {
            store.seed_match(seeded.clone());
        }

        advance_with_store(&store, tournament_id, quarter_one.id, teams[0])
            .await
            .unwrap();
        advance_with_store(&store, tournament_id, quarter_two.id, teams[2])
            .await
            .unwrap();
        let outcome = advance_with_store(&store, tournament_id, quarter_three.id, teams[4])
            .await
            .unwrap();
        assert_eq!(
            outcome,
            AdvanceOutcome::Seeded {
                round: 2,
                placed: 2,
                byes: 1
            }
        );

        let semi_state = match_of(&store, semi.id).await;
        assert_eq!(semi_state.team_a_id, Some(teams[0]));
        assert_eq!(semi_state.team_b_id, Some(teams[2]));

        let final_state = match_of(&store, final_match.id).await;
        assert_eq!(final_state.team_a_id, Some(teams[4]));
        assert_eq!(final_state.team_b_id, None);
    }

    #[tokio::test]
    async fn surplus_winner_without_a_later_round_is_reported() {
        let store = MemoryStore::new();
        let tournament_id = Uuid::new_v4();
        let teams: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();

        let quarter_one = entry(tournament_id, 1, 0, Some(teams[0]), Some(teams[1]));
        let quarter_two = entry(tournament_id, 1, 1, Some(teams[2]), Some(teams[3]));
        let quarter_three = entry(tournament_id, 1, 2, Some(teams[4]), Some(teams[5]));
        let semi = entry(tournament_id, 2, 0, None, None);
        for seeded in [&quarter_one, &quarter_two, &quarter_three, &semi] {
            store.seed_match(seeded.clone());
        }

        advance_with_store(&store, tournament_id, quarter_one.id, teams[0])
            .await
            .unwrap();
        advance_with_store(&store, tournament_id, quarter_two.id, teams[2])
            .await
            .unwrap();
        let outcome = advance_with_store(&store, tournament_id, quarter_three.id, teams[4])
            .await
            .unwrap();
        assert_eq!(
            outcome,
            AdvanceOutcome::BracketExhausted {
                unplaced: vec![teams[4]]
            }
        );
    }
}

use std::time::SystemTime;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::dao::models::{
    CupFormation, GameEntity, GameStatus, IslandCallEntity, PlayerEntity, PlayerTallyEntity,
    TeamEntity, TeamSide, TournamentLink,
};
use crate::state::machine::{CupMachine, GameState, PlayerTally, TurnPhase};

/// Participant tracked during a game session.
#[derive(Debug, Clone)]
pub struct Player {
    /// Stable identifier within this game.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Account identifier; present only for registered users.
    pub user_id: Option<Uuid>,
}

impl Player {
    /// Whether the player maps to a registered account.
    pub fn is_registered(&self) -> bool {
        self.user_id.is_some()
    }
}

/// One side of a running game session.
#[derive(Debug, Clone)]
pub struct Team {
    /// Display name chosen for the team.
    pub name: String,
    /// Ordered roster keyed by player id.
    pub players: IndexMap<Uuid, Player>,
    /// Match-level team identity used by the bracket engine, for tournament
    /// games only.
    pub bracket_team_id: Option<Uuid>,
}

/// Aggregated state for an in-progress or rehydrated game session: identity
/// and rosters here, gameplay state inside the wrapped machine.
pub struct GameSession {
    /// Primary key of the game.
    pub id: Uuid,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the game was persisted.
    pub updated_at: SystemTime,
    /// The two sides, in play order.
    pub teams: [Team; 2],
    /// Cup formation fixing the winning score.
    pub cup_formation: CupFormation,
    /// Tournament match this game decides, when part of a bracket.
    pub tournament: Option<TournamentLink>,
    /// Gameplay state machine.
    pub machine: CupMachine,
}

impl GameSession {
    /// Build a new in-memory session with a fresh identifier and machine.
    pub fn new(
        teams: [Team; 2],
        cup_formation: CupFormation,
        tournament: Option<TournamentLink>,
    ) -> Self {
        let timestamp = SystemTime::now();
        let rosters = [
            teams[0].players.keys().copied().collect(),
            teams[1].players.keys().copied().collect(),
        ];
        Self {
            id: Uuid::new_v4(),
            created_at: timestamp,
            updated_at: timestamp,
            teams,
            cup_formation,
            tournament,
            machine: CupMachine::new(GameState::new(cup_formation, rosters)),
        }
    }

    /// Look up a player on either roster.
    pub fn player(&self, id: Uuid) -> Option<&Player> {
        self.teams.iter().find_map(|team| team.players.get(&id))
    }

    /// Display name of a player, when known.
    pub fn player_name(&self, id: Uuid) -> Option<&str> {
        self.player(id).map(|player| player.name.as_str())
    }

    /// The team playing the given side.
    pub fn team(&self, side: TeamSide) -> &Team {
        &self.teams[side.index()]
    }

    /// Snapshot the session into its persistence entity.
    pub fn to_entity(&self) -> GameEntity {
        self.entity_with(self.machine.state())
    }

    /// Build the persistence entity for an explicit gameplay state, used to
    /// write a planned transition before it is applied.
    pub fn entity_with(&self, state: &GameState) -> GameEntity {
        let (status, winner) = match state.phase {
            TurnPhase::Completed { winner } => (GameStatus::Completed, Some(winner)),
            _ => (GameStatus::Active, None),
        };
        let (current_team, current_player_index) = match &state.phase {
            TurnPhase::Turn { team, player } => (*team, *player),
            TurnPhase::Redemption(context) => (context.redemption_team, context.shooter),
            // Terminal phase: freeze the last meaningful turn owner.
            TurnPhase::Completed { winner } => (*winner, 0),
        };

        let teams = [
            team_entity(&self.teams[0], state.scores[0]),
            team_entity(&self.teams[1], state.scores[1]),
        ];

        GameEntity {
            id: self.id,
            created_at: self.created_at,
            updated_at: SystemTime::now(),
            teams,
            cup_formation: self.cup_formation,
            status,
            winner,
            current_team,
            current_player_index,
            redemption_used: state.redemption_used,
            island_calls: state
                .island_calls
                .iter()
                .map(|(player_id, armed)| IslandCallEntity {
                    player_id: *player_id,
                    armed: *armed,
                })
                .collect(),
            last_played: state.last_played,
            drink_rotation: state.drink_rotation,
            tallies: state
                .tallies
                .iter()
                .map(|(player_id, tally)| PlayerTallyEntity {
                    player_id: *player_id,
                    shots_attempted: tally.attempts,
                    shots_made: tally.hits,
                    catches: tally.catches,
                })
                .collect(),
            tournament: self.tournament,
        }
    }

    /// Rehydrate a session from its persistence entity.
    ///
    /// Redemption is transient and never persisted, so a reloaded game always
    /// resumes in a normal turn; the consumed redemption flags survive.
    pub fn from_entity(entity: GameEntity) -> Self {
        let teams = entity.teams.clone().map(team_runtime);
        let rosters = [
            teams[0].players.keys().copied().collect(),
            teams[1].players.keys().copied().collect(),
        ];

        let mut state = GameState::new(entity.cup_formation, rosters);
        state.scores = [entity.teams[0].score, entity.teams[1].score];
        state.phase = match (entity.status, entity.winner) {
            (GameStatus::Completed, Some(winner)) => TurnPhase::Completed { winner },
            _ => {
                let roster_len = entity.teams[entity.current_team.index()].players.len();
                TurnPhase::Turn {
                    team: entity.current_team,
                    // Clamp a stale index rather than panic on a bad record.
                    player: entity
                        .current_player_index
                        .min(roster_len.saturating_sub(1)),
                }
            }
        };
        state.redemption_used = entity.redemption_used;
        state.island_calls = entity
            .island_calls
            .iter()
            .map(|call| (call.player_id, call.armed))
            .collect();
        state.last_played = entity.last_played;
        state.drink_rotation = entity.drink_rotation;
        state.tallies = entity
            .tallies
            .iter()
            .map(|tally| {
                (
                    tally.player_id,
                    PlayerTally {
                        attempts: tally.shots_attempted,
                        hits: tally.shots_made,
                        catches: tally.catches,
                    },
                )
            })
            .collect();

        Self {
            id: entity.id,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
            teams,
            cup_formation: entity.cup_formation,
            tournament: entity.tournament,
            machine: CupMachine::new(state),
        }
    }
}

fn team_entity(team: &Team, score: u8) -> TeamEntity {
    TeamEntity {
        name: team.name.clone(),
        players: team
            .players
            .values()
            .map(|player| PlayerEntity {
                id: player.id,
                name: player.name.clone(),
                is_registered: player.is_registered(),
                user_id: player.user_id,
            })
            .collect(),
        score,
        bracket_team_id: team.bracket_team_id,
    }
}

fn team_runtime(entity: TeamEntity) -> Team {
    Team {
        name: entity.name,
        players: entity
            .players
            .into_iter()
            .map(|player| {
                (
                    player.id,
                    Player {
                        id: player.id,
                        name: player.name,
                        user_id: player.user_id,
                    },
                )
            })
            .collect(),
        bracket_team_id: entity.bracket_team_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::machine::GameAction;

    fn team(name: &str, players: &[&str]) -> Team {
        Team {
            name: name.into(),
            players: players
                .iter()
                .map(|player_name| {
                    let id = Uuid::new_v4();
                    (
                        id,
                        Player {
                            id,
                            name: (*player_name).into(),
                            user_id: None,
                        },
                    )
                })
                .collect(),
            bracket_team_id: None,
        }
    }

    #[test]
    fn entity_round_trip_preserves_gameplay_state() {
        let mut session = GameSession::new(
            [team("Sharks", &["Ana", "Bo"]), team("Jets", &["Cy", "Di"])],
            CupFormation::Six,
            None,
        );
        for action in [GameAction::Hit, GameAction::Miss, GameAction::Miss] {
            let plan = session.machine.plan(action).unwrap();
            session.machine.apply(plan.id).unwrap();
        }

        let entity = session.to_entity();
        assert_eq!(entity.teams[0].score, 1);
        assert_eq!(entity.status, GameStatus::Active);

        let restored = GameSession::from_entity(entity);
        assert_eq!(restored.machine.state().scores, [1, 0]);
        assert_eq!(
            restored.machine.state().phase,
            session.machine.state().phase
        );
        assert_eq!(
            restored.machine.state().last_played,
            session.machine.state().last_played
        );
    }

    #[test]
    fn completed_entity_rehydrates_as_completed() {
        let mut session = GameSession::new(
            [team("Sharks", &["Ana"]), team("Jets", &["Cy"])],
            CupFormation::Six,
            None,
        );
        let plan = session
            .machine
            .plan(GameAction::Complete {
                winner: TeamSide::Two,
            })
            .unwrap();
        session.machine.apply(plan.id).unwrap();

        let restored = GameSession::from_entity(session.to_entity());
        assert_eq!(restored.machine.state().winner(), Some(TeamSide::Two));
    }
}

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::models::{CupFormation, GameStatus, TeamSide},
    dto::{format_system_time, validation::validate_display_name},
    state::{
        machine::TurnPhase,
        session::{GameSession, Player, Team},
    },
};

/// Payload used to bootstrap a brand-new game instance.
#[derive(Debug, Deserialize)]
pub struct CreateGameRequest {
    /// The two sides, in play order.
    pub teams: Vec<TeamInput>,
    /// Formation fixing the winning score.
    pub cup_formation: CupFormation,
    /// Tournament match the game decides, when played inside a bracket.
    #[serde(default)]
    pub tournament: Option<TournamentLinkInput>,
}

/// Incoming team definition for the game bootstrap.
#[derive(Debug, Deserialize)]
pub struct TeamInput {
    /// Team display name.
    pub name: String,
    /// Ordered roster, first shooter first.
    pub players: Vec<PlayerInput>,
    /// Match-level team identity; required for tournament games.
    #[serde(default)]
    pub bracket_team_id: Option<Uuid>,
}

/// Incoming player definition for the game bootstrap.
#[derive(Debug, Deserialize)]
pub struct PlayerInput {
    /// Player display name.
    pub name: String,
    /// Account identifier for registered users; guests leave this empty.
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

/// Tournament linkage supplied when the game decides a bracket match.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TournamentLinkInput {
    /// Tournament the game belongs to.
    pub tournament_id: Uuid,
    /// Match the game decides.
    pub match_id: Uuid,
}

impl Validate for PlayerInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_display_name(&self.name) {
            errors.add("name", e);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl Validate for TeamInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_display_name(&self.name) {
            errors.add("name", e);
        }

        if self.players.is_empty() {
            let mut err = ValidationError::new("players_empty");
            err.message = Some("a team requires at least one player".into());
            errors.add("players", err);
        }

        for player in &self.players {
            if let Err(player_errors) = player.validate() {
                errors.merge_self("players", Err(player_errors));
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl Validate for CreateGameRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.teams.len() != 2 {
            let mut err = ValidationError::new("team_count");
            err.message =
                Some(format!("a game requires exactly two teams (got {})", self.teams.len()).into());
            errors.add("teams", err);
        }

        let mut seen_users = HashSet::new();
        for team in &self.teams {
            if let Err(team_errors) = team.validate() {
                errors.merge_self("teams", Err(team_errors));
            }
            for player in &team.players {
                if let Some(user_id) = player.user_id {
                    if !seen_users.insert(user_id) {
                        let mut err = ValidationError::new("duplicate_user");
                        err.message = Some(
                            format!("user `{user_id}` appears more than once in the game").into(),
                        );
                        errors.add("teams", err);
                    }
                }
            }
        }

        if self.tournament.is_some()
            && self.teams.iter().any(|team| team.bracket_team_id.is_none())
        {
            let mut err = ValidationError::new("bracket_team_missing");
            err.message =
                Some("tournament games require a bracket team id on both teams".into());
            errors.add("tournament", err);
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl TeamInput {
    /// Build the runtime team, allocating fresh player identifiers.
    pub fn into_team(self) -> Team {
        Team {
            name: self.name,
            players: self
                .players
                .into_iter()
                .map(|player| {
                    let id = Uuid::new_v4();
                    (
                        id,
                        Player {
                            id,
                            name: player.name,
                            user_id: player.user_id,
                        },
                    )
                })
                .collect(),
            bracket_team_id: self.bracket_team_id,
        }
    }
}

/// Public projection of a player exposed to callers and broadcasts.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerSummary {
    /// Stable identifier within the game.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Whether the player maps to a registered account.
    pub is_registered: bool,
}

/// Public projection of a team exposed to callers and broadcasts.
#[derive(Debug, Clone, Serialize)]
pub struct TeamSummary {
    /// Team display name.
    pub name: String,
    /// Current score.
    pub score: u8,
    /// Cups still standing on this team's table.
    pub cups_remaining: u8,
    /// Match-level team identity, for tournament games.
    pub bracket_team_id: Option<Uuid>,
    /// Roster in shooting order.
    pub players: Vec<PlayerSummary>,
}

/// Redemption sub-state exposed while a counter-shot is underway.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RedemptionSummary {
    /// Team that reached the winning score.
    pub winning_team: TeamSide,
    /// Team playing the counter-shot.
    pub redemption_team: TeamSide,
}

/// Summary returned once a game has been created, loaded, or mutated.
#[derive(Debug, Clone, Serialize)]
pub struct GameSummary {
    /// Game identifier.
    pub id: String,
    /// Creation timestamp, RFC 3339.
    pub created_at: String,
    /// Last update timestamp, RFC 3339.
    pub updated_at: String,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Winning side, once completed.
    pub winner: Option<TeamSide>,
    /// Formation fixing the winning score.
    pub cup_formation: CupFormation,
    /// Winning score.
    pub cups_per_team: u8,
    /// Side currently holding the turn.
    pub current_team: TeamSide,
    /// Player currently shooting, while the game is active.
    pub current_player: Option<PlayerSummary>,
    /// Redemption sub-state, while a counter-shot is underway.
    pub redemption: Option<RedemptionSummary>,
    /// Authoritative state version; subscribers reconcile optimistic local
    /// guesses against the highest version seen.
    pub version: usize,
    /// Both sides, in play order.
    pub teams: Vec<TeamSummary>,
}

impl From<&GameSession> for GameSummary {
    fn from(session: &GameSession) -> Self {
        let state = session.machine.state();
        let (status, winner) = match state.phase {
            TurnPhase::Completed { winner } => (GameStatus::Completed, Some(winner)),
            _ => (GameStatus::Active, None),
        };

        let (current_team, current_index, redemption) = match &state.phase {
            TurnPhase::Turn { team, player } => (*team, Some(*player), None),
            TurnPhase::Redemption(context) => (
                context.redemption_team,
                Some(context.shooter),
                Some(RedemptionSummary {
                    winning_team: context.winning_team,
                    redemption_team: context.redemption_team,
                }),
            ),
            TurnPhase::Completed { winner } => (*winner, None, None),
        };

        let current_player = current_index.and_then(|index| {
            let team = session.team(current_team);
            team.players
                .get_index(index)
                .map(|(_, player)| player_summary(player))
        });

        let teams = TeamSide::both()
            .into_iter()
            .map(|side| {
                let team = session.team(side);
                TeamSummary {
                    name: team.name.clone(),
                    score: state.scores[side.index()],
                    cups_remaining: state.cups_remaining(side),
                    bracket_team_id: team.bracket_team_id,
                    players: team.players.values().map(player_summary).collect(),
                }
            })
            .collect();

        Self {
            id: session.id.to_string(),
            created_at: format_system_time(session.created_at),
            updated_at: format_system_time(session.updated_at),
            status,
            winner,
            cup_formation: session.cup_formation,
            cups_per_team: state.cups,
            current_team,
            current_player,
            redemption,
            version: session.machine.version(),
            teams,
        }
    }
}

fn player_summary(player: &Player) -> PlayerSummary {
    PlayerSummary {
        id: player.id,
        name: player.name.clone(),
        is_registered: player.is_registered(),
    }
}

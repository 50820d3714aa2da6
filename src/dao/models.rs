use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// One of the two sides of a game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TeamSide {
    /// The side that shoots first.
    One,
    /// The side that shoots second.
    Two,
}

impl TeamSide {
    /// The opposing side.
    pub fn opponent(self) -> Self {
        match self {
            TeamSide::One => TeamSide::Two,
            TeamSide::Two => TeamSide::One,
        }
    }

    /// Zero-based index used to address per-side arrays.
    pub fn index(self) -> usize {
        match self {
            TeamSide::One => 0,
            TeamSide::Two => 1,
        }
    }

    /// Both sides, in play order.
    pub fn both() -> [TeamSide; 2] {
        [TeamSide::One, TeamSide::Two]
    }
}

/// Preset cup formation fixing the winning score for both teams.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CupFormation {
    /// Triangle of six cups per team.
    Six,
    /// Pyramid of ten cups per team.
    Ten,
}

impl CupFormation {
    /// Total cups (and therefore the winning score) per team.
    pub fn cups(self) -> u8 {
        match self {
            CupFormation::Six => 6,
            CupFormation::Ten => 10,
        }
    }
}

/// Lifecycle status of a game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Shots are still being recorded.
    Active,
    /// A winner has been decided; the record is final.
    Completed,
}

/// Link between a game and the tournament match it decides.
///
/// Absence of this value means the game is a casual one; no sentinel values
/// are used.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TournamentLink {
    /// Tournament the game belongs to.
    pub tournament_id: Uuid,
    /// Match the game decides.
    pub match_id: Uuid,
}

/// Participant created at game-setup time, immutable for the life of the game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Stable identifier for the player within this game.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Whether the player maps to a registered account.
    pub is_registered: bool,
    /// Stable account identifier; present only for registered users.
    pub user_id: Option<Uuid>,
}

/// One side of a game as stored in persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEntity {
    /// Display name chosen for the team.
    pub name: String,
    /// Ordered roster; players rotate turns by index.
    pub players: Vec<PlayerEntity>,
    /// Current score (cups sunk on the opposing side).
    pub score: u8,
    /// Match-level team identity used by the bracket engine; present only for
    /// tournament games.
    pub bracket_team_id: Option<Uuid>,
}

/// Per-player island call bookkeeping persisted with the game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IslandCallEntity {
    /// Player who called island.
    pub player_id: Uuid,
    /// Whether the doubled hit is still pending.
    pub armed: bool,
}

/// Running per-player shot tallies, folded into [`PlayerStatsEntity`] rows at
/// completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerTallyEntity {
    /// Player the tallies belong to.
    pub player_id: Uuid,
    /// Shots thrown.
    pub shots_attempted: u32,
    /// Shots that sank a cup.
    pub shots_made: u32,
    /// Opposing shots caught.
    pub catches: u32,
}

/// Aggregate game entity persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEntity {
    /// Primary key of the game.
    pub id: Uuid,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the game entity was updated.
    pub updated_at: SystemTime,
    /// The two sides, in play order.
    pub teams: [TeamEntity; 2],
    /// Cup formation fixing the winning score.
    pub cup_formation: CupFormation,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Winning side once the game completes.
    pub winner: Option<TeamSide>,
    /// Side currently holding the turn.
    pub current_team: TeamSide,
    /// Index of the current shooter within the current team's roster.
    pub current_player_index: usize,
    /// Per-side one-shot redemption flags, consumed for the rest of the game.
    pub redemption_used: [bool; 2],
    /// Island calls made so far.
    pub island_calls: Vec<IslandCallEntity>,
    /// Per-side index of the player who last threw, driving turn rotation.
    pub last_played: [Option<usize>; 2],
    /// Per-side round-robin counters for drink notices.
    pub drink_rotation: [usize; 2],
    /// Running per-player tallies.
    pub tallies: Vec<PlayerTallyEntity>,
    /// Tournament match this game decides, when part of a bracket.
    pub tournament: Option<TournamentLink>,
}

/// Discriminant for entries of the append-only score ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreEventKind {
    /// Game created and first turn assigned.
    GameStart,
    /// A shot sank a cup.
    ShotHit,
    /// A shot missed.
    ShotMiss,
    /// A shot was caught by the opposing team.
    Catch,
    /// A player armed their once-per-game island call.
    Island,
    /// The losing team was granted its redemption shot.
    RedemptionStart,
    /// The redemption shot resolved.
    RedemptionEnd,
    /// The game completed.
    GameEnd,
}

/// Typed payload carried by a ledger entry; each variant holds exactly the
/// fields its event kind needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoreEventDetails {
    /// Initial event appended when the game is created.
    GameStart {
        /// Formation chosen for the game.
        cup_formation: CupFormation,
    },
    /// A successful shot.
    Shot {
        /// Shooter.
        player_id: Uuid,
        /// Points awarded (2 under an armed island call, 1 otherwise).
        points: u8,
        /// Whether an island call doubled this shot.
        island: bool,
        /// Player on the non-shooting team who drinks for this cup.
        drinking_player_id: Uuid,
    },
    /// A missed shot.
    Miss {
        /// Shooter.
        player_id: Uuid,
    },
    /// A caught shot, awarding the catching team one point.
    Catch {
        /// Player whose shot was caught.
        shooter_id: Uuid,
        /// Randomly chosen catching player on the opposing team.
        catcher_id: Uuid,
    },
    /// An island call being armed.
    IslandCalled {
        /// Player who called island.
        player_id: Uuid,
    },
    /// Redemption granted to the team about to lose.
    RedemptionStart {
        /// Team that reached the winning score and is being challenged.
        winning_team: TeamSide,
        /// Team granted the counter-shot.
        redemption_team: TeamSide,
    },
    /// Redemption resolved.
    RedemptionEnd {
        /// Team that played the redemption shot.
        redemption_team: TeamSide,
        /// Whether the shot landed and voided a cup.
        survived: bool,
    },
    /// Final event of a game.
    GameEnd {
        /// Winning side.
        winner: TeamSide,
    },
}

/// Immutable entry of the append-only score ledger.
///
/// Created on every state-changing action; never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreEventEntity {
    /// Primary key of the event.
    pub id: Uuid,
    /// Game the event belongs to.
    pub game_id: Uuid,
    /// Side that acted.
    pub team: TeamSide,
    /// Event discriminant.
    pub kind: ScoreEventKind,
    /// Typed event payload.
    pub details: ScoreEventDetails,
    /// Both sides' scores after the event resolved.
    pub scores: [u8; 2],
    /// Both sides' remaining cup counts after the event resolved.
    pub cups_remaining: [u8; 2],
    /// Wall-clock time the event was recorded.
    pub recorded_at: SystemTime,
}

/// Final per-player statistics written once a game completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStatsEntity {
    /// Game the stats belong to.
    pub game_id: Uuid,
    /// Player the stats belong to.
    pub player_id: Uuid,
    /// Shots thrown over the game.
    pub shots_attempted: u32,
    /// Shots that sank a cup.
    pub shots_made: u32,
    /// Opposing shots caught.
    pub catches: u32,
    /// Whether the player's team won.
    pub won: bool,
    /// The player's team's final score.
    pub final_score: u8,
}

/// Lifecycle status of a tournament match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Waiting for team slots or for play to begin.
    Pending,
    /// A linked game is underway.
    InProgress,
    /// A winner has been recorded; terminal and irreversible.
    Complete,
}

/// Lifecycle status of a tournament.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    /// Rounds are still being played.
    InProgress,
    /// The final round resolved and a champion is known.
    Completed,
}

/// Single-elimination bracket slot persisted by the bracket store.
///
/// Created at bracket-build time with team slots empty for later rounds;
/// populated by the advancement engine as earlier rounds resolve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TournamentMatchEntity {
    /// Primary key of the match.
    pub id: Uuid,
    /// Tournament the match belongs to.
    pub tournament_id: Uuid,
    /// One-based round number.
    pub round: u32,
    /// Position of the match within its round.
    pub match_index: u32,
    /// First team slot; empty until seeded.
    pub team_a_id: Option<Uuid>,
    /// Second team slot; empty until seeded.
    pub team_b_id: Option<Uuid>,
    /// Winning team, recorded exactly once.
    pub winner_team_id: Option<Uuid>,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Game deciding this match, once one is underway.
    pub game_id: Option<Uuid>,
}

use std::collections::HashMap;
use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::{
    CupFormation, ScoreEventDetails, ScoreEventKind, TeamSide,
};

/// Context of an in-flight redemption counter-shot.
///
/// Transient: lives only in the machine phase, never persisted on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedemptionContext {
    /// Team granted the counter-shot.
    pub redemption_team: TeamSide,
    /// Team that reached the winning score and is being challenged.
    pub winning_team: TeamSide,
    /// Roster index of the redemption shooter.
    pub shooter: usize,
}

/// Gameplay phase of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPhase {
    /// Normal play: the given roster index of the given side is shooting.
    Turn {
        /// Side holding the turn.
        team: TeamSide,
        /// Roster index of the current shooter.
        player: usize,
    },
    /// Sudden-death counter-shot by the team about to lose.
    Redemption(RedemptionContext),
    /// Terminal phase; a winner has been decided.
    Completed {
        /// Winning side.
        winner: TeamSide,
    },
}

/// Running shot tallies for a single player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerTally {
    /// Shots thrown.
    pub attempts: u32,
    /// Shots that sank a cup.
    pub hits: u32,
    /// Opposing shots caught.
    pub catches: u32,
}

/// Snapshot restored by [`GameAction::Undo`]: scores and turn only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertPoint {
    scores: [u8; 2],
    phase: TurnPhase,
}

/// Flavour of a celebration overlay shown to viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CelebrationKind {
    /// A regular made shot.
    Hit,
    /// A made shot doubled by an island call.
    IslandHit,
    /// A caught shot.
    Catch,
    /// The game-winning moment.
    Victory,
}

/// Ledger entry drafted by the reducer; the service layer stamps ids,
/// timestamps, and the score snapshot before appending it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerDraft {
    /// Event discriminant.
    pub kind: ScoreEventKind,
    /// Acting side.
    pub team: TeamSide,
    /// Typed event payload.
    pub details: ScoreEventDetails,
}

/// Side effects requested by a transition, executed by the surrounding
/// runtime so the reducer itself stays free of I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Append an entry to the score ledger.
    Ledger(LedgerDraft),
    /// Persist the updated game snapshot.
    Persist,
    /// Announce which player on the non-shooting team drinks.
    DrinkNotice {
        /// Team that drinks.
        team: TeamSide,
        /// Player chosen by the team's round-robin drink rotation.
        player_id: Uuid,
    },
    /// Show a celebration overlay to viewers.
    Celebration {
        /// Overlay flavour.
        kind: CelebrationKind,
        /// Celebrating side.
        team: TeamSide,
        /// Player at the centre of the celebration.
        player_id: Uuid,
    },
    /// Prompt viewers that a redemption shot is underway.
    RedemptionPrompt {
        /// Team that reached the winning score.
        winning_team: TeamSide,
        /// Team playing the counter-shot.
        redemption_team: TeamSide,
    },
    /// Announce an island call.
    IslandCalled {
        /// Player who armed the call.
        player_id: Uuid,
    },
    /// The game completed; persist stats and advance any linked bracket.
    Completed {
        /// Winning side.
        winner: TeamSide,
    },
    /// Restart the undo window for the transition just applied.
    OpenUndoWindow,
}

/// Player actions evaluated by the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameAction {
    /// The current shooter sank a cup.
    Hit,
    /// The current shooter missed.
    Miss,
    /// The current shot was caught by the given opposing player.
    Catch {
        /// Catching player, chosen by the caller.
        catcher: Uuid,
    },
    /// A player arms their once-per-game island call.
    CallIsland {
        /// Calling player.
        player: Uuid,
    },
    /// Explicitly complete the game for the given winner.
    Complete {
        /// Winning side.
        winner: TeamSide,
    },
    /// Revert the most recent transition (scores and turn only).
    Undo,
}

/// Reason an action cannot be applied to the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The action is not valid in the current phase.
    #[error("{action:?} cannot be applied while in {phase:?}")]
    Phase {
        /// Phase the machine was in.
        phase: TurnPhase,
        /// Rejected action.
        action: GameAction,
    },
    /// A catch was attempted while the shooting team is on match point.
    #[error("cannot catch while the shooting team is on match point")]
    CatchOnMatchPoint,
    /// The named player is not part of this game.
    #[error("player `{0}` is not part of this game")]
    UnknownPlayer(Uuid),
    /// The named player is not on the defending team.
    #[error("player `{0}` cannot catch their own team's shot")]
    CatcherSide(Uuid),
    /// The named player already spent their island call.
    #[error("player `{0}` already called island this game")]
    IslandUsed(Uuid),
    /// Island calls are barred on match point.
    #[error("island cannot be called on match point")]
    IslandOnMatchPoint,
    /// No revertible transition is recorded.
    #[error("nothing to undo")]
    NothingToUndo,
}

/// Full gameplay state of one session: the pure reducer core.
///
/// [`GameState::step`] never mutates `self`; it returns the successor state
/// together with the effects the runtime must execute.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    /// Winning score, fixed by the cup formation.
    pub cups: u8,
    /// Ordered player ids per side.
    pub rosters: [Vec<Uuid>; 2],
    /// Per-side scores, always within `[0, cups]`.
    pub scores: [u8; 2],
    /// Current phase.
    pub phase: TurnPhase,
    /// Per-side one-shot redemption flags, consumed for the rest of the game.
    pub redemption_used: [bool; 2],
    /// Island calls keyed by player id; presence means the call is spent,
    /// `true` means the doubled hit is still pending.
    pub island_calls: HashMap<Uuid, bool>,
    /// Per-side roster index of the player who last threw.
    pub last_played: [Option<usize>; 2],
    /// Per-side round-robin counters for drink notices.
    pub drink_rotation: [usize; 2],
    /// Running per-player tallies.
    pub tallies: HashMap<Uuid, PlayerTally>,
    /// Snapshot for the single-level undo, when a transition is revertible.
    pub revert: Option<RevertPoint>,
}

impl GameState {
    /// Fresh state: side one shoots first with its first player.
    pub fn new(formation: CupFormation, rosters: [Vec<Uuid>; 2]) -> Self {
        Self {
            cups: formation.cups(),
            rosters,
            scores: [0, 0],
            phase: TurnPhase::Turn {
                team: TeamSide::One,
                player: 0,
            },
            redemption_used: [false, false],
            island_calls: HashMap::new(),
            last_played: [None, None],
            drink_rotation: [0, 0],
            tallies: HashMap::new(),
            revert: None,
        }
    }

    /// Winning side, once the game has completed.
    pub fn winner(&self) -> Option<TeamSide> {
        match self.phase {
            TurnPhase::Completed { winner } => Some(winner),
            _ => None,
        }
    }

    /// Cups still standing on the given side's table.
    pub fn cups_remaining(&self, side: TeamSide) -> u8 {
        self.cups
            .saturating_sub(self.scores[side.opponent().index()])
    }

    /// Side the given player belongs to, if any.
    pub fn side_of(&self, player: Uuid) -> Option<TeamSide> {
        TeamSide::both()
            .into_iter()
            .find(|side| self.rosters[side.index()].contains(&player))
    }

    /// Detect a score that escaped the cap while the game is still running.
    ///
    /// Returns the side that should be force-declared winner. Cannot be
    /// produced by [`step`](Self::step) itself; it guards against data loaded
    /// from a store that was written without transactional guarantees.
    pub fn corruption(&self) -> Option<TeamSide> {
        for side in TeamSide::both() {
            let score = self.scores[side.index()];
            if score > self.cups {
                return Some(side);
            }
            if score == self.cups && matches!(self.phase, TurnPhase::Turn { .. }) {
                return Some(side);
            }
        }
        None
    }

    /// Evaluate `action`, returning the successor state and its effects.
    pub fn step(&self, action: GameAction) -> Result<(GameState, Vec<Effect>), ActionError> {
        match action {
            GameAction::Hit => self.record_hit(),
            GameAction::Miss => self.record_miss(),
            GameAction::Catch { catcher } => self.record_catch(catcher),
            GameAction::CallIsland { player } => self.call_island(player),
            GameAction::Complete { winner } => self.complete(winner),
            GameAction::Undo => self.undo(),
        }
    }

    fn record_hit(&self) -> Result<(GameState, Vec<Effect>), ActionError> {
        let mut next = self.clone();
        let mut effects = Vec::new();

        match self.phase.clone() {
            TurnPhase::Completed { .. } => Err(self.phase_error(GameAction::Hit)),
            TurnPhase::Redemption(context) => {
                // Sudden-death stay-alive: the made shot voids one cup from
                // the team that was about to win instead of scoring.
                let red = context.redemption_team;
                let shooter_id = next.rosters[red.index()][context.shooter];
                next.last_played[red.index()] = Some(context.shooter);
                next.disarm_island(shooter_id);
                let tally = next.tallies.entry(shooter_id).or_default();
                tally.attempts += 1;
                tally.hits += 1;

                next.scores[context.winning_team.index()] =
                    next.scores[context.winning_team.index()].saturating_sub(1);
                let returning = next.next_shooter(context.winning_team);
                next.phase = TurnPhase::Turn {
                    team: context.winning_team,
                    player: returning,
                };
                next.revert = Some(self.revert_point());

                let drinker = next.take_drinker(context.winning_team);
                effects.push(Effect::Ledger(LedgerDraft {
                    kind: ScoreEventKind::RedemptionEnd,
                    team: red,
                    details: ScoreEventDetails::RedemptionEnd {
                        redemption_team: red,
                        survived: true,
                    },
                }));
                effects.push(Effect::Persist);
                effects.push(Effect::DrinkNotice {
                    team: context.winning_team,
                    player_id: drinker,
                });
                effects.push(Effect::OpenUndoWindow);
                Ok((next, effects))
            }
            TurnPhase::Turn { team, player } => {
                let shooter_id = next.rosters[team.index()][player];
                let doubled = next.disarm_island(shooter_id);
                let points: u8 = if doubled { 2 } else { 1 };

                next.last_played[team.index()] = Some(player);
                let tally = next.tallies.entry(shooter_id).or_default();
                tally.attempts += 1;
                tally.hits += 1;

                let capped = (next.scores[team.index()] + points).min(next.cups);
                next.scores[team.index()] = capped;

                let opponent = team.opponent();
                let drinker = next.take_drinker(opponent);
                effects.push(Effect::Ledger(LedgerDraft {
                    kind: if doubled {
                        ScoreEventKind::Island
                    } else {
                        ScoreEventKind::ShotHit
                    },
                    team,
                    details: ScoreEventDetails::Shot {
                        player_id: shooter_id,
                        points,
                        island: doubled,
                        drinking_player_id: drinker,
                    },
                }));

                if capped == next.cups {
                    if next.redemption_used[opponent.index()] {
                        // Opponent already burned its one counter-shot.
                        next.complete_into(team, &mut effects);
                        effects.push(Effect::DrinkNotice {
                            team: opponent,
                            player_id: drinker,
                        });
                    } else {
                        next.redemption_used[opponent.index()] = true;
                        let shooter = next.next_shooter(opponent);
                        next.phase = TurnPhase::Redemption(RedemptionContext {
                            redemption_team: opponent,
                            winning_team: team,
                            shooter,
                        });
                        next.revert = Some(self.revert_point());
                        effects.push(Effect::Ledger(LedgerDraft {
                            kind: ScoreEventKind::RedemptionStart,
                            team: opponent,
                            details: ScoreEventDetails::RedemptionStart {
                                winning_team: team,
                                redemption_team: opponent,
                            },
                        }));
                        effects.push(Effect::Persist);
                        effects.push(Effect::DrinkNotice {
                            team: opponent,
                            player_id: drinker,
                        });
                        effects.push(Effect::RedemptionPrompt {
                            winning_team: team,
                            redemption_team: opponent,
                        });
                        effects.push(Effect::OpenUndoWindow);
                    }
                } else {
                    // Hits never pass the turn.
                    next.revert = Some(self.revert_point());
                    effects.push(Effect::Persist);
                    effects.push(Effect::DrinkNotice {
                        team: opponent,
                        player_id: drinker,
                    });
                    effects.push(Effect::Celebration {
                        kind: if doubled {
                            CelebrationKind::IslandHit
                        } else {
                            CelebrationKind::Hit
                        },
                        team,
                        player_id: shooter_id,
                    });
                    effects.push(Effect::OpenUndoWindow);
                }
                Ok((next, effects))
            }
        }
    }

    fn record_miss(&self) -> Result<(GameState, Vec<Effect>), ActionError> {
        let mut next = self.clone();
        let mut effects = Vec::new();

        match self.phase.clone() {
            TurnPhase::Completed { .. } => Err(self.phase_error(GameAction::Miss)),
            TurnPhase::Redemption(context) => {
                let red = context.redemption_team;
                let shooter_id = next.rosters[red.index()][context.shooter];
                next.last_played[red.index()] = Some(context.shooter);
                next.disarm_island(shooter_id);
                next.tallies.entry(shooter_id).or_default().attempts += 1;

                effects.push(Effect::Ledger(LedgerDraft {
                    kind: ScoreEventKind::RedemptionEnd,
                    team: red,
                    details: ScoreEventDetails::RedemptionEnd {
                        redemption_team: red,
                        survived: false,
                    },
                }));
                // The challenged team keeps its capped winning score.
                next.complete_into(context.winning_team, &mut effects);
                Ok((next, effects))
            }
            TurnPhase::Turn { team, player } => {
                let shooter_id = next.rosters[team.index()][player];
                next.disarm_island(shooter_id);
                next.last_played[team.index()] = Some(player);
                next.tallies.entry(shooter_id).or_default().attempts += 1;

                let opponent = team.opponent();
                let incoming = next.next_shooter(opponent);
                next.phase = TurnPhase::Turn {
                    team: opponent,
                    player: incoming,
                };
                next.revert = Some(self.revert_point());

                effects.push(Effect::Ledger(LedgerDraft {
                    kind: ScoreEventKind::ShotMiss,
                    team,
                    details: ScoreEventDetails::Miss {
                        player_id: shooter_id,
                    },
                }));
                effects.push(Effect::Persist);
                effects.push(Effect::OpenUndoWindow);
                Ok((next, effects))
            }
        }
    }

    fn record_catch(&self, catcher: Uuid) -> Result<(GameState, Vec<Effect>), ActionError> {
        let TurnPhase::Turn { team, player } = self.phase.clone() else {
            return Err(self.phase_error(GameAction::Catch { catcher }));
        };

        // No catching a team on match point.
        if self.scores[team.index()] >= self.cups - 1 {
            return Err(ActionError::CatchOnMatchPoint);
        }

        let catching_side = self
            .side_of(catcher)
            .ok_or(ActionError::UnknownPlayer(catcher))?;
        if catching_side != team.opponent() {
            return Err(ActionError::CatcherSide(catcher));
        }

        let mut next = self.clone();
        let mut effects = Vec::new();

        let shooter_id = next.rosters[team.index()][player];
        next.last_played[team.index()] = Some(player);
        next.tallies.entry(shooter_id).or_default().attempts += 1;
        next.tallies.entry(catcher).or_default().catches += 1;

        // A catch always awards exactly one point, island never applies.
        let catching = team.opponent();
        let capped = (next.scores[catching.index()] + 1).min(next.cups);
        next.scores[catching.index()] = capped;

        effects.push(Effect::Ledger(LedgerDraft {
            kind: ScoreEventKind::Catch,
            team: catching,
            details: ScoreEventDetails::Catch {
                shooter_id,
                catcher_id: catcher,
            },
        }));

        if capped == next.cups {
            // Catches end the game outright, with no redemption step.
            next.complete_into(catching, &mut effects);
        } else {
            let incoming = next.next_shooter(catching);
            next.phase = TurnPhase::Turn {
                team: catching,
                player: incoming,
            };
            next.revert = Some(self.revert_point());
            effects.push(Effect::Persist);
            effects.push(Effect::Celebration {
                kind: CelebrationKind::Catch,
                team: catching,
                player_id: catcher,
            });
            effects.push(Effect::OpenUndoWindow);
        }
        Ok((next, effects))
    }

    fn call_island(&self, player: Uuid) -> Result<(GameState, Vec<Effect>), ActionError> {
        if !matches!(self.phase, TurnPhase::Turn { .. }) {
            return Err(self.phase_error(GameAction::CallIsland { player }));
        }
        let side = self
            .side_of(player)
            .ok_or(ActionError::UnknownPlayer(player))?;
        if self.island_calls.contains_key(&player) {
            return Err(ActionError::IslandUsed(player));
        }
        if self.scores[side.index()] >= self.cups - 1 {
            return Err(ActionError::IslandOnMatchPoint);
        }

        let mut next = self.clone();
        next.island_calls.insert(player, true);

        // A toggle, not a shot: the undo snapshot of the last shot survives.
        let effects = vec![
            Effect::Ledger(LedgerDraft {
                kind: ScoreEventKind::Island,
                team: side,
                details: ScoreEventDetails::IslandCalled { player_id: player },
            }),
            Effect::Persist,
            Effect::IslandCalled { player_id: player },
        ];
        Ok((next, effects))
    }

    fn complete(&self, winner: TeamSide) -> Result<(GameState, Vec<Effect>), ActionError> {
        if matches!(self.phase, TurnPhase::Completed { .. }) {
            // Idempotent: completing twice is a no-op.
            return Ok((self.clone(), Vec::new()));
        }
        let mut next = self.clone();
        let mut effects = Vec::new();
        next.complete_into(winner, &mut effects);
        Ok((next, effects))
    }

    fn undo(&self) -> Result<(GameState, Vec<Effect>), ActionError> {
        if matches!(self.phase, TurnPhase::Completed { .. }) {
            return Err(self.phase_error(GameAction::Undo));
        }
        let Some(revert) = self.revert.clone() else {
            return Err(ActionError::NothingToUndo);
        };

        let mut next = self.clone();
        next.scores = revert.scores;
        next.phase = revert.phase;
        next.revert = None;
        // The ledger entry of the undone transition stays in place.
        Ok((next, vec![Effect::Persist]))
    }

    /// Roster index of the player who shoots next for `side`.
    fn next_shooter(&self, side: TeamSide) -> usize {
        let len = self.rosters[side.index()].len();
        match self.last_played[side.index()] {
            None => 0,
            Some(index) => (index + 1) % len,
        }
    }

    /// Advance `side`'s drink rotation and return the player who drinks.
    fn take_drinker(&mut self, side: TeamSide) -> Uuid {
        let len = self.rosters[side.index()].len();
        let index = self.drink_rotation[side.index()] % len;
        self.drink_rotation[side.index()] += 1;
        self.rosters[side.index()][index]
    }

    /// Clear a pending island call for `player`, reporting whether it was armed.
    fn disarm_island(&mut self, player: Uuid) -> bool {
        match self.island_calls.get_mut(&player) {
            Some(armed) if *armed => {
                *armed = false;
                true
            }
            _ => false,
        }
    }

    fn complete_into(&mut self, winner: TeamSide, effects: &mut Vec<Effect>) {
        self.phase = TurnPhase::Completed { winner };
        self.revert = None;
        effects.push(Effect::Ledger(LedgerDraft {
            kind: ScoreEventKind::GameEnd,
            team: winner,
            details: ScoreEventDetails::GameEnd { winner },
        }));
        effects.push(Effect::Persist);
        effects.push(Effect::Completed { winner });
    }

    fn revert_point(&self) -> RevertPoint {
        RevertPoint {
            scores: self.scores,
            phase: self.phase.clone(),
        }
    }

    fn phase_error(&self, action: GameAction) -> ActionError {
        ActionError::Phase {
            phase: self.phase.clone(),
            action,
        }
    }
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A validated transition that has not been committed yet.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the machine was in when the plan was created.
    pub from: TurnPhase,
    /// Successor state once the plan is applied.
    pub next: GameState,
    /// Effects the runtime must execute for this transition.
    pub effects: Vec<Effect>,
    /// Action that produced the plan.
    pub action: GameAction,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// Errors that can occur when planning a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested action is not valid in the current state.
    Action(ActionError),
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// Machine phase changed since the plan was created.
    PhaseMismatch {
        /// Phase when the plan was created.
        expected: TurnPhase,
        /// Current phase.
        actual: TurnPhase,
    },
    /// Machine version changed since the plan was created.
    VersionMismatch {
        /// Version the plan expected to commit.
        expected: usize,
        /// Version the machine would actually commit.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Authoritative snapshot broadcast to viewers after each transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    /// Current phase.
    pub phase: TurnPhase,
    /// Per-side scores.
    pub scores: [u8; 2],
    /// Version number (increments on each applied transition); subscribers
    /// reconcile optimistic local guesses against the highest version seen.
    pub version: usize,
    /// Pending transition phase, if a plan is awaiting its apply.
    pub pending: Option<TurnPhase>,
}

/// Reducer wrapper enforcing the plan/apply/abort transition protocol.
///
/// Planning validates an action and stages its successor state; applying
/// commits it after the runtime finished the transition's persistence work;
/// aborting discards it. At most one plan may be pending at a time.
#[derive(Debug, Clone)]
pub struct CupMachine {
    state: GameState,
    version: usize,
    pending: Option<Plan>,
}

impl CupMachine {
    /// Wrap a freshly built or rehydrated state.
    pub fn new(state: GameState) -> Self {
        Self {
            state,
            version: 0,
            pending: None,
        }
    }

    /// Inspect the committed state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Current committed version.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Create a snapshot of the committed machine state.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            phase: self.state.phase.clone(),
            scores: self.state.scores,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.next.phase.clone()),
        }
    }

    /// Plan a transition by evaluating the action against the committed state.
    pub fn plan(&mut self, action: GameAction) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let (next, effects) = self.state.step(action.clone()).map_err(PlanError::Action)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.state.phase.clone(),
            next,
            effects,
            action,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());
        Ok(plan)
    }

    /// Commit a planned transition, returning the new snapshot.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<StateSnapshot, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.state.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.state.phase.clone(),
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.state = plan.next;
        self.version = plan.version_next;
        Ok(self.snapshot())
    }

    /// Abort a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(len: usize) -> Vec<Uuid> {
        (0..len).map(|_| Uuid::new_v4()).collect()
    }

    fn six_cup_state(len_one: usize, len_two: usize) -> GameState {
        GameState::new(CupFormation::Six, [roster(len_one), roster(len_two)])
    }

    fn step(state: &GameState, action: GameAction) -> GameState {
        state.step(action).unwrap().0
    }

    fn drink_notices(effects: &[Effect]) -> Vec<(TeamSide, Uuid)> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::DrinkNotice { team, player_id } => Some((*team, *player_id)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn initial_state_is_team_one_first_player() {
        let state = six_cup_state(2, 2);
        assert_eq!(
            state.phase,
            TurnPhase::Turn {
                team: TeamSide::One,
                player: 0
            }
        );
        assert_eq!(state.scores, [0, 0]);
        assert_eq!(state.cups, 6);
    }

    #[test]
    fn hits_score_without_passing_the_turn() {
        let mut state = six_cup_state(2, 2);
        for _ in 0..3 {
            state = step(&state, GameAction::Hit);
        }
        assert_eq!(state.scores, [3, 0]);
        assert_eq!(
            state.phase,
            TurnPhase::Turn {
                team: TeamSide::One,
                player: 0
            }
        );
    }

    #[test]
    fn scores_never_exceed_the_cup_total() {
        let mut state = six_cup_state(1, 1);
        // Hammer hits until the game resolves; redemption for team two fires
        // at six, and its miss completes the game.
        for _ in 0..6 {
            state = step(&state, GameAction::Hit);
            assert!(state.scores[0] <= 6 && state.scores[1] <= 6);
        }
        assert!(matches!(state.phase, TurnPhase::Redemption(_)));
        state = step(&state, GameAction::Miss);
        assert_eq!(state.winner(), Some(TeamSide::One));
        assert_eq!(state.scores, [6, 0]);
    }

    #[test]
    fn island_hit_from_four_caps_at_the_total() {
        let mut state = six_cup_state(1, 1);
        for _ in 0..4 {
            state = step(&state, GameAction::Hit);
        }
        let shooter = state.rosters[0][0];
        state = step(&state, GameAction::CallIsland { player: shooter });
        state = step(&state, GameAction::Hit);
        // 4 + 2 caps exactly at 6 and triggers redemption, never 7.
        assert_eq!(state.scores[0], 6);
        assert!(matches!(state.phase, TurnPhase::Redemption(_)));
    }

    #[test]
    fn misses_alternate_two_player_rosters() {
        let mut state = six_cup_state(2, 2);
        state = step(&state, GameAction::Miss);
        assert_eq!(
            state.phase,
            TurnPhase::Turn {
                team: TeamSide::Two,
                player: 0
            }
        );
        state = step(&state, GameAction::Miss);
        assert_eq!(
            state.phase,
            TurnPhase::Turn {
                team: TeamSide::One,
                player: 1
            }
        );
        state = step(&state, GameAction::Miss);
        assert_eq!(
            state.phase,
            TurnPhase::Turn {
                team: TeamSide::Two,
                player: 1
            }
        );
        state = step(&state, GameAction::Miss);
        assert_eq!(
            state.phase,
            TurnPhase::Turn {
                team: TeamSide::One,
                player: 0
            }
        );
    }

    #[test]
    fn single_player_rosters_always_shoot_index_zero() {
        let mut state = six_cup_state(1, 1);
        for expected_team in [TeamSide::Two, TeamSide::One, TeamSide::Two] {
            state = step(&state, GameAction::Miss);
            assert_eq!(
                state.phase,
                TurnPhase::Turn {
                    team: expected_team,
                    player: 0
                }
            );
        }
    }

    #[test]
    fn reaching_the_total_enters_redemption_for_the_opponent() {
        let mut state = six_cup_state(2, 2);
        for _ in 0..6 {
            state = step(&state, GameAction::Hit);
        }
        match &state.phase {
            TurnPhase::Redemption(context) => {
                assert_eq!(context.redemption_team, TeamSide::Two);
                assert_eq!(context.winning_team, TeamSide::One);
            }
            other => panic!("expected redemption, got {other:?}"),
        }
        assert!(state.redemption_used[TeamSide::Two.index()]);
        assert_eq!(state.scores, [6, 0]);
    }

    #[test]
    fn redemption_miss_completes_for_the_challenged_team() {
        let mut state = six_cup_state(2, 2);
        for _ in 0..6 {
            state = step(&state, GameAction::Hit);
        }
        state = step(&state, GameAction::Miss);
        assert_eq!(state.winner(), Some(TeamSide::One));
        assert_eq!(state.scores[0], 6);
    }

    #[test]
    fn redemption_hit_voids_a_cup_and_returns_play() {
        let mut state = six_cup_state(2, 2);
        for _ in 0..6 {
            state = step(&state, GameAction::Hit);
        }
        state = step(&state, GameAction::Hit);
        assert_eq!(state.scores[0], 5);
        // Player 0 of team one threw the whole game, so rotation hands the
        // returned turn to player 1.
        assert_eq!(
            state.phase,
            TurnPhase::Turn {
                team: TeamSide::One,
                player: 1
            }
        );
    }

    #[test]
    fn redemption_is_granted_at_most_once_per_team() {
        let mut state = six_cup_state(2, 2);
        for _ in 0..6 {
            state = step(&state, GameAction::Hit);
        }
        // Team two survives its redemption shot once.
        state = step(&state, GameAction::Hit);
        assert_eq!(state.scores[0], 5);
        // Team one closes it out again; no second chance for team two.
        state = step(&state, GameAction::Hit);
        assert_eq!(state.winner(), Some(TeamSide::One));
        assert_eq!(state.scores[0], 6);
    }

    #[test]
    fn redemption_flags_are_tracked_per_team() {
        let mut state = six_cup_state(1, 1);
        state.scores = [5, 5];
        state.phase = TurnPhase::Turn {
            team: TeamSide::Two,
            player: 0,
        };
        state.redemption_used[TeamSide::Two.index()] = true;

        // Team one's chance is untouched, so team two's winning hit is
        // challenged.
        let state = step(&state, GameAction::Hit);
        match &state.phase {
            TurnPhase::Redemption(context) => {
                assert_eq!(context.redemption_team, TeamSide::One);
                assert_eq!(context.winning_team, TeamSide::Two);
            }
            other => panic!("expected redemption, got {other:?}"),
        }
    }

    #[test]
    fn island_doubles_exactly_one_hit() {
        let mut state = six_cup_state(2, 2);
        let shooter = state.rosters[0][0];
        let (with_island, effects) = state
            .step(GameAction::CallIsland { player: shooter })
            .unwrap();
        assert!(effects
            .iter()
            .any(|effect| matches!(effect, Effect::IslandCalled { .. })));
        state = with_island;
        assert_eq!(state.island_calls.get(&shooter), Some(&true));

        state = step(&state, GameAction::Hit);
        assert_eq!(state.scores[0], 2);
        assert_eq!(state.island_calls.get(&shooter), Some(&false));

        // The flag stays consumed on later hits by the same player.
        state = step(&state, GameAction::Hit);
        assert_eq!(state.scores[0], 3);
    }

    #[test]
    fn island_is_consumed_by_a_miss() {
        let mut state = six_cup_state(1, 1);
        let shooter = state.rosters[0][0];
        state = step(&state, GameAction::CallIsland { player: shooter });
        state = step(&state, GameAction::Miss);
        assert_eq!(state.island_calls.get(&shooter), Some(&false));
        state = step(&state, GameAction::Miss);
        state = step(&state, GameAction::Hit);
        assert_eq!(state.scores[0], 1);
    }

    #[test]
    fn island_cannot_be_called_twice_by_the_same_player() {
        let mut state = six_cup_state(1, 1);
        let shooter = state.rosters[0][0];
        state = step(&state, GameAction::CallIsland { player: shooter });
        state = step(&state, GameAction::Hit);
        let err = state
            .step(GameAction::CallIsland { player: shooter })
            .unwrap_err();
        assert_eq!(err, ActionError::IslandUsed(shooter));
    }

    #[test]
    fn island_is_rejected_on_match_point() {
        let mut state = six_cup_state(1, 1);
        for _ in 0..5 {
            state = step(&state, GameAction::Hit);
        }
        let shooter = state.rosters[0][0];
        let err = state
            .step(GameAction::CallIsland { player: shooter })
            .unwrap_err();
        assert_eq!(err, ActionError::IslandOnMatchPoint);
    }

    #[test]
    fn catch_is_rejected_on_match_point() {
        let mut state = six_cup_state(1, 1);
        for _ in 0..5 {
            state = step(&state, GameAction::Hit);
        }
        let catcher = state.rosters[1][0];
        let err = state.step(GameAction::Catch { catcher }).unwrap_err();
        assert_eq!(err, ActionError::CatchOnMatchPoint);
    }

    #[test]
    fn catch_awards_one_point_and_switches_the_turn() {
        let state = six_cup_state(2, 2);
        let catcher = state.rosters[1][1];
        let (state, effects) = state.step(GameAction::Catch { catcher }).unwrap();
        assert_eq!(state.scores, [0, 1]);
        assert_eq!(
            state.phase,
            TurnPhase::Turn {
                team: TeamSide::Two,
                player: 0
            }
        );
        assert_eq!(state.tallies.get(&catcher).unwrap().catches, 1);
        assert!(effects
            .iter()
            .any(|effect| matches!(effect, Effect::Celebration { kind: CelebrationKind::Catch, .. })));
    }

    #[test]
    fn catch_rejects_a_player_from_the_shooting_team() {
        let state = six_cup_state(2, 2);
        let teammate = state.rosters[0][1];
        let err = state.step(GameAction::Catch { catcher: teammate }).unwrap_err();
        assert_eq!(err, ActionError::CatcherSide(teammate));
    }

    #[test]
    fn winning_catch_skips_redemption() {
        let mut state = six_cup_state(1, 1);
        state.scores = [0, 5];
        let catcher = state.rosters[1][0];
        let state = step(&state, GameAction::Catch { catcher });
        assert_eq!(state.winner(), Some(TeamSide::Two));
        assert_eq!(state.scores, [0, 6]);
        assert!(!state.redemption_used[TeamSide::One.index()]);
    }

    #[test]
    fn completing_twice_is_a_no_op() {
        let mut state = six_cup_state(1, 1);
        state = step(
            &state,
            GameAction::Complete {
                winner: TeamSide::One,
            },
        );
        let (again, effects) = state
            .step(GameAction::Complete {
                winner: TeamSide::One,
            })
            .unwrap();
        assert!(effects.is_empty());
        assert_eq!(again, state);
    }

    #[test]
    fn undo_restores_scores_and_turn_once() {
        let mut state = six_cup_state(2, 2);
        state = step(&state, GameAction::Hit);
        state = step(&state, GameAction::Miss);
        assert_eq!(
            state.phase,
            TurnPhase::Turn {
                team: TeamSide::Two,
                player: 0
            }
        );

        state = step(&state, GameAction::Undo);
        assert_eq!(state.scores, [1, 0]);
        assert_eq!(
            state.phase,
            TurnPhase::Turn {
                team: TeamSide::One,
                player: 0
            }
        );

        let err = state.step(GameAction::Undo).unwrap_err();
        assert_eq!(err, ActionError::NothingToUndo);
    }

    #[test]
    fn undo_is_rejected_after_completion() {
        let mut state = six_cup_state(1, 1);
        state = step(
            &state,
            GameAction::Complete {
                winner: TeamSide::Two,
            },
        );
        assert!(matches!(
            state.step(GameAction::Undo),
            Err(ActionError::Phase { .. })
        ));
    }

    #[test]
    fn drink_rotation_is_independent_per_team() {
        let mut state = six_cup_state(1, 2);
        let defenders = state.rosters[1].clone();
        let mut drinkers = Vec::new();
        for _ in 0..3 {
            let (next, effects) = state.step(GameAction::Hit).unwrap();
            drinkers.extend(drink_notices(&effects).into_iter().map(|(_, id)| id));
            state = next;
        }
        assert_eq!(drinkers, vec![defenders[0], defenders[1], defenders[0]]);
    }

    #[test]
    fn corruption_is_detected_for_over_cap_scores() {
        let mut state = six_cup_state(1, 1);
        assert_eq!(state.corruption(), None);
        state.scores[0] = 7;
        assert_eq!(state.corruption(), Some(TeamSide::One));

        let mut at_cap = six_cup_state(1, 1);
        at_cap.scores[1] = 6;
        assert_eq!(at_cap.corruption(), Some(TeamSide::Two));
    }

    #[test]
    fn machine_plan_apply_commits_a_transition() {
        let mut machine = CupMachine::new(six_cup_state(1, 1));
        let plan = machine.plan(GameAction::Hit).unwrap();
        let snapshot = machine.apply(plan.id).unwrap();
        assert_eq!(snapshot.scores, [1, 0]);
        assert_eq!(snapshot.version, 1);
    }

    #[test]
    fn machine_rejects_a_second_pending_plan() {
        let mut machine = CupMachine::new(six_cup_state(1, 1));
        let _plan = machine.plan(GameAction::Hit).unwrap();
        assert_eq!(
            machine.plan(GameAction::Miss).unwrap_err(),
            PlanError::AlreadyPending
        );
    }

    #[test]
    fn machine_abort_clears_the_pending_plan() {
        let mut machine = CupMachine::new(six_cup_state(1, 1));
        let plan = machine.plan(GameAction::Hit).unwrap();
        machine.abort(plan.id).unwrap();
        assert_eq!(machine.version(), 0);
        assert_eq!(machine.state().scores, [0, 0]);
        let plan = machine.plan(GameAction::Miss).unwrap();
        machine.apply(plan.id).unwrap();
        assert_eq!(machine.version(), 1);
    }

    #[test]
    fn machine_apply_rejects_a_mismatched_plan_id() {
        let mut machine = CupMachine::new(six_cup_state(1, 1));
        let _plan = machine.plan(GameAction::Hit).unwrap();
        let bogus = Uuid::new_v4();
        assert!(matches!(
            machine.apply(bogus),
            Err(ApplyError::IdMismatch { .. })
        ));
    }
}

/// Pure gameplay reducer and its plan/apply/abort wrapper.
pub mod machine;
/// Per-game broadcast hubs and the subscriber dedup ring.
pub mod realtime;
/// Runtime session model and entity conversions.
pub mod session;
/// Transition orchestration helpers.
pub mod transitions;
/// Pausable undo countdown.
pub mod undo;

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::timeout;
use tracing::warn;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{bracket_store::BracketStore, game_store::GameStore},
    error::ServiceError,
};

pub use self::machine::{
    AbortError, ApplyError, GameAction, Plan, PlanError, PlanId, StateSnapshot,
};
use self::{realtime::RealtimeState, session::GameSession, undo::UndoWindow};

/// Cheaply cloneable handle to the central application state.
pub type SharedState = Arc<AppState>;

/// Per-game mutable state bundle: the session, its transition gate, and the
/// undo window slot.
pub struct GameHandle {
    /// Session data and state machine.
    pub session: RwLock<GameSession>,
    /// Serialises transitions so at most one is in flight per game.
    transition_gate: Mutex<()>,
    /// Active undo window, when a transition is still revertible.
    pub undo: Mutex<Option<UndoWindow>>,
}

impl GameHandle {
    fn new(session: GameSession) -> Self {
        Self {
            session: RwLock::new(session),
            transition_gate: Mutex::new(()),
            undo: Mutex::new(None),
        }
    }
}

/// Central application state storing store handles, realtime hubs, and the
/// registry of active game sessions.
pub struct AppState {
    config: AppConfig,
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    bracket_store: RwLock<Option<Arc<dyn BracketStore>>>,
    realtime: RealtimeState,
    sessions: DashMap<Uuid, Arc<GameHandle>>,
    degraded: watch::Sender<bool>,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned
    /// cheaply.
    ///
    /// The application starts in degraded mode until stores are installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let transition_timeout = Some(config.transition_timeout);
        Arc::new(Self {
            realtime: RealtimeState::new(config.channel_capacity),
            config,
            game_store: RwLock::new(None),
            bracket_store: RwLock::new(None),
            sessions: DashMap::new(),
            degraded: degraded_tx,
            transition_timeout,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// Game store handle or a degraded-mode error.
    pub async fn require_game_store(&self) -> Result<Arc<dyn GameStore>, ServiceError> {
        self.game_store.read().await.clone().ok_or(ServiceError::Degraded)
    }

    /// Bracket store handle or a degraded-mode error.
    pub async fn require_bracket_store(&self) -> Result<Arc<dyn BracketStore>, ServiceError> {
        self.bracket_store
            .read()
            .await
            .clone()
            .ok_or(ServiceError::Degraded)
    }

    /// Install store implementations and leave degraded mode.
    pub async fn install_stores(
        &self,
        game_store: Arc<dyn GameStore>,
        bracket_store: Arc<dyn BracketStore>,
    ) {
        {
            let mut guard = self.game_store.write().await;
            *guard = Some(game_store);
        }
        {
            let mut guard = self.bracket_store.write().await;
            *guard = Some(bracket_store);
        }
        self.update_degraded(false);
    }

    /// Remove the current stores and enter degraded mode.
    pub async fn clear_stores(&self) {
        {
            let mut guard = self.game_store.write().await;
            guard.take();
        }
        {
            let mut guard = self.bracket_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.game_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }

    /// Per-game broadcast hubs.
    pub fn realtime(&self) -> &RealtimeState {
        &self.realtime
    }

    /// Register a freshly created or loaded session, returning its handle.
    pub fn insert_session(&self, session: GameSession) -> Arc<GameHandle> {
        let id = session.id;
        let handle = Arc::new(GameHandle::new(session));
        self.sessions.insert(id, handle.clone());
        handle
    }

    /// Handle of an active session, or a not-found error.
    pub fn session(&self, game_id: Uuid) -> Result<Arc<GameHandle>, ServiceError> {
        self.sessions
            .get(&game_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("game `{game_id}` is not active")))
    }

    /// Drop a session and its realtime channels.
    pub fn remove_session(&self, game_id: Uuid) {
        self.sessions.remove(&game_id);
        self.realtime.remove(game_id);
    }

    /// Snapshot the committed machine state of an active game.
    pub async fn snapshot(&self, game_id: Uuid) -> Result<StateSnapshot, ServiceError> {
        let handle = self.session(game_id)?;
        let session = handle.session.read().await;
        Ok(session.machine.snapshot())
    }

    /// Run one gameplay transition under the game's transition gate.
    ///
    /// The action is planned against the committed state, `work` performs the
    /// transition's persistence with the plan in hand, and the plan is applied
    /// only when `work` succeeds within the timeout; otherwise it is aborted
    /// and the committed state is left untouched.
    pub async fn run_transition<F, Fut, T>(
        &self,
        game_id: Uuid,
        action: GameAction,
        work: F,
    ) -> Result<(T, StateSnapshot), ServiceError>
    where
        F: FnOnce(Plan) -> Fut,
        Fut: std::future::Future<Output = Result<T, ServiceError>>,
    {
        let handle = self.session(game_id)?;
        let gate = handle.transition_gate.lock().await;

        let plan = {
            let mut session = handle.session.write().await;
            session.machine.plan(action.clone())?
        };
        let plan_id = plan.id;

        let work_future = work(plan);
        let outcome = if let Some(limit) = self.transition_timeout {
            match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    self.abort_plan(&handle, plan_id, &action).await;
                    drop(gate);
                    return Err(ServiceError::Timeout);
                }
            }
        } else {
            work_future.await
        };

        match outcome {
            Ok(value) => {
                let snapshot = {
                    let mut session = handle.session.write().await;
                    session.machine.apply(plan_id)?
                };
                drop(gate);
                Ok((value, snapshot))
            }
            Err(err) => {
                self.abort_plan(&handle, plan_id, &action).await;
                drop(gate);
                Err(err)
            }
        }
    }

    async fn abort_plan(&self, handle: &GameHandle, plan_id: PlanId, action: &GameAction) {
        let mut session = handle.session.write().await;
        if let Err(abort_err) = session.machine.abort(plan_id) {
            warn!(
                action = ?action,
                plan_id = %plan_id,
                error = ?abort_err,
                "failed to abort transition"
            );
        }
    }
}

use uuid::Uuid;

use crate::{
    error::ServiceError,
    services::realtime_events::broadcast_state_changed,
    state::{GameAction, Plan, SharedState, StateSnapshot},
};

/// Execute a planned state-machine transition, then broadcast the resulting
/// authoritative snapshot to the game's subscribers.
pub async fn run_transition_with_broadcast<F, Fut, T>(
    state: &SharedState,
    game_id: Uuid,
    action: GameAction,
    work: F,
) -> Result<(T, StateSnapshot), ServiceError>
where
    F: FnOnce(Plan) -> Fut,
    Fut: std::future::Future<Output = Result<T, ServiceError>>,
{
    let (res, snapshot) = state.run_transition(game_id, action, work).await?;
    broadcast_state_changed(state, game_id).await;
    Ok((res, snapshot))
}

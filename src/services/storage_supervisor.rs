use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{bracket_store::BracketStore, game_store::GameStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Store pair produced by a connection attempt.
pub type ConnectedStores = (Arc<dyn GameStore>, Arc<dyn BracketStore>);

/// Keep the shared state connected to its storage backend, entering degraded
/// mode whenever it is unavailable and retrying with exponential backoff.
///
/// Spawn this on the runtime once at startup; it never returns.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<ConnectedStores, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok((game_store, bracket_store)) => {
                state
                    .install_stores(game_store.clone(), bracket_store)
                    .await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                loop {
                    match game_store.health_check().await {
                        Ok(()) => {
                            state.update_degraded(false);
                            sleep(HEALTH_POLL_INTERVAL).await;
                        }
                        Err(err) => {
                            warn!(error = %err, "storage health check failed; entering degraded mode");
                            state.clear_stores().await;
                            break;
                        }
                    }
                }

                sleep(delay).await;
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, dao::memory::MemoryStore, state::AppState};

    #[tokio::test]
    async fn successful_connection_leaves_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded().await);
        let mut watcher = state.degraded_watcher();

        let supervisor = tokio::spawn(run(state.clone(), || async {
            let store = MemoryStore::new();
            Ok((
                Arc::new(store.clone()) as Arc<dyn GameStore>,
                Arc::new(store) as Arc<dyn BracketStore>,
            ))
        }));

        watcher.wait_for(|degraded| !degraded).await.unwrap();
        assert!(!state.is_degraded().await);
        supervisor.abort();
    }
}

//! Core library for cup-rally, the turn-based cup game engine: game session
//! state machine, score ledger, realtime fan-out, undo window, and the
//! single-elimination bracket advancement engine.
//!
//! The crate exposes no network or CLI surface; the surrounding presentation
//! layer drives it through the functions in [`services`] over a shared
//! [`state::AppState`].

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod services;
pub mod state;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Configure tracing subscribers so embedder logs include spans by default.
///
/// Call once from the embedding process before driving any service function.
pub fn init_tracing() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

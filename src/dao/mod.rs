//! Persistence abstractions: entity models, store traits, and the in-memory
//! backend used in tests and by embedders without external storage.

/// Bracket store trait for tournament matches.
pub mod bracket_store;
/// Game store trait for game sessions, ledger events, and player stats.
pub mod game_store;
/// In-memory implementation of both store traits.
pub mod memory;
/// Entity models shared across layers.
pub mod models;
/// Backend-agnostic storage error types.
pub mod storage;

/// Bracket advancement engine consuming completed tournament games.
pub mod bracket;
/// Core game lifecycle and shot-recording logic.
pub mod game;
/// Realtime broadcast message generation.
pub mod realtime_events;
/// Realtime subscription handling.
pub mod realtime_service;
/// Storage connection supervisor with degraded-mode handling.
pub mod storage_supervisor;

//! Request/response data transfer objects exchanged with the embedding
//! presentation layer, plus the broadcast payload types.

use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Broadcast payload types.
pub mod events;
/// Game creation requests and projections.
pub mod game;
/// Validation helpers for DTOs.
pub mod validation;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

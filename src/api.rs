//! HTTP API for rooms on this device

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::db::Database;
use crate::runtime::RoomManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomManager>,
    /// Contact directory used for participant resolution
    pub db: Database,
    /// Recorded as the originator of rooms created here
    pub local_user_id: String,
}

impl AppState {
    pub fn new(rooms: RoomManager, db: Database, local_user_id: impl Into<String>) -> Self {
        Self {
            rooms: Arc::new(rooms),
            db,
            local_user_id: local_user_id.into(),
        }
    }
}

// src/state.rs

use crate::{config::ConnectionSettings, database::RoomStore, registry::RoomRegistry};
use std::sync::Arc;

/// Shared state handed to every handler through axum's `State` extractor.
/// Built once at startup; nothing here is a process-wide global.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub store: RoomStore,
    pub connections: ConnectionSettings,
}

impl AppState {
    pub fn new(registry: RoomRegistry, store: RoomStore, connections: ConnectionSettings) -> Self {
        Self {
            registry: Arc::new(registry),
            store,
            connections,
        }
    }
}

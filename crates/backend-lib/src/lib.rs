// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core of the Scorched Earth LAN signaling server.
//!
//! Browsers connect over a hand-rolled WebSocket at `/ws`, gather in rooms, and once a match
//! starts the server relays player actions to the room's host and the host's snapshots back
//! out. All game simulation happens on the host's browser.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod handlers;
pub mod handshake;
pub mod metrics;
pub mod payload;
pub mod peer;
pub mod reaper;
pub mod registry;
pub mod room;
pub mod ws_router;

use crate::config::Settings;
use crate::registry::Registry;
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// Peers, rooms and their index
    pub registry: Arc<Registry>,
    /// Loaded settings
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Create a new application state with an empty registry
    pub fn new(settings: Settings) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            settings: Arc::new(settings),
        }
    }
}

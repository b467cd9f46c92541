// ==============
// crates/backend-lib/src/metrics.rs
// ==============
//! Central place for metric keys.
//!
//! Call sites import the `metrics` crate macros as `::metrics::{counter, gauge}` and this
//! module under an alias, so the two never shadow each other.

/// Connections that completed the upgrade
pub const WS_CONNECTION: &str = "ws.connection";
pub const PEERS_ACTIVE: &str = "ws.active";
pub const ROOMS_ACTIVE: &str = "room.active";
pub const ROOM_CREATED: &str = "room.created";
pub const ROOM_JOINED: &str = "room.joined";
/// Rooms deleted by the reaper
pub const ROOM_REAPED: &str = "room.reaped";
pub const MATCH_STARTED: &str = "match.started";
/// Relay and snapshot messages forwarded between players
pub const RELAY_FORWARDED: &str = "relay.forwarded";
pub const MESSAGE_REJECTED: &str = "message.rejected";

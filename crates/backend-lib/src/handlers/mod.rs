// ============================
// crates/backend-lib/src/handlers/mod.rs
// ============================
//! Plain HTTP surfaces next to the WebSocket endpoint.

pub mod assets;
pub mod health;

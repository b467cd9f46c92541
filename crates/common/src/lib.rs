// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between the game clients and the signaling server.
//! This module defines the envelope format, the room snapshots and the event payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Server-assigned connection identifier (`peer-<n>`)
pub type PeerId = String;

/// Server-generated room identifier (`room-<base36>`)
pub type RoomId = String;

/// Envelope sent from client to server
///
/// `type` defaults to the empty string so a well-formed JSON object without a tag is
/// reported as an unknown type rather than as malformed JSON.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ClientEnvelope {
    /// Message type tag, e.g. `room.join`
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Free-form payload object
    #[serde(default)]
    pub payload: Option<Value>,
    /// Correlation id echoed on direct replies
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Envelope sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerEnvelope<T = Value> {
    /// Event type tag, see [`events`]
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload
    pub payload: T,
    /// Echo of the request's correlation id, when replying directly
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Room lifecycle status. One-way: `lobby` → `in-game`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RoomStatus {
    /// Accepting joins
    Lobby,
    /// Match running, joins rejected
    InGame,
}

/// Membership record of one peer inside a room
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Peer owning this seat
    pub peer_id: PeerId,
    /// Display name, at most 16 characters
    pub name: String,
    /// Lobby ready flag
    pub ready: bool,
    /// Whether this player is the room's host
    pub is_host: bool,
}

/// Full room snapshot broadcast to members
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub room_id: RoomId,
    pub room_name: String,
    pub status: RoomStatus,
    pub max_players: usize,
    /// Players in join order
    pub players: Vec<Player>,
}

/// Entry of the open-room listing
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub room_name: String,
    pub host_name: String,
    /// Current player count
    pub players: usize,
    pub max_players: usize,
    pub status: RoomStatus,
}

/// Error codes carried by `error` envelopes
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    Forbidden,
    RoomNotFound,
    RoomFull,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::RoomNotFound => "room_not_found",
            ErrorCode::RoomFull => "room_full",
        }
    }
}

/// Payload of an `error` envelope
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    /// Set for `room_full`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    /// Set for `room_full`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_players: Option<usize>,
    /// Set for `room_full`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_players: Option<usize>,
}

/// Message types a client may send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientMessageType {
    RoomListRequest,
    RoomCreate,
    RoomJoin,
    RoomLeave,
    PeerReady,
    PeerRename,
    ChatMsg,
    MatchStart,
    GameInput,
    ShopBuy,
    ShopSell,
    ShopDone,
    GameSnapshot,
}

impl ClientMessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientMessageType::RoomListRequest => "room.list.request",
            ClientMessageType::RoomCreate => "room.create",
            ClientMessageType::RoomJoin => "room.join",
            ClientMessageType::RoomLeave => "room.leave",
            ClientMessageType::PeerReady => "peer.ready",
            ClientMessageType::PeerRename => "peer.rename",
            ClientMessageType::ChatMsg => "chat.msg",
            ClientMessageType::MatchStart => "match.start",
            ClientMessageType::GameInput => "game.input",
            ClientMessageType::ShopBuy => "shop.buy",
            ClientMessageType::ShopSell => "shop.sell",
            ClientMessageType::ShopDone => "shop.done",
            ClientMessageType::GameSnapshot => "game.snapshot",
        }
    }
}

impl fmt::Display for ClientMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a type tag is not part of the protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMessageType(pub String);

impl fmt::Display for UnknownMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown type: {}", self.0)
    }
}

impl std::error::Error for UnknownMessageType {}

impl FromStr for ClientMessageType {
    type Err = UnknownMessageType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "room.list.request" => ClientMessageType::RoomListRequest,
            "room.create" => ClientMessageType::RoomCreate,
            "room.join" => ClientMessageType::RoomJoin,
            "room.leave" => ClientMessageType::RoomLeave,
            "peer.ready" => ClientMessageType::PeerReady,
            "peer.rename" => ClientMessageType::PeerRename,
            "chat.msg" => ClientMessageType::ChatMsg,
            "match.start" => ClientMessageType::MatchStart,
            "game.input" => ClientMessageType::GameInput,
            "shop.buy" => ClientMessageType::ShopBuy,
            "shop.sell" => ClientMessageType::ShopSell,
            "shop.done" => ClientMessageType::ShopDone,
            "game.snapshot" => ClientMessageType::GameSnapshot,
            other => return Err(UnknownMessageType(other.to_string())),
        };
        Ok(kind)
    }
}

/// Event type tags sent by the server
pub mod events {
    pub const ROOM_LIST_RESPONSE: &str = "room.list.response";
    pub const ROOM_CREATED: &str = "room.created";
    pub const ROOM_JOINED: &str = "room.joined";
    pub const ROOM_STATE: &str = "room.state";
    pub const PEER_RENAME: &str = "peer.rename";
    pub const CHAT_MSG: &str = "chat.msg";
    pub const MATCH_START: &str = "match.start";
    pub const GAME_INPUT: &str = "game.input";
    pub const SHOP_BUY: &str = "shop.buy";
    pub const SHOP_SELL: &str = "shop.sell";
    pub const SHOP_DONE: &str = "shop.done";
    pub const GAME_SNAPSHOT: &str = "game.snapshot";
    pub const ERROR: &str = "error";
}

/// `room.list.response`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RoomListResponse {
    pub rooms: Vec<RoomSummary>,
}

/// `room.created` and `room.joined`
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RoomEntered {
    /// The receiving client's own peer id
    pub self_peer_id: PeerId,
    pub room: RoomState,
}

/// `room.state`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RoomStateEvent {
    pub room: RoomState,
}

/// `peer.rename`
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PeerRenamed {
    pub peer_id: PeerId,
    pub room_id: RoomId,
    pub name: String,
}

/// `chat.msg` as broadcast by the server
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub room_id: RoomId,
    pub peer_id: PeerId,
    pub name: String,
    pub text: String,
    /// Server timestamp, milliseconds since the Unix epoch
    pub at: i64,
}

/// `match.start` as broadcast by the server
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MatchStarted {
    pub room_id: RoomId,
    /// Milliseconds since the Unix epoch
    pub started_at: i64,
}

/// `game.input` forwarded to the host
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GameInputRelay {
    pub peer_id: PeerId,
    /// The sender's payload, untouched
    pub data: Value,
}

/// `shop.buy` / `shop.sell` forwarded to the host
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ShopTradeRelay {
    pub peer_id: PeerId,
    pub room_id: RoomId,
    pub weapon_id: String,
}

/// `shop.done` forwarded to the host
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ShopDoneRelay {
    pub peer_id: PeerId,
    pub room_id: RoomId,
    pub done: bool,
}

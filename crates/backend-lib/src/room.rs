// ============================
// crates/backend-lib/src/room.rs
// ============================
//! Room model and the rules that keep it consistent.
//!
//! A room owns its players by value, in join order. While the room is non-empty exactly
//! one player carries the host flag; [`Room::remove_player`] restores that after a departure
//! by promoting the first remaining player.

use rand::Rng;
use scorched_common::{PeerId, Player, RoomId, RoomState, RoomStatus, RoomSummary};
use std::time::Duration;
use tokio::time::Instant;

/// Display names are cut to this many characters
pub const MAX_NAME_CHARS: usize = 16;
/// Chat text is cut to this many characters
pub const MAX_CHAT_CHARS: usize = 200;
pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: usize = 10;
pub const DEFAULT_ROOM_NAME: &str = "LAN Room";
pub const DEFAULT_HOST_NAME: &str = "Player1";
/// Listed as host name if a room somehow has no host
pub const FALLBACK_HOST_NAME: &str = "Host";
/// Ready players needed to start without `forceStart`
pub const MIN_READY_TO_START: usize = 2;

const ROOM_ID_PREFIX: &str = "room-";
const ROOM_ID_RANDOM_DIGITS: u32 = 6;

/// Cut `text` to at most `max` characters
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Clamp a requested capacity into `[MIN_PLAYERS, MAX_PLAYERS]`
pub fn clamp_max_players(requested: i64) -> usize {
    requested.clamp(MIN_PLAYERS as i64, MAX_PLAYERS as i64) as usize
}

/// `PlayerN` for the 0-based seat index
pub fn default_player_name(slot: usize) -> String {
    format!("Player{}", slot + 1)
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    out.into_iter().map(char::from).collect()
}

/// `room-` + six random base-36 digits + the last three base-36 digits of the clock
pub fn generate_room_id() -> RoomId {
    let random = rand::rng().random_range(0..36u64.pow(ROOM_ID_RANDOM_DIGITS));
    let clock = to_base36(chrono::Utc::now().timestamp_millis().unsigned_abs());
    let tail = &clock[clock.len().saturating_sub(3)..];
    format!(
        "{ROOM_ID_PREFIX}{:0>width$}{tail}",
        to_base36(random),
        width = ROOM_ID_RANDOM_DIGITS as usize
    )
}

/// A matchmaking unit
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub status: RoomStatus,
    pub max_players: usize,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    pub last_active: Instant,
    pub players: Vec<Player>,
}

impl Room {
    /// New lobby whose only player is the ready host
    pub fn new(id: RoomId, name: String, max_players: usize, host_peer: PeerId, host_name: String) -> Self {
        Self {
            id,
            name,
            status: RoomStatus::Lobby,
            max_players,
            created_at: chrono::Utc::now().timestamp_millis(),
            last_active: Instant::now(),
            players: vec![Player {
                peer_id: host_peer,
                name: host_name,
                ready: true,
                is_host: true,
            }],
        }
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    /// Listed and joinable
    pub fn is_open(&self) -> bool {
        self.status == RoomStatus::Lobby && !self.is_full()
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        self.players.is_empty() || now.saturating_duration_since(self.last_active) > ttl
    }

    pub fn player_index(&self, peer_id: &str) -> Option<usize> {
        self.players.iter().position(|p| p.peer_id == peer_id)
    }

    pub fn host(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_host)
    }

    pub fn ready_count(&self) -> usize {
        self.players.iter().filter(|p| p.ready).count()
    }

    /// Append a non-host, not-ready player
    pub fn add_player(&mut self, peer_id: PeerId, name: Option<String>) {
        let name = name.unwrap_or_else(|| default_player_name(self.players.len()));
        self.players.push(Player {
            peer_id,
            name,
            ready: false,
            is_host: false,
        });
        self.touch();
    }

    /// Drop `peer_id`'s player and, if the host left, promote the first remaining player.
    /// Returns the promoted peer, if any.
    pub fn remove_player(&mut self, peer_id: &str) -> Option<PeerId> {
        self.players.retain(|p| p.peer_id != peer_id);
        self.touch();
        if self.players.is_empty() || self.host().is_some() {
            return None;
        }
        let first = &mut self.players[0];
        first.is_host = true;
        Some(first.peer_id.clone())
    }

    pub fn state(&self) -> RoomState {
        RoomState {
            room_id: self.id.clone(),
            room_name: self.name.clone(),
            status: self.status,
            max_players: self.max_players,
            players: self.players.clone(),
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.id.clone(),
            room_name: self.name.clone(),
            host_name: self
                .host()
                .map_or_else(|| FALLBACK_HOST_NAME.to_string(), |p| p.name.clone()),
            players: self.players.len(),
            max_players: self.max_players,
            status: self.status,
        }
    }
}

#[cfg(test)]
pub(crate) fn assert_single_host(room: &Room) {
    if room.players.is_empty() {
        return;
    }
    let hosts = room.players.iter().filter(|p| p.is_host).count();
    assert_eq!(hosts, 1, "room {} has {hosts} hosts", room.id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lobby(max: usize) -> Room {
        Room::new(
            "room-test".to_string(),
            DEFAULT_ROOM_NAME.to_string(),
            max,
            "peer-1".to_string(),
            "Alice".to_string(),
        )
    }

    #[test]
    fn test_room_id_shape() {
        for _ in 0..200 {
            let id = generate_room_id();
            let suffix = id.strip_prefix("room-").unwrap();
            assert!(suffix.len() >= 6, "{id}");
            assert!(suffix
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(36u64.pow(6) - 1), "zzzzzz");
    }

    #[test]
    fn test_clamp_and_truncate() {
        assert_eq!(clamp_max_players(0), 2);
        assert_eq!(clamp_max_players(-5), 2);
        assert_eq!(clamp_max_players(4), 4);
        assert_eq!(clamp_max_players(99), 10);
        assert_eq!(truncate_chars("abcdefghijklmnopqrstuvwxyz", MAX_NAME_CHARS), "abcdefghijklmnop");
        // Characters, not bytes
        assert_eq!(truncate_chars("ééééé", 3), "ééé");
    }

    #[test]
    fn test_new_room_has_ready_host() {
        let room = lobby(4);
        assert_eq!(room.status, RoomStatus::Lobby);
        assert_eq!(room.players.len(), 1);
        assert!(room.players[0].ready);
        assert!(room.players[0].is_host);
        assert_single_host(&room);
    }

    #[test]
    fn test_default_names_follow_seat() {
        let mut room = lobby(4);
        room.add_player("peer-2".to_string(), None);
        room.add_player("peer-3".to_string(), Some("Carol".to_string()));
        assert_eq!(room.players[1].name, "Player2");
        assert_eq!(room.players[2].name, "Carol");
        assert!(!room.players[1].ready);
        assert!(!room.players[1].is_host);
        assert_single_host(&room);
    }

    #[test]
    fn test_host_departure_promotes_next_in_join_order() {
        let mut room = lobby(4);
        room.add_player("peer-2".to_string(), None);
        room.add_player("peer-3".to_string(), None);

        assert_eq!(room.remove_player("peer-1"), Some("peer-2".to_string()));
        assert!(room.players[0].is_host);
        assert_single_host(&room);

        // Non-host departure keeps the current host
        assert_eq!(room.remove_player("peer-3"), None);
        assert_eq!(room.host().unwrap().peer_id, "peer-2");

        assert_eq!(room.remove_player("peer-2"), None);
        assert!(room.players.is_empty());
    }

    #[test]
    fn test_open_and_full() {
        let mut room = lobby(2);
        assert!(room.is_open());
        room.add_player("peer-2".to_string(), None);
        assert!(room.is_full());
        assert!(!room.is_open());

        let mut room = lobby(3);
        room.status = RoomStatus::InGame;
        assert!(!room.is_open());
    }

    #[test]
    fn test_summary_host_name() {
        let mut room = lobby(4);
        assert_eq!(room.summary().host_name, "Alice");
        room.players[0].is_host = false;
        assert_eq!(room.summary().host_name, FALLBACK_HOST_NAME);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let room = lobby(4);
        let ttl = Duration::from_secs(300);
        assert!(!room.is_expired(Instant::now(), ttl));
        assert!(!room.is_expired(Instant::now() + ttl, ttl));
        assert!(room.is_expired(Instant::now() + ttl + Duration::from_secs(1), ttl));

        let mut empty = lobby(4);
        empty.players.clear();
        assert!(empty.is_expired(Instant::now(), ttl));
    }
}

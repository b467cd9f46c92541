// ============================
// crates/backend-lib/src/registry.rs
// ============================
//! Shared store of peers, rooms and the peer → room index.
//!
//! All three collections live behind one mutex so every transition of the room/player
//! graph is atomic. Methods lock, mutate, snapshot whatever has to be sent (recipient
//! peers and room state) and return it; callers deliver after the guard is gone, so no
//! network write ever happens while the lock is held. Rooms refer to peers by id only and
//! every lookup goes through the maps.

use crate::error::AppError;
use crate::metrics as keys;
use crate::peer::Peer;
use crate::room::Room;
use ::metrics::{counter, gauge};
use parking_lot::Mutex;
use scorched_common::{events, PeerId, RoomId, RoomState, RoomStateEvent, RoomSummary};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A `room.state` to deliver once the lock is released
#[derive(Debug)]
pub struct RoomBroadcast {
    pub recipients: Vec<Arc<Peer>>,
    pub room: RoomState,
}

impl RoomBroadcast {
    pub async fn deliver(self) {
        let event = RoomStateEvent { room: self.room };
        for peer in &self.recipients {
            peer.send(events::ROOM_STATE, &event, None).await;
        }
    }
}

/// Result of a successful `room.join`
#[derive(Debug)]
pub struct JoinOutcome {
    pub room: RoomState,
    /// Current members, joiner included; empty when the peer was already seated
    pub recipients: Vec<Arc<Peer>>,
    /// State of the room the joiner left to come here
    pub previous: Option<RoomBroadcast>,
}

#[derive(Debug, Default)]
struct RegistryState {
    peers: HashMap<PeerId, Arc<Peer>>,
    rooms: HashMap<RoomId, Room>,
    peer_to_room: HashMap<PeerId, RoomId>,
}

fn live_recipients(peers: &HashMap<PeerId, Arc<Peer>>, room: &Room) -> Vec<Arc<Peer>> {
    room.players
        .iter()
        .filter_map(|player| peers.get(&player.peer_id))
        .filter(|peer| !peer.is_closed())
        .cloned()
        .collect()
}

impl RegistryState {
    /// Take `peer_id` out of its room: host failover, deletion when empty, and the state
    /// broadcast for whoever remains.
    fn detach(&mut self, peer_id: &str) -> Option<RoomBroadcast> {
        let room_id = self.peer_to_room.remove(peer_id)?;
        let room = self.rooms.get_mut(&room_id)?;
        if let Some(promoted) = room.remove_player(peer_id) {
            tracing::info!(room_id = %room_id, peer_id = %promoted, "host promoted");
        }
        if room.players.is_empty() {
            self.rooms.remove(&room_id);
            gauge!(keys::ROOMS_ACTIVE).set(self.rooms.len() as f64);
            tracing::info!(room_id = %room_id, "room closed, last player left");
            return None;
        }
        Some(RoomBroadcast {
            recipients: live_recipients(&self.peers, room),
            room: room.state(),
        })
    }

    fn fresh_room_id(&self) -> RoomId {
        loop {
            let id = crate::room::generate_room_id();
            if !self.rooms.contains_key(&id) {
                return id;
            }
        }
    }
}

/// Access to the caller's seat, valid for the duration of one locked operation
pub struct Membership<'a> {
    room: &'a mut Room,
    index: usize,
    peers: &'a HashMap<PeerId, Arc<Peer>>,
}

impl Membership<'_> {
    pub fn room(&self) -> &Room {
        &*self.room
    }

    pub fn room_mut(&mut self) -> &mut Room {
        &mut *self.room
    }

    /// 0-based seat in join order
    pub fn slot(&self) -> usize {
        self.index
    }

    pub fn player(&self) -> &scorched_common::Player {
        &self.room.players[self.index]
    }

    pub fn player_mut(&mut self) -> &mut scorched_common::Player {
        &mut self.room.players[self.index]
    }

    pub fn recipients(&self) -> Vec<Arc<Peer>> {
        live_recipients(self.peers, &*self.room)
    }

    pub fn recipients_except(&self, peer_id: &str) -> Vec<Arc<Peer>> {
        self.room
            .players
            .iter()
            .filter(|player| player.peer_id != peer_id)
            .filter_map(|player| self.peers.get(&player.peer_id))
            .filter(|peer| !peer.is_closed())
            .cloned()
            .collect()
    }

    /// The peer currently holding the host seat
    pub fn host_peer(&self) -> Option<Arc<Peer>> {
        let host = self.room.host()?;
        self.peers.get(&host.peer_id).cloned()
    }

    pub fn broadcast(&self) -> RoomBroadcast {
        RoomBroadcast {
            recipients: self.recipients(),
            room: self.room.state(),
        }
    }
}

/// The server's entire mutable state
#[derive(Debug)]
pub struct Registry {
    state: Mutex<RegistryState>,
    peer_seq: AtomicU64,
    started_at: std::time::Instant,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            peer_seq: AtomicU64::new(0),
            started_at: std::time::Instant::now(),
        }
    }

    /// Next `peer-<n>` id, starting at 1
    pub fn next_peer_id(&self) -> PeerId {
        let n = self.peer_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("peer-{n}")
    }

    pub fn insert_peer(&self, peer: Arc<Peer>) {
        let mut state = self.state.lock();
        state.peers.insert(peer.id().to_string(), peer);
        gauge!(keys::PEERS_ACTIVE).set(state.peers.len() as f64);
    }

    /// `(rooms, peers)`
    pub fn counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.rooms.len(), state.peers.len())
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn room_of(&self, peer_id: &str) -> Option<RoomId> {
        self.state.lock().peer_to_room.get(peer_id).cloned()
    }

    pub fn room_state(&self, room_id: &str) -> Option<RoomState> {
        self.state.lock().rooms.get(room_id).map(Room::state)
    }

    /// Lobbies with a free seat, oldest first
    pub fn list_open_rooms(&self) -> Vec<RoomSummary> {
        let state = self.state.lock();
        let mut open: Vec<&Room> = state.rooms.values().filter(|room| room.is_open()).collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        open.into_iter().map(Room::summary).collect()
    }

    /// Create a lobby with `owner` as its ready host. If `owner` sat in another room it is
    /// detached from it first; that room's update is returned alongside.
    pub fn create_room(
        &self,
        owner: &str,
        room_name: String,
        host_name: String,
        max_players: usize,
    ) -> (RoomState, Option<RoomBroadcast>) {
        let mut state = self.state.lock();
        let previous = state.detach(owner);

        let room_id = state.fresh_room_id();
        let room = Room::new(room_id.clone(), room_name, max_players, owner.to_string(), host_name);
        let snapshot = room.state();
        state.rooms.insert(room_id.clone(), room);
        state.peer_to_room.insert(owner.to_string(), room_id.clone());

        counter!(keys::ROOM_CREATED).increment(1);
        gauge!(keys::ROOMS_ACTIVE).set(state.rooms.len() as f64);
        tracing::info!(room_id = %room_id, peer_id = %owner, max_players, "room created");
        (snapshot, previous)
    }

    /// Seat `peer_id` in `room_id`
    pub fn join_room(
        &self,
        peer_id: &str,
        room_id: &str,
        player_name: Option<String>,
    ) -> Result<JoinOutcome, AppError> {
        let mut state = self.state.lock();

        let room = state
            .rooms
            .get(room_id)
            .ok_or_else(|| AppError::RoomNotFound(format!("Room {room_id} not found")))?;
        if room.player_index(peer_id).is_some() {
            return Ok(JoinOutcome {
                room: room.state(),
                recipients: Vec::new(),
                previous: None,
            });
        }
        if room.is_full() {
            return Err(AppError::RoomFull {
                room_id: room_id.to_string(),
                current: room.players.len(),
                max: room.max_players,
            });
        }
        if room.status != scorched_common::RoomStatus::Lobby {
            return Err(AppError::Forbidden("Match already started".to_string()));
        }

        let previous = state.detach(peer_id);

        let RegistryState { peers, rooms, peer_to_room } = &mut *state;
        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| AppError::RoomNotFound(format!("Room {room_id} not found")))?;
        room.add_player(peer_id.to_string(), player_name);
        peer_to_room.insert(peer_id.to_string(), room_id.to_string());

        counter!(keys::ROOM_JOINED).increment(1);
        tracing::info!(room_id = %room_id, peer_id = %peer_id, players = room.players.len(), "player joined");
        Ok(JoinOutcome {
            room: room.state(),
            recipients: live_recipients(peers, room),
            previous,
        })
    }

    /// Forget `peer_id` entirely: close it, drop it from the peer map and its room.
    /// Both explicit leaves and disconnects end up here; calling it twice is harmless.
    pub fn remove_peer(&self, peer_id: &str) -> Option<RoomBroadcast> {
        let mut state = self.state.lock();
        if let Some(peer) = state.peers.remove(peer_id) {
            peer.close();
            gauge!(keys::PEERS_ACTIVE).set(state.peers.len() as f64);
        }
        state.detach(peer_id)
    }

    /// Run `f` against the caller's seat, resolving the room through the index right now
    pub fn with_member<T>(
        &self,
        peer_id: &str,
        f: impl FnOnce(Membership<'_>) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut state = self.state.lock();
        let RegistryState { peers, rooms, peer_to_room } = &mut *state;

        let room = peer_to_room
            .get(peer_id)
            .and_then(|room_id| rooms.get_mut(room_id))
            .ok_or_else(|| AppError::RoomNotFound("Room no longer exists".to_string()))?;
        let index = room
            .player_index(peer_id)
            .ok_or_else(|| AppError::Forbidden("Unknown player".to_string()))?;

        f(Membership {
            room,
            index,
            peers: &*peers,
        })
    }

    /// Delete rooms that are empty or idle for longer than `ttl`, with their index entries
    pub fn reap_expired(&self, now: Instant, ttl: Duration) -> Vec<RoomId> {
        let mut state = self.state.lock();
        let expired: Vec<RoomId> = state
            .rooms
            .values()
            .filter(|room| room.is_expired(now, ttl))
            .map(|room| room.id.clone())
            .collect();

        for room_id in &expired {
            if let Some(room) = state.rooms.remove(room_id) {
                for player in &room.players {
                    state.peer_to_room.remove(&player.peer_id);
                }
            }
        }
        if !expired.is_empty() {
            counter!(keys::ROOM_REAPED).increment(expired.len() as u64);
            gauge!(keys::ROOMS_ACTIVE).set(state.rooms.len() as f64);
        }
        expired
    }

    /// Close every live peer; their read loops then run the normal removal path
    pub fn close_all_peers(&self) -> usize {
        let peers: Vec<Arc<Peer>> = self.state.lock().peers.values().cloned().collect();
        peers.iter().filter(|peer| peer.close()).count()
    }
}

// ============================
// crates/backend-lib/src/dispatch.rs
// ============================
//! Routes decoded client envelopes.
//!
//! Every handler follows the same shape: resolve and mutate through the [`Registry`] while it
//! is locked, come back with the recipients and payloads to send, then send once the lock is
//! released. Failures become an `error` envelope for the caller only.

use crate::error::AppError;
use crate::metrics as keys;
use crate::payload::Payload;
use crate::peer::Peer;
use crate::registry::{Registry, RoomBroadcast};
use crate::room::{
    clamp_max_players, default_player_name, truncate_chars, DEFAULT_HOST_NAME, DEFAULT_ROOM_NAME,
    MAX_CHAT_CHARS, MAX_NAME_CHARS, MAX_PLAYERS, MIN_READY_TO_START,
};
use ::metrics::counter;
use scorched_common::{
    events, ChatMessage, ClientEnvelope, ClientMessageType, GameInputRelay, MatchStarted,
    PeerRenamed, RoomEntered, RoomId, RoomListResponse, RoomStatus, ShopDoneRelay, ShopTradeRelay,
};
use serde::Serialize;
use std::sync::Arc;

type HandlerResult = Result<(), AppError>;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

async fn send_all<T: Serialize>(recipients: &[Arc<Peer>], kind: &str, payload: &T) {
    for recipient in recipients {
        recipient.send(kind, payload, None).await;
    }
}

/// Handle one envelope from `peer`
pub async fn dispatch(registry: &Registry, peer: &Peer, envelope: ClientEnvelope) {
    let ClientEnvelope {
        kind,
        payload,
        request_id,
    } = envelope;
    let request_id = request_id.as_deref();
    let payload = Payload::from_value(payload);

    let result = match kind.parse::<ClientMessageType>() {
        Ok(message_type) => route(registry, peer, message_type, payload, request_id).await,
        Err(unknown) => Err(AppError::BadRequest(unknown.to_string())),
    };

    if let Err(err) = result {
        counter!(keys::MESSAGE_REJECTED).increment(1);
        tracing::debug!(peer_id = %peer.id(), kind = %kind, error = %err, "message rejected");
        peer.send_error(&err, request_id).await;
    }
}

async fn route(
    registry: &Registry,
    peer: &Peer,
    message_type: ClientMessageType,
    payload: Payload,
    request_id: Option<&str>,
) -> HandlerResult {
    use ClientMessageType::*;

    match message_type {
        RoomListRequest => {
            let rooms = registry.list_open_rooms();
            peer.send(events::ROOM_LIST_RESPONSE, RoomListResponse { rooms }, request_id)
                .await;
            Ok(())
        },
        RoomCreate => create_room(registry, peer, payload, request_id).await,
        RoomJoin => join_room(registry, peer, payload, request_id).await,
        RoomLeave => {
            if let Some(update) = registry.remove_peer(peer.id()) {
                update.deliver().await;
            }
            Ok(())
        },
        PeerReady => set_ready(registry, peer, payload).await,
        PeerRename => rename(registry, peer, payload).await,
        ChatMsg => chat(registry, peer, payload).await,
        MatchStart => start_match(registry, peer, payload).await,
        GameInput => relay_input(registry, peer, payload).await,
        ShopBuy => relay_trade(registry, peer, events::SHOP_BUY, payload).await,
        ShopSell => relay_trade(registry, peer, events::SHOP_SELL, payload).await,
        ShopDone => relay_shop_done(registry, peer, payload).await,
        GameSnapshot => relay_snapshot(registry, peer, payload).await,
    }
}

async fn create_room(
    registry: &Registry,
    peer: &Peer,
    payload: Payload,
    request_id: Option<&str>,
) -> HandlerResult {
    let room_name = payload.string_or("roomName", DEFAULT_ROOM_NAME);
    let host_name = truncate_chars(&payload.string_or("hostName", DEFAULT_HOST_NAME), MAX_NAME_CHARS);
    let max_players = clamp_max_players(payload.int_or("maxPlayers", MAX_PLAYERS as i64));

    let (room, previous) = registry.create_room(peer.id(), room_name, host_name, max_players);
    if let Some(update) = previous {
        update.deliver().await;
    }

    let created = RoomEntered {
        self_peer_id: peer.id().to_string(),
        room,
    };
    peer.send(events::ROOM_CREATED, created, request_id).await;
    Ok(())
}

async fn join_room(
    registry: &Registry,
    peer: &Peer,
    payload: Payload,
    request_id: Option<&str>,
) -> HandlerResult {
    let room_id = payload.string("roomId").unwrap_or_default();
    let player_name = payload
        .string("playerName")
        .map(|name| truncate_chars(&name, MAX_NAME_CHARS));

    let outcome = registry.join_room(peer.id(), &room_id, player_name)?;
    if let Some(update) = outcome.previous {
        update.deliver().await;
    }

    let joined = RoomEntered {
        self_peer_id: peer.id().to_string(),
        room: outcome.room.clone(),
    };
    peer.send(events::ROOM_JOINED, joined, request_id).await;

    RoomBroadcast {
        recipients: outcome.recipients,
        room: outcome.room,
    }
    .deliver()
    .await;
    Ok(())
}

async fn set_ready(registry: &Registry, peer: &Peer, payload: Payload) -> HandlerResult {
    let ready = payload.flag("ready");
    let update = registry.with_member(peer.id(), |mut seat| {
        seat.player_mut().ready = ready;
        seat.room_mut().touch();
        Ok(seat.broadcast())
    })?;
    update.deliver().await;
    Ok(())
}

async fn rename(registry: &Registry, peer: &Peer, payload: Payload) -> HandlerResult {
    let requested = payload
        .string("name")
        .map(|name| truncate_chars(&name, MAX_NAME_CHARS));

    let (renamed, update) = registry.with_member(peer.id(), |mut seat| {
        let name = requested.unwrap_or_else(|| default_player_name(seat.slot()));
        seat.player_mut().name = name.clone();
        seat.room_mut().touch();
        let renamed = PeerRenamed {
            peer_id: peer.id().to_string(),
            room_id: seat.room().id.clone(),
            name,
        };
        Ok((renamed, seat.broadcast()))
    })?;

    send_all(&update.recipients, events::PEER_RENAME, &renamed).await;
    update.deliver().await;
    Ok(())
}

async fn chat(registry: &Registry, peer: &Peer, payload: Payload) -> HandlerResult {
    let text = payload
        .string("text")
        .map(|text| truncate_chars(&text, MAX_CHAT_CHARS));

    let outgoing = registry.with_member(peer.id(), |mut seat| {
        // Blank messages are dropped without a reply
        let Some(text) = text else {
            return Ok(None);
        };
        seat.room_mut().touch();
        let message = ChatMessage {
            room_id: seat.room().id.clone(),
            peer_id: peer.id().to_string(),
            name: seat.player().name.clone(),
            text,
            at: now_millis(),
        };
        Ok(Some((message, seat.recipients())))
    })?;

    if let Some((message, recipients)) = outgoing {
        send_all(&recipients, events::CHAT_MSG, &message).await;
    }
    Ok(())
}

async fn start_match(registry: &Registry, peer: &Peer, payload: Payload) -> HandlerResult {
    let force_start = payload.flag("forceStart");

    let (started, update) = registry.with_member(peer.id(), |mut seat| {
        if !seat.player().is_host {
            return Err(AppError::Forbidden("Only host can start match".to_string()));
        }
        if !force_start && seat.room().ready_count() < MIN_READY_TO_START {
            return Err(AppError::BadRequest("Need at least 2 ready players".to_string()));
        }
        let room = seat.room_mut();
        room.status = RoomStatus::InGame;
        room.touch();
        let started = MatchStarted {
            room_id: room.id.clone(),
            started_at: now_millis(),
        };
        Ok((started, seat.broadcast()))
    })?;

    counter!(keys::MATCH_STARTED).increment(1);
    tracing::info!(
        room_id = %started.room_id,
        players = update.room.players.len(),
        force_start,
        "match started"
    );
    send_all(&update.recipients, events::MATCH_START, &started).await;
    update.deliver().await;
    Ok(())
}

/// The host a guest's actions are forwarded to, with the room they share
fn host_of(registry: &Registry, peer: &Peer) -> Result<(Arc<Peer>, RoomId), AppError> {
    let (host, room_id) = registry.with_member(peer.id(), |seat| {
        if seat.player().is_host {
            return Err(AppError::Forbidden(
                "Host should apply actions locally".to_string(),
            ));
        }
        Ok((seat.host_peer(), seat.room().id.clone()))
    })?;
    let host = host.ok_or_else(|| AppError::RoomNotFound("Host unavailable".to_string()))?;
    Ok((host, room_id))
}

async fn relay_input(registry: &Registry, peer: &Peer, payload: Payload) -> HandlerResult {
    let (host, _) = host_of(registry, peer)?;
    let relay = GameInputRelay {
        peer_id: peer.id().to_string(),
        data: payload.into_value(),
    };
    host.send(events::GAME_INPUT, relay, None).await;
    counter!(keys::RELAY_FORWARDED).increment(1);
    Ok(())
}

/// `shop.buy` and `shop.sell` share one shape and differ only in the event name
async fn relay_trade(
    registry: &Registry,
    peer: &Peer,
    kind: &str,
    payload: Payload,
) -> HandlerResult {
    let (host, room_id) = host_of(registry, peer)?;
    let relay = ShopTradeRelay {
        peer_id: peer.id().to_string(),
        room_id,
        weapon_id: payload.string("weaponId").unwrap_or_default(),
    };
    host.send(kind, relay, None).await;
    counter!(keys::RELAY_FORWARDED).increment(1);
    Ok(())
}

async fn relay_shop_done(registry: &Registry, peer: &Peer, payload: Payload) -> HandlerResult {
    let (host, room_id) = host_of(registry, peer)?;
    let relay = ShopDoneRelay {
        peer_id: peer.id().to_string(),
        room_id,
        done: payload.flag("done"),
    };
    host.send(events::SHOP_DONE, relay, None).await;
    counter!(keys::RELAY_FORWARDED).increment(1);
    Ok(())
}

/// Fan the host's authoritative snapshot out to everyone else in the room
async fn relay_snapshot(registry: &Registry, peer: &Peer, payload: Payload) -> HandlerResult {
    let recipients = registry.with_member(peer.id(), |mut seat| {
        if !seat.player().is_host {
            return Err(AppError::Forbidden("Only host can send snapshots".to_string()));
        }
        seat.room_mut().touch();
        Ok(seat.recipients_except(peer.id()))
    })?;

    let snapshot = payload.into_value();
    send_all(&recipients, events::GAME_SNAPSHOT, &snapshot).await;
    counter!(keys::RELAY_FORWARDED).increment(recipients.len() as u64);
    Ok(())
}

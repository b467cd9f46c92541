// ============================
// crates/backend-lib/src/connection.rs
// ============================
//! Per-connection read loop.
//!
//! Runs after the upgrade on whatever stream hyper handed over. Frames are processed one
//! at a time, so a peer's own requests are handled in the order it sent them.

use crate::dispatch::dispatch;
use crate::error::AppError;
use crate::frame::{self, OpCode};
use crate::metrics as keys;
use crate::peer::Peer;
use crate::registry::Registry;
use ::metrics::counter;
use scorched_common::ClientEnvelope;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Register a peer for `io`, serve its frames until it goes away, then clean up after it
pub async fn serve_connection<IO>(registry: Arc<Registry>, io: IO)
where
    IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (reader, writer) = tokio::io::split(io);
    let mut reader = BufReader::new(reader);

    let (peer, writer_task) = Peer::spawn(registry.next_peer_id(), writer);
    registry.insert_peer(Arc::clone(&peer));
    counter!(keys::WS_CONNECTION).increment(1);
    tracing::info!(peer_id = %peer.id(), "peer connected");

    loop {
        let frame = tokio::select! {
            _ = peer.closed() => break,
            frame = frame::read_frame(&mut reader) => frame,
        };

        match frame {
            Ok(frame) => match frame.opcode {
                OpCode::Close => break,
                OpCode::Ping => peer.send_pong().await,
                OpCode::Text => handle_text(&registry, &peer, &frame.payload).await,
                _ => {},
            },
            Err(err) if err.is_expected_disconnect() => {
                tracing::debug!(peer_id = %peer.id(), error = %err, "peer disconnected");
                break;
            },
            Err(err) => {
                tracing::warn!(peer_id = %peer.id(), error = %err, "read failed, dropping peer");
                break;
            },
        }
    }

    if let Some(update) = registry.remove_peer(peer.id()) {
        update.deliver().await;
    }
    peer.close();
    if let Err(err) = writer_task.await {
        tracing::error!(peer_id = %peer.id(), error = %err, "writer task failed");
    }
    tracing::info!(peer_id = %peer.id(), "peer removed");
}

async fn handle_text(registry: &Registry, peer: &Peer, payload: &[u8]) {
    match serde_json::from_slice::<ClientEnvelope>(payload) {
        Ok(envelope) => dispatch(registry, peer, envelope).await,
        Err(err) => {
            tracing::debug!(peer_id = %peer.id(), error = %err, "unparseable envelope");
            let err = AppError::BadRequest("Invalid JSON payload".to_string());
            peer.send_error(&err, None).await;
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{encode_masked_frame, read_frame};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;

    const MASK: [u8; 4] = [0x12, 0x34, 0x56, 0x78];

    fn start(registry: &Arc<Registry>) -> (DuplexStream, JoinHandle<()>) {
        let (client, server) = duplex(1 << 16);
        let task = tokio::spawn(serve_connection(Arc::clone(registry), server));
        (client, task)
    }

    async fn send_json(client: &mut DuplexStream, value: Value) {
        let bytes = serde_json::to_vec(&value).unwrap();
        client
            .write_all(&encode_masked_frame(OpCode::Text, &bytes, MASK))
            .await
            .unwrap();
    }

    async fn recv_json(client: &mut DuplexStream) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(2), read_frame(client))
            .await
            .expect("timed out")
            .unwrap();
        assert_eq!(frame.opcode, OpCode::Text);
        serde_json::from_slice(&frame.payload).unwrap()
    }

    #[tokio::test]
    async fn test_ping_gets_empty_pong() {
        let registry = Arc::new(Registry::new());
        let (mut client, _task) = start(&registry);

        client
            .write_all(&encode_masked_frame(OpCode::Ping, b"hi", MASK))
            .await
            .unwrap();
        let frame = read_frame(&mut client).await.unwrap();
        assert_eq!(frame.opcode, OpCode::Pong);
        assert!(frame.payload.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_json_keeps_connection_open() {
        let registry = Arc::new(Registry::new());
        let (mut client, _task) = start(&registry);

        client
            .write_all(&encode_masked_frame(OpCode::Text, b"{not json", MASK))
            .await
            .unwrap();
        let err = recv_json(&mut client).await;
        assert_eq!(err["type"], "error");
        assert_eq!(err["payload"]["code"], "bad_request");
        assert_eq!(err["payload"]["message"], "Invalid JSON payload");
        assert!(err.get("requestId").is_none());

        // Reserved and binary opcodes are ignored, the next request still works
        client
            .write_all(&encode_masked_frame(OpCode::Binary, &[1, 2, 3], MASK))
            .await
            .unwrap();
        send_json(&mut client, json!({"type": "room.list.request", "requestId": "after"})).await;
        let list = recv_json(&mut client).await;
        assert_eq!(list["type"], "room.list.response");
        assert_eq!(list["requestId"], "after");
    }

    #[tokio::test]
    async fn test_close_frame_removes_peer_and_room() {
        let registry = Arc::new(Registry::new());
        let (mut client, task) = start(&registry);

        send_json(&mut client, json!({"type": "room.create"})).await;
        recv_json(&mut client).await;
        assert_eq!(registry.counts(), (1, 1));

        client
            .write_all(&encode_masked_frame(OpCode::Close, &[], MASK))
            .await
            .unwrap();
        task.await.unwrap();
        assert_eq!(registry.counts(), (0, 0));
    }

    #[tokio::test]
    async fn test_abrupt_disconnect_promotes_remaining_player() {
        let registry = Arc::new(Registry::new());
        let (mut host, host_task) = start(&registry);
        let (mut guest, _guest_task) = start(&registry);

        send_json(&mut host, json!({"type": "room.create"})).await;
        let created = recv_json(&mut host).await;
        let room_id = created["payload"]["room"]["roomId"].clone();

        send_json(&mut guest, json!({"type": "room.join", "payload": {"roomId": room_id}})).await;
        assert_eq!(recv_json(&mut guest).await["type"], "room.joined");
        assert_eq!(recv_json(&mut guest).await["type"], "room.state");
        assert_eq!(recv_json(&mut host).await["type"], "room.state");

        drop(host);
        host_task.await.unwrap();

        let state = recv_json(&mut guest).await;
        assert_eq!(state["type"], "room.state");
        let players = state["payload"]["room"]["players"].as_array().unwrap().clone();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0]["isHost"], true);
        assert_eq!(registry.counts(), (1, 1));
    }

    #[tokio::test]
    async fn test_leave_closes_connection() {
        let registry = Arc::new(Registry::new());
        let (mut client, task) = start(&registry);

        send_json(&mut client, json!({"type": "room.create"})).await;
        recv_json(&mut client).await;
        send_json(&mut client, json!({"type": "room.leave"})).await;

        task.await.unwrap();
        assert_eq!(registry.counts(), (0, 0));
        let err = read_frame(&mut client).await.unwrap_err();
        assert!(err.is_expected_disconnect());
    }

    #[tokio::test]
    async fn test_reply_before_leave_in_same_burst_is_delivered() {
        let registry = Arc::new(Registry::new());
        let (mut client, task) = start(&registry);

        let list = serde_json::to_vec(&json!({"type": "room.list.request", "requestId": "a"})).unwrap();
        let leave = serde_json::to_vec(&json!({"type": "room.leave"})).unwrap();
        let mut burst = encode_masked_frame(OpCode::Text, &list, MASK);
        burst.extend(encode_masked_frame(OpCode::Text, &leave, MASK));
        client.write_all(&burst).await.unwrap();

        task.await.unwrap();
        let reply = recv_json(&mut client).await;
        assert_eq!(reply["type"], "room.list.response");
        assert_eq!(reply["requestId"], "a");
        assert!(read_frame(&mut client).await.unwrap_err().is_expected_disconnect());
    }

    #[tokio::test]
    async fn test_oversized_frame_drops_connection() {
        let registry = Arc::new(Registry::new());
        let (mut client, task) = start(&registry);

        let mut header = vec![0x81, 0x80 | 127];
        header.extend_from_slice(&(u64::MAX / 2).to_be_bytes());
        client.write_all(&header).await.unwrap();

        task.await.unwrap();
        assert_eq!(registry.counts(), (0, 0));
    }
}

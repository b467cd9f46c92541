// ============================
// crates/backend-lib/src/reaper.rs
// ============================
//! Periodic sweep of empty and idle rooms.

use crate::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Every `every`, delete rooms idle for longer than `ttl`. Stops when `shutdown` fires.
pub fn spawn_reaper(
    registry: Arc<Registry>,
    every: Duration,
    ttl: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let reaped = registry.reap_expired(Instant::now(), ttl);
                    if !reaped.is_empty() {
                        tracing::info!(count = reaped.len(), rooms = ?reaped, "reaped idle rooms");
                    }
                },
            }
        }
        tracing::debug!("reaper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::Peer;

    const EVERY: Duration = Duration::from_secs(30);
    const TTL: Duration = Duration::from_secs(300);

    #[tokio::test(start_paused = true)]
    async fn test_idle_room_disappears_after_ttl_and_a_tick() {
        let registry = Arc::new(Registry::new());
        let (peer, _writer) = Peer::spawn(registry.next_peer_id(), tokio::io::sink());
        registry.insert_peer(Arc::clone(&peer));
        let (room, _) = registry.create_room(peer.id(), "LAN Room".into(), "Host".into(), 4);

        let shutdown = CancellationToken::new();
        let reaper = spawn_reaper(Arc::clone(&registry), EVERY, TTL, shutdown.clone());

        // Exactly at the TTL the room is still listed
        time::sleep(TTL).await;
        assert_eq!(registry.list_open_rooms().len(), 1);

        time::sleep(EVERY + Duration::from_secs(1)).await;
        assert!(registry.room_state(&room.room_id).is_none());
        assert!(registry.list_open_rooms().is_empty());
        assert_eq!(registry.room_of(peer.id()), None);

        shutdown.cancel();
        reaper.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_keeps_room_alive() {
        let registry = Arc::new(Registry::new());
        let (peer, _writer) = Peer::spawn(registry.next_peer_id(), tokio::io::sink());
        registry.insert_peer(Arc::clone(&peer));
        registry.create_room(peer.id(), "LAN Room".into(), "Host".into(), 4);

        let shutdown = CancellationToken::new();
        let reaper = spawn_reaper(Arc::clone(&registry), EVERY, TTL, shutdown.clone());

        for _ in 0..20 {
            time::sleep(Duration::from_secs(60)).await;
            registry
                .with_member(peer.id(), |mut seat| {
                    seat.room_mut().touch();
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(registry.counts().0, 1);

        shutdown.cancel();
        reaper.await.unwrap();
    }
}

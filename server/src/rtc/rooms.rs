//! Room Registry
//!
//! In-memory registry of voice channel rooms. A room is the set of peers
//! currently joined to one channel, each holding a bounded outbound queue.
//! Rooms are created lazily on the first registration and removed eagerly
//! when the last participant leaves.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tracing::warn;

use super::types::{Envelope, Participant, ParticipantSummary};

/// Outbound queue capacity per participant.
pub const SEND_QUEUE_CAPACITY: usize = 64;

/// A registered peer: its identity plus the handle used to enqueue envelopes
/// toward its socket.
#[derive(Clone)]
pub struct PeerHandle {
    /// The peer's identity within its room.
    pub participant: Participant,
    sender: mpsc::Sender<Envelope>,
}

impl PeerHandle {
    /// Bind a participant to its outbound queue.
    #[must_use]
    pub fn new(participant: Participant, sender: mpsc::Sender<Envelope>) -> Self {
        Self {
            participant,
            sender,
        }
    }

    /// Enqueue an envelope without blocking.
    ///
    /// A full queue drops the envelope: a slow consumer must never stall the
    /// senders, and signaling clients renegotiate over lost frames.
    pub fn enqueue(&self, envelope: Envelope) {
        match self.sender.try_send(envelope) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                warn!(
                    participant_id = %self.participant.participant_id,
                    event_type = %envelope.event_type,
                    "dropping signaling message due to full send queue"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Peer is tearing down; nothing to deliver to.
            }
        }
    }
}

/// Registry of all active rooms, keyed by channel id.
///
/// Register/unregister take the write lock; broadcast and targeted sends
/// iterate under the read lock. Enqueueing is non-blocking, so holding the
/// read lock across a fan-out is bounded. No socket I/O happens under either
/// lock.
#[derive(Default)]
pub struct RoomHub {
    rooms: RwLock<HashMap<String, HashMap<String, PeerHandle>>>,
}

impl RoomHub {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a peer into its channel's room and return summaries of the
    /// peers that were present before it.
    ///
    /// Snapshot and insert happen under one write-lock acquisition, so the
    /// returned list is exactly the set of peers that preceded the join.
    pub async fn register(&self, peer: PeerHandle) -> Vec<ParticipantSummary> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(peer.participant.channel_id.clone())
            .or_default();
        let existing = room
            .values()
            .map(|member| member.participant.summary())
            .collect();
        room.insert(peer.participant.participant_id.clone(), peer);
        existing
    }

    /// Remove a peer from its room, deleting the room once empty.
    pub async fn unregister(&self, channel_id: &str, participant_id: &str) {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get_mut(channel_id) {
            room.remove(participant_id);
            if room.is_empty() {
                rooms.remove(channel_id);
            }
        }
    }

    /// Enqueue an envelope to every member of a room, optionally skipping one
    /// participant.
    pub async fn broadcast(
        &self,
        channel_id: &str,
        envelope: &Envelope,
        except_participant_id: Option<&str>,
    ) {
        let rooms = self.rooms.read().await;
        let Some(room) = rooms.get(channel_id) else {
            return;
        };
        for (participant_id, peer) in room {
            if except_participant_id == Some(participant_id.as_str()) {
                continue;
            }
            peer.enqueue(envelope.clone());
        }
    }

    /// Enqueue an envelope to a single room member. Returns `false` when no
    /// such participant exists in the room.
    pub async fn send_to_participant(
        &self,
        channel_id: &str,
        participant_id: &str,
        envelope: &Envelope,
    ) -> bool {
        let rooms = self.rooms.read().await;
        let Some(peer) = rooms
            .get(channel_id)
            .and_then(|room| room.get(participant_id))
        else {
            return false;
        };
        peer.enqueue(envelope.clone());
        true
    }

    /// Number of participants currently in a room.
    pub async fn participant_count(&self, channel_id: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(channel_id)
            .map_or(0, HashMap::len)
    }

    /// Number of active rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtc::types::Permissions;
    use chrono::Utc;
    use serde_json::json;

    fn handle(channel_id: &str, participant_id: &str) -> (PeerHandle, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let participant = Participant {
            participant_id: participant_id.to_string(),
            channel_id: channel_id.to_string(),
            user_uid: format!("uid_{participant_id}"),
            device_id: format!("dev_{participant_id}"),
            permissions: Permissions::all(),
            joined_at: Utc::now(),
        };
        (PeerHandle::new(participant, tx), rx)
    }

    #[tokio::test]
    async fn register_snapshots_preceding_peers() {
        let hub = RoomHub::new();
        let (first, _rx_first) = handle("vc_general", "p_1");
        let (second, _rx_second) = handle("vc_general", "p_2");

        assert!(hub.register(first).await.is_empty());

        let existing = hub.register(second).await;
        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].participant_id, "p_1");
        assert_eq!(hub.participant_count("vc_general").await, 2);
    }

    #[tokio::test]
    async fn empty_rooms_are_removed() {
        let hub = RoomHub::new();
        let (peer, _rx) = handle("vc_general", "p_1");
        hub.register(peer).await;
        assert_eq!(hub.room_count().await, 1);

        hub.unregister("vc_general", "p_1").await;
        assert_eq!(hub.room_count().await, 0);
        assert_eq!(hub.participant_count("vc_general").await, 0);
    }

    #[tokio::test]
    async fn broadcast_skips_excluded_participant() {
        let hub = RoomHub::new();
        let (sender, mut rx_sender) = handle("vc_general", "p_1");
        let (receiver, mut rx_receiver) = handle("vc_general", "p_2");
        hub.register(sender).await;
        hub.register(receiver).await;

        let envelope = Envelope::new("rtc.media.state", "vc_general", "", json!({}));
        hub.broadcast("vc_general", &envelope, Some("p_1")).await;

        assert!(rx_sender.try_recv().is_err());
        assert_eq!(rx_receiver.try_recv().unwrap().event_type, "rtc.media.state");
    }

    #[tokio::test]
    async fn send_to_unknown_participant_reports_miss() {
        let hub = RoomHub::new();
        let (peer, _rx) = handle("vc_general", "p_1");
        hub.register(peer).await;

        let envelope = Envelope::new("rtc.offer.publish", "vc_general", "", json!({}));
        assert!(!hub.send_to_participant("vc_general", "p_404", &envelope).await);
        assert!(!hub.send_to_participant("vc_other", "p_1", &envelope).await);
        assert!(hub.send_to_participant("vc_general", "p_1", &envelope).await);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let hub = RoomHub::new();
        let (peer, mut rx) = handle("vc_general", "p_1");
        hub.register(peer).await;

        let envelope = Envelope::new("rtc.media.state", "vc_general", "", json!({}));
        for _ in 0..SEND_QUEUE_CAPACITY + 10 {
            hub.broadcast("vc_general", &envelope, None).await;
        }

        let mut delivered = 0;
        while rx.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(delivered, SEND_QUEUE_CAPACITY);
    }
}

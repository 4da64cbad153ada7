//! Voice Signaling Service
//!
//! Accepts WebSocket connections, authenticates the first inbound frame
//! against the ticket authority, registers the peer into its channel room and
//! from then on routes typed envelopes between peers with per-stream-kind
//! permission enforcement.
//!
//! Each connection runs a read loop plus a spawned write pump, joined by a
//! bounded queue. Peers enqueue into each other's queues without blocking, so
//! one stalled consumer can never hold up the rest of the room.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use chrono::{SecondsFormat, Utc};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::rooms::{PeerHandle, RoomHub, SEND_QUEUE_CAPACITY};
use super::ticket::TicketAuthority;
use super::types::{Envelope, Participant, TicketClaims};
use crate::api::AppState;

/// How long a fresh connection may take to present its `rtc.join` frame.
const JOIN_WAIT: Duration = Duration::from_secs(12);
/// Steady-state read deadline, re-armed on every inbound frame.
const READ_DEADLINE: Duration = Duration::from_secs(40);
/// Outbound ping cadence.
const PING_INTERVAL: Duration = Duration::from_secs(20);
/// Per-frame write deadline.
const WRITE_DEADLINE: Duration = Duration::from_secs(10);
/// Largest accepted inbound message.
const MAX_MESSAGE_BYTES: usize = 1 << 20;
/// Socket write buffer size.
const SOCKET_BUFFER_BYTES: usize = 4096;

/// What the read loop should do after dispatching an envelope.
#[derive(Debug)]
enum LoopAction {
    Continue,
    Close,
}

/// A failed join handshake, reported to the peer before closing.
struct JoinDenied {
    request_id: String,
    message: String,
}

impl JoinDenied {
    fn new(request_id: &str, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.to_string(),
            message: message.into(),
        }
    }

    fn into_envelope(self) -> Envelope {
        Envelope::new(
            "rtc.error",
            "",
            &self.request_id,
            json!({
                "code": "rtc_join_denied",
                "message": self.message,
                "retryable": false,
            }),
        )
    }
}

/// Routes signaling envelopes between the participants of voice channel rooms.
pub struct SignalingService {
    tickets: Arc<TicketAuthority>,
    rooms: RoomHub,
}

impl SignalingService {
    /// Create a service consuming tickets from the given authority.
    #[must_use]
    pub fn new(tickets: Arc<TicketAuthority>) -> Self {
        Self {
            tickets,
            rooms: RoomHub::new(),
        }
    }

    /// Drive one WebSocket connection from upgrade to teardown.
    pub async fn serve(self: Arc<Self>, socket: WebSocket) {
        let (sink, mut stream) = socket.split();
        let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let mut writer = tokio::spawn(write_pump(sink, rx));

        let participant_id = Uuid::new_v4().to_string();

        let (claims, join_request_id) = match self.authenticate(&mut stream).await {
            Ok(authenticated) => authenticated,
            Err(denied) => {
                warn!(%participant_id, reason = %denied.message, "signaling join denied");
                let _ = tx.try_send(denied.into_envelope());
                drop(tx);
                let _ = writer.await;
                return;
            }
        };

        let peer = self
            .register_participant(&participant_id, claims, &join_request_id, &tx)
            .await;

        let writer_done = tokio::select! {
            () = self.read_loop(&mut stream, &peer) => false,
            // Write pump death (deadline or socket error) tears the session down.
            _ = &mut writer => true,
        };

        // Close-once: every teardown cause funnels into this single path.
        self.close_participant(&peer).await;
        drop(tx);
        if !writer_done {
            let _ = writer.await;
        }
    }

    /// Read exactly one envelope within the join window and consume its ticket.
    async fn authenticate(
        &self,
        stream: &mut SplitStream<WebSocket>,
    ) -> Result<(TicketClaims, String), JoinDenied> {
        let first = match timeout(JOIN_WAIT, next_text_frame(stream)).await {
            Ok(Some(text)) => text,
            Ok(None) => return Err(JoinDenied::new("", "connection closed before rtc.join")),
            Err(_) => return Err(JoinDenied::new("", "timed out waiting for rtc.join")),
        };

        let envelope: Envelope = match serde_json::from_str(&first) {
            Ok(envelope) => envelope,
            Err(_) => return Err(JoinDenied::new("", "invalid signaling envelope")),
        };
        if envelope.event_type != "rtc.join" {
            return Err(JoinDenied::new(
                &envelope.request_id,
                "first signaling message must be rtc.join",
            ));
        }

        let ticket = envelope.payload_str("ticket").to_string();
        match self.tickets.parse_and_consume(&ticket) {
            Ok(claims) => Ok((claims, envelope.request_id)),
            Err(error) => Err(JoinDenied::new(&envelope.request_id, error.to_string())),
        }
    }

    /// Insert the authenticated participant into its room, acknowledge the
    /// join and announce it to the rest of the room.
    ///
    /// The self-acknowledgement is enqueued before the broadcast, so the
    /// joining peer always sees its own `rtc.joined` before anyone reacts to
    /// `rtc.participant.joined`.
    async fn register_participant(
        &self,
        participant_id: &str,
        claims: TicketClaims,
        join_request_id: &str,
        sender: &mpsc::Sender<Envelope>,
    ) -> PeerHandle {
        let participant = Participant {
            participant_id: participant_id.to_string(),
            channel_id: claims.channel_id,
            user_uid: claims.user_uid,
            device_id: claims.device_id,
            permissions: claims.permissions,
            joined_at: Utc::now(),
        };
        let peer = PeerHandle::new(participant, sender.clone());
        let existing = self.rooms.register(peer.clone()).await;

        let channel_id = peer.participant.channel_id.clone();
        peer.enqueue(Envelope::new(
            "rtc.joined",
            &channel_id,
            join_request_id,
            json!({
                "participant_id": peer.participant.participant_id,
                "channel_id": channel_id,
                "participants": existing,
                "joined_at": peer.participant.joined_at,
            }),
        ));

        self.rooms
            .broadcast(
                &channel_id,
                &Envelope::new(
                    "rtc.participant.joined",
                    &channel_id,
                    "",
                    json!({"participant": peer.participant.summary()}),
                ),
                Some(&peer.participant.participant_id),
            )
            .await;

        info!(
            participant_id = %peer.participant.participant_id,
            channel_id = %channel_id,
            user_uid = %peer.participant.user_uid,
            "participant joined voice channel"
        );

        peer
    }

    /// Pump inbound frames until the peer leaves, errs out or goes quiet.
    async fn read_loop(&self, stream: &mut SplitStream<WebSocket>, peer: &PeerHandle) {
        loop {
            let frame = match timeout(READ_DEADLINE, stream.next()).await {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(error))) => {
                    debug!(
                        participant_id = %peer.participant.participant_id,
                        %error,
                        "signaling read loop ended"
                    );
                    return;
                }
                Ok(None) => return,
                Err(_) => {
                    debug!(
                        participant_id = %peer.participant.participant_id,
                        "signaling read deadline exceeded"
                    );
                    return;
                }
            };

            // Each turn of the loop re-arms the deadline, so any inbound
            // frame, pongs included, keeps the connection alive.
            match frame {
                Message::Text(text) => {
                    let envelope: Envelope = match serde_json::from_str(&text) {
                        Ok(envelope) => envelope,
                        Err(error) => {
                            debug!(
                                participant_id = %peer.participant.participant_id,
                                %error,
                                "closing on malformed signaling frame"
                            );
                            return;
                        }
                    };
                    if let LoopAction::Close = self.dispatch(peer, envelope).await {
                        return;
                    }
                }
                Message::Close(_) => return,
                // The transport answers pings on its own.
                Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
            }
        }
    }

    /// Route one post-join envelope.
    async fn dispatch(&self, peer: &PeerHandle, envelope: Envelope) -> LoopAction {
        match envelope.event_type.as_str() {
            "rtc.ping" => {
                peer.enqueue(Envelope::new(
                    "rtc.pong",
                    &peer.participant.channel_id,
                    &envelope.request_id,
                    json!({"ts": Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)}),
                ));
                LoopAction::Continue
            }
            "rtc.leave" => LoopAction::Close,
            "rtc.media.state" => {
                self.relay_media_state(peer, &envelope).await;
                LoopAction::Continue
            }
            "rtc.offer.publish"
            | "rtc.offer.subscribe"
            | "rtc.answer.publish"
            | "rtc.answer.subscribe"
            | "rtc.ice.candidate" => {
                self.forward_signal(peer, &envelope).await;
                LoopAction::Continue
            }
            _ => {
                self.send_error(
                    peer,
                    &envelope.request_id,
                    "rtc_unknown_event",
                    "unsupported signaling event type",
                    false,
                );
                LoopAction::Continue
            }
        }
    }

    /// Relay a media state update to the whole room, sender included.
    ///
    /// The stream kind decides which permission gates the update: camera and
    /// screen kinds map to their dedicated grants, any `audio*` kind requires
    /// speak, an empty kind is a presence-only update and other kinds are
    /// app-defined and pass through.
    async fn relay_media_state(&self, peer: &PeerHandle, envelope: &Envelope) {
        let permissions = peer.participant.permissions;
        let denied = match envelope.payload_str("stream_kind") {
            "" => None,
            "video_camera" if !permissions.video => {
                Some("participant is not allowed to publish camera video")
            }
            "video_screen" if !permissions.screenshare => {
                Some("participant is not allowed to publish screen share")
            }
            kind if kind.starts_with("audio") && !permissions.speak => {
                Some("participant is not allowed to publish audio")
            }
            _ => None,
        };
        if let Some(message) = denied {
            self.send_error(peer, &envelope.request_id, "rtc_media_denied", message, false);
            return;
        }

        let mut payload = envelope.payload_object();
        payload.insert(
            "participant_id".into(),
            Value::String(peer.participant.participant_id.clone()),
        );
        payload.insert(
            "user_uid".into(),
            Value::String(peer.participant.user_uid.clone()),
        );

        self.rooms
            .broadcast(
                &peer.participant.channel_id,
                &Envelope::new(
                    "rtc.media.state",
                    &peer.participant.channel_id,
                    &envelope.request_id,
                    Value::Object(payload),
                ),
                None,
            )
            .await;
    }

    /// Forward an offer/answer/ICE envelope, either to a single target or to
    /// everyone else in the room. The payload stays opaque apart from the
    /// injected sender id.
    async fn forward_signal(&self, peer: &PeerHandle, envelope: &Envelope) {
        let target = envelope.payload_str("target_participant_id").to_string();

        let mut payload = envelope.payload_object();
        payload.insert(
            "from_participant_id".into(),
            Value::String(peer.participant.participant_id.clone()),
        );
        let forward = Envelope::new(
            &envelope.event_type,
            &peer.participant.channel_id,
            &envelope.request_id,
            Value::Object(payload),
        );

        if !target.is_empty() {
            let delivered = self
                .rooms
                .send_to_participant(&peer.participant.channel_id, &target, &forward)
                .await;
            if !delivered {
                self.send_error(
                    peer,
                    &envelope.request_id,
                    "rtc_target_not_found",
                    "target participant is not available",
                    true,
                );
            }
            return;
        }

        self.rooms
            .broadcast(
                &peer.participant.channel_id,
                &forward,
                Some(&peer.participant.participant_id),
            )
            .await;
    }

    /// Report an error to the sending peer only.
    fn send_error(
        &self,
        peer: &PeerHandle,
        request_id: &str,
        code: &str,
        message: &str,
        retryable: bool,
    ) {
        peer.enqueue(Envelope::new(
            "rtc.error",
            &peer.participant.channel_id,
            request_id,
            json!({
                "code": code,
                "message": message,
                "retryable": retryable,
            }),
        ));
    }

    /// Remove the participant from its room and tell the remaining members.
    ///
    /// Unregistration happens first, so nobody ever receives a
    /// `rtc.participant.left` for a peer still enumerable in the room.
    async fn close_participant(&self, peer: &PeerHandle) {
        let participant = &peer.participant;
        self.rooms
            .unregister(&participant.channel_id, &participant.participant_id)
            .await;
        self.rooms
            .broadcast(
                &participant.channel_id,
                &Envelope::new(
                    "rtc.participant.left",
                    &participant.channel_id,
                    "",
                    json!({
                        "participant": {
                            "participant_id": participant.participant_id,
                            "user_uid": participant.user_uid,
                        }
                    }),
                ),
                None,
            )
            .await;

        info!(
            participant_id = %participant.participant_id,
            channel_id = %participant.channel_id,
            "participant left voice channel"
        );
    }
}

/// WebSocket upgrade handler for the signaling endpoint.
///
/// No authentication happens at upgrade time; the first inbound frame must be
/// an `rtc.join` carrying a valid ticket.
pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let signaling = state.signaling.clone();
    ws.write_buffer_size(SOCKET_BUFFER_BYTES)
        .max_message_size(MAX_MESSAGE_BYTES)
        .max_frame_size(MAX_MESSAGE_BYTES)
        .on_upgrade(move |socket| signaling.serve(socket))
}

/// Drain the outbound queue onto the socket and keep the peer alive with
/// periodic pings. Every write is bounded by the write deadline; exceeding it
/// ends the pump, which tears down the connection.
async fn write_pump(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Envelope>) {
    let mut ping = interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
    loop {
        tokio::select! {
            maybe_envelope = rx.recv() => {
                let Some(envelope) = maybe_envelope else {
                    // Queue closed: say goodbye and stop.
                    let _ = timeout(WRITE_DEADLINE, sink.send(Message::Close(None))).await;
                    return;
                };
                let frame = match serde_json::to_string(&envelope) {
                    Ok(json) => json,
                    Err(error) => {
                        error!(%error, "failed to serialize signaling envelope");
                        continue;
                    }
                };
                match timeout(WRITE_DEADLINE, sink.send(Message::Text(frame.into()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) | Err(_) => return,
                }
            }
            _ = ping.tick() => {
                match timeout(WRITE_DEADLINE, sink.send(Message::Ping(Bytes::from_static(b"ping")))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) | Err(_) => return,
                }
            }
        }
    }
}

/// Next text frame off the socket, skipping control frames. `None` means the
/// peer is gone.
async fn next_text_frame(stream: &mut SplitStream<WebSocket>) -> Option<String> {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => return Some(text.to_string()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

#[cfg(test)]
#[path = "signaling_test.rs"]
mod signaling_test;

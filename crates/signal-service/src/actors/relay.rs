//! `RelayActor` - the admission & host protocol state machine.
//!
//! Owns the room store and the switchboard. Every mutation, for every
//! room, flows through this actor's mailbox, so interleaved events from
//! many connections are serialized by arrival order and nothing else.
//!
//! # Host Failover
//!
//! When a host's connection drops while other participants remain, the
//! actor schedules a deferred reconciliation instead of transferring the
//! host seat immediately, tolerating fast reconnects. The deferred check
//! re-validates everything when it fires:
//!
//! 1. A current participant with the departed host's persistent identity
//!    is promoted in place (the same human came back on a new connection).
//! 2. Otherwise, if the stale host connection id is still installed, the
//!    earliest-joined participant takes over.
//! 3. Otherwise someone else already claimed the seat and the check is a
//!    no-op.
//!
//! Because every firing re-validates, overlapping reconciliations from
//! rapid repeated disconnects cannot double-transfer.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::SignalError;
use crate::observability::metrics;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::rooms::store::Room;
use crate::rooms::{Participant, RoomStore, UserData};
use crate::transport::Switchboard;

use super::messages::{HandshakeIdentity, RelayMessage, RelayStatus};

/// Mailbox capacity for the relay actor.
const RELAY_CHANNEL_BUFFER: usize = 500;

/// Handle to the `RelayActor`.
#[derive(Clone)]
pub struct RelayHandle {
    sender: mpsc::Sender<RelayMessage>,
    cancel_token: CancellationToken,
}

impl RelayHandle {
    /// Register a newly opened connection and its outbound channel.
    pub async fn connection_opened(
        &self,
        connection_id: String,
        identity: Option<HandshakeIdentity>,
        sender: mpsc::Sender<ServerEvent>,
    ) -> Result<(), SignalError> {
        self.send(RelayMessage::ConnectionOpened {
            connection_id,
            identity,
            sender,
        })
        .await
    }

    /// Report transport-level connection loss.
    pub async fn connection_closed(&self, connection_id: String) -> Result<(), SignalError> {
        self.send(RelayMessage::ConnectionClosed { connection_id })
            .await
    }

    /// Deliver a client protocol event.
    pub async fn client_event(
        &self,
        connection_id: String,
        event: ClientEvent,
    ) -> Result<(), SignalError> {
        self.send(RelayMessage::Client {
            connection_id,
            event,
        })
        .await
    }

    /// Snapshot of current relay state.
    pub async fn status(&self) -> Result<RelayStatus, SignalError> {
        let (tx, rx) = oneshot::channel();
        self.send(RelayMessage::GetStatus { respond_to: tx }).await?;
        rx.await
            .map_err(|e| SignalError::Internal(format!("response receive failed: {e}")))
    }

    /// Drop all rooms and broadcast groups. Test isolation support.
    pub async fn reset(&self) -> Result<(), SignalError> {
        let (tx, rx) = oneshot::channel();
        self.send(RelayMessage::Reset { respond_to: tx }).await?;
        rx.await
            .map_err(|e| SignalError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the relay actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for dependent tasks (servers, pumps).
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    async fn send(&self, message: RelayMessage) -> Result<(), SignalError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| SignalError::Internal(format!("channel send failed: {e}")))
    }
}

/// The `RelayActor` implementation.
pub struct RelayActor {
    receiver: mpsc::Receiver<RelayMessage>,
    /// Own sender, cloned into deferred failover tasks so their results
    /// re-enter the mailbox.
    sender: mpsc::Sender<RelayMessage>,
    cancel_token: CancellationToken,
    store: RoomStore,
    switchboard: Switchboard,
    /// Handshake identities by connection id.
    identities: HashMap<String, HandshakeIdentity>,
    /// Grace period before a host departure triggers reconciliation.
    failover_grace: Duration,
}

impl RelayActor {
    /// Spawn the relay actor. Returns a handle and the task join handle.
    #[must_use]
    pub fn spawn(
        failover_grace: Duration,
        cancel_token: CancellationToken,
    ) -> (RelayHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(RELAY_CHANNEL_BUFFER);

        let actor = Self {
            receiver,
            sender: sender.clone(),
            cancel_token: cancel_token.clone(),
            store: RoomStore::new(),
            switchboard: Switchboard::new(),
            identities: HashMap::new(),
            failover_grace,
        };

        let task_handle = tokio::spawn(actor.run());

        (
            RelayHandle {
                sender,
                cancel_token,
            },
            task_handle,
        )
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "signal.actor.relay")]
    async fn run(mut self) {
        info!(target: "signal.actor.relay", "RelayActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "signal.actor.relay", "RelayActor received cancellation signal");
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message),
                        None => {
                            info!(target: "signal.actor.relay", "RelayActor channel closed, exiting");
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "signal.actor.relay",
            rooms = self.store.all_room_ids().len(),
            connections = self.switchboard.connection_count(),
            "RelayActor stopped"
        );
    }

    fn handle_message(&mut self, message: RelayMessage) {
        match message {
            RelayMessage::ConnectionOpened {
                connection_id,
                identity,
                sender,
            } => {
                self.switchboard.register(&connection_id, sender);
                if let Some(identity) = identity {
                    self.identities.insert(connection_id.clone(), identity);
                }
                debug!(
                    target: "signal.actor.relay",
                    connection_id = %connection_id,
                    "Connection opened"
                );
            }

            RelayMessage::ConnectionClosed { connection_id } => {
                self.handle_disconnect(&connection_id);
            }

            RelayMessage::Client {
                connection_id,
                event,
            } => {
                metrics::record_client_event(event.wire_name());
                self.handle_client_event(&connection_id, event);
            }

            RelayMessage::ReconcileHost {
                room_id,
                departed_connection_id,
                departed_user_id,
            } => {
                self.handle_reconcile(&room_id, &departed_connection_id, departed_user_id);
            }

            RelayMessage::GetStatus { respond_to } => {
                let room_ids = self.store.all_room_ids();
                let _ = respond_to.send(RelayStatus {
                    connections: self.switchboard.connection_count(),
                    rooms: room_ids.len(),
                    room_ids,
                });
            }

            RelayMessage::Reset { respond_to } => {
                let room_ids = self.store.all_room_ids();
                for room_id in room_ids {
                    self.switchboard.drop_group(&room_id);
                }
                self.store.clear();
                let _ = respond_to.send(());
            }
        }
        self.update_gauges();
    }

    fn handle_client_event(&mut self, connection_id: &str, event: ClientEvent) {
        match event {
            ClientEvent::JoinRoom { room_id, user_data } => {
                self.handle_join(connection_id, &room_id, user_data);
            }
            ClientEvent::AdmitParticipant {
                room_id,
                target_connection_id,
            } => {
                self.handle_admit(connection_id, &room_id, &target_connection_id);
            }
            ClientEvent::RejectParticipant {
                room_id,
                target_connection_id,
            } => {
                self.handle_reject(connection_id, &room_id, &target_connection_id);
            }
            ClientEvent::MuteParticipant {
                room_id,
                target_connection_id,
            } => {
                self.handle_mute(connection_id, &room_id, &target_connection_id);
            }
            ClientEvent::KickParticipant {
                room_id,
                target_connection_id,
            } => {
                self.handle_kick(connection_id, &room_id, &target_connection_id);
            }
            ClientEvent::Offer {
                payload,
                target_connection_id,
                ..
            } => {
                self.switchboard.send_to(
                    &target_connection_id,
                    ServerEvent::Offer {
                        payload,
                        sender_connection_id: connection_id.to_string(),
                    },
                );
            }
            ClientEvent::Answer {
                payload,
                target_connection_id,
                ..
            } => {
                self.switchboard.send_to(
                    &target_connection_id,
                    ServerEvent::Answer {
                        payload,
                        sender_connection_id: connection_id.to_string(),
                    },
                );
            }
            ClientEvent::IceCandidate {
                payload,
                target_connection_id,
                ..
            } => {
                self.switchboard.send_to(
                    &target_connection_id,
                    ServerEvent::IceCandidate {
                        payload,
                        sender_connection_id: connection_id.to_string(),
                    },
                );
            }
            ClientEvent::ChatMessage {
                room_id,
                message,
                user_data,
            } => {
                self.relay_to_room(connection_id, &room_id, |_| ServerEvent::ChatMessage {
                    message,
                    user_data: serde_json::to_value(&user_data).unwrap_or_default(),
                    timestamp: Utc::now(),
                });
            }
            ClientEvent::ToggleAudio {
                room_id,
                audio_enabled,
            } => {
                self.relay_to_room(connection_id, &room_id, |conn| {
                    ServerEvent::UserAudioToggled {
                        connection_id: conn,
                        enabled: audio_enabled,
                    }
                });
            }
            ClientEvent::ToggleVideo {
                room_id,
                video_enabled,
            } => {
                self.relay_to_room(connection_id, &room_id, |conn| {
                    ServerEvent::UserVideoToggled {
                        connection_id: conn,
                        enabled: video_enabled,
                    }
                });
            }
            ClientEvent::Transcription {
                room_id,
                transcription,
            } => {
                self.relay_to_room(connection_id, &room_id, |conn| ServerEvent::Transcription {
                    connection_id: conn,
                    transcription,
                });
            }
            ClientEvent::ScreenShareStart { room_id } => {
                self.relay_to_room(connection_id, &room_id, |conn| {
                    ServerEvent::ScreenShareStarted {
                        connection_id: conn,
                    }
                });
            }
            ClientEvent::ScreenShareStop { room_id } => {
                self.relay_to_room(connection_id, &room_id, |conn| {
                    ServerEvent::ScreenShareStopped {
                        connection_id: conn,
                    }
                });
            }
        }
    }

    /// Join-room state machine (rules 1-4).
    #[instrument(skip_all, fields(room_id = %room_id, connection_id = %connection_id))]
    fn handle_join(&mut self, connection_id: &str, room_id: &str, user_data: UserData) {
        let user_data = self.enrich_user_data(connection_id, user_data);
        let user_id = user_data.user_id.clone();

        // Rule 1: unknown room, or a room in its transient zero-active
        // window. First writer wins the host seat.
        let active_count = self
            .store
            .get_room(room_id)
            .map_or(0, Room::participant_count);
        if active_count == 0 {
            self.store
                .create_room(room_id, Some(connection_id), user_id.as_deref());
            self.store
                .set_host(room_id, connection_id, user_id.as_deref());
            self.store.remove_pending(room_id, connection_id);
            let participant = Participant::from_user_data(connection_id, &user_data);
            self.store.add_participant(room_id, participant);
            self.switchboard.join_group(room_id, connection_id);

            self.switchboard
                .send_to(connection_id, ServerEvent::HostStatus { is_host: true });
            self.switchboard.send_to(
                connection_id,
                ServerEvent::Admitted {
                    room_id: room_id.to_string(),
                },
            );
            self.switchboard.send_to_group(
                room_id,
                &ServerEvent::HostUpdated {
                    host_connection_id: connection_id.to_string(),
                },
            );

            info!(target: "signal.actor.relay", "Room claimed by bootstrap host");
            return;
        }

        let already_active = self
            .store
            .get_room(room_id)
            .is_some_and(|r| r.has_participant(connection_id));
        let recognized_host = self
            .store
            .is_host(room_id, connection_id, user_id.as_deref());

        // Rule 2: idempotent rejoin, or a recognized host reconnecting
        // under a fresh connection id.
        if already_active || recognized_host {
            if recognized_host {
                self.store
                    .set_host(room_id, connection_id, user_id.as_deref());
            }
            let participant = Participant::from_user_data(connection_id, &user_data);
            let presence = participant.user_data_value();
            let newly_inserted = self.store.add_participant(room_id, participant);
            self.switchboard.join_group(room_id, connection_id);

            let is_host_now = self.store.is_host(room_id, connection_id, None);
            self.switchboard.send_to(
                connection_id,
                ServerEvent::HostStatus {
                    is_host: is_host_now,
                },
            );
            self.switchboard.send_to(
                connection_id,
                ServerEvent::Admitted {
                    room_id: room_id.to_string(),
                },
            );
            self.send_roster(room_id, connection_id);

            if newly_inserted {
                self.switchboard.send_to_group_except(
                    room_id,
                    connection_id,
                    &ServerEvent::UserConnected {
                        connection_id: connection_id.to_string(),
                        user_data: presence,
                    },
                );
            }
            if recognized_host {
                self.switchboard.send_to_group(
                    room_id,
                    &ServerEvent::HostUpdated {
                        host_connection_id: connection_id.to_string(),
                    },
                );
                info!(target: "signal.actor.relay", "Host reconnected and reclaimed the seat");
            }
            return;
        }

        // Rule 3: already waiting; repeat the notice, change nothing.
        if self
            .store
            .get_room(room_id)
            .is_some_and(|r| r.has_pending(connection_id))
        {
            self.switchboard.send_to(
                connection_id,
                ServerEvent::WaitingRoom {
                    room_id: room_id.to_string(),
                },
            );
            return;
        }

        // Rule 4: brand-new non-host connection enters the waiting room.
        let pending = Participant::from_user_data(connection_id, &user_data);
        let pending_value = pending.user_data_value();
        self.store.add_pending(room_id, pending);
        self.switchboard.send_to(
            connection_id,
            ServerEvent::WaitingRoom {
                room_id: room_id.to_string(),
            },
        );
        if let Some(host) = self.store.get_host(room_id) {
            self.switchboard.send_to(
                &host,
                ServerEvent::PendingParticipant {
                    connection_id: connection_id.to_string(),
                    user_data: pending_value,
                },
            );
        } else {
            // Pending requests persist until a host appears or the
            // requester disconnects; nobody to notify right now.
            debug!(target: "signal.actor.relay", "Pending join with no reachable host");
        }
    }

    #[instrument(skip_all, fields(room_id = %room_id, target = %target_connection_id))]
    fn handle_admit(
        &mut self,
        connection_id: &str,
        room_id: &str,
        target_connection_id: &str,
    ) {
        if !self.require_host(room_id, connection_id, "admit participants") {
            return;
        }

        let Some(mut participant) = self.store.remove_pending(room_id, target_connection_id)
        else {
            self.switchboard.send_to(
                connection_id,
                ServerEvent::Error {
                    message: SignalError::ParticipantNotFound(target_connection_id.to_string())
                        .client_message(),
                },
            );
            return;
        };

        participant.joined_at = Utc::now();
        let presence = participant.user_data_value();
        self.store.add_participant(room_id, participant);
        self.switchboard.join_group(room_id, target_connection_id);

        self.switchboard.send_to(
            target_connection_id,
            ServerEvent::Admitted {
                room_id: room_id.to_string(),
            },
        );
        self.send_roster(room_id, target_connection_id);

        // Whole-room presence broadcast (host included) keeps every
        // participant's view consistent.
        self.switchboard.send_to_group(
            room_id,
            &ServerEvent::UserConnected {
                connection_id: target_connection_id.to_string(),
                user_data: presence,
            },
        );
        self.switchboard.send_to(
            connection_id,
            ServerEvent::ParticipantAdmitted {
                connection_id: target_connection_id.to_string(),
            },
        );

        info!(target: "signal.actor.relay", "Participant admitted");
    }

    fn handle_reject(
        &mut self,
        connection_id: &str,
        room_id: &str,
        target_connection_id: &str,
    ) {
        if !self.require_host(room_id, connection_id, "reject participants") {
            return;
        }

        // Idempotent: rejecting an absent target is a success no-op.
        self.store.remove_pending(room_id, target_connection_id);

        self.switchboard.send_to(
            target_connection_id,
            ServerEvent::Rejected {
                room_id: room_id.to_string(),
                message: "Your request to join was declined".to_string(),
            },
        );
        self.switchboard.send_to(
            connection_id,
            ServerEvent::ParticipantRejected {
                connection_id: target_connection_id.to_string(),
            },
        );
    }

    /// Mute mutates no state: the target gets a directive, the room gets
    /// a notice, and enforcement is the target client's problem.
    fn handle_mute(&mut self, connection_id: &str, room_id: &str, target_connection_id: &str) {
        if !self.require_host(room_id, connection_id, "mute participants") {
            return;
        }

        self.switchboard.send_to(
            target_connection_id,
            ServerEvent::ForceMute {
                connection_id: target_connection_id.to_string(),
            },
        );
        self.switchboard.send_to_group_except(
            room_id,
            target_connection_id,
            &ServerEvent::ParticipantMuted {
                target_connection_id: target_connection_id.to_string(),
                muted_by: connection_id.to_string(),
            },
        );
    }

    #[instrument(skip_all, fields(room_id = %room_id, target = %target_connection_id))]
    fn handle_kick(&mut self, connection_id: &str, room_id: &str, target_connection_id: &str) {
        if !self.require_host(room_id, connection_id, "remove participants") {
            return;
        }

        if self
            .store
            .remove_participant(room_id, target_connection_id)
            .is_none()
        {
            self.switchboard.send_to(
                connection_id,
                ServerEvent::Error {
                    message: SignalError::ParticipantNotFound(target_connection_id.to_string())
                        .client_message(),
                },
            );
            return;
        }

        self.switchboard.leave_group(room_id, target_connection_id);
        if self.store.get_room(room_id).is_none() {
            self.switchboard.drop_group(room_id);
        }

        self.switchboard.send_to(
            target_connection_id,
            ServerEvent::Kicked {
                connection_id: target_connection_id.to_string(),
                message: "You were removed from the room by the host".to_string(),
            },
        );
        self.switchboard.send_to_group(
            room_id,
            &ServerEvent::ParticipantKicked {
                target_connection_id: target_connection_id.to_string(),
                kicked_by: connection_id.to_string(),
            },
        );

        info!(target: "signal.actor.relay", "Participant kicked");
    }

    /// Transport-level connection loss: clean up every room this
    /// connection belonged to, active or pending, independently.
    #[instrument(skip_all, fields(connection_id = %connection_id))]
    fn handle_disconnect(&mut self, connection_id: &str) {
        self.identities.remove(connection_id);

        for room_id in self.store.rooms_for_connection(connection_id) {
            self.handle_room_departure(&room_id, connection_id);
        }

        self.switchboard.unregister(connection_id);
        debug!(target: "signal.actor.relay", "Connection closed");
    }

    fn handle_room_departure(&mut self, room_id: &str, connection_id: &str) {
        let is_active = self
            .store
            .get_room(room_id)
            .is_some_and(|r| r.has_participant(connection_id));

        if is_active {
            let was_host = self.store.get_host(room_id).as_deref() == Some(connection_id);
            let departed = self.store.remove_participant(room_id, connection_id);
            self.switchboard.leave_group(room_id, connection_id);
            self.switchboard.send_to_group(
                room_id,
                &ServerEvent::UserDisconnected {
                    connection_id: connection_id.to_string(),
                },
            );

            if self.store.get_room(room_id).is_none() {
                // Last active participant left; the room is gone and the
                // host seat is reassigned lazily on the next join.
                self.switchboard.drop_group(room_id);
                return;
            }

            if was_host {
                let departed_user_id = departed.and_then(|p| p.user_id).or_else(|| {
                    self.store
                        .get_room(room_id)
                        .and_then(|r| r.host_user_id.clone())
                });
                self.schedule_reconcile(room_id, connection_id, departed_user_id);
            }
        } else if self.store.remove_pending(room_id, connection_id).is_some() {
            if let Some(host) = self.store.get_host(room_id) {
                self.switchboard.send_to(
                    &host,
                    ServerEvent::UserDisconnected {
                        connection_id: connection_id.to_string(),
                    },
                );
            }
        }
    }

    /// Schedule the deferred host-failover check. The task only carries
    /// enough to identify the departure; all state is re-read at expiry.
    fn schedule_reconcile(
        &self,
        room_id: &str,
        departed_connection_id: &str,
        departed_user_id: Option<String>,
    ) {
        info!(
            target: "signal.actor.relay",
            room_id = %room_id,
            departed_connection_id = %departed_connection_id,
            grace_seconds = self.failover_grace.as_secs(),
            "Host disconnected, scheduling failover reconciliation"
        );

        let sender = self.sender.clone();
        let grace = self.failover_grace;
        let room_id = room_id.to_string();
        let departed_connection_id = departed_connection_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = sender
                .send(RelayMessage::ReconcileHost {
                    room_id,
                    departed_connection_id,
                    departed_user_id,
                })
                .await;
        });
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    fn handle_reconcile(
        &mut self,
        room_id: &str,
        departed_connection_id: &str,
        departed_user_id: Option<String>,
    ) {
        if self.store.get_room(room_id).is_none() {
            return;
        }

        // The departed host came back under a new connection id: promote
        // in place, no transfer.
        if let Some(user) = departed_user_id.as_deref() {
            let rejoined = self
                .store
                .participants(room_id)
                .iter()
                .find(|p| p.user_id.as_deref() == Some(user))
                .map(|p| p.connection_id.clone());

            if let Some(recovered) = rejoined {
                self.store.set_host(room_id, &recovered, Some(user));
                self.switchboard
                    .send_to(&recovered, ServerEvent::HostStatus { is_host: true });
                self.switchboard.send_to_group(
                    room_id,
                    &ServerEvent::HostUpdated {
                        host_connection_id: recovered.clone(),
                    },
                );
                metrics::record_host_failover("recovered");
                info!(
                    target: "signal.actor.relay",
                    host_connection_id = %recovered,
                    "Host recovered by identity match"
                );
                return;
            }
        }

        // Only transfer while the stale host connection id is still
        // installed; anything else means the seat changed hands already.
        if self.store.get_host(room_id).as_deref() == Some(departed_connection_id) {
            if let Some(new_host) = self.store.transfer_host(room_id) {
                self.switchboard
                    .send_to(&new_host, ServerEvent::HostStatus { is_host: true });
                self.switchboard.send_to_group(
                    room_id,
                    &ServerEvent::HostUpdated {
                        host_connection_id: new_host.clone(),
                    },
                );
                metrics::record_host_failover("transferred");
                info!(
                    target: "signal.actor.relay",
                    host_connection_id = %new_host,
                    "Host transferred to earliest-joined participant"
                );
            }
        }
    }

    /// Host gate for admit/reject/mute/kick. Connection-id check only: a
    /// reconnected host re-installs its connection id on join before any
    /// action can arrive, so an identity fallback here would only mask
    /// protocol misuse.
    fn require_host(&self, room_id: &str, connection_id: &str, action: &str) -> bool {
        if self.store.get_room(room_id).is_none() {
            self.switchboard.send_to(
                connection_id,
                ServerEvent::Error {
                    message: SignalError::RoomNotFound(room_id.to_string()).client_message(),
                },
            );
            return false;
        }
        if self.store.is_host(room_id, connection_id, None) {
            return true;
        }
        warn!(
            target: "signal.actor.relay",
            room_id = %room_id,
            connection_id = %connection_id,
            "Non-host attempted a host-only action"
        );
        self.switchboard.send_to(
            connection_id,
            ServerEvent::Error {
                message: SignalError::PermissionDenied(format!("Only the host can {action}"))
                    .client_message(),
            },
        );
        false
    }

    /// Participant-gated room relay. Non-participant senders are silently
    /// ignored: a pending participant's stray events must not produce
    /// room-wide noise, and an error here would leak room membership.
    fn relay_to_room(
        &mut self,
        connection_id: &str,
        room_id: &str,
        build: impl FnOnce(String) -> ServerEvent,
    ) {
        let is_active = self
            .store
            .get_room(room_id)
            .is_some_and(|r| r.has_participant(connection_id));
        if !is_active {
            debug!(
                target: "signal.actor.relay",
                room_id = %room_id,
                connection_id = %connection_id,
                "Ignoring room event from non-participant"
            );
            return;
        }
        let event = build(connection_id.to_string());
        self.switchboard
            .send_to_group_except(room_id, connection_id, &event);
    }

    /// Send the roster of other active participants, each annotated with
    /// its computed host flag.
    fn send_roster(&self, room_id: &str, connection_id: &str) {
        let roster: Vec<Value> = self
            .store
            .participants(room_id)
            .iter()
            .filter(|p| p.connection_id != connection_id)
            .map(|p| {
                let is_host = self
                    .store
                    .is_host(room_id, &p.connection_id, p.user_id.as_deref());
                p.roster_entry(is_host)
            })
            .collect();
        self.switchboard
            .send_to(connection_id, ServerEvent::ExistingUsers(roster));
    }

    /// Fill user-data gaps from the handshake identity; explicit client
    /// fields always win.
    fn enrich_user_data(&self, connection_id: &str, mut user_data: UserData) -> UserData {
        if let Some(identity) = self.identities.get(connection_id) {
            if user_data.user_id.is_none() {
                user_data.user_id = Some(identity.user_id.clone());
            }
            let name_missing = user_data
                .display_name
                .as_deref()
                .map_or(true, |n| n.trim().is_empty());
            if name_missing {
                user_data.display_name = identity.display_name.clone();
            }
            if user_data.language.is_none() {
                user_data.language = identity.language.clone();
            }
        }
        user_data
    }

    fn update_gauges(&self) {
        let room_ids = self.store.all_room_ids();
        let participants: usize = room_ids
            .iter()
            .map(|id| self.store.participants(id).len())
            .sum();
        metrics::set_relay_gauges(
            room_ids.len(),
            participants,
            self.switchboard.connection_count(),
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    const GRACE: Duration = Duration::from_secs(5);

    fn spawn_relay() -> (RelayHandle, JoinHandle<()>) {
        RelayActor::spawn(GRACE, CancellationToken::new())
    }

    async fn open(handle: &RelayHandle, connection_id: &str) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(64);
        handle
            .connection_opened(connection_id.to_string(), None, tx)
            .await
            .unwrap();
        rx
    }

    async fn join(handle: &RelayHandle, connection_id: &str, room_id: &str, name: &str) {
        handle
            .client_event(
                connection_id.to_string(),
                ClientEvent::JoinRoom {
                    room_id: room_id.to_string(),
                    user_data: UserData {
                        display_name: Some(name.to_string()),
                        ..UserData::default()
                    },
                },
            )
            .await
            .unwrap();
    }

    /// Round-trip through the mailbox so all prior messages are handled.
    async fn settle(handle: &RelayHandle) {
        let _ = handle.status().await.unwrap();
    }

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn spawn_and_cancel() {
        let (handle, _task) = spawn_relay();
        assert!(!handle.is_cancelled());
        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn first_join_bootstraps_host() {
        let (handle, _task) = spawn_relay();
        let mut rx_a = open(&handle, "conn-a").await;

        join(&handle, "conn-a", "r1", "Alice").await;
        settle(&handle).await;

        let events = drain(&mut rx_a);
        assert!(events.contains(&ServerEvent::HostStatus { is_host: true }));
        assert!(events.contains(&ServerEvent::Admitted {
            room_id: "r1".to_string()
        }));
        assert!(events.contains(&ServerEvent::HostUpdated {
            host_connection_id: "conn-a".to_string()
        }));

        let status = handle.status().await.unwrap();
        assert_eq!(status.rooms, 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn second_join_lands_in_waiting_room() {
        let (handle, _task) = spawn_relay();
        let mut rx_a = open(&handle, "conn-a").await;
        let mut rx_b = open(&handle, "conn-b").await;

        join(&handle, "conn-a", "r1", "Alice").await;
        join(&handle, "conn-b", "r1", "Bob").await;
        settle(&handle).await;

        let b_events = drain(&mut rx_b);
        assert_eq!(
            b_events,
            vec![ServerEvent::WaitingRoom {
                room_id: "r1".to_string()
            }]
        );

        let a_events = drain(&mut rx_a);
        let pending = a_events.iter().find_map(|e| match e {
            ServerEvent::PendingParticipant {
                connection_id,
                user_data,
            } => Some((connection_id.clone(), user_data.clone())),
            _ => None,
        });
        let (pending_conn, pending_data) = pending.expect("host should see the pending request");
        assert_eq!(pending_conn, "conn-b");
        assert_eq!(pending_data["displayName"], json!("Bob"));

        handle.cancel();
    }

    #[tokio::test]
    async fn non_host_admit_is_rejected_with_error() {
        let (handle, _task) = spawn_relay();
        let _rx_a = open(&handle, "conn-a").await;
        let mut rx_b = open(&handle, "conn-b").await;

        join(&handle, "conn-a", "r1", "Alice").await;
        join(&handle, "conn-b", "r1", "Bob").await;
        settle(&handle).await;
        drain(&mut rx_b);

        handle
            .client_event(
                "conn-b".to_string(),
                ClientEvent::AdmitParticipant {
                    room_id: "r1".to_string(),
                    target_connection_id: "conn-b".to_string(),
                },
            )
            .await
            .unwrap();
        settle(&handle).await;

        let events = drain(&mut rx_b);
        assert!(matches!(
            events.as_slice(),
            [ServerEvent::Error { message }] if message.contains("host")
        ));
        // Bob must still be pending, not active.
        let status = handle.status().await.unwrap();
        assert_eq!(status.rooms, 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn chat_from_non_participant_is_silently_ignored() {
        let (handle, _task) = spawn_relay();
        let mut rx_a = open(&handle, "conn-a").await;
        let mut rx_b = open(&handle, "conn-b").await;

        join(&handle, "conn-a", "r1", "Alice").await;
        join(&handle, "conn-b", "r1", "Bob").await;
        settle(&handle).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        // Bob is pending: his chat must reach nobody and produce no error.
        handle
            .client_event(
                "conn-b".to_string(),
                ClientEvent::ChatMessage {
                    room_id: "r1".to_string(),
                    message: "let me in".to_string(),
                    user_data: UserData::default(),
                },
            )
            .await
            .unwrap();
        settle(&handle).await;

        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_b).is_empty());

        handle.cancel();
    }

    #[tokio::test]
    async fn mute_forwards_without_state_change() {
        let (handle, _task) = spawn_relay();
        let mut rx_a = open(&handle, "conn-a").await;
        let mut rx_b = open(&handle, "conn-b").await;

        join(&handle, "conn-a", "r1", "Alice").await;
        join(&handle, "conn-b", "r1", "Bob").await;
        handle
            .client_event(
                "conn-a".to_string(),
                ClientEvent::AdmitParticipant {
                    room_id: "r1".to_string(),
                    target_connection_id: "conn-b".to_string(),
                },
            )
            .await
            .unwrap();
        settle(&handle).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        handle
            .client_event(
                "conn-a".to_string(),
                ClientEvent::MuteParticipant {
                    room_id: "r1".to_string(),
                    target_connection_id: "conn-b".to_string(),
                },
            )
            .await
            .unwrap();
        settle(&handle).await;

        let b_events = drain(&mut rx_b);
        assert_eq!(
            b_events,
            vec![ServerEvent::ForceMute {
                connection_id: "conn-b".to_string()
            }]
        );
        let a_events = drain(&mut rx_a);
        assert!(a_events.contains(&ServerEvent::ParticipantMuted {
            target_connection_id: "conn-b".to_string(),
            muted_by: "conn-a".to_string(),
        }));

        handle.cancel();
    }

    #[tokio::test]
    async fn negotiation_relays_by_target_without_membership_check() {
        let (handle, _task) = spawn_relay();
        let _rx_a = open(&handle, "conn-a").await;
        let mut rx_b = open(&handle, "conn-b").await;

        // Neither connection has joined any room.
        handle
            .client_event(
                "conn-a".to_string(),
                ClientEvent::Offer {
                    payload: json!({ "sdp": "v=0..." }),
                    target_connection_id: "conn-b".to_string(),
                    room_id: "r1".to_string(),
                },
            )
            .await
            .unwrap();
        settle(&handle).await;

        let events = drain(&mut rx_b);
        assert_eq!(
            events,
            vec![ServerEvent::Offer {
                payload: json!({ "sdp": "v=0..." }),
                sender_connection_id: "conn-a".to_string(),
            }]
        );

        handle.cancel();
    }

    #[tokio::test]
    async fn reset_clears_all_rooms() {
        let (handle, _task) = spawn_relay();
        let _rx_a = open(&handle, "conn-a").await;
        join(&handle, "conn-a", "r1", "Alice").await;
        settle(&handle).await;

        handle.reset().await.unwrap();
        let status = handle.status().await.unwrap();
        assert_eq!(status.rooms, 0);
        // Connections survive a reset; only room state is dropped.
        assert_eq!(status.connections, 1);

        handle.cancel();
    }
}

//! Envelope dispatch: turns inbound messages into manager calls and
//! outbound messages.

use std::sync::Arc;

use super::broadcast::RoomEvent;
use super::manager::{CollabError, RoomManager};
use crate::core::{ErrorPayload, RoomKey};
use crate::protocol::{ClientRequest, Envelope, PresenceStatus, PresenceUpdate, RequestContext};

/// Where an outbound envelope goes.
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    /// Back to the sender only.
    Reply(Envelope),
    /// To every local connection in the room.
    Room { key: RoomKey, envelope: Envelope },
}

impl Outbound {
    pub fn envelope(&self) -> &Envelope {
        match self {
            Outbound::Reply(envelope) | Outbound::Room { envelope, .. } => envelope,
        }
    }
}

pub struct Dispatcher {
    manager: Arc<RoomManager>,
}

impl Dispatcher {
    pub fn new(manager: Arc<RoomManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<RoomManager> {
        &self.manager
    }

    /// Handle one inbound envelope.
    pub fn handle(&self, bytes: &[u8]) -> Vec<Outbound> {
        let envelope = match Envelope::decode(bytes, self.manager.limits()) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::debug!(error = %err, "rejected inbound envelope");
                let request_id = Envelope::peek_request_id(bytes);
                return vec![Outbound::Reply(Envelope::error(
                    "",
                    "",
                    "",
                    request_id,
                    &err.to_error_payload(),
                ))];
            }
        };

        let parsed = envelope.context().and_then(|ctx| {
            let request = envelope.parse_request(self.manager.limits())?;
            Ok((ctx, request))
        });
        let (ctx, request) = match parsed {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::debug!(
                    kind = %envelope.kind,
                    error = %err,
                    "rejected inbound request"
                );
                return vec![error_reply(&envelope, &err.to_error_payload())];
            }
        };

        match self.route(&ctx, request) {
            Ok(outbound) => outbound,
            Err(err) => {
                match &err {
                    CollabError::Rejected(rejection) => tracing::info!(
                        tenant = %ctx.key.tenant,
                        doc_id = %ctx.key.doc,
                        user_id = %ctx.user,
                        reason = %rejection,
                        "request rejected"
                    ),
                    other => tracing::error!(
                        tenant = %ctx.key.tenant,
                        doc_id = %ctx.key.doc,
                        user_id = %ctx.user,
                        error = %other,
                        "request failed"
                    ),
                }
                vec![error_reply(&envelope, &err.to_error_payload())]
            }
        }
    }

    fn route(
        &self,
        ctx: &RequestContext,
        request: ClientRequest,
    ) -> Result<Vec<Outbound>, CollabError> {
        let RequestContext {
            key,
            user,
            request_id,
        } = ctx;
        match request {
            ClientRequest::Join => {
                let room = self.manager.join(key, user)?;
                let view = room.lock()?.client_view();
                let joined = PresenceUpdate {
                    cursor: None,
                    status: PresenceStatus::Active,
                    meta: None,
                };
                Ok(vec![
                    Outbound::Reply(Envelope::snapshot_response(
                        key,
                        user,
                        request_id.clone(),
                        view,
                    )),
                    room_message(key, Envelope::presence_update(key, user, &joined)),
                ])
            }
            ClientRequest::Leave => {
                if !self.manager.leave(key, user)? {
                    return Ok(Vec::new());
                }
                Ok(vec![room_message(
                    key,
                    Envelope::presence_update(key, user, &PresenceUpdate::offline()),
                )])
            }
            ClientRequest::Submit { base_version, ops } => {
                let version = self
                    .manager
                    .apply_operations(key, user, base_version, ops)?;
                Ok(vec![Outbound::Reply(Envelope::op_ack(
                    key,
                    user,
                    request_id.clone(),
                    version,
                ))])
            }
            ClientRequest::SnapshotRequest => {
                let view = self.manager.current_snapshot(key)?;
                Ok(vec![Outbound::Reply(Envelope::snapshot_response(
                    key,
                    user,
                    request_id.clone(),
                    view,
                ))])
            }
            ClientRequest::Presence(update) => {
                self.manager.update_presence(key, user, &update)?;
                Ok(vec![room_message(
                    key,
                    Envelope::presence_update(key, user, &update),
                )])
            }
        }
    }

    /// Handle one message from the room channel: merge it and fan it out to
    /// local connections as `op_broadcast`.
    pub fn on_room_event(&self, payload: &[u8]) -> Option<Outbound> {
        let event = match RoomEvent::decode(payload) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "dropping undecodable room event");
                return None;
            }
        };
        match self.manager.ingest(event) {
            Ok(batch) => Some(room_message(
                &batch.key,
                Envelope::op_broadcast(&batch.key, &batch.user, batch.version, &batch.ops),
            )),
            Err(err) => {
                tracing::warn!(error = %err, "dropping room event");
                None
            }
        }
    }
}

fn room_message(key: &RoomKey, envelope: Envelope) -> Outbound {
    Outbound::Room {
        key: key.clone(),
        envelope,
    }
}

fn error_reply(request: &Envelope, payload: &ErrorPayload) -> Outbound {
    Outbound::Reply(Envelope::error(
        &request.tenant,
        &request.doc_id,
        &request.user_id,
        request.request_id.clone(),
        payload,
    ))
}

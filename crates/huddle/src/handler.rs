//! Per-connection handler: request dispatch and event forwarding.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive an envelope → decode and validate the request
//!   2. Run the matching registry operation
//!   3. Reply with a `Response` frame (or an `Error` frame)
//!
//! A `subscribe` request additionally spawns a forwarder task that drains
//! the participant's mailbox into `Event` frames on the same connection and
//! closes the connection after the terminal event.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use huddle_protocol::{Codec, Envelope, Event, Payload, Request, Response};
use huddle_room::{ErrorKind, EventSink, RoomError, Subscription};
use huddle_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::task::JoinHandle;

use crate::HuddleError;
use crate::server::ServerState;

/// Frame writer shared by the request loop and the event forwarder, so both
/// stamp frames from one sequence counter and one clock.
struct Outbound<C: Codec> {
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
    seq: AtomicU64,
    start: Instant,
}

impl<C: Codec> Outbound<C> {
    async fn send(&self, payload: Payload) -> Result<(), HuddleError> {
        let envelope = Envelope {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            timestamp: self.start.elapsed().as_millis() as u64,
            payload,
        };
        let bytes = self.state.codec.encode(&envelope)?;
        self.conn.send(&bytes).await?;
        Ok(())
    }

    async fn reply(&self, response: Response) -> Result<(), HuddleError> {
        self.send(Payload::Response(response)).await
    }

    async fn error(&self, code: u16, message: impl Into<String>) -> Result<(), HuddleError> {
        self.reply(Response::Error {
            code,
            message: message.into(),
        })
        .await
    }
}

impl<C: Codec> EventSink for Outbound<C> {
    type Error = HuddleError;

    async fn deliver(&self, event: &Event) -> Result<(), Self::Error> {
        self.send(Payload::Event(event.clone())).await
    }
}

/// Aborts the connection's event forwarder when the handler exits.
#[derive(Default)]
struct ForwarderGuard(Option<JoinHandle<()>>);

impl ForwarderGuard {
    fn replace(&mut self, task: JoinHandle<()>) {
        if let Some(previous) = self.0.replace(task) {
            previous.abort();
        }
    }

    fn stop(&mut self) {
        if let Some(task) = self.0.take() {
            task.abort();
        }
    }
}

impl Drop for ForwarderGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

/// HTTP-style status for a failed room operation.
pub(crate) fn status_code(err: &RoomError) -> u16 {
    match err.kind() {
        ErrorKind::Validation | ErrorKind::State => 400,
        ErrorKind::Authorization => 403,
        ErrorKind::NotFound => 404,
        ErrorKind::Capacity => 409,
        ErrorKind::Internal => 500,
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), HuddleError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    let out = Arc::new(Outbound {
        conn: conn.clone(),
        state,
        seq: AtomicU64::new(1),
        start: Instant::now(),
    });
    let mut forwarder = ForwarderGuard::default();

    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(%conn_id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        };

        let envelope: Envelope = match out.state.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode envelope");
                out.error(400, format!("malformed frame: {e}")).await?;
                continue;
            }
        };

        let request = match envelope.payload {
            Payload::Request(request) => request,
            Payload::Response(_) | Payload::Event(_) => {
                out.error(400, "expected a request").await?;
                continue;
            }
        };

        if let Err(e) = request.validate() {
            out.error(400, e.to_string()).await?;
            continue;
        }

        tracing::debug!(%conn_id, request = request.kind(), "dispatching request");
        handle_request(conn_id, &out, &mut forwarder, request).await?;
    }

    forwarder.stop();
    Ok(())
}

/// Runs one request against the registry and writes the reply.
async fn handle_request<C: Codec>(
    conn_id: ConnectionId,
    out: &Arc<Outbound<C>>,
    forwarder: &mut ForwarderGuard,
    request: Request,
) -> Result<(), HuddleError> {
    let registry = &out.state.registry;

    let result = match request {
        Request::CreateRoom {
            creation_info,
            name,
        } => registry
            .create_room(creation_info, name)
            .await
            .map(|created| Response::RoomCreated {
                room: created.room,
                user_id: created.user_id,
                token: created.token,
            }),

        Request::JoinRoom { room, name } => {
            registry
                .join_room(&room, name)
                .await
                .map(|joined| Response::RoomJoined {
                    id: joined.user_id,
                    token: joined.token,
                    info: joined.creation_info,
                })
        }

        Request::RenameUser { room, token, name } => registry
            .rename_user(&room, &token, name)
            .await
            .map(|()| Response::Ack),

        Request::CompleteRoom {
            room,
            token,
            completion_info,
        } => registry
            .complete_room(&room, &token, completion_info)
            .await
            .map(|()| Response::Ack),

        Request::RoomInfo { room, token } => registry
            .room_info(&room, &token)
            .await
            .map(|info| Response::RoomInfo {
                info: info.snapshot,
            }),

        Request::Subscribe { room, token } => {
            // One stream per connection; a new one takes over from the old.
            forwarder.stop();
            match registry.subscribe(&room, &token).await {
                Ok(subscription) => {
                    out.reply(Response::Subscribed {
                        room: subscription.room().clone(),
                        user_id: subscription.user_id(),
                    })
                    .await?;
                    forwarder.replace(tokio::spawn(forward_events(
                        conn_id,
                        Arc::clone(out),
                        subscription,
                    )));
                    return Ok(());
                }
                Err(e) => Err(e),
            }
        }

        Request::Version => Ok(Response::Version {
            version: out.state.version.clone(),
        }),
    };

    match result {
        Ok(response) => out.reply(response).await,
        Err(e) => {
            tracing::debug!(%conn_id, error = %e, "request failed");
            out.error(status_code(&e), e.to_string()).await
        }
    }
}

/// Pushes a participant's events to the connection until the stream ends,
/// then closes the connection.
async fn forward_events<C: Codec>(
    conn_id: ConnectionId,
    out: Arc<Outbound<C>>,
    subscription: Subscription,
) {
    let room = subscription.room().clone();
    let user_id = subscription.user_id();
    tracing::debug!(%conn_id, %room, %user_id, "forwarding events");

    match subscription.drain_into(out.as_ref()).await {
        Ok(last) => {
            tracing::debug!(
                %conn_id,
                %room,
                %user_id,
                last = last.as_ref().map(Event::message_type),
                "event stream ended"
            );
            if let Err(e) = out.conn.close().await {
                tracing::debug!(%conn_id, error = %e, "close failed");
            }
        }
        Err(e) => {
            tracing::debug!(%conn_id, %room, %user_id, error = %e, "event forwarding failed");
        }
    }
}

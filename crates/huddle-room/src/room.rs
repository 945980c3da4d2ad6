//! Room actor: one Tokio task per room owning its participants, state and
//! expiry timer.
//!
//! Every operation is a command on the actor's channel, so operations on a
//! room run one at a time, in arrival order. Each command handler changes
//! state and fans the resulting event out to all mailboxes before the next
//! command is looked at, which makes the broadcast part of the same atomic
//! step as the change that caused it.

use std::sync::Arc;

use huddle_protocol::{
    DisconnectReason, Event, ParticipantInfo, PublicId, RoomCode, RoomSnapshot, Token,
};
use huddle_ttl::{ExpiryHandle, ExpiryScheduler, Ticket};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::mailbox::{Mailbox, Subscription};
use crate::{RegistryConfig, RoomError, RoomState};

/// Default command channel size for room actors.
const COMMAND_CHANNEL_SIZE: usize = 64;

/// How many fresh tokens to try before giving up on a collision.
const TOKEN_ATTEMPTS: usize = 3;

/// What a successful join hands back to the new participant.
#[derive(Debug, Clone)]
pub struct Joined {
    pub user_id: PublicId,
    pub token: Token,
    pub creation_info: String,
}

/// Room metadata alongside its public snapshot.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub snapshot: RoomSnapshot,
    pub state: RoomState,
    pub created_at: Instant,
    /// When the current expiry timer fires.
    pub expires_at: Instant,
}

/// Commands sent to a room actor. Most carry a oneshot reply channel.
pub(crate) enum RoomCommand {
    Join {
        name: String,
        reply: oneshot::Sender<Result<Joined, RoomError>>,
    },
    Rename {
        token: Token,
        name: String,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Complete {
        completion_info: String,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    PublicId {
        token: Token,
        reply: oneshot::Sender<Result<PublicId, RoomError>>,
    },
    Subscribe {
        token: Token,
        reply: oneshot::Sender<Result<Subscription, RoomError>>,
    },
    Info {
        reply: oneshot::Sender<RoomInfo>,
    },
    /// Closes the room if `ticket` belongs to its live expiry timer.
    /// Replies whether it did.
    CloseIfExpired {
        ticket: Ticket,
        reply: oneshot::Sender<bool>,
    },
    /// Broadcast `disconnected{closed}` and stop.
    Close,
}

/// Handle to a running room actor.
///
/// Cheap to clone. Once the room has been closed every call fails with
/// [`RoomError::NotFound`].
#[derive(Debug, Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Returns the room's code.
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Returns `true` if both handles drive the same actor.
    pub(crate) fn same_room(&self, other: &RoomHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| RoomError::NotFound(self.code.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::NotFound(self.code.clone()))
    }

    /// Adds a participant. Allowed only while the room is Open.
    pub async fn join(&self, name: impl Into<String>) -> Result<Joined, RoomError> {
        let name = name.into();
        self.request(|reply| RoomCommand::Join { name, reply }).await?
    }

    /// Changes the display name of the participant holding `token`.
    pub async fn rename(&self, token: &Token, name: impl Into<String>) -> Result<(), RoomError> {
        let token = token.clone();
        let name = name.into();
        self.request(|reply| RoomCommand::Rename { token, name, reply })
            .await?
    }

    /// Moves the room to Complete and shortens its lifetime to the grace
    /// window.
    ///
    /// No permission check happens here; see
    /// [`RoomRegistry::complete_room`](crate::RoomRegistry::complete_room).
    pub async fn complete(&self, completion_info: impl Into<String>) -> Result<(), RoomError> {
        let completion_info = completion_info.into();
        self.request(|reply| RoomCommand::Complete {
            completion_info,
            reply,
        })
        .await?
    }

    /// Resolves a token to the participant's public id.
    pub async fn public_id(&self, token: &Token) -> Result<PublicId, RoomError> {
        let token = token.clone();
        self.request(|reply| RoomCommand::PublicId { token, reply })
            .await?
    }

    /// Claims the participant's event stream, replacing any previous one.
    pub async fn subscribe(&self, token: &Token) -> Result<Subscription, RoomError> {
        let token = token.clone();
        self.request(|reply| RoomCommand::Subscribe { token, reply })
            .await?
    }

    /// Returns the room's metadata and public snapshot.
    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::Info { reply }).await
    }

    /// Closes the room if `ticket` is its live expiry timer, checking and
    /// closing as one step. Returns `false` for a stale ticket or a room
    /// that is already closed.
    pub(crate) async fn close_if_expired(&self, ticket: Ticket) -> bool {
        self.request(|reply| RoomCommand::CloseIfExpired { ticket, reply })
            .await
            .unwrap_or(false)
    }

    /// Tells the room to disconnect every subscriber and stop.
    ///
    /// Does not unregister the room; the registry does that first.
    pub async fn close(&self) {
        let _ = self.sender.send(RoomCommand::Close).await;
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct Participant {
    id: PublicId,
    name: String,
    token: Token,
    mailbox: Mailbox,
}

struct RoomActor {
    code: RoomCode,
    state: RoomState,
    creation_info: String,
    completion_info: Option<String>,
    /// In join order.
    participants: Vec<Participant>,
    next_user_id: u32,
    created_at: Instant,
    expiry: Option<ExpiryHandle>,
    scheduler: ExpiryScheduler<RoomCode>,
    config: Arc<RegistryConfig>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        debug!(room = %self.code, "room actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join { name, reply } => {
                    let _ = reply.send(self.handle_join(name));
                }
                RoomCommand::Rename { token, name, reply } => {
                    let _ = reply.send(self.handle_rename(&token, name));
                }
                RoomCommand::Complete {
                    completion_info,
                    reply,
                } => {
                    let _ = reply.send(self.handle_complete(completion_info));
                }
                RoomCommand::PublicId { token, reply } => {
                    let _ = reply.send(self.participant(&token).map(|p| p.id));
                }
                RoomCommand::Subscribe { token, reply } => {
                    let _ = reply.send(self.handle_subscribe(&token));
                }
                RoomCommand::Info { reply } => {
                    let _ = reply.send(self.info());
                }
                RoomCommand::CloseIfExpired { ticket, reply } => {
                    let current = self.expiry.as_ref().map(ExpiryHandle::ticket);
                    let expired = current == Some(ticket);
                    let _ = reply.send(expired);
                    if expired {
                        self.broadcast(Event::Disconnected {
                            reason: DisconnectReason::Closed,
                        });
                        break;
                    }
                }
                RoomCommand::Close => {
                    self.broadcast(Event::Disconnected {
                        reason: DisconnectReason::Closed,
                    });
                    break;
                }
            }
        }

        debug!(room = %self.code, "room actor stopped");
    }

    fn handle_join(&mut self, name: String) -> Result<Joined, RoomError> {
        if self.participants.len() >= self.config.max_users {
            return Err(RoomError::RoomFull(self.code.clone()));
        }
        if !self.state.is_joinable() {
            return Err(RoomError::RoomNotOpen(self.code.clone(), self.state));
        }

        let token = self.issue_token()?;
        let user_id = PublicId(self.next_user_id);
        self.next_user_id += 1;

        self.participants.push(Participant {
            id: user_id,
            name: name.clone(),
            token: token.clone(),
            mailbox: Mailbox::new(self.config.mailbox_capacity),
        });
        info!(
            room = %self.code,
            %user_id,
            participants = self.participants.len(),
            "participant joined"
        );

        self.broadcast(Event::UserAdded { id: user_id, name });

        Ok(Joined {
            user_id,
            token,
            creation_info: self.creation_info.clone(),
        })
    }

    fn handle_rename(&mut self, token: &Token, name: String) -> Result<(), RoomError> {
        if !self.state.is_renamable() {
            return Err(RoomError::RenameNotAllowed(self.code.clone(), self.state));
        }

        let code = self.code.clone();
        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.token == *token)
            .ok_or(RoomError::TokenNotFound(code))?;

        // Clients re-send their own name freely; only real changes go out.
        if participant.name == name {
            return Ok(());
        }
        participant.name = name.clone();
        let id = participant.id;

        debug!(room = %self.code, user_id = %id, "participant renamed");
        self.broadcast(Event::UserRenamed { id, name });
        Ok(())
    }

    fn handle_complete(&mut self, completion_info: String) -> Result<(), RoomError> {
        if self.state.is_terminal() {
            return Err(RoomError::AlreadyComplete(self.code.clone()));
        }
        // A Complete room always carries non-empty completion info.
        if completion_info.is_empty() {
            return Err(RoomError::InfoMissing);
        }
        self.config.check_info(&completion_info)?;
        if !self.state.is_completable() || !self.state.can_transition_to(RoomState::Complete) {
            return Err(RoomError::NotCompletable(self.code.clone(), self.state));
        }

        self.state = RoomState::Complete;
        self.completion_info = Some(completion_info.clone());

        let grace = self.config.completion_grace;
        self.expiry = Some(match self.expiry.take() {
            Some(old) => self.scheduler.reschedule(old, grace, self.code.clone()),
            None => self.scheduler.schedule(grace, self.code.clone()),
        });
        info!(
            room = %self.code,
            grace_secs = grace.as_secs(),
            "room complete"
        );

        self.broadcast(Event::Complete { completion_info });
        Ok(())
    }

    fn handle_subscribe(&mut self, token: &Token) -> Result<Subscription, RoomError> {
        let code = self.code.clone();
        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.token == *token)
            .ok_or(RoomError::TokenNotFound(code.clone()))?;

        debug!(room = %code, user_id = %participant.id, "subscriber attached");
        let receiver = participant.mailbox.attach();
        Ok(Subscription::new(code, participant.id, receiver))
    }

    fn participant(&self, token: &Token) -> Result<&Participant, RoomError> {
        self.participants
            .iter()
            .find(|p| p.token == *token)
            .ok_or_else(|| RoomError::TokenNotFound(self.code.clone()))
    }

    /// Issues a time-ordered random token (UUIDv7) that no current
    /// participant holds.
    fn issue_token(&self) -> Result<Token, RoomError> {
        for _ in 0..TOKEN_ATTEMPTS {
            let token = Token::new(Uuid::now_v7().to_string());
            if self.participants.iter().all(|p| p.token != token) {
                return Ok(token);
            }
        }
        Err(RoomError::TokenGenerationFailed(
            "token collided with an existing participant".into(),
        ))
    }

    /// Pushes `event` to every participant in join order. Never blocks: a
    /// full or abandoned mailbox just misses the event.
    fn broadcast(&self, event: Event) {
        for participant in &self.participants {
            if let Err(e) = participant.mailbox.deliver(event.clone()) {
                debug!(
                    room = %self.code,
                    user_id = %participant.id,
                    message_type = event.message_type(),
                    error = %e,
                    "dropping event for slow subscriber"
                );
            }
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            snapshot: RoomSnapshot {
                id: self.code.clone(),
                users: self
                    .participants
                    .iter()
                    .map(|p| ParticipantInfo {
                        id: p.id,
                        name: p.name.clone(),
                    })
                    .collect(),
                creation_info: self.creation_info.clone(),
                completion_info: self.completion_info.clone(),
            },
            state: self.state,
            created_at: self.created_at,
            expires_at: self
                .expiry
                .as_ref()
                .map_or(self.created_at, ExpiryHandle::deadline),
        }
    }
}

/// Builds a room, schedules its initial expiry, optionally seats the
/// creator, and starts the actor.
///
/// The creator joins before the handle exists, so nobody else can take
/// public id 0.
pub(crate) fn spawn_room(
    code: RoomCode,
    creation_info: String,
    creator: Option<String>,
    config: Arc<RegistryConfig>,
    scheduler: ExpiryScheduler<RoomCode>,
) -> Result<(RoomHandle, Option<Joined>), RoomError> {
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

    let mut actor = RoomActor {
        code: code.clone(),
        state: RoomState::Open,
        creation_info,
        completion_info: None,
        participants: Vec::with_capacity(config.max_users),
        next_user_id: 0,
        created_at: Instant::now(),
        expiry: None,
        scheduler,
        config,
        receiver: rx,
    };

    let joined = creator.map(|name| actor.handle_join(name)).transpose()?;
    actor.expiry = Some(actor.scheduler.schedule(actor.config.room_ttl, code.clone()));

    tokio::spawn(actor.run());

    Ok((RoomHandle { code, sender: tx }, joined))
}

//! Room registry: owns every live room, hands out codes, and deletes rooms
//! whose expiry timer fires.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use huddle_protocol::{PublicId, RoomCode, Token};
use huddle_ttl::{Expired, ExpiryReceiver, ExpiryScheduler};
use tokio::sync::Mutex;

use crate::code::RoomCodeGenerator;
use crate::mailbox::Subscription;
use crate::room::{Joined, RoomHandle, RoomInfo, spawn_room};
use crate::{RegistryConfig, RoomError};

/// Fresh codes to draw before treating the code space as exhausted.
const CODE_ATTEMPTS: usize = 100;

/// What the creator gets back from [`RoomRegistry::create_room`].
#[derive(Debug, Clone)]
pub struct CreatedRoom {
    pub room: RoomCode,
    pub user_id: PublicId,
    pub token: Token,
}

struct Inner {
    rooms: Mutex<HashMap<RoomCode, RoomHandle>>,
    config: Arc<RegistryConfig>,
    codes: RoomCodeGenerator,
    scheduler: ExpiryScheduler<RoomCode>,
}

/// The set of live rooms, keyed by code.
///
/// Cheap to clone; clones share the same rooms. The registry lock only
/// guards the code-to-room map and is never held while a room broadcasts.
#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<Inner>,
}

impl RoomRegistry {
    /// Creates an empty registry and starts its expiry reaper.
    ///
    /// Fails with [`RoomError::InvalidConfig`] if a limit is zero. Must be
    /// called from within a Tokio runtime.
    pub fn new(config: RegistryConfig) -> Result<Self, RoomError> {
        config.validate()?;

        let (scheduler, expired) = ExpiryScheduler::new();
        let inner = Arc::new(Inner {
            rooms: Mutex::new(HashMap::new()),
            codes: RoomCodeGenerator::new(config.code_len),
            config: Arc::new(config),
            scheduler,
        });

        tokio::spawn(reap_expired(Arc::downgrade(&inner), expired));

        Ok(Self { inner })
    }

    /// The limits this registry enforces.
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Creates an empty room with a fresh code and schedules its expiry.
    pub async fn create(&self, creation_info: impl Into<String>) -> Result<RoomHandle, RoomError> {
        let (handle, _) = self.spawn(creation_info.into(), None).await?;
        Ok(handle)
    }

    /// Creates a room and seats `name` in it as the creator (public id 0).
    pub async fn create_room(
        &self,
        creation_info: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<CreatedRoom, RoomError> {
        let (handle, joined) = self
            .spawn(creation_info.into(), Some(name.into()))
            .await?;
        let joined = joined.ok_or_else(|| {
            RoomError::TokenGenerationFailed("creator was not seated".into())
        })?;

        Ok(CreatedRoom {
            room: handle.code().clone(),
            user_id: joined.user_id,
            token: joined.token,
        })
    }

    async fn spawn(
        &self,
        creation_info: String,
        creator: Option<String>,
    ) -> Result<(RoomHandle, Option<Joined>), RoomError> {
        let config = &self.inner.config;
        config.check_info(&creation_info)?;

        let mut rooms = self.inner.rooms.lock().await;
        if rooms.len() >= config.max_rooms {
            return Err(RoomError::TooManyRooms(config.max_rooms));
        }

        let code = (0..CODE_ATTEMPTS)
            .map(|_| self.inner.codes.generate())
            .find(|code| !rooms.contains_key(code))
            .ok_or(RoomError::TooManyRooms(rooms.len()))?;

        let (handle, joined) = spawn_room(
            code.clone(),
            creation_info,
            creator,
            Arc::clone(config),
            self.inner.scheduler.clone(),
        )?;
        rooms.insert(code.clone(), handle.clone());

        tracing::info!(room = %code, rooms = rooms.len(), "room created");
        Ok((handle, joined))
    }

    /// Looks up a live room.
    pub async fn get(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        self.inner
            .rooms
            .lock()
            .await
            .get(code)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(code.clone()))
    }

    /// Unregisters a room and disconnects its subscribers.
    ///
    /// Returns `false` if the room was already gone. Safe to call any
    /// number of times.
    pub async fn delete(&self, code: &RoomCode) -> bool {
        let removed = self.inner.rooms.lock().await.remove(code);
        match removed {
            Some(handle) => {
                handle.close().await;
                tracing::info!(room = %code, "room deleted");
                true
            }
            None => false,
        }
    }

    /// Adds a participant to an Open room.
    pub async fn join_room(
        &self,
        code: &RoomCode,
        name: impl Into<String>,
    ) -> Result<Joined, RoomError> {
        self.get(code).await?.join(name).await
    }

    /// Changes the display name of the participant holding `token`.
    pub async fn rename_user(
        &self,
        code: &RoomCode,
        token: &Token,
        name: impl Into<String>,
    ) -> Result<(), RoomError> {
        self.get(code).await?.rename(token, name).await
    }

    /// Completes a room on behalf of its creator.
    ///
    /// Any token other than the creator's, including one the room doesn't
    /// know, is refused with [`RoomError::PermissionDenied`].
    pub async fn complete_room(
        &self,
        code: &RoomCode,
        token: &Token,
        completion_info: impl Into<String>,
    ) -> Result<(), RoomError> {
        let handle = self.get(code).await?;
        let user_id = handle.public_id(token).await.map_err(deny_unknown_token)?;
        if !user_id.is_creator() {
            return Err(RoomError::PermissionDenied(code.clone()));
        }
        handle.complete(completion_info).await
    }

    /// Returns a room's snapshot to one of its participants.
    pub async fn room_info(&self, code: &RoomCode, token: &Token) -> Result<RoomInfo, RoomError> {
        let handle = self.get(code).await?;
        handle.public_id(token).await.map_err(deny_unknown_token)?;
        handle.info().await
    }

    /// Claims the participant's event stream.
    pub async fn subscribe(
        &self,
        code: &RoomCode,
        token: &Token,
    ) -> Result<Subscription, RoomError> {
        self.get(code)
            .await?
            .subscribe(token)
            .await
            .map_err(deny_unknown_token)
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.inner.rooms.lock().await.len()
    }

    /// Codes of all live rooms, in no particular order.
    pub async fn room_codes(&self) -> Vec<RoomCode> {
        self.inner.rooms.lock().await.keys().cloned().collect()
    }

    /// Deletes every room, disconnecting all subscribers.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.inner.rooms.lock().await.drain().collect();
        let count = drained.len();
        for (_, handle) in drained {
            handle.close().await;
        }
        tracing::info!(rooms = count, "registry shut down");
    }

    /// Deletes the room if `ticket` is still its live expiry timer.
    ///
    /// The room itself decides and shuts down in one step, so a completion
    /// it handled first keeps its grace window.
    async fn expire(&self, Expired { key, ticket }: Expired<RoomCode>) {
        let Ok(handle) = self.get(&key).await else {
            return;
        };
        if !handle.close_if_expired(ticket).await {
            tracing::debug!(room = %key, %ticket, "ignoring stale expiry");
            return;
        }

        // The code may have been reused by a new room in the meantime; only
        // unregister the room this ticket belonged to.
        let mut rooms = self.inner.rooms.lock().await;
        if rooms.get(&key).is_some_and(|current| current.same_room(&handle)) {
            rooms.remove(&key);
            tracing::info!(room = %key, "room expired");
        }
    }
}

/// Reading a room or its events with a token it doesn't know is refused the
/// same way as acting without privilege.
fn deny_unknown_token(err: RoomError) -> RoomError {
    match err {
        RoomError::TokenNotFound(code) => RoomError::PermissionDenied(code),
        other => other,
    }
}

/// Deletes rooms as their timers fire. Ends once the registry is dropped.
async fn reap_expired(inner: Weak<Inner>, mut expired: ExpiryReceiver<RoomCode>) {
    while let Some(notice) = expired.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        RoomRegistry { inner }.expire(notice).await;
    }
    tracing::debug!("expiry reaper stopped");
}

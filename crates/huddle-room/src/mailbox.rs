//! Per-participant event mailboxes and the subscriber side that drains them.
//!
//! Every participant owns one bounded mailbox. Room operations push events
//! into it with `try_send` while they hold the room: if the mailbox is full
//! or nobody is listening, the event is dropped for that participant and the
//! operation carries on. Delivery is at-most-once and never blocks the room.
//!
//! A mailbox has at most one live consumer. Events that arrive before the
//! first subscription wait in a parked receiver; each later subscription
//! tells the previous stream it was `replaced` and swaps in a fresh channel.

use std::future::Future;

use huddle_protocol::{DisconnectReason, Event, PublicId, RoomCode};
use tokio::sync::mpsc::{self, error::TrySendError};

/// The room-side end of a participant's event channel.
pub(crate) struct Mailbox {
    sender: mpsc::Sender<Event>,
    /// Receiver nobody has claimed yet.
    parked: Option<mpsc::Receiver<Event>>,
    capacity: usize,
}

impl Mailbox {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            parked: Some(receiver),
            capacity,
        }
    }

    /// Attempts delivery without waiting.
    pub(crate) fn deliver(&self, event: Event) -> Result<(), TrySendError<Event>> {
        self.sender.try_send(event)
    }

    /// Hands out the receiving end to a new consumer.
    ///
    /// The first call returns the parked receiver, with everything buffered
    /// since the participant joined. Later calls send
    /// `disconnected{replaced}` to the current consumer and start a new
    /// channel; dropping the old sender also ends the old stream if the
    /// notice itself didn't fit.
    pub(crate) fn attach(&mut self) -> mpsc::Receiver<Event> {
        if let Some(receiver) = self.parked.take() {
            return receiver;
        }

        let _ = self.sender.try_send(Event::Disconnected {
            reason: DisconnectReason::Replaced,
        });
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.sender = sender;
        receiver
    }
}

// ---------------------------------------------------------------------------
// Subscriber side
// ---------------------------------------------------------------------------

/// Where a [`Subscription`] delivers its events, typically a push
/// transport that turns each one into a frame.
pub trait EventSink: Send + Sync {
    /// The error type for failed deliveries.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Delivers one event. An error ends the drain loop.
    fn deliver(&self, event: &Event) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// A participant's live event stream.
///
/// Yields events in the room's operation order and ends after the first
/// terminal event (`complete` or `disconnected`), or when the room drops the
/// mailbox.
#[derive(Debug)]
pub struct Subscription {
    room: RoomCode,
    user_id: PublicId,
    receiver: mpsc::Receiver<Event>,
    finished: bool,
}

impl Subscription {
    pub(crate) fn new(room: RoomCode, user_id: PublicId, receiver: mpsc::Receiver<Event>) -> Self {
        Self {
            room,
            user_id,
            receiver,
            finished: false,
        }
    }

    /// The room this stream belongs to.
    pub fn room(&self) -> &RoomCode {
        &self.room
    }

    /// The participant this stream belongs to.
    pub fn user_id(&self) -> PublicId {
        self.user_id
    }

    /// Waits for the next event. Returns `None` once the stream is over.
    pub async fn next(&mut self) -> Option<Event> {
        if self.finished {
            return None;
        }
        match self.receiver.recv().await {
            Some(event) => {
                self.finished = event.is_terminal();
                Some(event)
            }
            None => {
                self.finished = true;
                None
            }
        }
    }

    /// Forwards every event to `sink` until the stream ends.
    ///
    /// Returns the terminal event that ended the stream, or `None` if the
    /// room went away without one reaching this mailbox.
    pub async fn drain_into<S: EventSink>(mut self, sink: &S) -> Result<Option<Event>, S::Error> {
        while let Some(event) = self.next().await {
            tracing::trace!(
                room = %self.room,
                user_id = %self.user_id,
                message_type = event.message_type(),
                "forwarding event"
            );
            sink.deliver(&event).await?;
            if event.is_terminal() {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }
}

//! Live radius-query subscriptions.
//!
//! Each subscription is driven by its own task: it watches the store for
//! changes inside its planned scan ranges, re-runs the query and emits the
//! membership diff as [`DeltaEvent`]s. Within one evaluation exits are
//! emitted before enters, and enters before updates.
//!
//! ```text
//!            subscribe()           pause()
//!  (new) ───────────────► Active ─────────► Paused
//!                           ▲  ◄───────────   │
//!                           │    resume()     │
//!                           └──── unsubscribe() / drop / fatal error ───► Closed
//! ```

mod manager;
mod worker;

pub use manager::SubscriptionManager;

use crate::error::GeoError;
use futures::Stream;
use geotrack_types::query::DeltaEvent;
use parking_lot::Mutex;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

/// Opaque handle identifying a subscription within its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Closed,
}

/// Item of a subscription's event stream.
#[derive(Debug)]
pub enum SubscriptionEvent {
    Delta(DeltaEvent),
    /// The subscription gave up and is now closed. Last item of the stream.
    Terminated(GeoError),
}

impl SubscriptionEvent {
    pub fn delta(&self) -> Option<&DeltaEvent> {
        match self {
            SubscriptionEvent::Delta(delta) => Some(delta),
            SubscriptionEvent::Terminated(_) => None,
        }
    }

    pub fn into_delta(self) -> Option<DeltaEvent> {
        match self {
            SubscriptionEvent::Delta(delta) => Some(delta),
            SubscriptionEvent::Terminated(_) => None,
        }
    }
}

/// Subscriber end of a live query.
///
/// Dropping the handle closes the subscription.
pub struct Subscription {
    id: SubscriptionId,
    events: mpsc::UnboundedReceiver<SubscriptionEvent>,
    control: Arc<Control>,
    _guard: DropGuard,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.control.status()
    }

    /// Wait for the next event. `None` once the subscription is closed and
    /// everything it emitted has been received; events still queued when
    /// the caller unsubscribes are discarded.
    pub async fn next_event(&mut self) -> Option<SubscriptionEvent> {
        if self.control.is_detached() {
            return None;
        }
        self.events.recv().await
    }

    /// Non-blocking variant of [`next_event`](Self::next_event).
    pub fn try_next_event(&mut self) -> Option<SubscriptionEvent> {
        if self.control.is_detached() {
            return None;
        }
        self.events.try_recv().ok()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

impl Stream for Subscription {
    type Item = SubscriptionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.control.is_detached() {
            return Poll::Ready(None);
        }
        self.events.poll_recv(cx)
    }
}

/// State shared between a handle, its worker and the manager's registry.
///
/// The status lock is held while a worker emits, so a caller that returns
/// from `pause` or `unsubscribe` never sees another delta from before.
pub(crate) struct Control {
    state: Mutex<State>,
    resume: Notify,
    cancel: CancellationToken,
}

struct State {
    status: SubscriptionStatus,
    /// Changes were observed while emission was suppressed.
    dirty: bool,
    /// Closed by the caller rather than by the worker.
    detached: bool,
}

impl Control {
    fn new() -> Self {
        Self {
            state: Mutex::new(State {
                status: SubscriptionStatus::Active,
                dirty: false,
                detached: false,
            }),
            resume: Notify::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn status(&self) -> SubscriptionStatus {
        self.state.lock().status
    }

    fn is_detached(&self) -> bool {
        self.state.lock().detached
    }

    /// Active -> Paused. `false` if already closed.
    fn pause(&self) -> bool {
        let mut state = self.state.lock();
        match state.status {
            SubscriptionStatus::Closed => false,
            _ => {
                state.status = SubscriptionStatus::Paused;
                true
            }
        }
    }

    /// Paused -> Active. `false` if already closed.
    fn resume(&self) -> bool {
        let mut state = self.state.lock();
        match state.status {
            SubscriptionStatus::Closed => false,
            SubscriptionStatus::Active => true,
            SubscriptionStatus::Paused => {
                state.status = SubscriptionStatus::Active;
                drop(state);
                self.resume.notify_one();
                true
            }
        }
    }

    /// Caller-initiated close. `false` if it was already closed.
    fn detach(&self) -> bool {
        let mut state = self.state.lock();
        let was_open = state.status != SubscriptionStatus::Closed;
        state.status = SubscriptionStatus::Closed;
        state.detached = true;
        drop(state);
        self.cancel.cancel();
        was_open
    }

    /// Worker-initiated close.
    fn close(&self) {
        self.state.lock().status = SubscriptionStatus::Closed;
        self.cancel.cancel();
    }

    fn mark_dirty(&self) {
        self.state.lock().dirty = true;
    }

    fn take_dirty(&self) -> bool {
        std::mem::take(&mut self.state.lock().dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = SubscriptionId::new();
        let b = SubscriptionId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_uuid().to_string());
    }

    #[test]
    fn test_control_transitions() {
        let control = Control::new();
        assert_eq!(control.status(), SubscriptionStatus::Active);
        assert!(control.pause());
        assert_eq!(control.status(), SubscriptionStatus::Paused);
        assert!(control.resume());
        assert_eq!(control.status(), SubscriptionStatus::Active);

        assert!(control.detach());
        assert!(!control.detach());
        assert!(!control.pause());
        assert!(!control.resume());
        assert_eq!(control.status(), SubscriptionStatus::Closed);
        assert!(control.cancel.is_cancelled());
    }

    #[test]
    fn test_dirty_flag_is_taken_once() {
        let control = Control::new();
        assert!(!control.take_dirty());
        control.mark_dirty();
        assert!(control.take_dirty());
        assert!(!control.take_dirty());
    }
}

use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll as TaskPoll},
};

use async_trait::async_trait;
use futures::{channel::mpsc, Stream};
use serde_json::Value;

use crate::{Error, MessageId, PollId};

/// A slash-separated location in the store tree, e.g. `messages/{id}`.
///
/// The tree is two levels deep: a top-level collection and optionally one
/// child key under it.
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct Path(String);

impl Path {
    pub fn parse(s: &str) -> Result<Path, Error> {
        let s = s.trim_matches('/');
        let depth = s.split('/').count();
        if s.is_empty() || depth > 2 || s.split('/').any(|seg| seg.is_empty()) {
            return Err(Error::NotFound(String::from(s)));
        }
        Ok(Path(String::from(s)))
    }

    pub fn messages() -> Path {
        Path(String::from("messages"))
    }

    pub fn message(id: MessageId) -> Path {
        Path(format!("messages/{}", id.0))
    }

    pub fn typing() -> Path {
        Path(String::from("typing"))
    }

    pub fn typing_user(username: &str) -> Path {
        Path(format!("typing/{}", username))
    }

    pub fn user_status() -> Path {
        Path(String::from("userStatus"))
    }

    pub fn user_status_user(username: &str) -> Path {
        Path(format!("userStatus/{}", username))
    }

    pub fn polls() -> Path {
        Path(String::from("polls"))
    }

    pub fn poll(id: PollId) -> Path {
        Path(format!("polls/{}", id.0))
    }

    /// (collection, child key) pair; child is None for a collection path.
    pub fn split(&self) -> (&str, Option<&str>) {
        match self.0.split_once('/') {
            Some((coll, key)) => (coll, Some(key)),
            None => (&self.0, None),
        }
    }

    pub fn collection(&self) -> Path {
        Path(String::from(self.split().0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One change fanned out to subscribers of a path.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum StoreEvent {
    ChildAdded { key: String, value: Value },
    ChildChanged { key: String, value: Value },
    ChildRemoved { key: String },
    /// Whole-subtree snapshot of the subscribed path.
    ValueChanged { value: Value },
}

/// A live listener on a store path.
///
/// The subscription owns its cancellation: dropping it (or calling
/// [`Subscription::cancel`]) detaches the listener from the store, so
/// teardown ordering is decided by whoever owns the subscription and not
/// by any UI lifecycle.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<StoreEvent>,
    canceller: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        events: mpsc::UnboundedReceiver<StoreEvent>,
        canceller: Box<dyn FnOnce() + Send>,
    ) -> Subscription {
        Subscription {
            events,
            canceller: Some(canceller),
        }
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.canceller.take() {
            cancel();
        }
        self.events.close();
    }

    /// Non-blocking receive of the next already-delivered event.
    pub fn try_recv(&mut self) -> Option<StoreEvent> {
        match self.events.try_next() {
            Ok(Some(e)) => Some(e),
            // disconnected or empty: nothing ready either way
            Ok(None) | Err(_) => None,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl Stream for Subscription {
    type Item = StoreEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> TaskPoll<Option<StoreEvent>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl futures::stream::FusedStream for Subscription {
    fn is_terminated(&self) -> bool {
        futures::stream::FusedStream::is_terminated(&self.events)
    }
}

/// The realtime store the engines synchronize against: a key-path
/// addressable tree with point reads/writes, an atomic conditional
/// update, and change subscriptions. The store is the single source of
/// truth; every client-side copy is a cache kept live by subscriptions.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn read(&self, path: &Path) -> Result<Option<Value>, Error>;

    async fn write(&self, path: &Path, value: Value) -> Result<(), Error>;

    /// Field-merge into an object value; missing intermediate objects are
    /// created.
    async fn update(
        &self,
        path: &Path,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), Error>;

    async fn remove(&self, path: &Path) -> Result<(), Error>;

    /// Atomic conditional update: replaces the value at `path` with `new`
    /// only if the current value still equals `expected`, and reports
    /// whether the swap happened. `new = None` is a conditional delete.
    ///
    /// This is the primitive that makes compound read-compute-write
    /// operations (reaction toggles, votes) safe under concurrency.
    async fn compare_and_swap(
        &self,
        path: &Path,
        expected: Option<Value>,
        new: Option<Value>,
    ) -> Result<bool, Error>;

    /// Child added/changed/removed events for a collection path. Existing
    /// children are replayed as `ChildAdded` when the listener attaches.
    async fn subscribe_children(&self, path: &Path) -> Result<Subscription, Error>;

    /// Whole-subtree snapshots for a path; the current snapshot is
    /// delivered when the listener attaches.
    async fn subscribe_value(&self, path: &Path) -> Result<Subscription, Error>;
}

//! Derived views: streams of state slices that only emit on change.
//!
//! Every view subscribes to the store's [`StateFeed`], which hands each
//! subscriber every published state in order. The view projects each state
//! to one slice and drops values that are the same as the last one emitted.
//! "Same" is pointer identity for `Arc` slices and value equality for
//! scalars, so an observer of an untouched slice is never woken, and an
//! observer of a changed slice sees every intermediate value.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};

use crate::state::{ErrorInfo, StatusTag, StoreState};

/// Change detection of a projected slice.
pub(crate) trait Slice {
    /// Whether `other` is the same slice as `self`.
    fn same(&self, other: &Self) -> bool;
}

impl<T> Slice for Arc<T> {
    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T> Slice for Option<Arc<T>> {
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

macro_rules! slice_by_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Slice for $ty {
                fn same(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

slice_by_value!(bool, usize, StatusTag, Option<ErrorInfo>, Option<Value>);

/// Fan-out of published states to view subscribers.
///
/// Each subscriber owns an unbounded queue, so a slow observer falls behind
/// instead of skipping states. Subscribing and publishing take the same
/// lock: a new subscriber receives the current state first and then exactly
/// the states published after it.
pub(crate) struct StateFeed<T> {
    inner: Mutex<FeedInner<T>>,
}

struct FeedInner<T> {
    current: Arc<StoreState<T>>,
    /// `None` once the dispatch loop has stopped.
    subscribers: Option<Vec<mpsc::UnboundedSender<Arc<StoreState<T>>>>>,
}

impl<T> StateFeed<T> {
    pub(crate) fn new(initial: Arc<StoreState<T>>) -> Self {
        Self {
            inner: Mutex::new(FeedInner {
                current: initial,
                subscribers: Some(Vec::new()),
            }),
        }
    }

    // A panic while holding the lock cannot leave the feed half-updated.
    fn lock(&self) -> MutexGuard<'_, FeedInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand `state` to every live subscriber and make it the current state.
    ///
    /// Subscribers whose stream was dropped are forgotten.
    pub(crate) fn publish(&self, state: Arc<StoreState<T>>) {
        let mut inner = self.lock();
        if let Some(subscribers) = inner.subscribers.as_mut() {
            subscribers.retain(|tx| tx.send(Arc::clone(&state)).is_ok());
        }
        inner.current = state;
    }

    /// Queue of the current state followed by every later one.
    ///
    /// After [`close`](Self::close) the queue holds the last state and ends.
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<Arc<StoreState<T>>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        // The receiver is still in scope, so this cannot fail.
        let _ = tx.send(Arc::clone(&inner.current));
        if let Some(subscribers) = inner.subscribers.as_mut() {
            subscribers.push(tx);
        }
        rx
    }

    /// End every subscriber's stream once its queue is drained.
    pub(crate) fn close(&self) {
        self.lock().subscribers = None;
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.lock().subscribers.as_ref().map_or(0, Vec::len)
    }
}

/// Stream of one slice of the store state.
///
/// Yields the current slice immediately, then every distinct slice of
/// subsequently published states, in publication order.
///
/// # Arguments
///
/// * `feed` - The store's state feed.
/// * `select` - Pure selector of the slice.
pub(crate) fn project<T, V, F>(
    feed: &StateFeed<T>,
    select: F,
) -> impl Stream<Item = V> + Send + use<T, V, F>
where
    T: Send + Sync + 'static,
    V: Slice + Clone + Send + 'static,
    F: Fn(&StoreState<T>) -> V + Send + 'static,
{
    let mut last: Option<V> = None;
    UnboundedReceiverStream::new(feed.subscribe()).filter_map(move |state| {
        let next = select(&state);
        if last.as_ref().is_some_and(|prev| prev.same(&next)) {
            return None;
        }
        last = Some(next.clone());
        Some(next)
    })
}

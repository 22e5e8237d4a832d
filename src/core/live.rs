//! Live collection - the subscription lifecycle shared by every synced view.
//!
//! A [`LiveCollection`] owns one remote listener at a time and mirrors its result set into
//! a [`CollectionView`] published over a `tokio::sync::watch` channel. Each snapshot
//! replaces the whole view, while an error keeps the last good data.
//!
//! Every subscription is stamped with an id that is checked under the same lock that
//! performs the write, so a callback from a torn-down listener can never touch the view.

use crate::{
    errors::{Error, Result},
    remote::{Document, ListenerRegistration, Query, RemoteCollectionClient, SnapshotEvent},
};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// Subscription lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// No listener
    #[default]
    Unsubscribed,
    /// Listener requested, first snapshot not yet delivered
    Subscribing,
    /// Last delivery was a snapshot
    Live,
    /// Last delivery was an error; previously loaded items are retained
    Erroring,
}

/// Identifies one subscribe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Frozen state of a live collection at one point in time.
#[derive(Debug)]
pub struct CollectionView<T> {
    /// Lifecycle state
    pub status: SyncStatus,
    /// Items in delivery order
    pub items: Arc<Vec<T>>,
    /// Last surfaced error, if not dismissed
    pub error: Option<String>,
    /// Incremented on every applied delivery
    pub version: u64,
    subscription: Option<SubscriptionId>,
}

impl<T> Clone for CollectionView<T> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            items: Arc::clone(&self.items),
            error: self.error.clone(),
            version: self.version,
            subscription: self.subscription,
        }
    }
}

impl<T> Default for CollectionView<T> {
    fn default() -> Self {
        Self {
            status: SyncStatus::Unsubscribed,
            items: Arc::new(Vec::new()),
            error: None,
            version: 0,
            subscription: None,
        }
    }
}

impl<T> CollectionView<T> {
    /// Whether mutations may originate from this state.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.status == SyncStatus::Live
    }
}

/// A remote query mirrored into local state.
pub struct LiveCollection<T> {
    label: &'static str,
    view: Arc<watch::Sender<CollectionView<T>>>,
    registration: Mutex<Option<ListenerRegistration>>,
    next_subscription: AtomicU64,
}

impl<T: Send + Sync + 'static> LiveCollection<T> {
    /// An unsubscribed collection. `label` only appears in logs.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        let (view, _) = watch::channel(CollectionView::default());
        Self {
            label,
            view: Arc::new(view),
            registration: Mutex::new(None),
            next_subscription: AtomicU64::new(0),
        }
    }

    /// Frozen copy of the current view.
    #[must_use]
    pub fn snapshot(&self) -> CollectionView<T> {
        self.view.borrow().clone()
    }

    /// Receiver notified after every applied change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<CollectionView<T>> {
        self.view.subscribe()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.view.borrow().status
    }

    /// Opens a listener for `query`, decoding each document with `decode`.
    ///
    /// Any previous listener is detached first. Items already in the view are kept until
    /// the first snapshot replaces them, so a retry after an error does not blank the view.
    pub async fn subscribe<C, D>(&self, client: &C, query: Query, decode: D) -> Result<()>
    where
        C: RemoteCollectionClient + ?Sized,
        D: Fn(&Document) -> T + Send + Sync + 'static,
    {
        self.detach();

        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed) + 1);
        self.view.send_modify(|view| {
            view.subscription = Some(id);
            view.status = SyncStatus::Subscribing;
        });
        debug!(
            "{}: subscribing to {} (subscription {})",
            self.label, query.collection, id.0
        );

        let view = Arc::clone(&self.view);
        let label = self.label;
        let on_snapshot = Arc::new(move |event: SnapshotEvent| {
            apply_event(&view, label, id, event, &decode);
        });

        match client.listen(query, on_snapshot).await {
            Ok(registration) => {
                let mut slot = self
                    .registration
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                if self.view.borrow().subscription == Some(id) {
                    *slot = Some(registration);
                } else {
                    // Unsubscribed while the listener was being opened.
                    drop(slot);
                    drop(registration);
                }
                Ok(())
            }
            Err(source) => {
                warn!("{}: failed to open listener: {}", self.label, source);
                let message = source.to_string();
                self.view.send_if_modified(|view| {
                    if view.subscription != Some(id) {
                        return false;
                    }
                    view.status = SyncStatus::Erroring;
                    view.error = Some(message);
                    true
                });
                Err(Error::TransientSync { source })
            }
        }
    }

    /// Tears down the listener and clears the view. Safe to call any number of times;
    /// no delivery from the torn-down listener is applied afterwards.
    pub fn unsubscribe(&self) {
        self.detach();
        self.view.send_if_modified(|view| {
            if view.status == SyncStatus::Unsubscribed && view.items.is_empty() {
                return false;
            }
            view.status = SyncStatus::Unsubscribed;
            view.items = Arc::new(Vec::new());
            view.error = None;
            view.version += 1;
            true
        });
    }

    /// Clears the surfaced error without touching the data.
    pub fn dismiss_error(&self) {
        self.view.send_if_modified(|view| view.error.take().is_some());
    }

    /// Invalidates the current subscription id and removes its listener.
    fn detach(&self) {
        // Receivers are not notified: the id is internal bookkeeping.
        self.view.send_if_modified(|view| {
            view.subscription = None;
            false
        });
        let registration = self
            .registration
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(mut registration) = registration {
            trace!("{}: removing listener", self.label);
            registration.remove();
        }
    }
}

fn apply_event<T, D>(
    view: &watch::Sender<CollectionView<T>>,
    label: &'static str,
    id: SubscriptionId,
    event: SnapshotEvent,
    decode: &D,
) where
    D: Fn(&Document) -> T,
{
    view.send_if_modified(|state| {
        if state.subscription != Some(id) {
            trace!("{label}: dropping delivery for stale subscription {}", id.0);
            return false;
        }
        match event {
            Ok(documents) => {
                let items: Vec<T> = documents.iter().map(decode).collect();
                debug!("{label}: applied snapshot with {} items", items.len());
                state.items = Arc::new(items);
                state.status = SyncStatus::Live;
                state.error = None;
            }
            Err(error) => {
                warn!(
                    "{label}: listener error, keeping {} items: {}",
                    state.items.len(),
                    error
                );
                state.status = SyncStatus::Erroring;
                state.error = Some(error.to_string());
            }
        }
        state.version += 1;
        true
    });
}

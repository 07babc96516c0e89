use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};

use futures::StreamExt;
use tokio::{sync::watch, task::JoinHandle};

use crate::services::feed::{map_documents, FeedSource};
use crate::services::notifications::NotificationCenter;

/// Lifecycle of the feed subscription.
///
/// `Idle -> Subscribing -> Active -> (Error <-> Active) -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    Subscribing,
    Active,
    Error,
    Closed,
}

impl SubscriptionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::Idle => "idle",
            SubscriptionState::Subscribing => "subscribing",
            SubscriptionState::Active => "active",
            SubscriptionState::Error => "error",
            SubscriptionState::Closed => "closed",
        }
    }
}

struct Shared {
    center: Arc<NotificationCenter>,
    state: watch::Sender<SubscriptionState>,
    generation: AtomicU64,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn set_state(&self, state: SubscriptionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!("Feed subscription {} -> {}", previous.as_str(), state.as_str());
        }
    }

    /// Transition on behalf of a running task. The generation is checked
    /// while the state is locked, so a concurrent unsubscribe always lands
    /// after this write.
    fn set_state_if_current(&self, generation: u64, state: SubscriptionState) -> bool {
        self.state.send_if_modified(|current| {
            if !self.is_current(generation) {
                return false;
            }
            if *current != state {
                tracing::debug!("Feed subscription {} -> {}", current.as_str(), state.as_str());
            }
            *current = state;
            true
        })
    }
}

/// Keeps a single live subscription to the feed and forwards every snapshot
/// to the notification center.
pub struct FeedSubscriber {
    source: Arc<dyn FeedSource>,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FeedSubscriber {
    pub fn new(source: Arc<dyn FeedSource>, center: Arc<NotificationCenter>) -> Self {
        let (state, _) = watch::channel(SubscriptionState::Idle);
        Self {
            source,
            shared: Arc::new(Shared {
                center,
                state,
                generation: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SubscriptionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.shared.state.subscribe()
    }

    /// Start following the feed, cancelling any previous subscription.
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self) {
        let mut task = self.lock_task();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(previous) = task.take() {
            previous.abort();
        }

        self.shared.set_state(SubscriptionState::Subscribing);
        self.shared.center.set_loading(true);

        let source = self.source.clone();
        let shared = self.shared.clone();
        *task = Some(tokio::spawn(run(source, shared, generation)));
    }

    pub fn unsubscribe(&self) {
        let mut task = self.lock_task();
        self.shared.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(previous) = task.take() {
            previous.abort();
        }

        self.shared.set_state(SubscriptionState::Closed);
        self.shared.center.set_loading(false);
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for FeedSubscriber {
    fn drop(&mut self) {
        if let Some(task) = self.lock_task().take() {
            task.abort();
        }
    }
}

async fn run(source: Arc<dyn FeedSource>, shared: Arc<Shared>, generation: u64) {
    let mut stream = match source.open().await {
        Ok(stream) => stream,
        Err(e) => {
            if shared.is_current(generation) {
                shared.center.apply_feed_error(e);
                shared.set_state_if_current(generation, SubscriptionState::Error);
            }
            return;
        }
    };

    if !shared.set_state_if_current(generation, SubscriptionState::Active) {
        return;
    }

    while let Some(event) = stream.next().await {
        // Late events from a cancelled subscription are dropped.
        if !shared.is_current(generation) {
            return;
        }

        match event {
            Ok(snapshot) => {
                let items = map_documents(&snapshot);
                shared.center.apply_snapshot(items).await;
                shared.set_state_if_current(generation, SubscriptionState::Active);
            }
            Err(e) => {
                shared.center.apply_feed_error(e);
                shared.set_state_if_current(generation, SubscriptionState::Error);
            }
        }
    }

    if shared.set_state_if_current(generation, SubscriptionState::Closed) {
        tracing::info!("Notification feed stream ended");
        shared.center.set_loading(false);
    }
}

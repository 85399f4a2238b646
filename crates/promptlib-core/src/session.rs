//! The process-scoped prompt library.
//!
//! A [`PromptLibrary`] owns one [`Reconciler`], one change feed subscription
//! and the notification channels a front end listens to. Clones share the
//! same state. The engine lock is never held across an `.await`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::engine::{Applied, ReconcileStats, Reconciler};
use crate::error::{LibraryError, TransportError, WriteError, WriteOp};
use crate::event::ChangeEvent;
use crate::feed::{ChangeFeedListener, Subscription};
use crate::model::{Prompt, PromptDraft, PromptId, PromptPatch};
use crate::store::PromptStore;

const CHANNEL_CAPACITY: usize = 256;

/// How far the cache can be trusted to match the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Freshness {
    Connecting,
    Live,
    /// The store asked the client to reconnect; updates may pause.
    Reconnecting,
    Stale { reason: String },
}

impl Freshness {
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// User-visible notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notice {
    fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
            at: Utc::now(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Feed,
    Local,
}

/// One change to the cache, for views that redraw incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub id: PromptId,
    pub origin: Origin,
    pub outcome: Applied,
}

struct Shared {
    engine: Mutex<Reconciler>,
    store: Arc<dyn PromptStore>,
    notices: broadcast::Sender<Notice>,
    activity: broadcast::Sender<Activity>,
    freshness: watch::Sender<Freshness>,
    subscription: Mutex<Option<Subscription>>,
}

impl Shared {
    fn engine(&self) -> MutexGuard<'_, Reconciler> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    fn record(&self, id: &PromptId, origin: Origin, outcome: Applied) {
        let _ = self.activity.send(Activity {
            id: id.clone(),
            origin,
            outcome,
        });
    }

    fn on_event(&self, event: &ChangeEvent) {
        match event {
            ChangeEvent::Welcome => {
                info!("change feed live");
                self.freshness.send_replace(Freshness::Live);
            }
            ChangeEvent::Reconnect => {
                self.freshness.send_replace(Freshness::Reconnecting);
            }
            ChangeEvent::Disconnect { reason } => {
                warn!(reason = reason.as_deref().unwrap_or("unspecified"), "change feed disconnected");
                self.freshness.send_replace(Freshness::Stale {
                    reason: reason.clone().unwrap_or_else(|| "disconnected".into()),
                });
            }
            ChangeEvent::Mutation(_) => {}
        }
        let outcome = self.engine().apply(event);
        if let Some(id) = event.document_id() {
            self.record(id, Origin::Feed, outcome);
        }
    }

    fn on_transport_error(&self, error: &TransportError) {
        match error {
            // A single unreadable message does not mean the feed is down.
            TransportError::Malformed(_) => {}
            _ => {
                self.freshness.send_replace(Freshness::Stale {
                    reason: error.to_string(),
                });
            }
        }
    }
}

/// Shared handle to the live prompt list.
#[derive(Clone)]
pub struct PromptLibrary {
    shared: Arc<Shared>,
}

impl PromptLibrary {
    /// Subscribe to the feed, then load every prompt.
    ///
    /// Subscribing first means nothing written during the initial read is
    /// missed; [`Reconciler::seed`] keeps whichever copy is newer.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Load`] if the initial read fails. A feed that
    /// cannot be opened is not an error; freshness reports it instead.
    pub async fn open(store: Arc<dyn PromptStore>) -> Result<Self, LibraryError> {
        let (notices, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (activity, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (freshness, _) = watch::channel(Freshness::Connecting);
        let shared = Arc::new(Shared {
            engine: Mutex::new(Reconciler::new()),
            store: Arc::clone(&store),
            notices,
            activity,
            freshness,
            subscription: Mutex::new(None),
        });

        let on_event: Weak<Shared> = Arc::downgrade(&shared);
        let on_error: Weak<Shared> = Arc::downgrade(&shared);
        let subscription = ChangeFeedListener::new(Arc::clone(&store))
            .subscribe(
                move |event| {
                    if let Some(shared) = on_event.upgrade() {
                        shared.on_event(&event);
                    }
                },
                move |error| {
                    if let Some(shared) = on_error.upgrade() {
                        shared.on_transport_error(&error);
                    }
                },
            )
            .await;
        *shared
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(subscription);

        let fetched = store.fetch_all().await.map_err(LibraryError::Load)?;
        let count = shared.engine().seed(fetched);
        info!(prompts = count, "prompt library loaded");

        Ok(Self { shared })
    }

    /// Current prompts, newest created first.
    #[must_use]
    pub fn prompts(&self) -> Vec<Prompt> {
        self.shared.engine().prompts().to_vec()
    }

    #[must_use]
    pub fn find(&self, id: &PromptId) -> Option<Prompt> {
        self.shared.engine().find(id).cloned()
    }

    #[must_use]
    pub fn stats(&self) -> ReconcileStats {
        self.shared.engine().stats().clone()
    }

    /// Number of writes still waiting on the store.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.shared.engine().pending().len()
    }

    #[must_use]
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.shared.notices.subscribe()
    }

    #[must_use]
    pub fn activity(&self) -> broadcast::Receiver<Activity> {
        self.shared.activity.subscribe()
    }

    #[must_use]
    pub fn freshness(&self) -> watch::Receiver<Freshness> {
        self.shared.freshness.subscribe()
    }

    /// Flip a prompt's favorite flag now and confirm it with the store.
    ///
    /// Returns the value the flag settled on.
    ///
    /// # Errors
    ///
    /// [`LibraryError::NotFound`] for an id not in the list (nothing is
    /// written), or [`LibraryError::Write`] when the store refused the
    /// patch, in which case the flag has been rolled back.
    pub async fn toggle_favorite(&self, id: &PromptId) -> Result<bool, LibraryError> {
        let toggle = self.shared.engine().begin_favorite_toggle(id);
        let toggle = match toggle {
            Ok(toggle) => toggle,
            Err(err) => {
                warn!(prompt = %id, "favorite toggle for unknown prompt");
                return Err(err);
            }
        };
        self.shared.record(id, Origin::Local, Applied::Optimistic);

        let result = self
            .shared
            .store
            .patch(id, &PromptPatch::favorite(toggle.value))
            .await;

        match result {
            Ok(stored) => {
                let outcome = self.shared.engine().confirm_favorite(&toggle, &stored);
                debug!(prompt = %id, outcome = outcome.as_str(), "favorite toggle confirmed");
                self.shared.record(id, Origin::Local, outcome);
                self.shared.notify(Notice::success(if toggle.value {
                    "Added to favorites!"
                } else {
                    "Removed from favorites!"
                }));
                Ok(toggle.value)
            }
            Err(source) => {
                warn!(prompt = %id, error = %source, "favorite toggle rejected");
                let outcome = self.shared.engine().fail_favorite(&toggle);
                self.shared.record(id, Origin::Local, outcome);
                self.shared
                    .notify(Notice::error("Failed to update favorite status"));
                Err(WriteError {
                    op: WriteOp::Patch,
                    id: Some(id.clone()),
                    source,
                }
                .into())
            }
        }
    }

    /// Validate and store a new prompt, then add it to the list.
    ///
    /// # Errors
    ///
    /// [`LibraryError::Draft`] for an invalid draft (the store is not
    /// called) or [`LibraryError::Write`] when the store refused it. The
    /// list is unchanged on error.
    pub async fn create(&self, draft: PromptDraft) -> Result<Prompt, LibraryError> {
        draft.validate()?;

        match self.shared.store.create(&draft).await {
            Ok(stored) => {
                let outcome = self.shared.engine().insert_created(stored.clone());
                self.shared.record(&stored.id, Origin::Local, outcome);
                info!(prompt = %stored.id, "prompt created");
                self.shared.notify(Notice::success("Prompt added successfully!"));
                Ok(stored)
            }
            Err(source) => {
                warn!(error = %source, "prompt create rejected");
                self.shared.notify(Notice::error("Failed to create prompt"));
                Err(WriteError {
                    op: WriteOp::Create,
                    id: None,
                    source,
                }
                .into())
            }
        }
    }

    /// Stop listening. The list stays readable but is no longer updated.
    pub fn close(&self) {
        let subscription = self
            .shared
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
            self.shared.freshness.send_replace(Freshness::Stale {
                reason: "closed".into(),
            });
        }
    }
}

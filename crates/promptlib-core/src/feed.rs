//! Change feed listener.
//!
//! One [`Subscription`] per [`ChangeFeedListener::subscribe`] call. Events are
//! normalized and handed to the event callback one at a time, in the order the
//! transport delivered them. Transport and normalization failures go to the
//! error callback instead. The listener never reconnects on its own.

use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::event::ChangeEvent;
use crate::store::PromptStore;

pub struct ChangeFeedListener {
    store: Arc<dyn PromptStore>,
}

impl ChangeFeedListener {
    #[must_use]
    pub const fn new(store: Arc<dyn PromptStore>) -> Self {
        Self { store }
    }

    /// Open the feed and start delivering events.
    ///
    /// A failure to connect is reported through `on_error` and yields an
    /// inactive subscription.
    pub async fn subscribe<E, F>(&self, mut on_event: E, mut on_error: F) -> Subscription
    where
        E: FnMut(ChangeEvent) + Send + 'static,
        F: FnMut(TransportError) + Send + 'static,
    {
        let mut stream = match self.store.listen().await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "change feed subscription failed");
                on_error(err);
                return Subscription { task: None };
            }
        };
        info!("change feed subscribed");

        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item.and_then(|raw| ChangeEvent::try_from(raw).map_err(TransportError::from)) {
                    Ok(event) => on_event(event),
                    Err(err) => {
                        warn!(error = %err, "change feed error");
                        on_error(err);
                    }
                }
            }
            debug!("change feed stream ended");
            on_error(TransportError::Closed);
        });

        Subscription { task: Some(task) }
    }
}

/// Live feed subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop delivery and release the connection.
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    /// Whether events can still arrive.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("change feed unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RawChangeEvent;
    use crate::model::{Category, PromptDraft};
    use crate::store::MemoryStore;
    use tokio::sync::mpsc;

    async fn listen(
        store: &Arc<MemoryStore>,
    ) -> (
        Subscription,
        mpsc::UnboundedReceiver<ChangeEvent>,
        mpsc::UnboundedReceiver<TransportError>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let dyn_store: Arc<dyn PromptStore> = store.clone();
        let subscription = ChangeFeedListener::new(dyn_store)
            .subscribe(
                move |event| {
                    let _ = event_tx.send(event);
                },
                move |err| {
                    let _ = error_tx.send(err);
                },
            )
            .await;
        (subscription, event_rx, error_rx)
    }

    #[tokio::test]
    async fn delivers_events_in_order() {
        let store = Arc::new(MemoryStore::new());
        let (_subscription, mut events, _errors) = listen(&store).await;

        let mut ids = Vec::new();
        for n in 0..5 {
            let draft = PromptDraft::new(format!("Ordered prompt {n}"), "body", "use", Category::Coding);
            ids.push(store.remote_create(draft).expect("create").id);
        }

        assert_eq!(events.recv().await, Some(ChangeEvent::Welcome));
        for expected in ids {
            let event = events.recv().await.expect("event");
            assert_eq!(event.document_id(), Some(&expected));
        }
    }

    #[tokio::test]
    async fn malformed_messages_go_to_error_channel() {
        let store = Arc::new(MemoryStore::new());
        let (_subscription, mut events, mut errors) = listen(&store).await;
        assert_eq!(events.recv().await, Some(ChangeEvent::Welcome));

        let mut bogus = RawChangeEvent::welcome();
        bogus.kind = "channelError".into();
        store.emit(bogus);
        store.disconnect("server restart");

        assert!(matches!(errors.recv().await, Some(TransportError::Malformed(_))));
        assert_eq!(
            events.recv().await,
            Some(ChangeEvent::Disconnect {
                reason: Some("server restart".into())
            })
        );
    }

    #[tokio::test]
    async fn connect_failure_is_reported_not_raised() {
        let store = Arc::new(MemoryStore::new());
        store.refuse_listen(true);
        let (subscription, _events, mut errors) = listen(&store).await;
        assert!(!subscription.is_active());
        assert!(matches!(errors.recv().await, Some(TransportError::Connect(_))));
    }

    #[tokio::test]
    async fn unsubscribe_releases_the_connection() {
        let store = Arc::new(MemoryStore::new());
        let (subscription, mut events, _errors) = listen(&store).await;
        assert_eq!(events.recv().await, Some(ChangeEvent::Welcome));
        assert_eq!(store.listeners(), 1);

        subscription.unsubscribe();
        tokio::task::yield_now().await;
        for _ in 0..100 {
            if store.listeners() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(store.listeners(), 0);

        let draft = PromptDraft::new("After unsubscribe", "body", "use", Category::Design);
        store.remote_create(draft).expect("create");
        assert_eq!(events.recv().await, None);
    }
}

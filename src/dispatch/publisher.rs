//! Subscriber fan-out for a single content item

use std::sync::Arc;

use crate::dispatch::pool::WorkerPool;
use crate::dispatch::DispatchError;
use crate::metrics;
use crate::models::Content;
use crate::notifications::NotificationTransport;
use crate::storage::SubscriberStore;

/// Resolves a content item's subscribers and submits one send task each
///
/// Sends run on the shared [`WorkerPool`]; `notify_subscribers` returns as
/// soon as every task has been admitted (or rejected). Send failures are
/// logged and counted per subscriber and never reach the caller.
pub struct ContentPublisher {
    subscribers: Arc<dyn SubscriberStore>,
    pool: WorkerPool,
}

impl ContentPublisher {
    pub fn new(subscribers: Arc<dyn SubscriberStore>, pool: WorkerPool) -> Self {
        Self { subscribers, pool }
    }

    /// Pool the send tasks run on
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Fan `content` out to every subscriber of its topic
    ///
    /// Only a failed subscriber lookup is reported as an error.
    pub async fn notify_subscribers(
        &self,
        content: &Content,
        transport: Arc<dyn NotificationTransport>,
    ) -> Result<(), DispatchError> {
        let subscribers = self.subscribers.find_by_topic(&content.topic).await?;
        let subject: Arc<str> = Arc::from(content.topic.subject_line());
        let body: Arc<str> = Arc::from(content.text.as_str());

        tracing::debug!(
            content = %content.label(),
            topic = %content.topic.name,
            subscribers = subscribers.len(),
            transport = transport.name(),
            "Fanning out content"
        );

        for subscriber in subscribers {
            let transport = Arc::clone(&transport);
            let subject = Arc::clone(&subject);
            let body = Arc::clone(&body);
            let recipient = subscriber.email;

            // Rejections are counted and logged by the pool
            let _ = self.pool.submit(async move {
                match transport.send(&recipient, &subject, &body).await {
                    Ok(status) => {
                        metrics::record_send(true);
                        tracing::debug!(%status, "Notification delivered");
                    }
                    Err(e) => {
                        metrics::record_send(false);
                        tracing::warn!(
                            recipient = %recipient,
                            transport = transport.name(),
                            error = %e,
                            "Notification failed"
                        );
                    }
                }
            });
        }

        Ok(())
    }
}

//! Authoring and status queries over the record stores
//!
//! Topics, subscribers and content are created here before the dispatcher
//! ever sees them. Content always starts out `PENDING`.
//!
//! # Example
//!
//! ```rust,ignore
//! use newsletter::authoring::NewsletterService;
//!
//! let service = NewsletterService::new(topics, subscribers, contents);
//! let topic = service.create_topic("rust").await?;
//! service.subscribe("reader@example.com", topic.id.unwrap()).await?;
//! service.create_content("This week in Rust", Utc::now(), topic.id.unwrap()).await?;
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Content, ContentStatus, Subscriber, Topic};
use crate::notifications::{validate_address, TransportError};
use crate::storage::{ContentStore, StoreError, SubscriberStore, TopicStore};

/// Errors raised by authoring operations
#[derive(Debug, thiserror::Error)]
pub enum AuthoringError {
    /// Store rejected or failed the operation
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Subscriber address is malformed
    #[error(transparent)]
    InvalidAddress(#[from] TransportError),

    /// Referenced topic does not exist
    #[error("Topic not found: {0}")]
    UnknownTopic(i64),

    /// Required field is empty
    #[error("{0} cannot be empty")]
    Empty(&'static str),
}

pub type AuthoringResult<T> = Result<T, AuthoringError>;

/// Content item to be created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContent {
    pub text: String,
    pub scheduled_time: DateTime<Utc>,
    pub topic_id: i64,
}

/// Subscription to be created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubscription {
    pub email: String,
    pub topic_id: i64,
}

/// Which content items a status query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    /// Not yet sent (`PENDING` or `FAILED`)
    Pending,
    Sent,
}

/// Creates topics, subscribers and content, and answers status queries
#[derive(Clone)]
pub struct NewsletterService {
    topics: Arc<dyn TopicStore>,
    subscribers: Arc<dyn SubscriberStore>,
    contents: Arc<dyn ContentStore>,
}

impl NewsletterService {
    pub fn new(
        topics: Arc<dyn TopicStore>,
        subscribers: Arc<dyn SubscriberStore>,
        contents: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            topics,
            subscribers,
            contents,
        }
    }

    // ========================================================================
    // Topics
    // ========================================================================

    pub async fn create_topic(&self, name: &str) -> AuthoringResult<Topic> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthoringError::Empty("Topic name"));
        }
        let topic = self.topics.save(Topic::new(name)).await?;
        tracing::info!(topic_id = ?topic.id, name = %topic.name, "Topic created");
        Ok(topic)
    }

    pub async fn list_topics(&self) -> AuthoringResult<Vec<Topic>> {
        Ok(self.topics.find_all().await?)
    }

    async fn resolve_topic(&self, topic_id: i64) -> AuthoringResult<Topic> {
        self.topics
            .find_by_id(topic_id)
            .await?
            .ok_or(AuthoringError::UnknownTopic(topic_id))
    }

    // ========================================================================
    // Subscribers
    // ========================================================================

    /// Register `email` to a topic; duplicates are rejected
    pub async fn subscribe(&self, email: &str, topic_id: i64) -> AuthoringResult<Subscriber> {
        let address = validate_address(email)?;
        let topic = self.resolve_topic(topic_id).await?;
        let subscriber = self
            .subscribers
            .save(Subscriber::new(address.to_string(), topic))
            .await?;
        tracing::info!(email = %subscriber.email, topic = %subscriber.topic.name, "Subscriber added");
        Ok(subscriber)
    }

    /// Register a batch of subscriptions; nothing is stored if any is rejected
    pub async fn subscribe_all(
        &self,
        requests: Vec<NewSubscription>,
    ) -> AuthoringResult<Vec<Subscriber>> {
        let mut batch = Vec::with_capacity(requests.len());
        for request in requests {
            let address = validate_address(&request.email)?;
            let topic = self.resolve_topic(request.topic_id).await?;
            batch.push(Subscriber::new(address.to_string(), topic));
        }
        let saved = self.subscribers.save_all(batch).await?;
        tracing::info!(count = saved.len(), "Subscribers added");
        Ok(saved)
    }

    pub async fn subscribers_of(&self, topic_id: i64) -> AuthoringResult<Vec<Subscriber>> {
        let topic = self.resolve_topic(topic_id).await?;
        Ok(self.subscribers.find_by_topic(&topic).await?)
    }

    // ========================================================================
    // Content
    // ========================================================================

    /// Create one `PENDING` content item
    pub async fn create_content(
        &self,
        text: &str,
        scheduled_time: DateTime<Utc>,
        topic_id: i64,
    ) -> AuthoringResult<Content> {
        if text.trim().is_empty() {
            return Err(AuthoringError::Empty("Content text"));
        }
        let topic = self.resolve_topic(topic_id).await?;
        let content = self
            .contents
            .save(Content::new(text, scheduled_time, topic))
            .await?;
        tracing::info!(
            content = %content.label(),
            scheduled_time = %content.scheduled_time,
            "Content scheduled"
        );
        Ok(content)
    }

    /// Create a batch of `PENDING` content items
    pub async fn create_contents(&self, items: Vec<NewContent>) -> AuthoringResult<Vec<Content>> {
        let mut batch = Vec::with_capacity(items.len());
        for item in items {
            if item.text.trim().is_empty() {
                return Err(AuthoringError::Empty("Content text"));
            }
            let topic = self.resolve_topic(item.topic_id).await?;
            batch.push(Content::new(item.text, item.scheduled_time, topic));
        }
        let saved = self.contents.save_all(batch).await?;
        tracing::info!(count = saved.len(), "Content scheduled");
        Ok(saved)
    }

    // ========================================================================
    // Status Queries
    // ========================================================================

    pub async fn content_by_id(&self, id: i64) -> AuthoringResult<Content> {
        self.contents
            .find_by_id(id)
            .await?
            .ok_or_else(|| StoreError::not_found("Content", id).into())
    }

    pub async fn content_status(&self, filter: StatusFilter) -> AuthoringResult<Vec<Content>> {
        let all = self.contents.find_all().await?;
        let selected = match filter {
            StatusFilter::All => all,
            StatusFilter::Pending => all.into_iter().filter(|c| !c.sent).collect(),
            StatusFilter::Sent => all.into_iter().filter(|c| c.sent).collect(),
        };
        Ok(selected)
    }

    /// Count of items per status
    pub async fn status_counts(&self) -> AuthoringResult<Vec<(ContentStatus, usize)>> {
        let all = self.contents.find_all().await?;
        let counts = [ContentStatus::Pending, ContentStatus::Sent, ContentStatus::Failed]
            .into_iter()
            .map(|status| (status, all.iter().filter(|c| c.status == status).count()))
            .collect();
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryContentStore, InMemorySubscriberStore, InMemoryTopicStore};

    fn service() -> NewsletterService {
        NewsletterService::new(
            Arc::new(InMemoryTopicStore::new()),
            Arc::new(InMemorySubscriberStore::new()),
            Arc::new(InMemoryContentStore::new()),
        )
    }

    #[tokio::test]
    async fn test_subscribe_validates_and_rejects_duplicates() {
        let service = service();
        let topic = service.create_topic("rust").await.unwrap();
        let id = topic.id.unwrap();

        service.subscribe("reader@example.com", id).await.unwrap();
        let dup = service.subscribe("reader@example.com", id).await.unwrap_err();
        assert!(matches!(
            dup,
            AuthoringError::Store(StoreError::DuplicateSubscriber { .. })
        ));

        let bad = service.subscribe("not-an-email", id).await.unwrap_err();
        assert!(matches!(bad, AuthoringError::InvalidAddress(_)));

        let missing = service.subscribe("x@example.com", 99).await.unwrap_err();
        assert!(matches!(missing, AuthoringError::UnknownTopic(99)));
    }

    #[tokio::test]
    async fn test_created_content_is_pending() {
        let service = service();
        let topic = service.create_topic("rust").await.unwrap();
        let content = service
            .create_content("hello", Utc::now(), topic.id.unwrap())
            .await
            .unwrap();

        assert_eq!(content.status, ContentStatus::Pending);
        assert!(!content.sent);
        assert_eq!(service.content_by_id(content.id.unwrap()).await.unwrap(), content);
    }

    #[tokio::test]
    async fn test_status_filters() {
        let service = service();
        let topic = service.create_topic("rust").await.unwrap();
        let id = topic.id.unwrap();
        let items = service
            .create_contents(vec![
                NewContent {
                    text: "one".to_string(),
                    scheduled_time: Utc::now(),
                    topic_id: id,
                },
                NewContent {
                    text: "two".to_string(),
                    scheduled_time: Utc::now(),
                    topic_id: id,
                },
            ])
            .await
            .unwrap();

        let mut first = items[0].clone();
        first.mark_sent();
        service.contents.save(first).await.unwrap();

        assert_eq!(service.content_status(StatusFilter::All).await.unwrap().len(), 2);
        assert_eq!(service.content_status(StatusFilter::Sent).await.unwrap().len(), 1);
        assert_eq!(service.content_status(StatusFilter::Pending).await.unwrap().len(), 1);

        let counts = service.status_counts().await.unwrap();
        assert_eq!(counts[0], (ContentStatus::Pending, 1));
        assert_eq!(counts[1], (ContentStatus::Sent, 1));
    }

    #[tokio::test]
    async fn test_empty_inputs_rejected() {
        let service = service();
        assert!(matches!(
            service.create_topic("  ").await,
            Err(AuthoringError::Empty(_))
        ));
        let topic = service.create_topic("rust").await.unwrap();
        assert!(service
            .create_content("", Utc::now(), topic.id.unwrap())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_missing_content_is_not_found() {
        let service = service();
        let err = service.content_by_id(5).await.unwrap_err();
        assert!(matches!(err, AuthoringError::Store(StoreError::NotFound { .. })));
    }
}

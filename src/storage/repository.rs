//! Repository traits for the record stores
//!
//! The traits decouple the dispatch core from the storage backend, enabling:
//! - testing with the in-memory implementations below
//! - swapping SQLite for another backend without touching the dispatcher
//!
//! # Usage
//!
//! ```rust,ignore
//! use newsletter::storage::{ContentStore, InMemoryContentStore};
//!
//! let store = InMemoryContentStore::new();
//! let saved = store.save(content).await?;
//! let due = store.find_pending(ContentStatus::Pending, start, end).await?;
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{StoreError, StoreResult};
use crate::models::{Content, ContentStatus, Subscriber, Topic};

// ============================================================================
// Repository Traits
// ============================================================================

/// Durable record store for content items
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Items with `status` whose scheduled time lies in `[window_start, window_end]`,
    /// ordered by scheduled time
    async fn find_pending(
        &self,
        status: ContentStatus,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> StoreResult<Vec<Content>>;

    /// Insert (no id) or replace (id present) one item
    async fn save(&self, content: Content) -> StoreResult<Content>;

    /// Insert or replace a batch of items
    async fn save_all(&self, contents: Vec<Content>) -> StoreResult<Vec<Content>>;

    /// Look up one item by id
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Content>>;

    /// All items, ordered by id
    async fn find_all(&self) -> StoreResult<Vec<Content>>;
}

/// Durable record store mapping topics to subscribers
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// All subscribers registered to `topic`
    async fn find_by_topic(&self, topic: &Topic) -> StoreResult<Vec<Subscriber>>;

    /// Register one subscriber; duplicate (email, topic) pairs are rejected
    async fn save(&self, subscriber: Subscriber) -> StoreResult<Subscriber>;

    /// Register a batch; nothing is stored if any pair is a duplicate
    async fn save_all(&self, subscribers: Vec<Subscriber>) -> StoreResult<Vec<Subscriber>>;
}

/// Durable record store for topics
#[async_trait]
pub trait TopicStore: Send + Sync {
    async fn save(&self, topic: Topic) -> StoreResult<Topic>;

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Topic>>;

    async fn find_all(&self) -> StoreResult<Vec<Topic>>;
}

// ============================================================================
// In-memory Implementations
// ============================================================================

#[derive(Default)]
struct ContentTable {
    next_id: i64,
    records: HashMap<i64, Content>,
    /// (status, scheduled_time, id): keeps the window query a range scan
    by_status_time: BTreeSet<(ContentStatus, DateTime<Utc>, i64)>,
}

impl ContentTable {
    fn upsert(&mut self, mut content: Content) -> Content {
        let id = match content.id {
            Some(id) => {
                if let Some(previous) = self.records.get(&id) {
                    self.by_status_time
                        .remove(&(previous.status, previous.scheduled_time, id));
                }
                self.next_id = self.next_id.max(id);
                id
            }
            None => {
                self.next_id += 1;
                self.next_id
            }
        };
        content.id = Some(id);
        self.by_status_time
            .insert((content.status, content.scheduled_time, id));
        self.records.insert(id, content.clone());
        content
    }
}

/// In-memory content store
///
/// Useful for testing without database dependencies.
#[derive(Default)]
pub struct InMemoryContentStore {
    table: RwLock<ContentTable>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of records
    pub fn len(&self) -> usize {
        self.table.read().map(|t| t.records.len()).unwrap_or(0)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn find_pending(
        &self,
        status: ContentStatus,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> StoreResult<Vec<Content>> {
        if window_end < window_start {
            return Ok(Vec::new());
        }
        let table = self.table.read().map_err(|_| StoreError::Poisoned)?;
        let found = table
            .by_status_time
            .range((status, window_start, i64::MIN)..=(status, window_end, i64::MAX))
            .filter_map(|(_, _, id)| table.records.get(id).cloned())
            .collect();
        Ok(found)
    }

    async fn save(&self, content: Content) -> StoreResult<Content> {
        let mut table = self.table.write().map_err(|_| StoreError::Poisoned)?;
        Ok(table.upsert(content))
    }

    async fn save_all(&self, contents: Vec<Content>) -> StoreResult<Vec<Content>> {
        let mut table = self.table.write().map_err(|_| StoreError::Poisoned)?;
        Ok(contents.into_iter().map(|c| table.upsert(c)).collect())
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Content>> {
        let table = self.table.read().map_err(|_| StoreError::Poisoned)?;
        Ok(table.records.get(&id).cloned())
    }

    async fn find_all(&self) -> StoreResult<Vec<Content>> {
        let table = self.table.read().map_err(|_| StoreError::Poisoned)?;
        let mut all: Vec<Content> = table.records.values().cloned().collect();
        all.sort_by_key(|c| c.id);
        Ok(all)
    }
}

#[derive(Default)]
struct SubscriberTable {
    next_id: i64,
    by_topic: HashMap<i64, Vec<Subscriber>>,
}

impl SubscriberTable {
    fn check(&self, subscriber: &Subscriber, topic_id: i64) -> StoreResult<()> {
        let duplicate = self
            .by_topic
            .get(&topic_id)
            .is_some_and(|subs| subs.iter().any(|s| s.email == subscriber.email));
        if duplicate {
            return Err(StoreError::DuplicateSubscriber {
                email: subscriber.email.clone(),
                topic: subscriber.topic.name.clone(),
            });
        }
        Ok(())
    }

    fn insert(&mut self, mut subscriber: Subscriber, topic_id: i64) -> Subscriber {
        self.next_id += 1;
        subscriber.id = Some(self.next_id);
        self.by_topic
            .entry(topic_id)
            .or_default()
            .push(subscriber.clone());
        subscriber
    }
}

fn saved_topic_id(topic: &Topic) -> StoreResult<i64> {
    topic
        .id
        .ok_or_else(|| StoreError::invalid(format!("topic '{}' has not been saved", topic.name)))
}

/// In-memory subscriber store
#[derive(Default)]
pub struct InMemorySubscriberStore {
    table: RwLock<SubscriberTable>,
}

impl InMemorySubscriberStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriberStore for InMemorySubscriberStore {
    async fn find_by_topic(&self, topic: &Topic) -> StoreResult<Vec<Subscriber>> {
        let Some(topic_id) = topic.id else {
            return Ok(Vec::new());
        };
        let table = self.table.read().map_err(|_| StoreError::Poisoned)?;
        Ok(table.by_topic.get(&topic_id).cloned().unwrap_or_default())
    }

    async fn save(&self, subscriber: Subscriber) -> StoreResult<Subscriber> {
        let topic_id = saved_topic_id(&subscriber.topic)?;
        let mut table = self.table.write().map_err(|_| StoreError::Poisoned)?;
        table.check(&subscriber, topic_id)?;
        Ok(table.insert(subscriber, topic_id))
    }

    async fn save_all(&self, subscribers: Vec<Subscriber>) -> StoreResult<Vec<Subscriber>> {
        let mut table = self.table.write().map_err(|_| StoreError::Poisoned)?;

        // Validate the whole batch (including duplicates inside it) before inserting
        let mut seen = std::collections::HashSet::new();
        for subscriber in &subscribers {
            let topic_id = saved_topic_id(&subscriber.topic)?;
            table.check(subscriber, topic_id)?;
            if !seen.insert((subscriber.email.clone(), topic_id)) {
                return Err(StoreError::DuplicateSubscriber {
                    email: subscriber.email.clone(),
                    topic: subscriber.topic.name.clone(),
                });
            }
        }

        let mut saved = Vec::with_capacity(subscribers.len());
        for subscriber in subscribers {
            let topic_id = saved_topic_id(&subscriber.topic)?;
            saved.push(table.insert(subscriber, topic_id));
        }
        Ok(saved)
    }
}

/// In-memory topic store
#[derive(Default)]
pub struct InMemoryTopicStore {
    topics: RwLock<Vec<Topic>>,
}

impl InMemoryTopicStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TopicStore for InMemoryTopicStore {
    async fn save(&self, mut topic: Topic) -> StoreResult<Topic> {
        let mut topics = self.topics.write().map_err(|_| StoreError::Poisoned)?;
        match topic.id {
            Some(id) => {
                if let Some(existing) = topics.iter_mut().find(|t| t.id == Some(id)) {
                    *existing = topic.clone();
                } else {
                    topics.push(topic.clone());
                }
            }
            None => {
                let next = topics.iter().filter_map(|t| t.id).max().unwrap_or(0) + 1;
                topic.id = Some(next);
                topics.push(topic.clone());
            }
        }
        Ok(topic)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Topic>> {
        let topics = self.topics.read().map_err(|_| StoreError::Poisoned)?;
        Ok(topics.iter().find(|t| t.id == Some(id)).cloned())
    }

    async fn find_all(&self) -> StoreResult<Vec<Topic>> {
        let topics = self.topics.read().map_err(|_| StoreError::Poisoned)?;
        Ok(topics.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================

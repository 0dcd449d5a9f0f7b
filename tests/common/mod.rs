//! Common test utilities
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::{Notify, Semaphore};

use newsletter::config::PoolConfig;
use newsletter::dispatch::{BrokerError, ContentPublisher, DispatchStrategy, MessageBroker, WorkerPool};
use newsletter::models::{Content, ContentStatus, Subscriber, Topic};
use newsletter::notifications::{DeliveryStatus, NotificationTransport, TransportError, TransportResult};
use newsletter::scheduler::{ContentDispatcher, FixedClock};
use newsletter::storage::{
    ContentStore, InMemoryContentStore, InMemorySubscriberStore, InMemoryTopicStore, StoreError,
    StoreResult, SubscriberStore, TopicStore,
};

// ============================================================================
// Fixtures
// ============================================================================

/// Reference instant used as "now" by the scenario tests
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

/// `base_time()` shifted by `secs`
pub fn offset(secs: i64) -> DateTime<Utc> {
    base_time() + Duration::seconds(secs)
}

pub fn pool_of(core_workers: usize, max_workers: usize, queue_capacity: usize) -> WorkerPool {
    WorkerPool::new(&PoolConfig {
        core_workers,
        max_workers,
        queue_capacity,
        worker_name_prefix: "test-".to_string(),
    })
    .unwrap()
}

pub fn small_pool() -> WorkerPool {
    pool_of(2, 4, 16)
}

/// Stores and clock shared by a scenario
pub struct Harness {
    pub topics: Arc<InMemoryTopicStore>,
    pub subscribers: Arc<InMemorySubscriberStore>,
    pub contents: Arc<InMemoryContentStore>,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(InMemoryTopicStore::new()),
            subscribers: Arc::new(InMemorySubscriberStore::new()),
            contents: Arc::new(InMemoryContentStore::new()),
            clock: Arc::new(FixedClock::new(base_time())),
        }
    }

    /// Save a topic and subscribe `emails` to it
    pub async fn topic_with_subscribers(&self, name: &str, emails: &[&str]) -> Topic {
        let topic = self.topics.save(Topic::new(name)).await.unwrap();
        for email in emails {
            self.subscribers
                .save(Subscriber::new(*email, topic.clone()))
                .await
                .unwrap();
        }
        topic
    }

    /// Save a pending content item scheduled at `base_time() + secs`
    pub async fn content_at(&self, topic: &Topic, text: &str, secs: i64) -> Content {
        self.contents
            .save(Content::new(text, offset(secs), topic.clone()))
            .await
            .unwrap()
    }

    pub async fn reload(&self, content: &Content) -> Content {
        self.contents
            .find_by_id(content.id.unwrap())
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn status_of(&self, content: &Content) -> (ContentStatus, bool) {
        let c = self.reload(content).await;
        (c.status, c.sent)
    }

    /// Direct strategy over this harness' subscribers
    pub fn direct(&self, transport: Arc<dyn NotificationTransport>) -> (DispatchStrategy, WorkerPool) {
        self.direct_on(transport, small_pool())
    }

    /// Direct strategy running its sends on `pool`
    pub fn direct_on(
        &self,
        transport: Arc<dyn NotificationTransport>,
        pool: WorkerPool,
    ) -> (DispatchStrategy, WorkerPool) {
        let publisher = Arc::new(ContentPublisher::new(self.subscribers.clone(), pool.clone()));
        (DispatchStrategy::direct(publisher, transport), pool)
    }

    pub fn dispatcher(&self, strategy: DispatchStrategy) -> ContentDispatcher {
        ContentDispatcher::new(self.contents.clone(), strategy).with_clock(self.clock.clone())
    }
}

// ============================================================================
// Transports
// ============================================================================

/// Records every message it is asked to send
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// (recipient, subject, body) per send, in completion order
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipients(&self) -> Vec<String> {
        let mut recipients: Vec<String> = self.sent().into_iter().map(|(r, _, _)| r).collect();
        recipients.sort();
        recipients
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, recipient: &str, subject: &str, body: &str) -> TransportResult<DeliveryStatus> {
        self.sent.lock().unwrap().push((
            recipient.to_string(),
            subject.to_string(),
            body.to_string(),
        ));
        Ok(DeliveryStatus::delivered("recording", recipient))
    }
}

/// Fails every send, optionally only for one recipient
#[derive(Default)]
pub struct FailingTransport {
    only: Option<String>,
    attempts: AtomicUsize,
    delivered: Mutex<Vec<String>>,
}

impl FailingTransport {
    pub fn always() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn for_recipient(recipient: &str) -> Arc<Self> {
        Arc::new(Self {
            only: Some(recipient.to_string()),
            ..Self::default()
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<String> {
        let mut delivered = self.delivered.lock().unwrap().clone();
        delivered.sort();
        delivered
    }
}

#[async_trait]
impl NotificationTransport for FailingTransport {
    fn name(&self) -> &str {
        "failing"
    }

    async fn send(&self, recipient: &str, _subject: &str, _body: &str) -> TransportResult<DeliveryStatus> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let fail = self.only.as_deref().map_or(true, |only| only == recipient);
        if fail {
            return Err(TransportError::Rejected(format!("mailbox {recipient} unavailable")));
        }
        self.delivered.lock().unwrap().push(recipient.to_string());
        Ok(DeliveryStatus::delivered("failing", recipient))
    }
}

// ============================================================================
// Brokers
// ============================================================================

/// Records every enqueue
#[derive(Default)]
pub struct RecordingBroker {
    enqueued: Mutex<Vec<(String, Content)>>,
}

impl RecordingBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn enqueued(&self) -> Vec<(String, Content)> {
        self.enqueued.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageBroker for RecordingBroker {
    async fn enqueue(&self, destination: &str, content: &Content) -> Result<(), BrokerError> {
        self.enqueued
            .lock()
            .unwrap()
            .push((destination.to_string(), content.clone()));
        Ok(())
    }
}

/// Rejects every enqueue, or only items whose text matches
#[derive(Default)]
pub struct FailingBroker {
    only_text: Option<String>,
    attempts: AtomicUsize,
}

impl FailingBroker {
    pub fn always() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn for_text(text: &str) -> Arc<Self> {
        Arc::new(Self {
            only_text: Some(text.to_string()),
            ..Self::default()
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageBroker for FailingBroker {
    async fn enqueue(&self, _destination: &str, content: &Content) -> Result<(), BrokerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let fail = self.only_text.as_deref().map_or(true, |t| t == content.text);
        if fail {
            return Err(BrokerError::Rejected("broker unavailable".to_string()));
        }
        Ok(())
    }
}

/// Holds every enqueue until released
pub struct BlockingBroker {
    gate: Semaphore,
    entered: AtomicUsize,
    entered_notify: Notify,
}

impl BlockingBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            entered: AtomicUsize::new(0),
            entered_notify: Notify::new(),
        })
    }

    /// Let `n` pending or future enqueues complete
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` enqueues have started
    pub async fn wait_entered(&self, n: usize) {
        loop {
            let notified = self.entered_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.entered() >= n {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl MessageBroker for BlockingBroker {
    async fn enqueue(&self, _destination: &str, _content: &Content) -> Result<(), BrokerError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.entered_notify.notify_waiters();
        self.gate
            .acquire()
            .await
            .map(|permit| permit.forget())
            .map_err(|e| BrokerError::Rejected(e.to_string()))
    }
}

// ============================================================================
// Stores
// ============================================================================

/// Content store whose query or saves can be made to fail
pub struct FlakyContentStore {
    inner: InMemoryContentStore,
    pub fail_query: AtomicBool,
    pub fail_saves: AtomicBool,
    pub save_calls: AtomicUsize,
}

impl FlakyContentStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryContentStore::new(),
            fail_query: AtomicBool::new(false),
            fail_saves: AtomicBool::new(false),
            save_calls: AtomicUsize::new(0),
        })
    }

    /// Seed without going through the failure switches
    pub async fn seed(&self, content: Content) -> Content {
        self.inner.save(content).await.unwrap()
    }
}

#[async_trait]
impl ContentStore for FlakyContentStore {
    async fn find_pending(
        &self,
        status: ContentStatus,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> StoreResult<Vec<Content>> {
        if self.fail_query.load(Ordering::SeqCst) {
            return Err(StoreError::Task("query timed out".to_string()));
        }
        self.inner.find_pending(status, window_start, window_end).await
    }

    async fn save(&self, content: Content) -> StoreResult<Content> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Task("write failed".to_string()));
        }
        self.inner.save(content).await
    }

    async fn save_all(&self, contents: Vec<Content>) -> StoreResult<Vec<Content>> {
        self.inner.save_all(contents).await
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Content>> {
        self.inner.find_by_id(id).await
    }

    async fn find_all(&self) -> StoreResult<Vec<Content>> {
        self.inner.find_all().await
    }
}

/// Subscriber store whose lookups always fail
#[derive(Default)]
pub struct BrokenSubscriberStore;

#[async_trait]
impl SubscriberStore for BrokenSubscriberStore {
    async fn find_by_topic(&self, _topic: &Topic) -> StoreResult<Vec<Subscriber>> {
        Err(StoreError::Task("subscriber lookup failed".to_string()))
    }

    async fn save(&self, _subscriber: Subscriber) -> StoreResult<Subscriber> {
        Err(StoreError::Task("subscriber store is read-only".to_string()))
    }

    async fn save_all(&self, _subscribers: Vec<Subscriber>) -> StoreResult<Vec<Subscriber>> {
        Err(StoreError::Task("subscriber store is read-only".to_string()))
    }
}

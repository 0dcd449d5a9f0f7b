//! Record stores for topics, subscribers and content
//!
//! The dispatch core only talks to the traits in [`repository`]; the concrete
//! backends are interchangeable:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  ContentDispatcher / ContentPublisher        │
//! └──────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────┐
//! │  ContentStore, SubscriberStore, TopicStore   │
//! └──────────────────────────────────────────────┘
//!            │                       │
//!            ▼                       ▼
//!   ┌─────────────────┐    ┌─────────────────┐
//!   │     SQLite      │    │    In-memory    │
//!   └─────────────────┘    └─────────────────┘
//! ```

pub mod repository;
pub mod sqlite;

pub use repository::{
    ContentStore, InMemoryContentStore, InMemorySubscriberStore, InMemoryTopicStore,
    SubscriberStore, TopicStore,
};
pub use sqlite::SqliteStore;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by record stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The (email, topic) pair is already subscribed
    #[error("Subscriber '{email}' is already registered to topic '{topic}'")]
    DuplicateSubscriber { email: String, topic: String },

    /// A referenced record does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    /// A record cannot be stored as given
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem failure while opening a store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store lock poisoned by a panicking writer
    #[error("Store lock poisoned")]
    Poisoned,

    /// Blocking task failed to complete
    #[error("Store task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Create a not-found error
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Create an invalid record error
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRecord(reason.into())
    }

    /// Check if the operation may succeed when retried
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Io(_) | Self::Task(_))
    }
}

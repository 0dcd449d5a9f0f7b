// Core data structures for the newsletter scheduler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentStatus {
    #[default]
    Pending,
    Sent,
    Failed,
}

impl ContentStatus {
    /// Get string representation (as persisted)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }

    /// Parse the persisted representation (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "SENT" => Some(Self::Sent),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named channel grouping content and subscribers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    /// Assigned by the topic store; `None` until saved
    pub id: Option<i64>,
    pub name: String,
}

impl Topic {
    /// Create an unsaved topic
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    /// Subject line used for every notification of this topic's content
    pub fn subject_line(&self) -> String {
        format!("Newsletter: {}", self.name)
    }
}

/// An email address registered to one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: Option<i64>,
    pub email: String,
    pub topic: Topic,
}

impl Subscriber {
    pub fn new(email: impl Into<String>, topic: Topic) -> Self {
        Self {
            id: None,
            email: email.into(),
            topic,
        }
    }
}

/// A unit of material with a scheduled delivery time
///
/// `sent` is only ever true together with [`ContentStatus::Sent`]; use
/// [`Content::mark_sent`] and [`Content::mark_failed`] rather than touching the
/// fields directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: Option<i64>,
    pub status: ContentStatus,
    pub text: String,
    pub scheduled_time: DateTime<Utc>,
    pub sent: bool,
    pub topic: Topic,
}

impl Content {
    /// Create a new pending content item
    pub fn new(text: impl Into<String>, scheduled_time: DateTime<Utc>, topic: Topic) -> Self {
        Self {
            id: None,
            status: ContentStatus::Pending,
            text: text.into(),
            scheduled_time,
            sent: false,
            topic,
        }
    }

    /// Whether the dispatcher may still hand this item off
    pub fn is_dispatchable(&self) -> bool {
        !self.sent && self.status == ContentStatus::Pending
    }

    /// Record a successful hand-off
    pub fn mark_sent(&mut self) {
        self.sent = true;
        self.status = ContentStatus::Sent;
    }

    /// Record a failed hand-off
    pub fn mark_failed(&mut self) {
        self.sent = false;
        self.status = ContentStatus::Failed;
    }

    /// Display label used in logs
    pub fn label(&self) -> String {
        match self.id {
            Some(id) => format!("content#{id}"),
            None => "content#unsaved".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic() -> Topic {
        Topic {
            id: Some(1),
            name: "rust".to_string(),
        }
    }

    #[test]
    fn test_new_content_is_pending() {
        let content = Content::new("hello", Utc::now(), topic());
        assert_eq!(content.status, ContentStatus::Pending);
        assert!(!content.sent);
        assert!(content.is_dispatchable());
    }

    #[test]
    fn test_mark_sent_keeps_flag_in_sync() {
        let mut content = Content::new("hello", Utc::now(), topic());
        content.mark_sent();
        assert!(content.sent);
        assert_eq!(content.status, ContentStatus::Sent);
        assert!(!content.is_dispatchable());
    }

    #[test]
    fn test_mark_failed_clears_flag() {
        let mut content = Content::new("hello", Utc::now(), topic());
        content.mark_failed();
        assert!(!content.sent);
        assert_eq!(content.status, ContentStatus::Failed);
        assert!(!content.is_dispatchable());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(ContentStatus::parse("pending"), Some(ContentStatus::Pending));
        assert_eq!(ContentStatus::parse("SENT"), Some(ContentStatus::Sent));
        assert_eq!(ContentStatus::parse("Failed"), Some(ContentStatus::Failed));
        assert_eq!(ContentStatus::parse("queued"), None);
        assert!(ContentStatus::Failed.is_terminal());
        assert!(!ContentStatus::Pending.is_terminal());
    }

    #[test]
    fn test_subject_line() {
        assert_eq!(topic().subject_line(), "Newsletter: rust");
    }
}

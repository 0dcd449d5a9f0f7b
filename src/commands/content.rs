use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use newsletter::authoring::NewContent;
use newsletter::config::Config;

use super::{open_store, service};

/// Parse an RFC 3339 timestamp; `None` means now
pub fn parse_schedule(at: Option<&str>) -> Result<DateTime<Utc>> {
    match at {
        None => Ok(Utc::now()),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .with_context(|| format!("Invalid timestamp '{raw}', expected RFC 3339")),
    }
}

pub async fn content_add(
    config: &Config,
    topic_id: i64,
    text: String,
    at: Option<String>,
) -> Result<()> {
    let store = open_store(config)?;
    let scheduled_time = parse_schedule(at.as_deref())?;

    let content = service(&store)
        .create_content(&text, scheduled_time, topic_id)
        .await
        .context("Failed to create content")?;

    println!(
        "Scheduled {} for {} ({})",
        content.label(),
        content.scheduled_time,
        content.status
    );
    Ok(())
}

/// Create content items from a JSON array of `{text, scheduled_time, topic_id}`
pub async fn content_import(config: &Config, input: PathBuf) -> Result<()> {
    let store = open_store(config)?;

    let raw = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let items: Vec<NewContent> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", input.display()))?;

    let created = service(&store)
        .create_contents(items)
        .await
        .context("Failed to import content")?;

    println!("Imported {} content item(s) from {}", created.len(), input.display());
    Ok(())
}

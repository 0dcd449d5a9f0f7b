use std::str::FromStr;

use anyhow::Result;

use newsletter::authoring::StatusFilter;
use newsletter::config::Config;
use newsletter::models::Content;

use super::{open_store, service};

/// What `newsletter status` shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusQuery {
    List(StatusFilter),
    Id(i64),
}

impl FromStr for StatusQuery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::List(StatusFilter::All)),
            "pending" => Ok(Self::List(StatusFilter::Pending)),
            "sent" => Ok(Self::List(StatusFilter::Sent)),
            other => other
                .parse::<i64>()
                .map(Self::Id)
                .map_err(|_| format!("expected all, pending, sent or a content id, got '{s}'")),
        }
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(40).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn print_row(content: &Content) {
    println!(
        "{:>6}  {:<8}  {:<5}  {:<25}  {:<16}  {}",
        content.id.unwrap_or_default(),
        content.status.as_str(),
        content.sent,
        content
            .scheduled_time
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string(),
        content.topic.name,
        preview(&content.text)
    );
}

pub async fn status(config: &Config, query: StatusQuery) -> Result<()> {
    let store = open_store(config)?;
    let service = service(&store);

    match query {
        StatusQuery::Id(id) => {
            let content = service.content_by_id(id).await?;
            println!("Content {id}");
            println!("==========");
            println!("Status: {}", content.status);
            println!("Sent: {}", content.sent);
            println!("Scheduled: {}", content.scheduled_time);
            println!("Topic: {}", content.topic.name);
            println!("Text: {}", content.text);
        }
        StatusQuery::List(filter) => {
            let items = service.content_status(filter).await?;
            if items.is_empty() {
                println!("No content found.");
            } else {
                println!(
                    "{:>6}  {:<8}  {:<5}  {:<25}  {:<16}  TEXT",
                    "ID", "STATUS", "SENT", "SCHEDULED", "TOPIC"
                );
                for content in &items {
                    print_row(content);
                }
            }

            let counts = service.status_counts().await?;
            let summary: Vec<String> = counts
                .iter()
                .map(|(status, count)| format!("{status}: {count}"))
                .collect();
            println!("\n{}", summary.join(" | "));
        }
    }

    Ok(())
}

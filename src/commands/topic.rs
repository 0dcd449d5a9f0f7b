use anyhow::{Context, Result};

use newsletter::authoring::NewSubscription;
use newsletter::config::Config;

use super::{open_store, service};

pub async fn topic_add(config: &Config, name: String) -> Result<()> {
    let store = open_store(config)?;

    let topic = service(&store)
        .create_topic(&name)
        .await
        .context("Failed to create topic")?;

    println!(
        "Created topic '{}' (id {})",
        topic.name,
        topic.id.unwrap_or_default()
    );
    Ok(())
}

pub async fn topic_list(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let service = service(&store);

    let topics = service.list_topics().await?;
    if topics.is_empty() {
        println!("No topics yet. Create one with 'newsletter topic add <name>'.");
        return Ok(());
    }

    println!("{:>6}  {:<30}  {:>11}", "ID", "TOPIC", "SUBSCRIBERS");
    for topic in topics {
        let Some(id) = topic.id else { continue };
        let subscribers = service.subscribers_of(id).await?.len();
        println!("{id:>6}  {:<30}  {subscribers:>11}", topic.name);
    }
    Ok(())
}

/// Subscribe one or more addresses to a topic; a batch is stored all-or-nothing
pub async fn subscribe(
    config: &Config,
    topic_id: i64,
    emails: Vec<String>,
) -> Result<()> {
    let store = open_store(config)?;
    let service = service(&store);

    let subscribers = match emails.as_slice() {
        [] => anyhow::bail!("at least one email address is required"),
        [email] => vec![service
            .subscribe(email, topic_id)
            .await
            .with_context(|| format!("Failed to subscribe {email}"))?],
        _ => {
            let requests = emails
                .into_iter()
                .map(|email| NewSubscription { email, topic_id })
                .collect();
            service
                .subscribe_all(requests)
                .await
                .context("Failed to subscribe addresses")?
        }
    };

    for subscriber in &subscribers {
        println!("Subscribed {} to '{}'", subscriber.email, subscriber.topic.name);
    }
    Ok(())
}

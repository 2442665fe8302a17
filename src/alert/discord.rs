use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::alert::{AlertBatch, AlertSink};
use crate::config::DISCORD_DESCRIPTION_LIMIT;
use crate::error::{AppError, Result};

#[derive(Debug, Serialize)]
pub struct WebhookPayload {
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub footer: Footer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Thumbnail>,
    /// RFC 3339
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct Footer {
    pub text: String,
}

/// Posts one embed per batch to a Discord webhook.
pub struct DiscordNotifier {
    client: reqwest::Client,
    webhook_url: String,
    footer: String,
    /// Winning source → embed thumbnail.
    thumbnails: HashMap<String, String>,
}

impl DiscordNotifier {
    pub fn new(webhook_url: String, footer: String, thumbnails: HashMap<String, String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            webhook_url,
            footer,
            thumbnails,
        })
    }

    pub fn payload(&self, batch: &AlertBatch) -> WebhookPayload {
        WebhookPayload {
            embeds: vec![Embed {
                title: format!("{} Odds Alert", capitalize(&batch.group_source)),
                description: truncate_chars(&batch.render_description(), DISCORD_DESCRIPTION_LIMIT),
                footer: Footer {
                    text: self.footer.clone(),
                },
                thumbnail: self
                    .thumbnails
                    .get(&batch.group_source)
                    .map(|url| Thumbnail { url: url.clone() }),
                timestamp: chrono::Utc::now().to_rfc3339(),
            }],
        }
    }
}

#[async_trait]
impl AlertSink for DiscordNotifier {
    async fn send(&self, batch: &AlertBatch) -> Result<()> {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&self.payload(batch))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::AlertRejected(format!("{status}: {body}")));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "discord"
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiscrepancyRow, PropIdentity, Side};

    fn batch(rows: usize) -> AlertBatch {
        let rows = (0..rows)
            .map(|i| DiscrepancyRow {
                identity: PropIdentity::new(format!("Player {i}"), "Points + Rebounds + Assists", 35.5),
                side: Side::Over,
                best_source: "prizepicks".to_string(),
                best_price: 1.78,
                worst_source: "draftkings".to_string(),
                worst_price: 1.45,
                spread: 0.33,
                trimmed_mean: 1.6,
            })
            .collect();
        AlertBatch::build("prizepicks", rows, &[]).unwrap()
    }

    fn notifier() -> DiscordNotifier {
        let thumbnails = HashMap::from([("prizepicks".to_string(), "https://img.example/pp.png".to_string())]);
        DiscordNotifier::new("http://localhost/webhook".to_string(), "footer text".to_string(), thumbnails).unwrap()
    }

    #[test]
    fn payload_has_one_titled_embed() {
        let payload = notifier().payload(&batch(2));

        assert_eq!(payload.embeds.len(), 1);
        let embed = &payload.embeds[0];
        assert_eq!(embed.title, "Prizepicks Odds Alert");
        assert_eq!(embed.footer.text, "footer text");
        assert!(embed.description.contains("**Player 1 O 35.5 Points + Rebounds + Assists**"));
        assert!(chrono::DateTime::parse_from_rfc3339(&embed.timestamp).is_ok());
    }

    #[test]
    fn long_descriptions_are_truncated_to_the_discord_limit() {
        let payload = notifier().payload(&batch(200));
        let description = &payload.embeds[0].description;

        assert_eq!(description.chars().count(), DISCORD_DESCRIPTION_LIMIT);
        assert!(description.ends_with('…'));
    }

    #[test]
    fn payload_serializes_in_webhook_shape() {
        let value = serde_json::to_value(notifier().payload(&batch(1))).unwrap();
        assert!(value["embeds"][0]["title"].is_string());
        assert!(value["embeds"][0]["footer"]["text"].is_string());
    }

    #[test]
    fn thumbnail_follows_the_winning_source() {
        let notifier = notifier();

        let with = serde_json::to_value(notifier.payload(&batch(1))).unwrap();
        assert_eq!(with["embeds"][0]["thumbnail"]["url"], "https://img.example/pp.png");

        let mut other = batch(1);
        other.group_source = "sleeper".to_string();
        let without = serde_json::to_value(notifier.payload(&other)).unwrap();
        assert!(without["embeds"][0].get("thumbnail").is_none());
    }
}

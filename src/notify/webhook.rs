//! Webhook sink: posts each event as a JSON embed message.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::error::DeliveryError;
use crate::notify::{NotificationEvent, NotificationSink};

/// Sink that POSTs events to a chat webhook URL.
pub struct WebhookSink {
    url: SecretString,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: SecretString) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), DeliveryError> {
        let body = serde_json::to_value(WebhookMessage::from(event))?;

        let resp = self
            .client
            .post(self.url.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status,
                body: body.chars().take(200).collect(),
            });
        }

        tracing::debug!("Webhook accepted event");
        Ok(())
    }
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
    embeds: Vec<Embed<'a>>,
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: &'a str,
    color: u32,
    fields: Vec<EmbedField<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<EmbedImage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EmbedImage<'a>>,
    timestamp: String,
    footer: EmbedFooter<'a>,
}

#[derive(Debug, Serialize)]
struct EmbedField<'a> {
    name: &'a str,
    value: &'a str,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct EmbedImage<'a> {
    url: &'a str,
}

#[derive(Debug, Serialize)]
struct EmbedFooter<'a> {
    text: &'a str,
}

impl<'a> From<&'a NotificationEvent> for WebhookMessage<'a> {
    fn from(event: &'a NotificationEvent) -> Self {
        let embed = Embed {
            title: &event.title,
            color: event.color,
            fields: event
                .fields
                .iter()
                .map(|f| EmbedField {
                    name: &f.label,
                    value: &f.value,
                    inline: f.inline,
                })
                .collect(),
            thumbnail: event.thumbnail_url.as_deref().map(|url| EmbedImage { url }),
            image: event.image_url.as_deref().map(|url| EmbedImage { url }),
            timestamp: event.timestamp.to_rfc3339(),
            footer: EmbedFooter {
                text: &event.footer,
            },
        };

        Self {
            content: &event.headline,
            embeds: vec![embed],
        }
    }
}

use serde::Serialize;
use tracing::debug;

use crate::error::DeliveryError;

/// Body of one webhook execution.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct WebhookPayload {
    pub embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Embed {
    pub title: String,
    pub url: String,
    /// Decimal RGB, sent as a string.
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    pub author: EmbedAuthor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct EmbedAuthor {
    pub name: String,
    pub url: String,
    pub icon_url: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct EmbedImage {
    pub url: String,
}

/// Where formatted notifications go.
pub trait Sink {
    /// One delivery attempt. `Ok` carries the response body.
    fn deliver(&self, payload: &WebhookPayload) -> Result<String, DeliveryError>;
}

pub struct WebhookClient {
    pub url: String,
    http: reqwest::blocking::Client,
}

impl WebhookClient {
    pub fn new(url: String) -> Self {
        Self {
            url,
            http: reqwest::blocking::Client::new(),
        }
    }
}

impl Sink for WebhookClient {
    fn deliver(&self, payload: &WebhookPayload) -> Result<String, DeliveryError> {
        let res = self.http.post(&self.url).json(payload).send()?;

        let status = res.status();
        let body = res.text()?;
        debug!(status = status.as_u16(), "Webhook responded");

        if !status.is_success() {
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

//! Webhook calls
//!
//! Request construction is a pure function of the webhook configuration and
//! the report tags; [`send`] only performs the HTTP exchange.

use reqwest::Method;

use crate::config::Webhook;
use crate::engine::Tags;
use crate::notify::template;
use crate::{Error, Result};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// Fully rendered webhook request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Rendered body and its content type
    pub body: Option<(String, &'static str)>,
}

impl WebhookRequest {
    /// Render `webhook` with `tags`
    pub fn build(webhook: &Webhook, tags: &Tags) -> Result<Self> {
        let url = template::render_url(webhook.url.trim(), tags);
        if url.is_empty() {
            return Err(Error::webhook(&webhook.name, "URL is empty"));
        }

        let body = template::render(&webhook.body, tags);
        let body = (!body.trim().is_empty()).then(|| {
            let content_type = if serde_json::from_str::<serde_json::Value>(&body).is_ok() {
                CONTENT_TYPE_JSON
            } else {
                CONTENT_TYPE_FORM
            };
            (body, content_type)
        });

        let method = match webhook.method.as_deref().map(str::trim) {
            Some(method) if !method.is_empty() => {
                Method::from_bytes(method.to_ascii_uppercase().as_bytes()).map_err(|_| {
                    Error::webhook(&webhook.name, format!("Invalid HTTP method: {method}"))
                })?
            }
            _ if body.is_some() => Method::POST,
            _ => Method::GET,
        };

        let headers = parse_headers(&template::render(&webhook.headers, tags), &webhook.name);

        Ok(Self {
            method,
            url,
            headers,
            body,
        })
    }
}

/// One `Key: Value` per line; blank and malformed lines are skipped
fn parse_headers(raw: &str, webhook: &str) -> Vec<(String, String)> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match line.split_once(':') {
            Some((key, value)) if !key.trim().is_empty() => {
                Some((key.trim().to_string(), value.trim().to_string()))
            }
            _ => {
                tracing::warn!("Webhook {}: ignoring malformed header line {:?}", webhook, line);
                None
            }
        })
        .collect()
}

/// Render and send `webhook`; non-2xx answers are errors
pub async fn send(client: &reqwest::Client, webhook: &Webhook, tags: &Tags) -> Result<()> {
    let request = WebhookRequest::build(webhook, tags)?;

    let mut builder = client.request(request.method.clone(), &request.url);
    for (key, value) in &request.headers {
        builder = builder.header(key, value);
    }
    if let Some((body, content_type)) = request.body {
        builder = builder
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| Error::webhook(&webhook.name, format!("Request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(Error::webhook(
            &webhook.name,
            format!("HTTP {status}: {}", text.trim()),
        ));
    }

    tracing::debug!("Webhook {} answered {}", webhook.name, status);
    Ok(())
}

//! Operator notifications
//!
//! The pipeline reports through a [`NotificationHub`] handed to it at startup.
//! The hub filters by the `notify_on` flags and fans out to every registered
//! [`Notifier`]. Delivery failures are logged and never reach the caller.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::settings::NotifyOn;

/// Something worth telling the operator about
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Service started
    Startup,
    /// A new event passed the news filter
    NewArticle { title: String, link: Option<String> },
    /// One target file was rewritten
    ConfigUpdated {
        file: PathBuf,
        removed: Vec<String>,
        added: Vec<String>,
    },
    /// Bot stop or start command failed
    RestartFailed { stage: String, message: String },
    /// Any other failure inside a cycle
    Error { context: String, message: String },
}

impl Notification {
    pub fn title(&self) -> String {
        let kind = match self {
            Notification::Startup => "Startup",
            Notification::NewArticle { .. } => "News",
            Notification::ConfigUpdated { .. } => "Symbol List Update",
            Notification::RestartFailed { .. } => "Restart Failed",
            Notification::Error { .. } => "Error",
        };
        format!("SymbolScout {}", kind)
    }

    pub fn body(&self) -> String {
        match self {
            Notification::Startup => "Started SymbolScout integration".to_string(),
            Notification::NewArticle { title, link } => match link {
                Some(link) => format!("New article: {}\n{}", title, link),
                None => format!("New article: {}", title),
            },
            Notification::ConfigUpdated {
                file,
                removed,
                added,
            } => {
                let mut lines = Vec::new();
                if !removed.is_empty() {
                    lines.push(format!("🔴 Removing symbols: {}", removed.join(", ")));
                }
                if !added.is_empty() {
                    lines.push(format!("🟢 Adding symbols: {}", added.join(", ")));
                }
                lines.push(format!("✅ Updated {}", file.display()));
                lines.join("\n")
            }
            Notification::RestartFailed { stage, message } => {
                format!("{} command failed: {}", stage, message)
            }
            Notification::Error { context, message } => format!("{}: {}", context, message),
        }
    }

    /// Whether the operator asked for this kind of notification
    fn enabled_by(&self, notify_on: &NotifyOn) -> bool {
        match self {
            Notification::Startup => notify_on.startup,
            Notification::NewArticle { .. } => notify_on.new_news,
            Notification::ConfigUpdated { .. } => notify_on.config_updates,
            Notification::RestartFailed { .. } | Notification::Error { .. } => notify_on.errors,
        }
    }
}

/// A notification sink
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification);
}

/// Writes notifications to the tracing log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) {
        info!("📣 {} - {}", notification.title(), notification.body());
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    title: String,
    body: String,
}

/// POSTs `{title, body}` to every configured URL
pub struct WebhookNotifier {
    client: Client,
    urls: Vec<String>,
}

impl WebhookNotifier {
    pub fn new(urls: Vec<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, urls })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) {
        let payload = WebhookPayload {
            title: notification.title(),
            body: notification.body(),
        };

        for url in &self.urls {
            match self.client.post(url).json(&payload).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!("Notification delivered to {}", url);
                }
                Ok(resp) => {
                    warn!("Webhook {} rejected notification: {}", url, resp.status());
                }
                Err(e) => {
                    warn!("Failed to deliver notification to {}: {}", url, e);
                }
            }
        }
    }
}

/// Fans notifications out to every sink, filtered by `notify_on`
#[derive(Clone)]
pub struct NotificationHub {
    notify_on: NotifyOn,
    sinks: Vec<Arc<dyn Notifier>>,
}

impl NotificationHub {
    pub fn new(notify_on: NotifyOn) -> Self {
        Self {
            notify_on,
            sinks: Vec::new(),
        }
    }

    /// A hub that drops everything
    pub fn disabled() -> Self {
        Self::new(NotifyOn::default())
    }

    pub fn with_sink(mut self, sink: Arc<dyn Notifier>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Log sink plus one webhook sink when URLs are configured
    pub fn from_settings(notify_on: NotifyOn, webhook_urls: &[String]) -> anyhow::Result<Self> {
        if !notify_on.any() {
            info!("Notifications are disabled");
            return Ok(Self::disabled());
        }

        let mut hub = Self::new(notify_on).with_sink(Arc::new(LogNotifier));
        if !webhook_urls.is_empty() {
            hub = hub.with_sink(Arc::new(WebhookNotifier::new(webhook_urls.to_vec())?));
        }
        info!("Notification system initialized");
        Ok(hub)
    }

    pub async fn notify(&self, notification: Notification) {
        if !notification.enabled_by(&self.notify_on) {
            return;
        }
        for sink in &self.sinks {
            sink.notify(&notification).await;
        }
    }
}

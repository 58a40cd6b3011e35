//! Push subscriptions and notification fan-out.
//!
//! Subscriptions are keyed by endpoint and persisted as a JSON map. Delivery
//! goes through a [`Notifier`]; `[push].notifier` picks the backend:
//! `log` only records the notification, `webhook` POSTs the payload as JSON
//! to each subscriber's endpoint.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::PushConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub endpoint: String,
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub url: String,
}

pub struct SubscriptionRegistry {
    path: Option<PathBuf>,
    subs: RwLock<BTreeMap<String, Subscription>>,
    /// Held from mutation until the file is written, so writes land in order.
    persist_lock: Mutex<()>,
}

impl SubscriptionRegistry {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            subs: RwLock::new(BTreeMap::new()),
            persist_lock: Mutex::new(()),
        }
    }

    /// Open the registry at `path`. A missing file is an empty registry.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let subs = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse subscriptions {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read subscriptions {}", path.display()))
            }
        };
        Ok(Self {
            path: Some(path),
            subs: RwLock::new(subs),
            persist_lock: Mutex::new(()),
        })
    }

    /// Add or replace the subscription for its endpoint.
    pub fn add(&self, sub: Subscription) -> Result<()> {
        if sub.endpoint.trim().is_empty() {
            bail!("subscription endpoint must not be empty");
        }
        let _persist = self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = {
            let mut subs = self.subs.write().unwrap_or_else(PoisonError::into_inner);
            subs.insert(sub.endpoint.clone(), sub);
            subs.clone()
        };
        self.persist(&snapshot)
    }

    /// Returns whether a subscription was removed.
    pub fn remove(&self, endpoint: &str) -> Result<bool> {
        let _persist = self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (removed, snapshot) = {
            let mut subs = self.subs.write().unwrap_or_else(PoisonError::into_inner);
            let removed = subs.remove(endpoint).is_some();
            (removed, subs.clone())
        };
        if removed {
            self.persist(&snapshot)?;
        }
        Ok(removed)
    }

    pub fn list(&self) -> Vec<Subscription> {
        self.subs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, subs: &BTreeMap<String, Subscription>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(subs)?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write subscriptions {}", path.display()))
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, sub: &Subscription, notification: &Notification) -> Result<()>;
}

pub fn create_notifier(config: &PushConfig) -> Result<Arc<dyn Notifier>> {
    match config.notifier.as_str() {
        "log" => Ok(Arc::new(LogNotifier)),
        "webhook" => Ok(Arc::new(WebhookNotifier::new()?)),
        other => bail!("Unknown push notifier: {}", other),
    }
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, sub: &Subscription, notification: &Notification) -> Result<()> {
        tracing::info!(
            endpoint = %sub.endpoint,
            title = %notification.title,
            "push notification"
        );
        Ok(())
    }
}

pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, sub: &Subscription, notification: &Notification) -> Result<()> {
        let resp = self
            .client
            .post(&sub.endpoint)
            .json(notification)
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("endpoint returned {}", resp.status());
        }
        Ok(())
    }
}

/// Send `notification` to every subscriber, pausing `delay` between sends.
///
/// Failures do not stop the fan-out; each one is returned as
/// `"<endpoint>: <error>"`.
pub async fn send_to_all(
    registry: &SubscriptionRegistry,
    notifier: &dyn Notifier,
    notification: &Notification,
    delay: Duration,
) -> Vec<String> {
    let subs = registry.list();
    let mut errors = Vec::new();
    for (i, sub) in subs.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Err(e) = notifier.send(sub, notification).await {
            errors.push(format!("{}: {:#}", sub.endpoint, e));
        }
    }
    if !errors.is_empty() {
        tracing::warn!(
            failed = errors.len(),
            total = subs.len(),
            "push delivery errors: {}",
            errors.join("; ")
        );
    }
    errors
}

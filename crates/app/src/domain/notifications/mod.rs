//! Outbound notifications.
//!
//! Delivery is behind the [`NotificationDispatcher`] trait so the commerce
//! services stay ignorant of the transport. Dispatch is always best-effort:
//! callers log failures and move on, a lost notification never rolls back a
//! committed order.

use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;
use tracing::info;

use crate::domain::{buyers::records::BuyerUuid, tenants::records::TenantUuid};

/// How urgently the receiving channel should surface the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// A single message to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub severity: Severity,
    /// Optional in-app destination, e.g. an order detail screen.
    pub deep_link: Option<String>,
}

impl Notification {
    #[must_use]
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            severity: Severity::Info,
            deep_link: None,
        }
    }

    #[must_use]
    pub fn with_deep_link(mut self, deep_link: impl Into<String>) -> Self {
        self.deep_link = Some(deep_link.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("notification channel unavailable: {0}")]
    ChannelUnavailable(String),
}

#[automock]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver a notification to one buyer.
    async fn notify_buyer(
        &self,
        tenant: TenantUuid,
        buyer: BuyerUuid,
        notification: Notification,
    ) -> Result<(), DispatchError>;

    /// Deliver a notification to the tenant's back-office staff.
    async fn notify_admins(
        &self,
        tenant: TenantUuid,
        notification: Notification,
    ) -> Result<(), DispatchError>;
}

/// Dispatcher that only records the notification in the log stream.
///
/// Used when no real channel is configured, and as the default wiring in
/// development.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDispatcher;

#[async_trait]
impl NotificationDispatcher for TracingDispatcher {
    async fn notify_buyer(
        &self,
        tenant: TenantUuid,
        buyer: BuyerUuid,
        notification: Notification,
    ) -> Result<(), DispatchError> {
        info!(
            tenant_uuid = %tenant,
            buyer_uuid = %buyer,
            severity = notification.severity.as_str(),
            title = %notification.title,
            body = %notification.body,
            deep_link = notification.deep_link.as_deref(),
            "buyer notification"
        );

        Ok(())
    }

    async fn notify_admins(
        &self,
        tenant: TenantUuid,
        notification: Notification,
    ) -> Result<(), DispatchError> {
        info!(
            tenant_uuid = %tenant,
            severity = notification.severity.as_str(),
            title = %notification.title,
            body = %notification.body,
            deep_link = notification.deep_link.as_deref(),
            "admin notification"
        );

        Ok(())
    }
}

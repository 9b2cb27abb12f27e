//! Audit sink implementations.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::ports::{AuditError, AuditEvent, AuditSink};

/// Writes audit events as structured log lines under the `audit` target.
///
/// ```text
/// INFO audit: actor=3 action=order_paid subject=2c9f… Order 202406011234 paid by cash
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        info!(
            target: "audit",
            actor = event.actor_id,
            action = %event.action,
            subject = %event.subject,
            at = %event.at.to_rfc3339(),
            "{}",
            event.message
        );
        Ok(())
    }
}

/// Keeps events in memory so callers can inspect them.
#[derive(Debug, Clone, Default)]
pub struct RecordingAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

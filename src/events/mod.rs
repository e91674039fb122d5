//! Append-only audit log of lifecycle transitions.
//!
//! Every component writes here; the only sanctioned read paths are the
//! orchestrator's idempotency check and operator audit queries. Nothing in
//! the engine makes a business decision from the log beyond "was this step
//! already recorded".

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::types::PlanTier;
use crate::store::{EventStore, StoreResult};

/// Kind of a recorded lifecycle step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    GracePeriodStarted,
    PaymentFailureRecorded,
    PaymentRecovered,
    SubscriptionCanceled,
    SubscriptionResumed,
    GracePeriodExpired,
    ContentArchived,
    ContentRestored,
    DeletionScheduled,
    DeletionCanceled,
    DeletionWarningSent,
}

impl EventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GracePeriodStarted => "grace_period_started",
            Self::PaymentFailureRecorded => "payment_failure_recorded",
            Self::PaymentRecovered => "payment_recovered",
            Self::SubscriptionCanceled => "subscription_canceled",
            Self::SubscriptionResumed => "subscription_resumed",
            Self::GracePeriodExpired => "grace_period_expired",
            Self::ContentArchived => "content_archived",
            Self::ContentRestored => "content_restored",
            Self::DeletionScheduled => "deletion_scheduled",
            Self::DeletionCanceled => "deletion_canceled",
            Self::DeletionWarningSent => "deletion_warning_sent",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: EventKind,
    pub prior_plan: Option<PlanTier>,
    pub new_plan: Option<PlanTier>,
    pub correlation_id: String,
    pub metadata: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl LifecycleEvent {
    /// The id derives from `(correlation_id, kind)`, the append dedupe key,
    /// so a replayed step produces the same row id instead of a new one.
    pub fn new(
        account_id: Uuid,
        kind: EventKind,
        correlation_id: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let correlation_id = correlation_id.into();
        let id = Self::derive_id(&correlation_id, kind);
        Self {
            id,
            account_id,
            kind,
            prior_plan: None,
            new_plan: None,
            correlation_id,
            metadata: serde_json::Value::Null,
            recorded_at,
        }
    }

    pub fn with_plans(mut self, prior: Option<PlanTier>, new: Option<PlanTier>) -> Self {
        self.prior_plan = prior;
        self.new_plan = new;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn derive_id(correlation_id: &str, kind: EventKind) -> Uuid {
        let key = format!("{}:{}", correlation_id, kind.as_str());
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
    }
}

/// Write-mostly facade over the event store.
#[derive(Clone)]
pub struct EventLog {
    store: Arc<dyn EventStore>,
}

impl EventLog {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Appends unless the `(correlation_id, kind)` pair is already recorded.
    /// Returns whether a row was written.
    pub async fn record(&self, event: LifecycleEvent) -> StoreResult<bool> {
        let appended = self.store.append(event.clone()).await?;
        if appended {
            tracing::debug!(
                account_id = %event.account_id,
                correlation_id = %event.correlation_id,
                kind = %event.kind,
                "lifecycle event recorded"
            );
        }
        Ok(appended)
    }

    pub async fn step_recorded(&self, correlation_id: &str, kind: EventKind) -> StoreResult<bool> {
        self.store.step_recorded(correlation_id, kind).await
    }

    pub async fn for_correlation(&self, correlation_id: &str) -> StoreResult<Vec<LifecycleEvent>> {
        self.store.events_for_correlation(correlation_id).await
    }

    pub async fn for_account(&self, account_id: Uuid) -> StoreResult<Vec<LifecycleEvent>> {
        self.store.events_for_account(account_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_are_stable_per_step() {
        let a = LifecycleEvent::derive_id("evt_123", EventKind::GracePeriodStarted);
        let b = LifecycleEvent::derive_id("evt_123", EventKind::GracePeriodStarted);
        let c = LifecycleEvent::derive_id("evt_123", EventKind::ContentArchived);
        let d = LifecycleEvent::derive_id("evt_124", EventKind::GracePeriodStarted);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn kind_wire_names() {
        assert_eq!(EventKind::GracePeriodStarted.as_str(), "grace_period_started");
        let json = serde_json::to_string(&EventKind::DeletionWarningSent).unwrap();
        assert_eq!(json, "\"deletion_warning_sent\"");
    }
}

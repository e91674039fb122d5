//! Deletion scheduling.
//!
//! Creates, warns about, and cancels pending deletions of a downgraded
//! account's excess content. Execution of a due deletion belongs to an
//! external sweep; this module only feeds it and keeps "detect" strictly
//! separate from "act".

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::core::clock::Clock;
use crate::core::config::LifecycleConfig;
use crate::core::error::Result;
use crate::core::types::DeletionKind;
use crate::entitlement::Account;
use crate::store::{AccountStore, DeletionStore};

/// A pending, cancellable intent to remove content after a fixed horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledDeletion {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: DeletionKind,
    pub scheduled_for: DateTime<Utc>,
    pub warning_sent_at: Option<DateTime<Utc>>,
    /// Terminal markers; at most one is ever set.
    pub executed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledDeletion {
    pub fn new(
        account_id: Uuid,
        kind: DeletionKind,
        scheduled_for: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            kind,
            scheduled_for,
            warning_sent_at: None,
            executed_at: None,
            canceled_at: None,
            created_at,
        }
    }

    /// Neither executed nor canceled yet.
    pub fn is_active(&self) -> bool {
        self.executed_at.is_none() && self.canceled_at.is_none()
    }
}

pub struct DeletionScheduler {
    deletions: Arc<dyn DeletionStore>,
    accounts: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
}

impl DeletionScheduler {
    pub fn new(
        deletions: Arc<dyn DeletionStore>,
        accounts: Arc<dyn AccountStore>,
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            deletions,
            accounts,
            clock,
            config,
        }
    }

    /// Schedule the storage deletion for a downgraded account.
    ///
    /// Called once at the moment of downgrade, not per payment failure. If an
    /// active record already exists nothing happens and `None` is returned;
    /// otherwise the new record (due in the configured delay) comes back.
    pub async fn schedule(&self, account_id: Uuid) -> Result<Option<ScheduledDeletion>> {
        let now = self.clock.now();
        let record = ScheduledDeletion::new(
            account_id,
            DeletionKind::UserStorage,
            now + self.config.deletion_delay(),
            now,
        );

        if self.deletions.insert_pending(record.clone()).await? {
            debug!(
                account_id = %account_id,
                deletion_id = %record.id,
                scheduled_for = %record.scheduled_for,
                "deletion scheduled"
            );
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    /// Cancel every active storage deletion for the account. A no-op (0)
    /// when none exists.
    pub async fn cancel(&self, account_id: Uuid) -> Result<u32> {
        let now = self.clock.now();
        let canceled = self
            .deletions
            .cancel_active(account_id, DeletionKind::UserStorage, now)
            .await?;

        if canceled > 0 {
            debug!(account_id = %account_id, canceled, "deletion canceled");
        }

        Ok(canceled)
    }

    /// Active, un-warned deletions due within `lead_days`. Read-only: the
    /// warning marker is set separately once the caller confirms delivery,
    /// so a failed notification is simply retried on the next poll.
    pub async fn pending_warnings(&self, lead_days: i64) -> Result<Vec<ScheduledDeletion>> {
        let cutoff = self.clock.now() + chrono::Duration::days(lead_days);
        Ok(self.deletions.due_for_warning(cutoff).await?)
    }

    /// Record that the warning for a deletion was delivered. Returns false
    /// for unknown, terminal, or already-warned records.
    pub async fn mark_warning_sent(&self, deletion_id: Uuid) -> Result<bool> {
        let now = self.clock.now();
        Ok(self.deletions.mark_warning_sent(deletion_id, now).await?)
    }

    /// Accounts whose grace deadline has elapsed and who still hold a paid
    /// plan. Read-only; the periodic sweep acts on the result through the
    /// orchestrator so detection stays independently retryable.
    pub async fn expired_grace_periods(&self) -> Result<Vec<Account>> {
        let now = self.clock.now();
        Ok(self.accounts.accounts_in_expired_grace(now).await?)
    }

    pub async fn active_deletion(&self, account_id: Uuid) -> Result<Option<ScheduledDeletion>> {
        Ok(self
            .deletions
            .active_for_account(account_id, DeletionKind::UserStorage)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::store::MemoryStore;

    fn scheduler(store: &Arc<MemoryStore>, clock: &Arc<ManualClock>) -> DeletionScheduler {
        DeletionScheduler::new(
            store.clone(),
            store.clone(),
            clock.clone(),
            LifecycleConfig::default(),
        )
    }

    #[tokio::test]
    async fn schedule_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let s = scheduler(&store, &clock);
        let account_id = Uuid::new_v4();

        let first = s.schedule(account_id).await.unwrap();
        let record = first.expect("first call creates the record");
        assert_eq!(
            record.scheduled_for,
            clock.now() + chrono::Duration::days(90)
        );

        let second = s.schedule(account_id).await.unwrap();
        assert!(second.is_none());

        let active = s.active_deletion(account_id).await.unwrap().unwrap();
        assert_eq!(active.id, record.id);
    }

    #[tokio::test]
    async fn cancel_tolerates_nothing_to_cancel() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let s = scheduler(&store, &clock);
        let account_id = Uuid::new_v4();

        assert_eq!(s.cancel(account_id).await.unwrap(), 0);

        s.schedule(account_id).await.unwrap();
        assert_eq!(s.cancel(account_id).await.unwrap(), 1);
        assert!(s.active_deletion(account_id).await.unwrap().is_none());

        // Canceled records stay terminal; a new schedule creates a new one.
        let again = s.schedule(account_id).await.unwrap();
        assert!(again.is_some());
    }

    #[tokio::test]
    async fn warning_window_and_marking() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let s = scheduler(&store, &clock);
        let account_id = Uuid::new_v4();

        let record = s.schedule(account_id).await.unwrap().unwrap();

        // 90 days out, nothing is due within a 7-day lead.
        assert!(s.pending_warnings(7).await.unwrap().is_empty());

        clock.advance_days(84);
        let due = s.pending_warnings(7).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, record.id);

        // Listing twice marks nothing.
        assert_eq!(s.pending_warnings(7).await.unwrap().len(), 1);

        assert!(s.mark_warning_sent(record.id).await.unwrap());
        assert!(s.pending_warnings(7).await.unwrap().is_empty());

        // Marking again is a no-op.
        assert!(!s.mark_warning_sent(record.id).await.unwrap());
    }

    #[tokio::test]
    async fn canceled_deletion_never_warns() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let s = scheduler(&store, &clock);
        let account_id = Uuid::new_v4();

        s.schedule(account_id).await.unwrap();
        s.cancel(account_id).await.unwrap();

        clock.advance_days(89);
        assert!(s.pending_warnings(7).await.unwrap().is_empty());
    }
}

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::archival::ContentUnit;
use crate::core::types::{ArchiveReason, DeletionKind, PlanTier, SubscriptionStatus};
use crate::deletion::ScheduledDeletion;
use crate::entitlement::Account;
use crate::events::{EventKind, LifecycleEvent};
use crate::store::{
    AccountStore, ContentStore, DeletionStore, EventStore, StoreError, StoreResult,
};

/// In-memory implementation of every store trait.
///
/// Used by the test suite and the scenario simulator, and suitable for
/// embedding. Each mutating method applies its guard and the write under one
/// lock acquisition, giving the same convergence behavior as the single-row
/// conditional updates a relational backend would use.
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
    account_id_by_ref: RwLock<HashMap<String, Uuid>>,
    units: RwLock<HashMap<Uuid, ContentUnit>>,
    deletions: RwLock<HashMap<Uuid, ScheduledDeletion>>,
    event_keys: RwLock<HashSet<(String, EventKind)>>,
    events: RwLock<Vec<LifecycleEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, account: Account) -> StoreResult<()> {
        let mut id_by_ref = self.account_id_by_ref.write().await;
        if id_by_ref.contains_key(&account.customer_ref) {
            return Err(StoreError::constraint(format!(
                "customer_ref '{}' already exists",
                account.customer_ref
            )));
        }

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.id) {
            return Err(StoreError::constraint(format!(
                "account id {} already exists",
                account.id
            )));
        }

        id_by_ref.insert(account.customer_ref.clone(), account.id);
        accounts.insert(account.id, account);
        Ok(())
    }

    async fn account_by_id(&self, id: Uuid) -> StoreResult<Option<Account>> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn account_by_customer_ref(&self, customer_ref: &str) -> StoreResult<Option<Account>> {
        let id_by_ref = self.account_id_by_ref.read().await;
        let Some(id) = id_by_ref.get(customer_ref) else {
            return Ok(None);
        };
        Ok(self.accounts.read().await.get(id).cloned())
    }

    async fn open_grace_period(
        &self,
        id: Uuid,
        deadline: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut accounts = self.accounts.write().await;
        let Some(account) = accounts.get_mut(&id) else {
            return Ok(false);
        };

        if !account.status.is_paying() || account.grace_deadline.is_some() {
            return Ok(false);
        }

        account.status = SubscriptionStatus::GracePeriod;
        account.grace_deadline = Some(deadline);
        account.updated_at = at;
        Ok(true)
    }

    async fn increment_failure_count(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<u32> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::inconsistent(format!("account {id} disappeared")))?;

        account.failure_count += 1;
        account.updated_at = at;
        Ok(account.failure_count)
    }

    async fn settle_recovery(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut accounts = self.accounts.write().await;
        let Some(account) = accounts.get_mut(&id) else {
            return Ok(false);
        };

        if !account.status.is_paying() {
            return Ok(false);
        }

        account.status = SubscriptionStatus::Active;
        account.failure_count = 0;
        account.grace_deadline = None;
        account.updated_at = at;
        Ok(true)
    }

    async fn apply_downgrade(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut accounts = self.accounts.write().await;
        let Some(account) = accounts.get_mut(&id) else {
            return Ok(false);
        };

        if !account.status.is_paying() {
            return Ok(false);
        }

        account.prior_plan = Some(account.plan);
        account.plan = PlanTier::Free;
        account.status = SubscriptionStatus::Free;
        account.grace_deadline = None;
        account.downgraded_at = Some(at);
        account.updated_at = at;
        Ok(true)
    }

    async fn apply_resume(&self, id: Uuid, plan: PlanTier, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut accounts = self.accounts.write().await;
        let Some(account) = accounts.get_mut(&id) else {
            return Ok(false);
        };

        if !account.status.is_downgraded() {
            return Ok(false);
        }

        account.plan = plan;
        account.status = SubscriptionStatus::Active;
        account.prior_plan = None;
        account.downgraded_at = None;
        account.failure_count = 0;
        account.grace_deadline = None;
        account.updated_at = at;
        Ok(true)
    }

    async fn accounts_in_expired_grace(&self, now: DateTime<Utc>) -> StoreResult<Vec<Account>> {
        let accounts = self.accounts.read().await;
        let mut expired: Vec<Account> = accounts
            .values()
            .filter(|account| {
                account.status == SubscriptionStatus::GracePeriod
                    && account.plan.is_paid()
                    && account.grace_expired(now)
            })
            .cloned()
            .collect();
        expired.sort_by_key(|account| (account.grace_deadline, account.id));
        Ok(expired)
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn insert_unit(&self, unit: ContentUnit) -> StoreResult<()> {
        let mut units = self.units.write().await;
        if units.contains_key(&unit.id) {
            return Err(StoreError::constraint(format!(
                "content unit {} already exists",
                unit.id
            )));
        }
        units.insert(unit.id, unit);
        Ok(())
    }

    async fn units_for_account(&self, account_id: Uuid) -> StoreResult<Vec<ContentUnit>> {
        let units = self.units.read().await;
        let mut owned: Vec<ContentUnit> = units
            .values()
            .filter(|unit| unit.account_id == account_id)
            .cloned()
            .collect();
        owned.sort_by_key(|unit| (unit.created_at, unit.id));
        Ok(owned)
    }

    async fn archive_unit(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        reason: ArchiveReason,
    ) -> StoreResult<bool> {
        let mut units = self.units.write().await;
        let Some(unit) = units.get_mut(&id) else {
            return Ok(false);
        };

        if unit.is_archived() {
            return Ok(false);
        }

        unit.archived_at = Some(at);
        unit.archive_reason = Some(reason);
        Ok(true)
    }

    async fn restore_unit(&self, id: Uuid) -> StoreResult<bool> {
        let mut units = self.units.write().await;
        let Some(unit) = units.get_mut(&id) else {
            return Ok(false);
        };

        if !unit.is_archived() {
            return Ok(false);
        }

        unit.archived_at = None;
        unit.archive_reason = None;
        Ok(true)
    }
}

#[async_trait]
impl DeletionStore for MemoryStore {
    async fn insert_pending(&self, deletion: ScheduledDeletion) -> StoreResult<bool> {
        let mut deletions = self.deletions.write().await;

        let already_active = deletions.values().any(|existing| {
            existing.account_id == deletion.account_id
                && existing.kind == deletion.kind
                && existing.is_active()
        });
        if already_active {
            return Ok(false);
        }

        deletions.insert(deletion.id, deletion);
        Ok(true)
    }

    async fn active_for_account(
        &self,
        account_id: Uuid,
        kind: DeletionKind,
    ) -> StoreResult<Option<ScheduledDeletion>> {
        let deletions = self.deletions.read().await;
        Ok(deletions
            .values()
            .find(|deletion| {
                deletion.account_id == account_id && deletion.kind == kind && deletion.is_active()
            })
            .cloned())
    }

    async fn cancel_active(
        &self,
        account_id: Uuid,
        kind: DeletionKind,
        at: DateTime<Utc>,
    ) -> StoreResult<u32> {
        let mut deletions = self.deletions.write().await;
        let mut canceled = 0u32;
        for deletion in deletions.values_mut() {
            if deletion.account_id == account_id && deletion.kind == kind && deletion.is_active() {
                deletion.canceled_at = Some(at);
                canceled += 1;
            }
        }
        Ok(canceled)
    }

    async fn mark_warning_sent(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut deletions = self.deletions.write().await;
        let Some(deletion) = deletions.get_mut(&id) else {
            return Ok(false);
        };

        if !deletion.is_active() || deletion.warning_sent_at.is_some() {
            return Ok(false);
        }

        deletion.warning_sent_at = Some(at);
        Ok(true)
    }

    async fn due_for_warning(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<ScheduledDeletion>> {
        let deletions = self.deletions.read().await;
        let mut due: Vec<ScheduledDeletion> = deletions
            .values()
            .filter(|deletion| {
                deletion.is_active()
                    && deletion.warning_sent_at.is_none()
                    && deletion.scheduled_for <= cutoff
            })
            .cloned()
            .collect();
        due.sort_by_key(|deletion| (deletion.scheduled_for, deletion.id));
        Ok(due)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append(&self, event: LifecycleEvent) -> StoreResult<bool> {
        // Claim the dedupe key and append under the same key-lock hold so a
        // concurrent duplicate cannot slip between check and write.
        let mut keys = self.event_keys.write().await;
        let key = (event.correlation_id.clone(), event.kind);
        if keys.contains(&key) {
            return Ok(false);
        }

        let mut events = self.events.write().await;
        keys.insert(key);
        events.push(event);
        Ok(true)
    }

    async fn step_recorded(&self, correlation_id: &str, kind: EventKind) -> StoreResult<bool> {
        let keys = self.event_keys.read().await;
        Ok(keys.contains(&(correlation_id.to_string(), kind)))
    }

    async fn events_for_correlation(
        &self,
        correlation_id: &str,
    ) -> StoreResult<Vec<LifecycleEvent>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|event| event.correlation_id == correlation_id)
            .cloned()
            .collect())
    }

    async fn events_for_account(&self, account_id: Uuid) -> StoreResult<Vec<LifecycleEvent>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|event| event.account_id == account_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SubscriptionStatus;
    use chrono::Duration;

    #[tokio::test]
    async fn grace_guard_refuses_second_open() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let account = Account::new("cus_1", PlanTier::Solo, now);
        let id = account.id;
        store.insert_account(account).await.unwrap();

        let first_deadline = now + Duration::days(21);
        assert!(store.open_grace_period(id, first_deadline, now).await.unwrap());

        // A later attempt with a different deadline must not move the window.
        let moved = store
            .open_grace_period(id, now + Duration::days(40), now)
            .await
            .unwrap();
        assert!(!moved);

        let stored = store.account_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.grace_deadline, Some(first_deadline));
    }

    #[tokio::test]
    async fn downgrade_guard_only_fires_for_paying_status() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let account = Account::new("cus_2", PlanTier::Studio, now);
        let id = account.id;
        store.insert_account(account).await.unwrap();

        assert!(store.apply_downgrade(id, now).await.unwrap());
        assert!(!store.apply_downgrade(id, now).await.unwrap());

        let stored = store.account_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Free);
        assert_eq!(stored.prior_plan, Some(PlanTier::Studio));
    }

    #[tokio::test]
    async fn duplicate_customer_ref_is_a_constraint_error() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_account(Account::new("cus_dup", PlanTier::Solo, now))
            .await
            .unwrap();

        let err = store
            .insert_account(Account::new("cus_dup", PlanTier::Solo, now))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[tokio::test]
    async fn event_append_dedupes_per_step() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let account_id = Uuid::new_v4();

        let event = LifecycleEvent::new(account_id, EventKind::GracePeriodStarted, "evt_1", now);
        assert!(store.append(event.clone()).await.unwrap());
        assert!(!store.append(event).await.unwrap());

        // Same correlation, different step: records fine.
        let other = LifecycleEvent::new(account_id, EventKind::ContentArchived, "evt_1", now);
        assert!(store.append(other).await.unwrap());

        assert!(
            store
                .step_recorded("evt_1", EventKind::GracePeriodStarted)
                .await
                .unwrap()
        );
        assert!(
            !store
                .step_recorded("evt_1", EventKind::DeletionScheduled)
                .await
                .unwrap()
        );
        assert_eq!(store.events_for_correlation("evt_1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_appends_converge_to_one_row() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let now = Utc::now();
        let account_id = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let event =
                    LifecycleEvent::new(account_id, EventKind::DeletionScheduled, "evt_race", now);
                store.append(event).await.unwrap()
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(
            store.events_for_correlation("evt_race").await.unwrap().len(),
            1
        );
    }
}

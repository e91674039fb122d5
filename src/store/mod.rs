//! Persistence seam.
//!
//! Every mutating method on these traits is a conditional, idempotent
//! single-row update ("apply only while the guard holds") and reports
//! whether it applied. The backing datastore is the concurrency arbiter;
//! the engine itself takes no locks. A relational backend maps each method
//! onto one guarded `UPDATE .. WHERE` or `INSERT .. ON CONFLICT`; the
//! bundled [`MemoryStore`] honors the same contracts under an async lock.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::archival::ContentUnit;
use crate::core::types::{ArchiveReason, DeletionKind, PlanTier};
use crate::deletion::ScheduledDeletion;
use crate::entitlement::Account;
use crate::events::{EventKind, LifecycleEvent};

pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Inconsistent state: {0}")]
    Inconsistent(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint(message.into())
    }

    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::Inconsistent(message.into())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Account rows. Owned by the entitlement state machine; all writes are
/// status-guarded so concurrent deliveries of the same event converge.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_account(&self, account: Account) -> StoreResult<()>;

    async fn account_by_id(&self, id: Uuid) -> StoreResult<Option<Account>>;

    async fn account_by_customer_ref(&self, customer_ref: &str) -> StoreResult<Option<Account>>;

    /// Move a paying account into its grace period. Applies only while the
    /// grace deadline is null, so repeat failures never extend the window.
    async fn open_grace_period(
        &self,
        id: Uuid,
        deadline: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Unconditional counter bump; the caller runs it only after winning the
    /// per-event append, so duplicates never reach it. Returns the new count.
    async fn increment_failure_count(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<u32>;

    /// Settle a paying account back to active, clearing the failure counter
    /// and grace deadline. Applies only while the status is paying.
    async fn settle_recovery(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Drop a paying account to the free tier, remembering the prior plan
    /// and the downgrade time. Applies only while the status is paying.
    async fn apply_downgrade(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Put a downgraded account back on a paid plan, clearing the downgrade
    /// bookkeeping. Applies only while the status is downgraded.
    async fn apply_resume(&self, id: Uuid, plan: PlanTier, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Accounts whose grace deadline has elapsed and who still hold a paid
    /// plan. Read-only.
    async fn accounts_in_expired_grace(&self, now: DateTime<Utc>) -> StoreResult<Vec<Account>>;
}

/// Content unit rows. Archival flips status, never deletes.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn insert_unit(&self, unit: ContentUnit) -> StoreResult<()>;

    /// All units of an account, ordered by creation time ascending (ties by
    /// id) so selection is deterministic.
    async fn units_for_account(&self, account_id: Uuid) -> StoreResult<Vec<ContentUnit>>;

    /// Applies only while the unit is active; archiving an archived unit is
    /// a no-op returning false.
    async fn archive_unit(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        reason: ArchiveReason,
    ) -> StoreResult<bool>;

    /// Applies only while the unit is archived.
    async fn restore_unit(&self, id: Uuid) -> StoreResult<bool>;
}

/// Scheduled deletion rows. At most one active record per account per kind.
#[async_trait]
pub trait DeletionStore: Send + Sync {
    /// Inserts unless an active (non-executed, non-canceled) record of the
    /// same kind already exists for the account. Returns whether inserted.
    async fn insert_pending(&self, deletion: ScheduledDeletion) -> StoreResult<bool>;

    async fn active_for_account(
        &self,
        account_id: Uuid,
        kind: DeletionKind,
    ) -> StoreResult<Option<ScheduledDeletion>>;

    /// Cancels every active record of the kind for the account. Returns the
    /// number canceled (0 is a valid no-op).
    async fn cancel_active(
        &self,
        account_id: Uuid,
        kind: DeletionKind,
        at: DateTime<Utc>,
    ) -> StoreResult<u32>;

    /// Applies only while the record is active and not yet warned.
    async fn mark_warning_sent(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Active, un-warned records scheduled at or before the cutoff.
    /// Read-only; marking is the caller's explicit second step.
    async fn due_for_warning(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<ScheduledDeletion>>;
}

/// Append-only audit rows, deduplicated per `(correlation_id, kind)`.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends unless the `(correlation_id, kind)` pair is already present.
    /// Returns whether a row was written.
    async fn append(&self, event: LifecycleEvent) -> StoreResult<bool>;

    async fn step_recorded(&self, correlation_id: &str, kind: EventKind) -> StoreResult<bool>;

    async fn events_for_correlation(
        &self,
        correlation_id: &str,
    ) -> StoreResult<Vec<LifecycleEvent>>;

    async fn events_for_account(&self, account_id: Uuid) -> StoreResult<Vec<LifecycleEvent>>;
}

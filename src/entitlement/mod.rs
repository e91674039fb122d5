//! Entitlement state machine.
//!
//! Owns the subscription status of every account; the authoritative answer
//! to "is this account currently paying". All transitions are expressed as
//! guarded store updates so duplicate and concurrent deliveries converge.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::core::clock::Clock;
use crate::core::config::LifecycleConfig;
use crate::core::error::{LifecycleError, Result};
use crate::core::types::{PlanTier, SubscriptionStatus};
use crate::store::AccountStore;

/// One customer account row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// Stable key issued by the billing provider.
    pub customer_ref: String,
    pub plan: PlanTier,
    pub status: SubscriptionStatus,
    pub failure_count: u32,
    /// Non-null exactly while the status is `grace_period`.
    pub grace_deadline: Option<DateTime<Utc>>,
    /// Plan held before the last downgrade; non-null while downgraded.
    pub prior_plan: Option<PlanTier>,
    pub downgraded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(customer_ref: impl Into<String>, plan: PlanTier, now: DateTime<Utc>) -> Self {
        let status = if plan.is_paid() {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Free
        };
        Self {
            id: Uuid::new_v4(),
            customer_ref: customer_ref.into(),
            plan,
            status,
            failure_count: 0,
            grace_deadline: None,
            prior_plan: None,
            downgraded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn grace_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.grace_deadline, Some(deadline) if deadline <= now)
    }
}

/// Result of one state-machine operation.
///
/// `applied == false` means the guarded update found the account already
/// past this transition (another delivery or instance got there first); the
/// caller treats that as convergence, not failure.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub from_status: SubscriptionStatus,
    pub to_status: SubscriptionStatus,
    pub from_plan: PlanTier,
    pub to_plan: PlanTier,
    pub applied: bool,
    pub failure_count: Option<u32>,
    pub grace_deadline: Option<DateTime<Utc>>,
}

pub struct EntitlementMachine {
    accounts: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
}

impl EntitlementMachine {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            accounts,
            clock,
            config,
        }
    }

    /// Look up an account by the billing provider's customer reference.
    /// An unresolvable reference is surfaced, never retried here.
    pub async fn resolve(&self, customer_ref: &str) -> Result<Account> {
        self.accounts
            .account_by_customer_ref(customer_ref)
            .await?
            .ok_or_else(|| LifecycleError::account_not_found(customer_ref))
    }

    /// Record a payment failure. The first failure of an episode opens the
    /// grace period (deadline = now + configured window, set once via the
    /// store guard); repeat failures leave the window untouched. `applied`
    /// reports whether this call opened the episode. Counting the failure is
    /// [`count_failure`](Self::count_failure), a separate step the caller
    /// gates on its own idempotency claim.
    pub async fn record_payment_failure(&self, account: &Account) -> Result<Transition> {
        if !account.status.is_paying() {
            return Err(LifecycleError::policy_violation(format!(
                "payment failure for non-paying account {} (status {})",
                account.id, account.status
            )));
        }

        let now = self.clock.now();
        let proposed = now + self.config.grace_period();
        let opened = self
            .accounts
            .open_grace_period(account.id, proposed, now)
            .await?;

        // If the guard did not fire the episode deadline is whatever an
        // earlier failure wrote; the pre-read value covers the repeat case.
        let deadline = if opened {
            proposed
        } else {
            account.grace_deadline.unwrap_or(proposed)
        };

        debug!(
            account_id = %account.id,
            opened_grace = opened,
            deadline = %deadline,
            "payment failure noted"
        );

        Ok(Transition {
            from_status: account.status,
            to_status: SubscriptionStatus::GracePeriod,
            from_plan: account.plan,
            to_plan: account.plan,
            applied: opened,
            failure_count: None,
            grace_deadline: Some(deadline),
        })
    }

    /// Bump the failure counter. The bump itself is unconditional; callers
    /// gate it on winning the per-event append so duplicate deliveries never
    /// double-count. Returns the new count.
    pub async fn count_failure(&self, account: &Account) -> Result<u32> {
        let now = self.clock.now();
        let failure_count = self.accounts.increment_failure_count(account.id, now).await?;

        debug!(account_id = %account.id, failure_count, "payment failure counted");

        Ok(failure_count)
    }

    /// Settle a recovered payment: back to active, counter and deadline
    /// cleared.
    pub async fn settle_recovery(&self, account: &Account) -> Result<Transition> {
        if !account.status.is_paying() {
            return Err(LifecycleError::policy_violation(format!(
                "payment recovery for non-paying account {} (status {})",
                account.id, account.status
            )));
        }

        let now = self.clock.now();
        let applied = self.accounts.settle_recovery(account.id, now).await?;

        debug!(account_id = %account.id, applied, "payment recovery settled");

        Ok(Transition {
            from_status: account.status,
            to_status: SubscriptionStatus::Active,
            from_plan: account.plan,
            to_plan: account.plan,
            applied,
            failure_count: Some(0),
            grace_deadline: None,
        })
    }

    /// Sweep-driven expiry: grace period elapsed, drop to the free tier.
    /// Returns `applied == false` when another sweep instance already did it.
    pub async fn expire_grace(&self, account: &Account) -> Result<Transition> {
        let now = self.clock.now();

        if account.status.is_downgraded() {
            return Ok(self.noop_downgrade(account));
        }

        if account.status != SubscriptionStatus::GracePeriod {
            return Err(LifecycleError::policy_violation(format!(
                "grace expiry for account {} without an open grace period (status {})",
                account.id, account.status
            )));
        }

        if !account.grace_expired(now) {
            return Err(LifecycleError::policy_violation(format!(
                "grace period for account {} has not elapsed",
                account.id
            )));
        }

        let applied = self.accounts.apply_downgrade(account.id, now).await?;

        debug!(account_id = %account.id, applied, "grace period expired");

        Ok(Transition {
            from_status: account.status,
            to_status: SubscriptionStatus::Free,
            from_plan: account.plan,
            to_plan: PlanTier::Free,
            applied,
            failure_count: None,
            grace_deadline: None,
        })
    }

    /// Explicit cancellation: drop to free immediately, bypassing any
    /// remaining grace window.
    pub async fn cancel_now(&self, account: &Account) -> Result<Transition> {
        if account.status.is_downgraded() {
            return Ok(self.noop_downgrade(account));
        }

        let now = self.clock.now();
        let applied = self.accounts.apply_downgrade(account.id, now).await?;

        debug!(account_id = %account.id, applied, "subscription canceled");

        Ok(Transition {
            from_status: account.status,
            to_status: SubscriptionStatus::Free,
            from_plan: account.plan,
            to_plan: PlanTier::Free,
            applied,
            failure_count: None,
            grace_deadline: None,
        })
    }

    /// Resubscription onto a paid plan after a downgrade.
    pub async fn resume(&self, account: &Account, new_plan: PlanTier) -> Result<Transition> {
        if !new_plan.is_paid() {
            return Err(LifecycleError::policy_violation(format!(
                "resume for account {} onto non-paid plan {}",
                account.id, new_plan
            )));
        }

        if account.status.is_paying() {
            return Err(LifecycleError::policy_violation(format!(
                "resume for account {} that is already paying (status {})",
                account.id, account.status
            )));
        }

        if account.prior_plan.is_none() && account.downgraded_at.is_none() {
            return Err(LifecycleError::policy_violation(format!(
                "resume for account {} with no downgrade record",
                account.id
            )));
        }

        let now = self.clock.now();
        let applied = self.accounts.apply_resume(account.id, new_plan, now).await?;

        debug!(account_id = %account.id, plan = %new_plan, applied, "subscription resumed");

        Ok(Transition {
            from_status: account.status,
            to_status: SubscriptionStatus::Active,
            from_plan: account.plan,
            to_plan: new_plan,
            applied,
            failure_count: Some(0),
            grace_deadline: None,
        })
    }

    fn noop_downgrade(&self, account: &Account) -> Transition {
        Transition {
            from_status: account.status,
            to_status: account.status,
            from_plan: account.plan,
            to_plan: account.plan,
            applied: false,
            failure_count: None,
            grace_deadline: None,
        }
    }
}

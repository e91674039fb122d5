//! Lifecycle orchestrator.
//!
//! The single entry point for every external billing event and for the
//! time-driven sweeps. Sequences the state machine, archival policy, and
//! deletion scheduler into a cascade whose steps are individually idempotent:
//! each step is recorded as its own `(correlation_id, EventKind)` audit event
//! and a step whose event already exists is skipped, so re-invoking an entry
//! point after a crash resumes exactly the missing steps.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::archival::ArchivalPolicy;
use crate::core::clock::Clock;
use crate::core::config::LifecycleConfig;
use crate::core::error::{LifecycleError, Result};
use crate::core::types::{ArchiveReason, PlanTier, SubscriptionStatus};
use crate::deletion::{DeletionScheduler, ScheduledDeletion};
use crate::entitlement::{Account, EntitlementMachine};
use crate::events::{EventKind, EventLog, LifecycleEvent};
use crate::external::{
    BillingProvider, DirectoryService, LogDirectory, LogNotifier, NotificationSender,
};
use crate::store::{AccountStore, ContentStore, DeletionStore, EventStore};

/// What one entry-point invocation did.
///
/// Counts cover this invocation only; a replay that found every step already
/// recorded reports the account's current state with `already_processed` set
/// and all counts zero.
#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    pub account_id: Uuid,
    pub correlation_id: String,
    pub already_processed: bool,
    pub status: SubscriptionStatus,
    pub plan: PlanTier,
    pub failure_count: u32,
    pub archived: u32,
    pub restored: u32,
    pub deletion_scheduled: bool,
    pub deletions_canceled: u32,
}

/// Tally of one grace-period sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub downgraded: usize,
    pub already_processed: usize,
    pub failed: usize,
}

/// Tally of one warning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarningReport {
    pub examined: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Which downgrade path triggered a cascade. Decides the transition event
/// kind and the archive reason stamped onto shed content.
#[derive(Debug, Clone, Copy)]
enum DowngradeTrigger {
    Canceled,
    GraceExpired,
}

impl DowngradeTrigger {
    fn event_kind(self) -> EventKind {
        match self {
            Self::Canceled => EventKind::SubscriptionCanceled,
            Self::GraceExpired => EventKind::GracePeriodExpired,
        }
    }

    fn archive_reason(self) -> ArchiveReason {
        match self {
            Self::Canceled => ArchiveReason::Downgrade,
            Self::GraceExpired => ArchiveReason::PaymentFailed,
        }
    }
}

pub struct LifecycleOrchestrator {
    machine: EntitlementMachine,
    archival: ArchivalPolicy,
    scheduler: DeletionScheduler,
    log: EventLog,
    accounts: Arc<dyn AccountStore>,
    notifier: Arc<dyn NotificationSender>,
    directory: Arc<dyn DirectoryService>,
    billing: Option<Arc<dyn BillingProvider>>,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
}

impl LifecycleOrchestrator {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        content: Arc<dyn ContentStore>,
        deletions: Arc<dyn DeletionStore>,
        events: Arc<dyn EventStore>,
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            machine: EntitlementMachine::new(accounts.clone(), clock.clone(), config.clone()),
            archival: ArchivalPolicy::new(content, clock.clone()),
            scheduler: DeletionScheduler::new(
                deletions,
                accounts.clone(),
                clock.clone(),
                config.clone(),
            ),
            log: EventLog::new(events),
            accounts,
            notifier: Arc::new(LogNotifier),
            directory: Arc::new(LogDirectory),
            billing: None,
            clock,
            config,
        }
    }

    /// Build over a single backend implementing all four store traits, such
    /// as the bundled [`MemoryStore`](crate::store::MemoryStore).
    pub fn with_store<S>(store: Arc<S>, clock: Arc<dyn Clock>, config: LifecycleConfig) -> Self
    where
        S: AccountStore + ContentStore + DeletionStore + EventStore + 'static,
    {
        Self::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            clock,
            config,
        )
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSender>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn DirectoryService>) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_billing_provider(mut self, billing: Arc<dyn BillingProvider>) -> Self {
        self.billing = Some(billing);
        self
    }

    /// Payment failure webhook. Opens the grace period on the first failure
    /// of an episode; repeat failures never move the deadline. The
    /// `PaymentFailureRecorded` append is the idempotency claim for the
    /// counter: only the delivery that wins the append counts the failure,
    /// so concurrent duplicates converge on one increment.
    pub async fn on_payment_failed(
        &self,
        customer_ref: &str,
        correlation_id: &str,
    ) -> Result<CascadeOutcome> {
        let account = self.machine.resolve(customer_ref).await?;

        if self
            .log
            .step_recorded(correlation_id, EventKind::PaymentFailureRecorded)
            .await?
        {
            debug!(account_id = %account.id, correlation_id, "duplicate failure event ignored");
            return Ok(Self::replayed(&account, correlation_id));
        }

        let transition = match self.machine.record_payment_failure(&account).await {
            Ok(transition) => transition,
            Err(LifecycleError::PolicyViolation(reason)) => {
                warn!(account_id = %account.id, correlation_id, %reason, "out-of-order event ignored");
                return Ok(Self::outcome_base(&account, correlation_id));
            }
            Err(err) => return Err(err),
        };

        // `applied` comes from the store guard, so exactly one delivery per
        // episode writes the GracePeriodStarted row even when failures with
        // distinct correlation ids race.
        let mut completed = 0usize;
        if transition.applied {
            let event = LifecycleEvent::new(
                account.id,
                EventKind::GracePeriodStarted,
                correlation_id,
                self.clock.now(),
            )
            .with_plans(Some(account.plan), Some(account.plan))
            .with_metadata(json!({ "deadline": transition.grace_deadline }));
            self.record_step(event, correlation_id, &mut completed)
                .await?;
        }

        let claim = LifecycleEvent::new(
            account.id,
            EventKind::PaymentFailureRecorded,
            correlation_id,
            self.clock.now(),
        )
        .with_plans(Some(account.plan), Some(account.plan))
        .with_metadata(json!({ "deadline": transition.grace_deadline }));
        let won = self
            .log
            .record(claim)
            .await
            .map_err(|err| LifecycleError::partial_cascade(correlation_id, completed, err.into()))?;
        if !won {
            debug!(account_id = %account.id, correlation_id, "duplicate failure event ignored");
            return Ok(Self::replayed(&account, correlation_id));
        }
        completed += 1;

        let failure_count = self
            .machine
            .count_failure(&account)
            .await
            .map_err(|err| LifecycleError::partial_cascade(correlation_id, completed, err))?;

        self.push_entitlement(account.id).await;

        let mut outcome = Self::outcome_base(&account, correlation_id);
        outcome.status = transition.to_status;
        outcome.failure_count = failure_count;
        Ok(outcome)
    }

    /// Payment recovery webhook. Settles the account back to active and
    /// clears the grace episode. Optionally re-verifies with the billing
    /// provider first when so configured.
    pub async fn on_payment_recovered(
        &self,
        customer_ref: &str,
        correlation_id: &str,
    ) -> Result<CascadeOutcome> {
        let account = self.machine.resolve(customer_ref).await?;

        if self
            .log
            .step_recorded(correlation_id, EventKind::PaymentRecovered)
            .await?
        {
            debug!(account_id = %account.id, correlation_id, "duplicate recovery event ignored");
            return Ok(Self::replayed(&account, correlation_id));
        }

        if self.config.verify_recovery {
            if let Some(billing) = &self.billing {
                match billing.verify_subscription(customer_ref).await {
                    Ok(subscription) if !subscription.paying => {
                        warn!(
                            account_id = %account.id,
                            correlation_id,
                            "provider reports non-paying; recovery ignored"
                        );
                        return Ok(Self::outcome_base(&account, correlation_id));
                    }
                    Ok(_) => {}
                    Err(err) => {
                        // Verification is advisory; the webhook remains the
                        // trigger of record.
                        warn!(
                            account_id = %account.id,
                            error = %err,
                            "recovery re-verification unavailable, proceeding"
                        );
                    }
                }
            }
        }

        let transition = match self.machine.settle_recovery(&account).await {
            Ok(transition) => transition,
            Err(LifecycleError::PolicyViolation(reason)) => {
                warn!(account_id = %account.id, correlation_id, %reason, "out-of-order event ignored");
                return Ok(Self::outcome_base(&account, correlation_id));
            }
            Err(err) => return Err(err),
        };

        let mut completed = 0usize;
        let event = LifecycleEvent::new(
            account.id,
            EventKind::PaymentRecovered,
            correlation_id,
            self.clock.now(),
        )
        .with_plans(Some(account.plan), Some(account.plan))
        .with_metadata(json!({ "cleared_failures": account.failure_count }));
        self.record_step(event, correlation_id, &mut completed)
            .await?;

        self.push_entitlement(account.id).await;

        info!(account_id = %account.id, correlation_id, "payment recovered");

        let mut outcome = Self::outcome_base(&account, correlation_id);
        outcome.status = transition.to_status;
        outcome.failure_count = 0;
        Ok(outcome)
    }

    /// Explicit cancellation webhook. Downgrades immediately, bypassing any
    /// remaining grace window, then runs the downgrade cascade.
    pub async fn on_subscription_canceled(
        &self,
        customer_ref: &str,
        correlation_id: &str,
    ) -> Result<CascadeOutcome> {
        let account = self.machine.resolve(customer_ref).await?;
        let outcome = self
            .downgrade_cascade(&account, correlation_id, DowngradeTrigger::Canceled)
            .await?;

        if !outcome.already_processed {
            // Fire-and-forget; delivery failure never unwinds the cascade.
            if let Err(err) = self.notifier.send_cancellation_notice(&account).await {
                warn!(account_id = %account.id, error = %err, "cancellation notice failed");
            }
        }

        Ok(outcome)
    }

    /// Resubscription webhook. Restores a downgraded account onto `new_plan`:
    /// the pending deletion is canceled first so no execution race can remove
    /// content mid-restore, then every archived unit comes back.
    pub async fn on_subscription_resumed(
        &self,
        customer_ref: &str,
        correlation_id: &str,
        new_plan: PlanTier,
    ) -> Result<CascadeOutcome> {
        let account = self.machine.resolve(customer_ref).await?;

        let resume_done = self
            .log
            .step_recorded(correlation_id, EventKind::SubscriptionResumed)
            .await?;
        let cancel_done = self
            .log
            .step_recorded(correlation_id, EventKind::DeletionCanceled)
            .await?;
        let restore_done = self
            .log
            .step_recorded(correlation_id, EventKind::ContentRestored)
            .await?;

        if resume_done && cancel_done && restore_done {
            debug!(account_id = %account.id, correlation_id, "duplicate resume event ignored");
            return Ok(Self::replayed(&account, correlation_id));
        }

        let mut completed = 0usize;
        let mut outcome = Self::outcome_base(&account, correlation_id);

        if !resume_done {
            let transition = match self.machine.resume(&account, new_plan).await {
                Ok(transition) => transition,
                Err(LifecycleError::PolicyViolation(reason)) => {
                    warn!(account_id = %account.id, correlation_id, %reason, "out-of-order event ignored");
                    return Ok(outcome);
                }
                Err(err) => return Err(err),
            };

            let event = LifecycleEvent::new(
                account.id,
                EventKind::SubscriptionResumed,
                correlation_id,
                self.clock.now(),
            )
            .with_plans(Some(transition.from_plan), Some(transition.to_plan))
            .with_metadata(json!({ "previously_held": account.prior_plan }));
            self.record_step(event, correlation_id, &mut completed)
                .await?;

            outcome.status = transition.to_status;
            outcome.plan = transition.to_plan;
            outcome.failure_count = 0;
        }

        if !cancel_done {
            let canceled = self
                .scheduler
                .cancel(account.id)
                .await
                .map_err(|err| LifecycleError::partial_cascade(correlation_id, completed, err))?;

            let event = LifecycleEvent::new(
                account.id,
                EventKind::DeletionCanceled,
                correlation_id,
                self.clock.now(),
            )
            .with_metadata(json!({ "canceled": canceled }));
            self.record_step(event, correlation_id, &mut completed)
                .await?;

            outcome.deletions_canceled = canceled;
        }

        if !restore_done {
            let restored = self
                .archival
                .restore_all(account.id)
                .await
                .map_err(|err| LifecycleError::partial_cascade(correlation_id, completed, err))?;

            let event = LifecycleEvent::new(
                account.id,
                EventKind::ContentRestored,
                correlation_id,
                self.clock.now(),
            )
            .with_metadata(json!({ "restored": restored }));
            self.record_step(event, correlation_id, &mut completed)
                .await?;

            outcome.restored = restored;
        }

        self.push_entitlement(account.id).await;

        info!(
            account_id = %account.id,
            correlation_id,
            plan = %new_plan,
            restored = outcome.restored,
            "subscription resumed"
        );

        Ok(outcome)
    }

    /// Time-driven sweep: downgrade every account whose grace deadline has
    /// elapsed. Each account runs the same cascade as an explicit downgrade
    /// under the synthetic correlation id `sweep:<date>:<account_id>`, so a
    /// sweep rerun (or a concurrent instance) converges per account. One
    /// account's failure does not abort the rest.
    pub async fn run_grace_period_sweep(&self) -> Result<SweepReport> {
        let expired = self.scheduler.expired_grace_periods().await?;
        let mut report = SweepReport::default();

        for account in expired {
            report.examined += 1;
            let correlation_id = format!(
                "sweep:{}:{}",
                self.clock.now().format("%Y-%m-%d"),
                account.id
            );

            match self
                .downgrade_cascade(&account, &correlation_id, DowngradeTrigger::GraceExpired)
                .await
            {
                Ok(outcome) if outcome.already_processed => report.already_processed += 1,
                Ok(outcome) => {
                    info!(
                        account_id = %account.id,
                        archived = outcome.archived,
                        "grace period expired, account downgraded"
                    );
                    report.downgraded += 1;
                }
                Err(err) => {
                    warn!(
                        account_id = %account.id,
                        error = %err,
                        "sweep downgrade failed, next run retries"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Poll-and-notify pass over deletions due within `lead_days`. The
    /// warning marker is set only after the notifier confirms delivery, so a
    /// failed send is retried on the next pass.
    pub async fn run_warning_pass(&self, lead_days: i64) -> Result<WarningReport> {
        let due = self.scheduler.pending_warnings(lead_days).await?;
        let mut report = WarningReport::default();

        for deletion in due {
            report.examined += 1;

            let account = match self.accounts.account_by_id(deletion.account_id).await? {
                Some(account) => account,
                None => {
                    warn!(
                        deletion_id = %deletion.id,
                        account_id = %deletion.account_id,
                        "deletion refers to a missing account"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            match self.notifier.send_deletion_warning(&account, &deletion).await {
                Ok(()) => {
                    if self.scheduler.mark_warning_sent(deletion.id).await? {
                        let event = LifecycleEvent::new(
                            account.id,
                            EventKind::DeletionWarningSent,
                            format!("warning:{}", deletion.id),
                            self.clock.now(),
                        )
                        .with_metadata(json!({ "scheduled_for": deletion.scheduled_for }));
                        self.log.record(event).await?;
                    }
                    report.sent += 1;
                }
                Err(err) => {
                    warn!(
                        deletion_id = %deletion.id,
                        account_id = %account.id,
                        error = %err,
                        "deletion warning failed, marker left unset"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Active, un-warned deletions due within `lead_days`. Read-only.
    pub async fn list_pending_deletion_warnings(
        &self,
        lead_days: i64,
    ) -> Result<Vec<ScheduledDeletion>> {
        self.scheduler.pending_warnings(lead_days).await
    }

    /// Record confirmed delivery of a deletion warning.
    pub async fn mark_warning_sent(&self, deletion_id: Uuid) -> Result<bool> {
        self.scheduler.mark_warning_sent(deletion_id).await
    }

    /// Audit trail for one account, for operator tooling.
    pub async fn events_for_account(&self, account_id: Uuid) -> Result<Vec<LifecycleEvent>> {
        Ok(self.log.for_account(account_id).await?)
    }

    /// Account lookup by billing-provider customer reference.
    pub async fn account(&self, customer_ref: &str) -> Result<Account> {
        self.machine.resolve(customer_ref).await
    }

    async fn downgrade_cascade(
        &self,
        account: &Account,
        correlation_id: &str,
        trigger: DowngradeTrigger,
    ) -> Result<CascadeOutcome> {
        let transition_kind = trigger.event_kind();
        let transition_done = self.log.step_recorded(correlation_id, transition_kind).await?;
        let archive_done = self
            .log
            .step_recorded(correlation_id, EventKind::ContentArchived)
            .await?;
        let schedule_done = self
            .log
            .step_recorded(correlation_id, EventKind::DeletionScheduled)
            .await?;

        if transition_done && archive_done && schedule_done {
            debug!(account_id = %account.id, correlation_id, "duplicate downgrade event ignored");
            return Ok(Self::replayed(account, correlation_id));
        }

        let mut completed = 0usize;
        let mut outcome = Self::outcome_base(account, correlation_id);

        if !transition_done {
            let transition = match trigger {
                DowngradeTrigger::Canceled => self.machine.cancel_now(account).await,
                DowngradeTrigger::GraceExpired => self.machine.expire_grace(account).await,
            };
            let transition = match transition {
                Ok(transition) => transition,
                Err(LifecycleError::PolicyViolation(reason)) => {
                    warn!(account_id = %account.id, correlation_id, %reason, "out-of-order event ignored");
                    return Ok(outcome);
                }
                Err(err) => return Err(err),
            };

            let event = LifecycleEvent::new(
                account.id,
                transition_kind,
                correlation_id,
                self.clock.now(),
            )
            .with_plans(Some(transition.from_plan), Some(transition.to_plan))
            .with_metadata(json!({
                "from_status": transition.from_status,
                "to_status": transition.to_status,
            }));
            self.record_step(event, correlation_id, &mut completed)
                .await?;

            outcome.status = transition.to_status;
            outcome.plan = transition.to_plan;
        }

        // Archival before scheduling: losing entitlement is the higher
        // priority guarantee, so shed content even if scheduling then fails.
        if !archive_done {
            let archived = self
                .archival
                .archive_for_downgrade(
                    account.id,
                    PlanTier::Free.unit_limit(),
                    None,
                    trigger.archive_reason(),
                )
                .await
                .map_err(|err| LifecycleError::partial_cascade(correlation_id, completed, err))?;

            let event = LifecycleEvent::new(
                account.id,
                EventKind::ContentArchived,
                correlation_id,
                self.clock.now(),
            )
            .with_metadata(json!({
                "archived": archived,
                "reason": trigger.archive_reason(),
            }));
            self.record_step(event, correlation_id, &mut completed)
                .await?;

            outcome.archived = archived;
        }

        if !schedule_done {
            let scheduled = self
                .scheduler
                .schedule(account.id)
                .await
                .map_err(|err| LifecycleError::partial_cascade(correlation_id, completed, err))?;

            let event = LifecycleEvent::new(
                account.id,
                EventKind::DeletionScheduled,
                correlation_id,
                self.clock.now(),
            )
            .with_metadata(match &scheduled {
                Some(record) => json!({
                    "deletion_id": record.id,
                    "scheduled_for": record.scheduled_for,
                }),
                None => json!({ "existing_record": true }),
            });
            self.record_step(event, correlation_id, &mut completed)
                .await?;

            outcome.deletion_scheduled = scheduled.is_some();
        }

        self.push_entitlement(account.id).await;

        Ok(outcome)
    }

    /// Append one cascade-step event, mapping a write failure to a
    /// retryable partial-cascade error once earlier steps have committed.
    async fn record_step(
        &self,
        event: LifecycleEvent,
        correlation_id: &str,
        completed: &mut usize,
    ) -> Result<()> {
        self.log
            .record(event)
            .await
            .map_err(|err| LifecycleError::partial_cascade(correlation_id, *completed, err.into()))?;
        *completed += 1;
        Ok(())
    }

    /// Push the current plan/status to the directory copy. Never fails the
    /// operation: the directory is non-authoritative and catches up on the
    /// next change.
    async fn push_entitlement(&self, account_id: Uuid) {
        let account = match self.accounts.account_by_id(account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => return,
            Err(err) => {
                warn!(%account_id, error = %err, "entitlement push skipped, account read failed");
                return;
            }
        };

        if let Err(err) = self
            .directory
            .push_entitlement(account.id, account.plan, account.status)
            .await
        {
            warn!(account_id = %account.id, error = %err, "entitlement push failed, directory copy stale");
        }
    }

    fn outcome_base(account: &Account, correlation_id: &str) -> CascadeOutcome {
        CascadeOutcome {
            account_id: account.id,
            correlation_id: correlation_id.to_string(),
            already_processed: false,
            status: account.status,
            plan: account.plan,
            failure_count: account.failure_count,
            archived: 0,
            restored: 0,
            deletion_scheduled: false,
            deletions_canceled: 0,
        }
    }

    fn replayed(account: &Account, correlation_id: &str) -> CascadeOutcome {
        CascadeOutcome {
            already_processed: true,
            ..Self::outcome_base(account, correlation_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::store::MemoryStore;

    async fn setup(plan: PlanTier) -> (Arc<MemoryStore>, Arc<ManualClock>, LifecycleOrchestrator) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let orchestrator = LifecycleOrchestrator::with_store(
            store.clone(),
            clock.clone(),
            LifecycleConfig::default(),
        );
        let account = Account::new("cus_orch", plan, clock.now());
        store.insert_account(account).await.unwrap();
        (store, clock, orchestrator)
    }

    #[tokio::test]
    async fn unknown_customer_ref_is_surfaced() {
        let (_store, _clock, orchestrator) = setup(PlanTier::Solo).await;

        let err = orchestrator
            .on_payment_failed("cus_missing", "evt_1")
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn cancellation_records_all_three_steps() {
        let (store, _clock, orchestrator) = setup(PlanTier::Studio).await;

        let outcome = orchestrator
            .on_subscription_canceled("cus_orch", "evt_cancel")
            .await
            .unwrap();
        assert!(!outcome.already_processed);
        assert_eq!(outcome.status, SubscriptionStatus::Free);
        assert!(outcome.deletion_scheduled);

        let events = store.events_for_correlation("evt_cancel").await.unwrap();
        let kinds: Vec<EventKind> = events.iter().map(|event| event.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::SubscriptionCanceled,
                EventKind::ContentArchived,
                EventKind::DeletionScheduled,
            ]
        );
    }

    #[tokio::test]
    async fn resume_without_downgrade_is_absorbed() {
        let (_store, _clock, orchestrator) = setup(PlanTier::Free).await;

        let outcome = orchestrator
            .on_subscription_resumed("cus_orch", "evt_resume", PlanTier::Solo)
            .await
            .unwrap();
        assert!(!outcome.already_processed);
        assert_eq!(outcome.status, SubscriptionStatus::Free);
        assert_eq!(outcome.restored, 0);
    }

    #[tokio::test]
    async fn sweep_ignores_accounts_still_in_window() {
        let (_store, clock, orchestrator) = setup(PlanTier::Solo).await;

        orchestrator
            .on_payment_failed("cus_orch", "evt_fail")
            .await
            .unwrap();

        clock.advance_days(5);
        let report = orchestrator.run_grace_period_sweep().await.unwrap();
        assert_eq!(report, SweepReport::default());

        clock.advance_days(17);
        let report = orchestrator.run_grace_period_sweep().await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.downgraded, 1);

        // A concurrent or repeated run the same day converges as replay.
        let again = orchestrator.run_grace_period_sweep().await.unwrap();
        assert_eq!(again.examined, 0);
    }
}

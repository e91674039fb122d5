//! Deletion scheduling, warning window, and notification retry semantics.

use std::sync::Arc;

use chrono::Duration;
use fotolio_lifecycle::external::test::RecordingNotifier;
use fotolio_lifecycle::prelude::*;
use uuid::Uuid;

struct Harness {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    engine: LifecycleOrchestrator,
    notifier: Arc<RecordingNotifier>,
    account_id: Uuid,
}

async fn downgraded_harness(units: usize) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::starting_now());
    let notifier = Arc::new(RecordingNotifier::new());
    let engine =
        LifecycleOrchestrator::with_store(store.clone(), clock.clone(), LifecycleConfig::default())
            .with_notifier(notifier.clone());

    let account = Account::new("cus_sched", PlanTier::Solo, clock.now());
    let account_id = account.id;
    store.insert_account(account).await.unwrap();
    for i in 0..units {
        store
            .insert_unit(ContentUnit::new(
                account_id,
                format!("gallery-{i}"),
                clock.now(),
            ))
            .await
            .unwrap();
    }
    engine
        .on_subscription_canceled("cus_sched", "evt_cancel")
        .await
        .unwrap();

    Harness {
        store,
        clock,
        engine,
        notifier,
        account_id,
    }
}

#[tokio::test]
async fn duplicate_cancellation_keeps_one_active_deletion() {
    let h = downgraded_harness(6).await;

    // A second cancellation under a fresh correlation id (an out-of-order
    // provider duplicate) must not create a second record.
    h.engine
        .on_subscription_canceled("cus_sched", "evt_cancel_dup")
        .await
        .unwrap();

    let deletion = h
        .store
        .active_for_account(h.account_id, DeletionKind::UserStorage)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(deletion.scheduled_for, h.clock.now() + Duration::days(90));
}

#[tokio::test]
async fn listing_warnings_marks_nothing() {
    let h = downgraded_harness(3).await;

    h.clock.advance_days(85);
    let due = h.engine.list_pending_deletion_warnings(7).await.unwrap();
    assert_eq!(due.len(), 1);

    // Repeated listing is read-only.
    let again = h.engine.list_pending_deletion_warnings(7).await.unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].id, due[0].id);
    assert!(again[0].warning_sent_at.is_none());
}

#[tokio::test]
async fn mark_warning_sent_is_a_single_shot() {
    let h = downgraded_harness(3).await;

    h.clock.advance_days(85);
    let due = h.engine.list_pending_deletion_warnings(7).await.unwrap();

    assert!(h.engine.mark_warning_sent(due[0].id).await.unwrap());
    assert!(!h.engine.mark_warning_sent(due[0].id).await.unwrap());
    assert!(
        h.engine
            .list_pending_deletion_warnings(7)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn warning_pass_sends_and_marks_on_confirmed_delivery() {
    let h = downgraded_harness(4).await;

    // Far from the horizon: nothing to do.
    let report = h.engine.run_warning_pass(7).await.unwrap();
    assert_eq!(report, WarningReport::default());

    h.clock.advance_days(85);
    let report = h.engine.run_warning_pass(7).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(h.notifier.warning_count(), 1);

    // Marked sent, so the next pass has nothing.
    let report = h.engine.run_warning_pass(7).await.unwrap();
    assert_eq!(report.examined, 0);

    let events = h.engine.events_for_account(h.account_id).await.unwrap();
    assert!(
        events
            .iter()
            .any(|event| event.kind == EventKind::DeletionWarningSent)
    );
}

#[tokio::test]
async fn failed_delivery_leaves_the_marker_unset_for_retry() {
    let h = downgraded_harness(4).await;

    h.clock.advance_days(85);
    h.notifier.set_failing(true);
    let report = h.engine.run_warning_pass(7).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.sent, 0);
    assert_eq!(report.failed, 1);

    // Delivery comes back: the same record is retried and marked.
    h.notifier.set_failing(false);
    let report = h.engine.run_warning_pass(7).await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(h.notifier.warning_count(), 1);
}

#[tokio::test]
async fn canceled_deletion_never_reaches_the_warning_window() {
    let h = downgraded_harness(4).await;

    h.engine
        .on_subscription_resumed("cus_sched", "evt_resume", PlanTier::Solo)
        .await
        .unwrap();

    h.clock.advance_days(89);
    assert!(
        h.engine
            .list_pending_deletion_warnings(7)
            .await
            .unwrap()
            .is_empty()
    );
    let report = h.engine.run_warning_pass(7).await.unwrap();
    assert_eq!(report, WarningReport::default());
}

#[tokio::test]
async fn a_second_downgrade_episode_schedules_afresh() {
    let h = downgraded_harness(6).await;

    h.engine
        .on_subscription_resumed("cus_sched", "evt_resume", PlanTier::Solo)
        .await
        .unwrap();

    // New episode: failure, expiry, new deletion record 90 days from the
    // second downgrade.
    h.engine
        .on_payment_failed("cus_sched", "evt_fail_2")
        .await
        .unwrap();
    h.clock.advance_days(22);
    let report = h.engine.run_grace_period_sweep().await.unwrap();
    assert_eq!(report.downgraded, 1);

    let deletion = h
        .store
        .active_for_account(h.account_id, DeletionKind::UserStorage)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(deletion.scheduled_for, h.clock.now() + Duration::days(90));
    assert!(deletion.warning_sent_at.is_none());
}

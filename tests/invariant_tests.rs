//! Property tests: structural invariants hold under arbitrary event
//! sequences, including duplicates and out-of-order deliveries.

use std::sync::Arc;

use fotolio_lifecycle::prelude::*;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

#[derive(Debug, Clone)]
enum Op {
    PaymentFailed,
    PaymentRecovered,
    Canceled,
    Resumed(PlanTier),
    AdvanceDays(i64),
    Sweep,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::PaymentFailed),
        2 => Just(Op::PaymentRecovered),
        1 => Just(Op::Canceled),
        2 => prop_oneof![
            Just(Op::Resumed(PlanTier::Solo)),
            Just(Op::Resumed(PlanTier::Studio)),
            Just(Op::Resumed(PlanTier::Agency)),
        ],
        3 => (1i64..30).prop_map(Op::AdvanceDays),
        2 => Just(Op::Sweep),
    ]
}

async fn apply(
    engine: &LifecycleOrchestrator,
    clock: &ManualClock,
    op: &Op,
    index: usize,
) -> Result<()> {
    match op {
        Op::PaymentFailed => {
            engine
                .on_payment_failed("cus_prop", &format!("fail-{index}"))
                .await?;
        }
        Op::PaymentRecovered => {
            engine
                .on_payment_recovered("cus_prop", &format!("recover-{index}"))
                .await?;
        }
        Op::Canceled => {
            engine
                .on_subscription_canceled("cus_prop", &format!("cancel-{index}"))
                .await?;
        }
        Op::Resumed(plan) => {
            engine
                .on_subscription_resumed("cus_prop", &format!("resume-{index}"), *plan)
                .await?;
        }
        Op::AdvanceDays(days) => clock.advance_days(*days),
        Op::Sweep => {
            engine.run_grace_period_sweep().await?;
        }
    }
    Ok(())
}

async fn check_invariants(store: &MemoryStore) -> std::result::Result<(), TestCaseError> {
    let account = store
        .account_by_customer_ref("cus_prop")
        .await
        .unwrap()
        .unwrap();

    // Grace deadline is set exactly while the status is grace_period.
    match account.status {
        SubscriptionStatus::GracePeriod => {
            prop_assert!(account.grace_deadline.is_some());
        }
        _ => prop_assert!(account.grace_deadline.is_none()),
    }

    // Downgrade bookkeeping exists exactly while downgraded.
    if account.status.is_paying() {
        prop_assert!(account.prior_plan.is_none());
        prop_assert!(account.downgraded_at.is_none());
    } else {
        prop_assert!(account.prior_plan.is_some());
        prop_assert!(account.downgraded_at.is_some());
        prop_assert_eq!(account.plan, PlanTier::Free);
    }

    let units = store.units_for_account(account.id).await.unwrap();
    let mut active = 0usize;
    for unit in &units {
        // Archive timestamp and reason travel together.
        prop_assert_eq!(unit.archived_at.is_some(), unit.archive_reason.is_some());
        if !unit.is_archived() {
            active += 1;
        }
    }

    // A downgraded account fits the free tier's capacity.
    if account.status.is_downgraded() {
        prop_assert!(active <= PlanTier::Free.unit_limit().unwrap() as usize);
    }

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn invariants_hold_over_random_event_sequences(
        ops in proptest::collection::vec(op_strategy(), 1..40),
        unit_count in 0usize..12,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        let result: std::result::Result<(), TestCaseError> = rt.block_on(async {
            let store = Arc::new(MemoryStore::new());
            let clock = Arc::new(ManualClock::starting_now());
            let engine = LifecycleOrchestrator::with_store(
                store.clone(),
                clock.clone(),
                LifecycleConfig::default(),
            );

            let account = Account::new("cus_prop", PlanTier::Solo, clock.now());
            let account_id = account.id;
            store.insert_account(account).await.unwrap();
            for i in 0..unit_count {
                store
                    .insert_unit(ContentUnit::new(
                        account_id,
                        format!("gallery-{i}"),
                        clock.now() + chrono::Duration::hours(i as i64),
                    ))
                    .await
                    .unwrap();
            }

            for (index, op) in ops.iter().enumerate() {
                apply(&engine, &clock, op, index).await.unwrap();
                check_invariants(&store).await?;
            }
            Ok(())
        });
        result?;
    }

    #[test]
    fn replaying_every_event_changes_nothing(
        ops in proptest::collection::vec(op_strategy(), 1..20),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        let result: std::result::Result<(), TestCaseError> = rt.block_on(async {
            let store = Arc::new(MemoryStore::new());
            let clock = Arc::new(ManualClock::starting_now());
            let engine = LifecycleOrchestrator::with_store(
                store.clone(),
                clock.clone(),
                LifecycleConfig::default(),
            );

            let account = Account::new("cus_prop", PlanTier::Studio, clock.now());
            let account_id = account.id;
            store.insert_account(account).await.unwrap();
            for i in 0..6 {
                store
                    .insert_unit(ContentUnit::new(
                        account_id,
                        format!("gallery-{i}"),
                        clock.now(),
                    ))
                    .await
                    .unwrap();
            }

            for (index, op) in ops.iter().enumerate() {
                apply(&engine, &clock, op, index).await.unwrap();

                let before = store.account_by_id(account_id).await.unwrap().unwrap();
                let events_before = store.events_for_account(account_id).await.unwrap().len();

                // Deliver the same correlation id a second time.
                apply(&engine, &clock, op, index).await.unwrap();

                let after = store.account_by_id(account_id).await.unwrap().unwrap();
                prop_assert_eq!(before.status, after.status);
                prop_assert_eq!(before.plan, after.plan);
                prop_assert_eq!(before.failure_count, after.failure_count);
                prop_assert_eq!(before.grace_deadline, after.grace_deadline);
                prop_assert_eq!(
                    events_before,
                    store.events_for_account(account_id).await.unwrap().len()
                );
            }
            Ok(())
        });
        result?;
    }
}

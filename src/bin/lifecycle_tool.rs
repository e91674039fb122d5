use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use fotolio_lifecycle::prelude::*;
use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lifecycle-tool")]
#[command(about = "Developer tooling for the Fotolio lifecycle engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scripted failure -> grace -> expiry -> resubscribe scenario
    /// against the in-memory store and print the audit trail
    Simulate {
        #[arg(long, default_value_t = 12)]
        units: u32,
        #[arg(long, default_value = "solo")]
        plan: PlanTier,
    },
    /// Run the grace sweep and warning pass periodically over a demo
    /// fixture; each tick advances the demo clock by one day
    Watch {
        #[arg(long, default_value_t = 2)]
        interval_secs: u64,
        #[arg(long)]
        lead_days: Option<i64>,
    },
    /// Print the plan catalog
    Plans,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = config_from_env()?;

    match cli.command {
        Command::Simulate { units, plan } => simulate(units, plan, config).await,
        Command::Watch {
            interval_secs,
            lead_days,
        } => watch(interval_secs, lead_days, config).await,
        Command::Plans => {
            plans();
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fotolio_lifecycle=info,lifecycle_tool=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Engine defaults with `FOTOLIO_*` environment overrides layered on top.
fn config_from_env() -> Result<LifecycleConfig> {
    let mut config = LifecycleConfig::default();
    if let Some(days) = env_i64("FOTOLIO_GRACE_DAYS") {
        config = config.grace_period_days(days);
    }
    if let Some(days) = env_i64("FOTOLIO_DELETION_DELAY_DAYS") {
        config = config.deletion_delay_days(days);
    }
    if let Some(days) = env_i64("FOTOLIO_WARNING_LEAD_DAYS") {
        config = config.warning_lead_days(days);
    }
    config
        .validate()
        .map_err(|reason| anyhow!("invalid configuration: {reason}"))?;
    Ok(config)
}

fn env_i64(key: &str) -> Option<i64> {
    std::env::var(key).ok()?.trim().parse().ok()
}

async fn simulate(units: u32, plan: PlanTier, config: LifecycleConfig) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::starting_now());
    let engine =
        LifecycleOrchestrator::with_store(store.clone(), clock.clone(), config.clone());

    let account = Account::new("cus_sim", plan, clock.now());
    let account_id = account.id;
    store
        .insert_account(account)
        .await
        .context("failed to seed the simulated account")?;
    for i in 0..units {
        let unit = ContentUnit::new(account_id, format!("gallery-{i}"), clock.now());
        store.insert_unit(unit).await?;
        clock.advance_days(1);
    }

    println!("Simulating account cus_sim on plan '{plan}' with {units} galleries\n");

    for attempt in 1..=3u32 {
        let outcome = engine
            .on_payment_failed("cus_sim", &format!("evt_fail_{attempt}"))
            .await?;
        println!(
            "day +{attempt}: payment failure #{attempt} -> status={}, failures={}",
            outcome.status, outcome.failure_count
        );
        clock.advance_days(1);
    }

    clock.advance_days(config.grace_period_days);
    let report = engine.run_grace_period_sweep().await?;
    println!(
        "\ngrace deadline passed: sweep examined={} downgraded={}",
        report.examined, report.downgraded
    );

    let account = engine.account("cus_sim").await?;
    let archived = store
        .units_for_account(account_id)
        .await?
        .iter()
        .filter(|unit| unit.is_archived())
        .count();
    println!(
        "account now plan={} status={}, {archived} galleries archived",
        account.plan, account.status
    );

    clock.advance_days(40);
    let outcome = engine
        .on_subscription_resumed("cus_sim", "evt_resume", plan)
        .await?;
    println!(
        "\nday +40 of the deletion window: resubscribed -> plan={}, restored={}, deletions canceled={}",
        outcome.plan, outcome.restored, outcome.deletions_canceled
    );

    println!("\nAudit trail:");
    for event in engine.events_for_account(account_id).await? {
        println!(
            "  {}  {:<26} correlation={}",
            event.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            event.kind.as_str(),
            event.correlation_id
        );
    }

    Ok(())
}

async fn watch(interval_secs: u64, lead_days: Option<i64>, config: LifecycleConfig) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::starting_now());
    let engine =
        LifecycleOrchestrator::with_store(store.clone(), clock.clone(), config.clone());
    let lead_days = lead_days.unwrap_or(config.warning_lead_days);

    seed_fixture(&store, &engine, clock.now()).await?;
    info!("watch loop started; each tick advances the demo clock by one day");

    loop {
        clock.advance_days(1);

        let sweep = engine.run_grace_period_sweep().await?;
        if sweep.examined > 0 {
            info!(
                examined = sweep.examined,
                downgraded = sweep.downgraded,
                already_processed = sweep.already_processed,
                failed = sweep.failed,
                "grace period sweep"
            );
        }

        let warnings = engine.run_warning_pass(lead_days).await?;
        if warnings.examined > 0 {
            info!(
                examined = warnings.examined,
                sent = warnings.sent,
                failed = warnings.failed,
                "warning pass"
            );
        }

        sleep(Duration::from_secs(interval_secs)).await;
    }
}

/// Two accounts mid-story: one deep in its grace period, one already
/// downgraded with a deletion coming due soon.
async fn seed_fixture(
    store: &Arc<MemoryStore>,
    engine: &LifecycleOrchestrator,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    let graced = Account::new("cus_graced", PlanTier::Solo, now);
    let graced_id = graced.id;
    store.insert_account(graced).await?;
    for i in 0..8 {
        store
            .insert_unit(ContentUnit::new(graced_id, format!("graced-{i}"), now))
            .await?;
    }
    engine.on_payment_failed("cus_graced", "fixture_fail").await?;

    let doomed = Account::new("cus_doomed", PlanTier::Studio, now);
    let doomed_id = doomed.id;
    store.insert_account(doomed).await?;
    for i in 0..6 {
        store
            .insert_unit(ContentUnit::new(doomed_id, format!("doomed-{i}"), now))
            .await?;
    }
    engine
        .on_subscription_canceled("cus_doomed", "fixture_cancel")
        .await?;

    Ok(())
}

fn plans() {
    println!("{:<8} {:<10} {}", "plan", "name", "active gallery limit");
    for plan in [
        PlanTier::Free,
        PlanTier::Solo,
        PlanTier::Studio,
        PlanTier::Agency,
    ] {
        let limit = match plan.unit_limit() {
            Some(limit) => limit.to_string(),
            None => "unlimited".to_string(),
        };
        println!("{:<8} {:<10} {}", plan.as_str(), plan.display_name(), limit);
    }
}

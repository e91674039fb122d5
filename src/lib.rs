// ============================================================================
// Fotolio Lifecycle Engine
// ============================================================================

//! Subscription lifecycle and entitlement-enforcement engine for the Fotolio
//! gallery platform.
//!
//! The engine reacts to billing events (payment failure/recovery,
//! cancellation, resubscription), tracks grace periods, and cascades every
//! state change into durable side effects: downgrading accounts, archiving
//! and restoring galleries under plan capacity limits, and scheduling
//! eventual data deletion with warnings.
//!
//! Built for at-least-once delivery: every entry point is idempotent per
//! cascade step, every store write is a guarded conditional update, and a
//! partially completed cascade is resumed by simply re-invoking the same
//! entry point.
//!
//! # Examples
//!
//! ```
//! use fotolio_lifecycle::prelude::*;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! let clock = Arc::new(SystemClock);
//! let engine = LifecycleOrchestrator::with_store(
//!     store.clone(),
//!     clock,
//!     LifecycleConfig::default(),
//! );
//!
//! let account = Account::new("cus_100", PlanTier::Solo, chrono::Utc::now());
//! store.insert_account(account).await.unwrap();
//!
//! let outcome = engine.on_payment_failed("cus_100", "evt_1").await.unwrap();
//! assert_eq!(outcome.status, SubscriptionStatus::GracePeriod);
//! assert_eq!(outcome.failure_count, 1);
//!
//! // At-least-once delivery: the duplicate changes nothing.
//! let replay = engine.on_payment_failed("cus_100", "evt_1").await.unwrap();
//! assert!(replay.already_processed);
//! # });
//! ```

pub mod archival;
pub mod core;
pub mod deletion;
pub mod entitlement;
pub mod events;
pub mod external;
pub mod orchestrator;
pub mod prelude;
pub mod store;

// Re-export main types for convenience
pub use core::{
    ArchiveReason, Clock, DeletionKind, LifecycleConfig, LifecycleError, ManualClock, PlanTier,
    Result, SubscriptionStatus, SystemClock,
};
pub use orchestrator::{CascadeOutcome, LifecycleOrchestrator, SweepReport, WarningReport};
pub use store::MemoryStore;

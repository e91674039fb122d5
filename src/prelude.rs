//! Curated import surface for engine consumers.
//!
//! Webhook receivers and schedulers only need `engine` plus the domain
//! enums; `seams` pulls in the store and collaborator traits for anyone
//! wiring a real backend or test double.

pub use crate::archival::{ArchivalPolicy, ContentUnit};
pub use crate::core::{
    ArchiveReason, Clock, DeletionKind, LifecycleConfig, LifecycleError, ManualClock, PlanTier,
    Result, SubscriptionStatus, SystemClock,
};
pub use crate::deletion::{DeletionScheduler, ScheduledDeletion};
pub use crate::entitlement::{Account, EntitlementMachine, Transition};
pub use crate::events::{EventKind, EventLog, LifecycleEvent};
pub use crate::external::{
    BillingProvider, DirectoryService, LogDirectory, LogNotifier, NotificationSender,
    ProviderSubscription,
};
pub use crate::orchestrator::{CascadeOutcome, LifecycleOrchestrator, SweepReport, WarningReport};
pub use crate::store::{
    AccountStore, ContentStore, DeletionStore, EventStore, MemoryStore, StoreError,
};

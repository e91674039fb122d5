pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LifecycleConfig;
pub use error::{LifecycleError, Result};
pub use types::{ArchiveReason, DeletionKind, PlanTier, SubscriptionStatus};

//! External collaborator seams.
//!
//! Everything the engine talks to besides the datastore lives behind a trait
//! here: the transactional notifier, the identity directory holding a
//! denormalized plan/status copy, and the billing provider for optional
//! status re-verification. None of these are authoritative; failures on
//! these seams never roll back engine state.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::core::types::{PlanTier, SubscriptionStatus};
use crate::deletion::ScheduledDeletion;
use crate::entitlement::Account;

#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl CollaboratorError {
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Transactional notification delivery. Fire-and-forget from the engine's
/// perspective: a failed warning only leaves the warning-sent marker unset,
/// so the next warning pass retries it.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_deletion_warning(
        &self,
        account: &Account,
        deletion: &ScheduledDeletion,
    ) -> CollaboratorResult<()>;

    async fn send_cancellation_notice(&self, account: &Account) -> CollaboratorResult<()>;
}

/// Identity/directory service holding a denormalized plan/status copy for
/// fast authorization checks elsewhere. Push-only, never read back.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    async fn push_entitlement(
        &self,
        account_id: Uuid,
        plan: PlanTier,
        status: SubscriptionStatus,
    ) -> CollaboratorResult<()>;
}

/// Subscription state as the billing provider reports it.
#[derive(Debug, Clone)]
pub struct ProviderSubscription {
    pub customer_ref: String,
    pub paying: bool,
    pub plan: Option<PlanTier>,
}

/// Read-back into the billing provider, used only when a recovery event is
/// configured to be re-verified before settling.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn verify_subscription(
        &self,
        customer_ref: &str,
    ) -> CollaboratorResult<ProviderSubscription>;
}

/// Default notifier: logs the request and reports success. Production
/// deployments plug in the real email sender instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSender for LogNotifier {
    async fn send_deletion_warning(
        &self,
        account: &Account,
        deletion: &ScheduledDeletion,
    ) -> CollaboratorResult<()> {
        info!(
            account_id = %account.id,
            deletion_id = %deletion.id,
            scheduled_for = %deletion.scheduled_for,
            "deletion warning (log only)"
        );
        Ok(())
    }

    async fn send_cancellation_notice(&self, account: &Account) -> CollaboratorResult<()> {
        info!(account_id = %account.id, "cancellation notice (log only)");
        Ok(())
    }
}

/// Default directory: logs the push and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDirectory;

#[async_trait]
impl DirectoryService for LogDirectory {
    async fn push_entitlement(
        &self,
        account_id: Uuid,
        plan: PlanTier,
        status: SubscriptionStatus,
    ) -> CollaboratorResult<()> {
        info!(%account_id, %plan, %status, "entitlement push (log only)");
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test {
    //! Recording doubles for the collaborator seams.

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// Records every delivery request; can be told to fail.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub warnings: Mutex<Vec<(Uuid, Uuid)>>,
        pub cancellation_notices: Mutex<Vec<Uuid>>,
        fail_deliveries: AtomicBool,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_failing(&self, failing: bool) {
            self.fail_deliveries.store(failing, Ordering::SeqCst);
        }

        pub fn warning_count(&self) -> usize {
            self.warnings.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl NotificationSender for RecordingNotifier {
        async fn send_deletion_warning(
            &self,
            account: &Account,
            deletion: &ScheduledDeletion,
        ) -> CollaboratorResult<()> {
            if self.fail_deliveries.load(Ordering::SeqCst) {
                return Err(CollaboratorError::delivery("notifier down"));
            }
            self.warnings
                .lock()
                .unwrap()
                .push((account.id, deletion.id));
            Ok(())
        }

        async fn send_cancellation_notice(&self, account: &Account) -> CollaboratorResult<()> {
            if self.fail_deliveries.load(Ordering::SeqCst) {
                return Err(CollaboratorError::delivery("notifier down"));
            }
            self.cancellation_notices.lock().unwrap().push(account.id);
            Ok(())
        }
    }

    /// Records every entitlement push.
    #[derive(Default)]
    pub struct RecordingDirectory {
        pub pushes: Mutex<Vec<(Uuid, PlanTier, SubscriptionStatus)>>,
    }

    impl RecordingDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn last_push(&self) -> Option<(Uuid, PlanTier, SubscriptionStatus)> {
            self.pushes.lock().unwrap().last().copied()
        }
    }

    #[async_trait]
    impl DirectoryService for RecordingDirectory {
        async fn push_entitlement(
            &self,
            account_id: Uuid,
            plan: PlanTier,
            status: SubscriptionStatus,
        ) -> CollaboratorResult<()> {
            self.pushes
                .lock()
                .unwrap()
                .push((account_id, plan, status));
            Ok(())
        }
    }

    /// Billing provider double with a fixed answer.
    pub struct StaticBillingProvider {
        paying: AtomicBool,
        plan: Option<PlanTier>,
    }

    impl StaticBillingProvider {
        pub fn paying(plan: PlanTier) -> Self {
            Self {
                paying: AtomicBool::new(true),
                plan: Some(plan),
            }
        }

        pub fn not_paying() -> Self {
            Self {
                paying: AtomicBool::new(false),
                plan: None,
            }
        }

        pub fn set_paying(&self, paying: bool) {
            self.paying.store(paying, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl BillingProvider for StaticBillingProvider {
        async fn verify_subscription(
            &self,
            customer_ref: &str,
        ) -> CollaboratorResult<ProviderSubscription> {
            Ok(ProviderSubscription {
                customer_ref: customer_ref.to_string(),
                paying: self.paying.load(Ordering::SeqCst),
                plan: self.plan,
            })
        }
    }
}

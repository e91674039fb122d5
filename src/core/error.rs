use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Account not found for customer reference '{0}'")]
    AccountNotFound(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Cascade for correlation '{correlation_id}' stopped after {completed} recorded step(s): {source}")]
    PartialCascade {
        correlation_id: String,
        completed: usize,
        #[source]
        source: Box<LifecycleError>,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

impl LifecycleError {
    pub fn account_not_found(customer_ref: impl Into<String>) -> Self {
        Self::AccountNotFound(customer_ref.into())
    }

    pub fn policy_violation(reason: impl Into<String>) -> Self {
        Self::PolicyViolation(reason.into())
    }

    pub fn partial_cascade(
        correlation_id: impl Into<String>,
        completed: usize,
        source: LifecycleError,
    ) -> Self {
        Self::PartialCascade {
            correlation_id: correlation_id.into(),
            completed,
            source: Box::new(source),
        }
    }

    /// Whether re-invoking the failed entry point can make further progress.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PartialCascade { .. } | Self::Store(_))
    }
}

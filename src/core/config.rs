use chrono::Duration;

/// Engine configuration
///
/// Windows are expressed in whole days, matching how the product
/// communicates them to customers.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Days of retained entitlement after the first payment failure
    pub grace_period_days: i64,

    /// Days between downgrade and permanent deletion of excess content
    pub deletion_delay_days: i64,

    /// Default warning horizon used by the bundled warning pass
    pub warning_lead_days: i64,

    /// Re-verify a recovery event against the billing provider before
    /// settling the account back to active
    pub verify_recovery: bool,
}

impl LifecycleConfig {
    /// Create a configuration with production defaults
    pub fn new() -> Self {
        Self {
            grace_period_days: 21,
            deletion_delay_days: 90,
            warning_lead_days: 7,
            verify_recovery: false,
        }
    }

    /// Set the grace period length
    pub fn grace_period_days(mut self, days: i64) -> Self {
        self.grace_period_days = days;
        self
    }

    /// Set the deletion delay
    pub fn deletion_delay_days(mut self, days: i64) -> Self {
        self.deletion_delay_days = days;
        self
    }

    /// Set the warning lead horizon
    pub fn warning_lead_days(mut self, days: i64) -> Self {
        self.warning_lead_days = days;
        self
    }

    /// Enable billing-provider re-verification of recovery events
    pub fn verify_recovery(mut self, enabled: bool) -> Self {
        self.verify_recovery = enabled;
        self
    }

    pub fn grace_period(&self) -> Duration {
        Duration::days(self.grace_period_days)
    }

    pub fn deletion_delay(&self) -> Duration {
        Duration::days(self.deletion_delay_days)
    }

    pub fn warning_lead(&self) -> Duration {
        Duration::days(self.warning_lead_days)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.grace_period_days <= 0 {
            return Err("grace_period_days must be > 0".to_string());
        }

        if self.deletion_delay_days <= 0 {
            return Err("deletion_delay_days must be > 0".to_string());
        }

        if self.warning_lead_days <= 0 {
            return Err("warning_lead_days must be > 0".to_string());
        }

        if self.warning_lead_days > self.deletion_delay_days {
            return Err("warning_lead_days cannot exceed deletion_delay_days".to_string());
        }

        Ok(())
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self::new()
    }
}

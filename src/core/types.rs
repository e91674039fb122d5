use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Plan tiers sold by the platform, ordered from free to largest.
///
/// The tier carries the capacity catalog: `unit_limit` is the number of
/// active galleries the plan allows, `None` meaning unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Solo,
    Studio,
    Agency,
}

impl PlanTier {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Solo => "solo",
            Self::Studio => "studio",
            Self::Agency => "agency",
        }
    }

    /// Maximum number of active galleries on this plan. `None` is unlimited.
    pub const fn unit_limit(&self) -> Option<u32> {
        match self {
            Self::Free => Some(5),
            Self::Solo => Some(25),
            Self::Studio => Some(100),
            Self::Agency => None,
        }
    }

    pub const fn is_paid(&self) -> bool {
        !matches!(self, Self::Free)
    }

    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::Solo => "Solo",
            Self::Studio => "Studio",
            Self::Agency => "Agency",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "solo" => Ok(Self::Solo),
            "studio" => Ok(Self::Studio),
            "agency" => Ok(Self::Agency),
            other => Err(format!("unknown plan tier '{other}'")),
        }
    }
}

/// Subscription status of an account.
///
/// `GracePeriod` is the bounded window after a payment failure during which
/// paid entitlements are retained. `Canceled` and `Free` are both resting
/// non-paying states; `Canceled` additionally records that the customer ended
/// the subscription themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    GracePeriod,
    Canceled,
    Free,
}

impl SubscriptionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::GracePeriod => "grace_period",
            Self::Canceled => "canceled",
            Self::Free => "free",
        }
    }

    /// Statuses that still hold paid entitlements.
    pub const fn is_paying(&self) -> bool {
        matches!(self, Self::Active | Self::PastDue | Self::GracePeriod)
    }

    /// Resting states reached after a full downgrade.
    pub const fn is_downgraded(&self) -> bool {
        matches!(self, Self::Canceled | Self::Free)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a content unit was archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveReason {
    Downgrade,
    PaymentFailed,
}

impl ArchiveReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Downgrade => "downgrade",
            Self::PaymentFailed => "payment_failed",
        }
    }
}

impl fmt::Display for ArchiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a scheduled deletion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionKind {
    UserStorage,
}

impl DeletionKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserStorage => "user_storage",
        }
    }
}

impl fmt::Display for DeletionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

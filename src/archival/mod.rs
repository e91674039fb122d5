//! Capacity archival policy.
//!
//! Decides which content units survive a downgrade and flips archive status
//! both ways. Archiving never deletes anything; deletion is a separate,
//! explicitly scheduled action.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::core::clock::Clock;
use crate::core::error::Result;
use crate::core::types::ArchiveReason;
use crate::store::ContentStore;

/// One content unit (a delivered gallery).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentUnit {
    pub id: Uuid,
    pub account_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// Non-null exactly while an archive reason is set.
    pub archived_at: Option<DateTime<Utc>>,
    pub archive_reason: Option<ArchiveReason>,
}

impl ContentUnit {
    pub fn new(account_id: Uuid, title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            title: title.into(),
            created_at,
            archived_at: None,
            archive_reason: None,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

pub struct ArchivalPolicy {
    content: Arc<dyn ContentStore>,
    clock: Arc<dyn Clock>,
}

impl ArchivalPolicy {
    pub fn new(content: Arc<dyn ContentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { content, clock }
    }

    /// Shed content to fit `unit_limit` on the way down a plan change.
    ///
    /// With an explicit keep-list every unit of the account outside the list
    /// is archived. Without one the N oldest units (creation time ascending)
    /// are kept and the newer remainder archived, so a photographer's
    /// longest-standing client deliveries survive an unattended downgrade.
    /// Already-archived units are untouched; calling this twice archives
    /// nothing new. Returns the number of units archived.
    pub async fn archive_for_downgrade(
        &self,
        account_id: Uuid,
        unit_limit: Option<u32>,
        keep: Option<&[Uuid]>,
        reason: ArchiveReason,
    ) -> Result<u32> {
        let units = self.content.units_for_account(account_id).await?;
        let active: Vec<&ContentUnit> = units.iter().filter(|unit| !unit.is_archived()).collect();

        let to_archive: Vec<Uuid> = match keep {
            Some(keep_ids) => {
                let keep_set: HashSet<&Uuid> = keep_ids.iter().collect();
                active
                    .iter()
                    .filter(|unit| !keep_set.contains(&unit.id))
                    .map(|unit| unit.id)
                    .collect()
            }
            None => {
                let Some(limit) = unit_limit else {
                    return Ok(0);
                };
                // `units_for_account` is ordered oldest first.
                active
                    .iter()
                    .skip(limit as usize)
                    .map(|unit| unit.id)
                    .collect()
            }
        };

        let now = self.clock.now();
        let mut archived = 0u32;
        for unit_id in to_archive {
            if self.content.archive_unit(unit_id, now, reason).await? {
                archived += 1;
            }
        }

        debug!(
            account_id = %account_id,
            archived,
            reason = %reason,
            "archival pass complete"
        );

        Ok(archived)
    }

    /// Un-archive everything for an account returning to a paid tier.
    ///
    /// Unconditional: the new plan's limit is not re-checked here, since
    /// forward-looking enforcement happens at content creation. Returns the
    /// number of units restored; zero when nothing was archived.
    pub async fn restore_all(&self, account_id: Uuid) -> Result<u32> {
        let units = self.content.units_for_account(account_id).await?;

        let mut restored = 0u32;
        for unit in units.iter().filter(|unit| unit.is_archived()) {
            if self.content.restore_unit(unit.id).await? {
                restored += 1;
            }
        }

        debug!(account_id = %account_id, restored, "restore pass complete");

        Ok(restored)
    }
}

//! Invalidation & settings hook (Component H): clears the current month's
//! materialized schedule when settings change, and enforces the
//! follower/collective-owner conflict rule.

use crate::domain::{OwnerId, OwnerSettings};
use crate::error::EngineError;
use crate::repo::{OwnerRepo, ScheduleRepo, SettingsRepo};
use chrono::{Datelike, Utc};
use std::sync::Arc;
use tracing::info;

pub struct SettingsHook {
    settings: Arc<dyn SettingsRepo>,
    schedules: Arc<dyn ScheduleRepo>,
    owners: Arc<dyn OwnerRepo>,
}

/// Whether the field set a settings update touches includes prayer-rule
/// content (as opposed to display-only preferences like time format).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsChangeKind {
    PrayerRules,
    DisplayPreferenceOnly,
}

impl SettingsHook {
    pub fn new(
        settings: Arc<dyn SettingsRepo>,
        schedules: Arc<dyn ScheduleRepo>,
        owners: Arc<dyn OwnerRepo>,
    ) -> Self {
        SettingsHook {
            settings,
            schedules,
            owners,
        }
    }

    pub async fn is_following_collective(&self, owner_id: OwnerId) -> Result<bool, EngineError> {
        Ok(self.owners.collective_target(owner_id).await?.is_some())
    }

    /// Applies a settings update for `owner_id`. Prayer-rule changes from a
    /// follower of a collective owner are rejected with `Conflict`;
    /// everything else is persisted and the owner's current-month
    /// schedule is invalidated.
    pub async fn apply_settings_change(
        &self,
        owner_id: OwnerId,
        new_settings: OwnerSettings,
        change_kind: SettingsChangeKind,
    ) -> Result<(), EngineError> {
        if change_kind == SettingsChangeKind::PrayerRules && self.is_following_collective(owner_id).await? {
            return Err(EngineError::Conflict(format!(
                "owner {owner_id} follows a collective owner; prayer rules are not editable"
            )));
        }

        self.settings.put(new_settings).await?;

        if change_kind == SettingsChangeKind::PrayerRules {
            let now = Utc::now();
            self.schedules.delete(owner_id, now.year(), now.month()).await?;
            info!(owner_id, "invalidated current month schedule after settings change");

            if let Ok(followers) = self.owners.followers_of(owner_id).await {
                for follower in followers {
                    info!(follower_id = follower, owner_id, "advisory: followed owner's settings changed");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::{InMemoryOwnerRepo, InMemoryScheduleRepo, InMemorySettingsRepo};
    use crate::domain::{JummahRule, MethodKey};
    use std::collections::BTreeMap;

    fn settings(owner_id: OwnerId) -> OwnerSettings {
        OwnerSettings {
            owner_id,
            latitude: 0.0,
            longitude: 0.0,
            method_key: MethodKey::new(3, 0, 1),
            timezone: "UTC".to_string(),
            threshold_minutes: 5,
            rules: BTreeMap::new(),
            jummah: JummahRule::Offset {
                azan_offset: 0,
                khutbah_offset: 0,
                jamaat_offset: 0,
            },
            hijri_offset_days: 0,
        }
    }

    #[tokio::test]
    async fn rejects_prayer_rule_change_for_follower() {
        let owners = Arc::new(InMemoryOwnerRepo::default());
        owners.set_follow(10, 99).await.unwrap();
        let hook = SettingsHook::new(
            Arc::new(InMemorySettingsRepo::default()),
            Arc::new(InMemoryScheduleRepo::default()),
            owners,
        );
        let result = hook
            .apply_settings_change(10, settings(10), SettingsChangeKind::PrayerRules)
            .await;
        assert!(matches!(result, Err(EngineError::Conflict(_))));
    }

    #[tokio::test]
    async fn allows_display_preference_change_for_follower() {
        let owners = Arc::new(InMemoryOwnerRepo::default());
        owners.set_follow(10, 99).await.unwrap();
        let hook = SettingsHook::new(
            Arc::new(InMemorySettingsRepo::default()),
            Arc::new(InMemoryScheduleRepo::default()),
            owners,
        );
        let result = hook
            .apply_settings_change(10, settings(10), SettingsChangeKind::DisplayPreferenceOnly)
            .await;
        assert!(result.is_ok());
    }
}

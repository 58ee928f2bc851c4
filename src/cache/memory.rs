//! In-memory repository fakes used by tests to exercise the engine
//! deterministically without an embedded database.

use crate::domain::{
    LastRawTimes, MethodKey, MonthlySchedule, OwnerId, OwnerSettings, YearlyCalendar, ZoneAlias,
};
use crate::error::EngineError;
use crate::repo::{AliasRepo, CalendarRepo, OwnerRepo, ScheduleRepo, SettingsRepo};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryCalendarRepo {
    entries: Mutex<HashMap<(String, i32, MethodKey), YearlyCalendar>>,
}

#[async_trait]
impl CalendarRepo for InMemoryCalendarRepo {
    async fn get(
        &self,
        zone_id: &str,
        year: i32,
        method_key: &MethodKey,
    ) -> Result<Option<YearlyCalendar>, EngineError> {
        let key = (zone_id.to_string(), year, method_key.clone());
        Ok(self.entries.lock().unwrap().get(&key).cloned())
    }

    async fn upsert(&self, calendar: YearlyCalendar) -> Result<(), EngineError> {
        let key = (calendar.zone_id.clone(), calendar.year, calendar.method_key.clone());
        self.entries.lock().unwrap().insert(key, calendar);
        Ok(())
    }

    async fn list_zone_method_pairs(&self) -> Result<Vec<(String, MethodKey)>, EngineError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .keys()
            .map(|(zone, _, method)| (zone.clone(), method.clone()))
            .collect())
    }

    async fn delete_years_before(&self, year: i32) -> Result<u64, EngineError> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|(_, y, _), _| *y >= year);
        Ok((before - entries.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryScheduleRepo {
    entries: Mutex<HashMap<(OwnerId, i32, u32), MonthlySchedule>>,
}

#[async_trait]
impl ScheduleRepo for InMemoryScheduleRepo {
    async fn get(
        &self,
        owner_id: OwnerId,
        year: i32,
        month: u32,
    ) -> Result<Option<MonthlySchedule>, EngineError> {
        Ok(self.entries.lock().unwrap().get(&(owner_id, year, month)).cloned())
    }

    async fn upsert(&self, schedule: MonthlySchedule) -> Result<(), EngineError> {
        let key = (schedule.owner_id, schedule.year, schedule.month);
        self.entries.lock().unwrap().insert(key, schedule);
        Ok(())
    }

    async fn delete(&self, owner_id: OwnerId, year: i32, month: u32) -> Result<(), EngineError> {
        self.entries.lock().unwrap().remove(&(owner_id, year, month));
        Ok(())
    }

    async fn owners_with_schedule(&self, year: i32, month: u32) -> Result<Vec<OwnerId>, EngineError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .keys()
            .filter(|(_, y, m)| *y == year && *m == month)
            .map(|(owner, _, _)| *owner)
            .collect())
    }
}

#[derive(Default)]
pub struct InMemorySettingsRepo {
    settings: Mutex<HashMap<OwnerId, OwnerSettings>>,
    last_raw: Mutex<HashMap<OwnerId, LastRawTimes>>,
}

#[async_trait]
impl SettingsRepo for InMemorySettingsRepo {
    async fn get(&self, owner_id: OwnerId) -> Result<Option<OwnerSettings>, EngineError> {
        Ok(self.settings.lock().unwrap().get(&owner_id).cloned())
    }

    async fn put(&self, settings: OwnerSettings) -> Result<(), EngineError> {
        self.settings.lock().unwrap().insert(settings.owner_id, settings);
        Ok(())
    }

    async fn get_last_raw_times(&self, owner_id: OwnerId) -> Result<Option<LastRawTimes>, EngineError> {
        Ok(self.last_raw.lock().unwrap().get(&owner_id).cloned())
    }

    async fn put_last_raw_times(&self, owner_id: OwnerId, raw: LastRawTimes) -> Result<(), EngineError> {
        self.last_raw.lock().unwrap().insert(owner_id, raw);
        Ok(())
    }

    async fn all_owner_ids(&self) -> Result<Vec<OwnerId>, EngineError> {
        Ok(self.settings.lock().unwrap().keys().copied().collect())
    }
}

#[derive(Default)]
pub struct InMemoryAliasRepo {
    entries: Mutex<HashMap<(String, MethodKey), ZoneAlias>>,
}

#[async_trait]
impl AliasRepo for InMemoryAliasRepo {
    async fn get(&self, source_zone_id: &str, method_key: &MethodKey) -> Result<Option<ZoneAlias>, EngineError> {
        let key = (source_zone_id.to_string(), method_key.clone());
        Ok(self.entries.lock().unwrap().get(&key).cloned())
    }

    async fn put(&self, alias: ZoneAlias) -> Result<(), EngineError> {
        let key = (alias.source_zone_id.clone(), alias.method_key.clone());
        self.entries.lock().unwrap().insert(key, alias);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOwnerRepo {
    follows: Mutex<HashMap<OwnerId, OwnerId>>,
}

#[async_trait]
impl OwnerRepo for InMemoryOwnerRepo {
    async fn collective_target(&self, owner_id: OwnerId) -> Result<Option<OwnerId>, EngineError> {
        Ok(self.follows.lock().unwrap().get(&owner_id).copied())
    }

    async fn followers_of(&self, collective_owner_id: OwnerId) -> Result<Vec<OwnerId>, EngineError> {
        Ok(self
            .follows
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, target)| **target == collective_owner_id)
            .map(|(follower, _)| *follower)
            .collect())
    }

    async fn set_follow(&self, follower_id: OwnerId, collective_owner_id: OwnerId) -> Result<(), EngineError> {
        self.follows.lock().unwrap().insert(follower_id, collective_owner_id);
        Ok(())
    }
}

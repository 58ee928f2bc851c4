//! Cold tier (Component D): an embedded, durable, log-structured store
//! behind the repository ports. `sled` stands in for a relational engine;
//! every access goes through the trait so a SQL-backed implementation can
//! be swapped in later without touching callers.

use crate::domain::{
    LastRawTimes, MethodKey, MonthlySchedule, OwnerId, OwnerSettings, YearlyCalendar, ZoneAlias,
};
use crate::error::EngineError;
use crate::repo::{AliasRepo, CalendarRepo, OwnerRepo, ScheduleRepo, SettingsRepo};
use async_trait::async_trait;
use std::collections::BTreeMap;

fn internal(e: impl std::fmt::Display) -> EngineError {
    EngineError::Internal(e.to_string())
}

/// A `sled` database opened at startup, split into named trees, one per
/// entity kind.
pub struct SledStore {
    calendars: sled::Tree,
    schedules: sled::Tree,
    settings: sled::Tree,
    last_raw: sled::Tree,
    aliases: sled::Tree,
    follows: sled::Tree,
}

impl SledStore {
    pub fn open(path: &str) -> Result<Self, EngineError> {
        let db = sled::open(path).map_err(internal)?;
        Ok(SledStore {
            calendars: db.open_tree("calendars").map_err(internal)?,
            schedules: db.open_tree("schedules").map_err(internal)?,
            settings: db.open_tree("settings").map_err(internal)?,
            last_raw: db.open_tree("last_raw").map_err(internal)?,
            aliases: db.open_tree("aliases").map_err(internal)?,
            follows: db.open_tree("follows").map_err(internal)?,
        })
    }

    fn calendar_key(zone_id: &str, year: i32, method_key: &MethodKey) -> String {
        format!("{zone_id}\0{year}\0{}", method_key.as_str())
    }

    fn schedule_key(owner_id: OwnerId, year: i32, month: u32) -> String {
        format!("{owner_id}\0{year}\0{month:02}")
    }
}

#[async_trait]
impl CalendarRepo for SledStore {
    async fn get(
        &self,
        zone_id: &str,
        year: i32,
        method_key: &MethodKey,
    ) -> Result<Option<YearlyCalendar>, EngineError> {
        let key = Self::calendar_key(zone_id, year, method_key);
        match self.calendars.get(key.as_bytes()).map_err(internal)? {
            Some(bytes) => {
                let cal = serde_json::from_slice(&bytes).map_err(internal)?;
                Ok(Some(cal))
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, calendar: YearlyCalendar) -> Result<(), EngineError> {
        let key = Self::calendar_key(&calendar.zone_id, calendar.year, &calendar.method_key);
        let bytes = serde_json::to_vec(&calendar).map_err(internal)?;
        self.calendars.insert(key.as_bytes(), bytes).map_err(internal)?;
        Ok(())
    }

    async fn list_zone_method_pairs(&self) -> Result<Vec<(String, MethodKey)>, EngineError> {
        let mut seen = BTreeMap::new();
        for item in self.calendars.iter() {
            let (_, bytes) = item.map_err(internal)?;
            let cal: YearlyCalendar = serde_json::from_slice(&bytes).map_err(internal)?;
            seen.insert((cal.zone_id.clone(), cal.method_key.clone()), ());
        }
        Ok(seen.into_keys().collect())
    }

    async fn delete_years_before(&self, year: i32) -> Result<u64, EngineError> {
        let mut to_delete = Vec::new();
        for item in self.calendars.iter() {
            let (key, bytes) = item.map_err(internal)?;
            let cal: YearlyCalendar = serde_json::from_slice(&bytes).map_err(internal)?;
            if cal.year < year {
                to_delete.push(key);
            }
        }
        let count = to_delete.len() as u64;
        for key in to_delete {
            self.calendars.remove(key).map_err(internal)?;
        }
        Ok(count)
    }
}

#[async_trait]
impl ScheduleRepo for SledStore {
    async fn get(
        &self,
        owner_id: OwnerId,
        year: i32,
        month: u32,
    ) -> Result<Option<MonthlySchedule>, EngineError> {
        let key = Self::schedule_key(owner_id, year, month);
        match self.schedules.get(key.as_bytes()).map_err(internal)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(internal)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, schedule: MonthlySchedule) -> Result<(), EngineError> {
        let key = Self::schedule_key(schedule.owner_id, schedule.year, schedule.month);
        let bytes = serde_json::to_vec(&schedule).map_err(internal)?;
        self.schedules.insert(key.as_bytes(), bytes).map_err(internal)?;
        Ok(())
    }

    async fn delete(&self, owner_id: OwnerId, year: i32, month: u32) -> Result<(), EngineError> {
        let key = Self::schedule_key(owner_id, year, month);
        self.schedules.remove(key.as_bytes()).map_err(internal)?;
        Ok(())
    }

    async fn owners_with_schedule(&self, year: i32, month: u32) -> Result<Vec<OwnerId>, EngineError> {
        let suffix = format!("\0{year}\0{month:02}");
        let mut owners = Vec::new();
        for item in self.schedules.iter() {
            let (key, _) = item.map_err(internal)?;
            let key = String::from_utf8_lossy(&key);
            if key.ends_with(&suffix) {
                if let Some(owner_str) = key.split('\0').next() {
                    if let Ok(owner_id) = owner_str.parse() {
                        owners.push(owner_id);
                    }
                }
            }
        }
        Ok(owners)
    }
}

#[async_trait]
impl SettingsRepo for SledStore {
    async fn get(&self, owner_id: OwnerId) -> Result<Option<OwnerSettings>, EngineError> {
        match self.settings.get(owner_id.to_be_bytes()).map_err(internal)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(internal)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, settings: OwnerSettings) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec(&settings).map_err(internal)?;
        self.settings
            .insert(settings.owner_id.to_be_bytes(), bytes)
            .map_err(internal)?;
        Ok(())
    }

    async fn get_last_raw_times(&self, owner_id: OwnerId) -> Result<Option<LastRawTimes>, EngineError> {
        match self.last_raw.get(owner_id.to_be_bytes()).map_err(internal)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(internal)?)),
            None => Ok(None),
        }
    }

    async fn put_last_raw_times(&self, owner_id: OwnerId, raw: LastRawTimes) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec(&raw).map_err(internal)?;
        self.last_raw.insert(owner_id.to_be_bytes(), bytes).map_err(internal)?;
        Ok(())
    }

    async fn all_owner_ids(&self) -> Result<Vec<OwnerId>, EngineError> {
        let mut ids = Vec::new();
        for item in self.settings.iter() {
            let (key, _) = item.map_err(internal)?;
            let arr: [u8; 8] = key.as_ref().try_into().map_err(|_| internal("corrupt owner key"))?;
            ids.push(OwnerId::from_be_bytes(arr));
        }
        Ok(ids)
    }
}

#[async_trait]
impl AliasRepo for SledStore {
    async fn get(&self, source_zone_id: &str, method_key: &MethodKey) -> Result<Option<ZoneAlias>, EngineError> {
        let key = format!("{source_zone_id}\0{}", method_key.as_str());
        match self.aliases.get(key.as_bytes()).map_err(internal)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(internal)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, alias: ZoneAlias) -> Result<(), EngineError> {
        let key = format!("{}\0{}", alias.source_zone_id, alias.method_key.as_str());
        let bytes = serde_json::to_vec(&alias).map_err(internal)?;
        self.aliases.insert(key.as_bytes(), bytes).map_err(internal)?;
        Ok(())
    }
}

#[async_trait]
impl OwnerRepo for SledStore {
    async fn collective_target(&self, owner_id: OwnerId) -> Result<Option<OwnerId>, EngineError> {
        match self.follows.get(owner_id.to_be_bytes()).map_err(internal)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_ref().try_into().map_err(|_| internal("corrupt follow value"))?;
                Ok(Some(OwnerId::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    async fn followers_of(&self, collective_owner_id: OwnerId) -> Result<Vec<OwnerId>, EngineError> {
        let mut followers = Vec::new();
        for item in self.follows.iter() {
            let (key, value) = item.map_err(internal)?;
            let target_arr: [u8; 8] = value.as_ref().try_into().map_err(|_| internal("corrupt follow value"))?;
            if OwnerId::from_be_bytes(target_arr) == collective_owner_id {
                let key_arr: [u8; 8] = key.as_ref().try_into().map_err(|_| internal("corrupt follow key"))?;
                followers.push(OwnerId::from_be_bytes(key_arr));
            }
        }
        Ok(followers)
    }

    async fn set_follow(&self, follower_id: OwnerId, collective_owner_id: OwnerId) -> Result<(), EngineError> {
        self.follows
            .insert(follower_id.to_be_bytes(), &collective_owner_id.to_be_bytes())
            .map_err(internal)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MethodKey;

    fn temp_store() -> SledStore {
        let dir = tempfile::tempdir().unwrap();
        SledStore::open(dir.path().join("db").to_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn calendar_round_trips() {
        let store = temp_store();
        let method_key = MethodKey::new(3, 0, 1);
        let cal = YearlyCalendar {
            zone_id: "grid:28.60/77.20".into(),
            year: 2025,
            method_key: method_key.clone(),
            schema_version: "v1".into(),
            days: vec![],
            content_hash: "abc".into(),
            created_at: 0,
            updated_at: 0,
        };
        CalendarRepo::upsert(&store, cal).await.unwrap();
        let fetched = CalendarRepo::get(&store, "grid:28.60/77.20", 2025, &method_key).await.unwrap();
        assert!(fetched.is_some());
        assert_eq!(fetched.unwrap().content_hash, "abc");
    }

    #[tokio::test]
    async fn delete_years_before_prunes_old_calendars() {
        let store = temp_store();
        let method_key = MethodKey::new(3, 0, 1);
        for year in [2023, 2024, 2025] {
            CalendarRepo::upsert(
                &store,
                YearlyCalendar {
                    zone_id: "grid:1.00/1.00".into(),
                    year,
                    method_key: method_key.clone(),
                    schema_version: "v1".into(),
                    days: vec![],
                    content_hash: "h".into(),
                    created_at: 0,
                    updated_at: 0,
                },
            )
            .await
            .unwrap();
        }
        let deleted = CalendarRepo::delete_years_before(&store, 2025).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(CalendarRepo::get(&store, "grid:1.00/1.00", 2024, &method_key).await.unwrap().is_none());
        assert!(CalendarRepo::get(&store, "grid:1.00/1.00", 2025, &method_key).await.unwrap().is_some());
    }
}

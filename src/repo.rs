//! Repository ports (Component J): the narrow interfaces the engine calls
//! for persistence. Production wires these to the embedded `sled` cold
//! store plus an in-process hot cache; tests wire in-memory fakes.

use crate::domain::{
    LastRawTimes, MethodKey, MonthlySchedule, OwnerId, OwnerSettings, YearlyCalendar, ZoneAlias,
};
use crate::error::EngineError;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait CalendarRepo: Send + Sync {
    async fn get(
        &self,
        zone_id: &str,
        year: i32,
        method_key: &MethodKey,
    ) -> Result<Option<YearlyCalendar>, EngineError>;

    async fn upsert(&self, calendar: YearlyCalendar) -> Result<(), EngineError>;

    /// Distinct `(zone_id, method_key)` pairs present in the cold store,
    /// used by the yearly rolling-wave fetcher.
    async fn list_zone_method_pairs(&self) -> Result<Vec<(String, MethodKey)>, EngineError>;

    async fn delete_years_before(&self, year: i32) -> Result<u64, EngineError>;
}

#[async_trait]
pub trait ScheduleRepo: Send + Sync {
    async fn get(
        &self,
        owner_id: OwnerId,
        year: i32,
        month: u32,
    ) -> Result<Option<MonthlySchedule>, EngineError>;

    async fn upsert(&self, schedule: MonthlySchedule) -> Result<(), EngineError>;

    async fn delete(&self, owner_id: OwnerId, year: i32, month: u32) -> Result<(), EngineError>;

    /// Owner ids that already have a schedule for `(year, month)`, used to
    /// skip redundant rolling-wave dispatches.
    async fn owners_with_schedule(&self, year: i32, month: u32) -> Result<Vec<OwnerId>, EngineError>;
}

#[async_trait]
pub trait SettingsRepo: Send + Sync {
    async fn get(&self, owner_id: OwnerId) -> Result<Option<OwnerSettings>, EngineError>;
    async fn put(&self, settings: OwnerSettings) -> Result<(), EngineError>;
    async fn get_last_raw_times(&self, owner_id: OwnerId) -> Result<Option<LastRawTimes>, EngineError>;
    async fn put_last_raw_times(&self, owner_id: OwnerId, raw: LastRawTimes) -> Result<(), EngineError>;
    /// All known owner ids, used by the monthly rolling-wave generator.
    async fn all_owner_ids(&self) -> Result<Vec<OwnerId>, EngineError>;
}

#[async_trait]
pub trait AliasRepo: Send + Sync {
    async fn get(&self, source_zone_id: &str, method_key: &MethodKey) -> Result<Option<ZoneAlias>, EngineError>;
    async fn put(&self, alias: ZoneAlias) -> Result<(), EngineError>;
}

/// Resolves whether an owner follows a collective owner (a masjid), and to
/// which one, backing the follow/settings-conflict rules of Component H.
#[async_trait]
pub trait OwnerRepo: Send + Sync {
    async fn collective_target(&self, owner_id: OwnerId) -> Result<Option<OwnerId>, EngineError>;
    async fn followers_of(&self, collective_owner_id: OwnerId) -> Result<Vec<OwnerId>, EngineError>;
    async fn set_follow(&self, follower_id: OwnerId, collective_owner_id: OwnerId) -> Result<(), EngineError>;
}

/// The hot cache tier: a key-value store with TTL, plus the atomic
/// set-if-absent primitive the single-flight lock is built on.
#[async_trait]
pub trait HotCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, EngineError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), EngineError>;
    /// Atomically claims `key` for `ttl` if absent; returns true if this
    /// call was the claimant.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, EngineError>;
    async fn delete(&self, key: &str) -> Result<(), EngineError>;
}

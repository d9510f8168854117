pub mod json_file;

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::dao::models::{MapEntity, PoolEntity, RoundEntity, ScheduleEntity, WatchEntity};
use crate::dao::storage::StorageResult;

/// Raw cooldown collection, values not yet validated.
pub type RawCooldowns = BTreeMap<String, Value>;

/// Abstraction over the named record collections the service persists.
///
/// Saves replace the whole collection. Callers serialize read-modify-write cycles with the
/// collection locks held by the application state.
pub trait VoteStore: Send + Sync {
    /// Map catalog.
    fn load_maps(&self) -> BoxFuture<'static, StorageResult<Vec<MapEntity>>>;
    /// Named pools.
    fn load_pools(&self) -> BoxFuture<'static, StorageResult<Vec<PoolEntity>>>;
    /// Cooldowns as stored, possibly hand-edited.
    fn load_cooldowns(&self) -> BoxFuture<'static, StorageResult<RawCooldowns>>;
    /// Replace the cooldown collection.
    fn save_cooldowns(
        &self,
        cooldowns: BTreeMap<String, u32>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Every round, open and closed.
    fn load_rounds(&self) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>>;
    /// Replace the round collection.
    fn save_rounds(&self, rounds: Vec<RoundEntity>) -> BoxFuture<'static, StorageResult<()>>;
    /// Stored schedules.
    fn load_schedules(&self) -> BoxFuture<'static, StorageResult<Vec<ScheduleEntity>>>;
    /// Replace the schedule collection.
    fn save_schedules(
        &self,
        schedules: Vec<ScheduleEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Match watcher bookkeeping.
    fn load_watch(&self) -> BoxFuture<'static, StorageResult<WatchEntity>>;
    /// Replace the match watcher bookkeeping.
    fn save_watch(&self, watch: WatchEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Whether the backend can currently serve requests.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

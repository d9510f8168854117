use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::{ScheduleEntity, ServerSettings},
    error::ServiceError,
    services::scheduler::{CronTimetable, DEFAULT_POOL},
    state::SharedState,
};

/// Changes to the schedule matching `(pool, cron)`, or a new schedule when none matches.
#[derive(Debug, Clone, Default)]
pub struct ScheduleUpsert {
    /// Pool; unset means the default pool.
    pub pool: Option<String>,
    /// Five-field crontab expression.
    pub cron: String,
    /// Settings merged into the stored ones.
    pub settings: ServerSettings,
    /// Start a vote; otherwise queue a map directly.
    pub mapvote_enabled: Option<bool>,
    /// Cooldown override.
    pub mapvote_cooldown: Option<u32>,
    /// Quorum override.
    pub minimum_votes: Option<u32>,
}

/// Stored schedules as written on disk.
pub async fn list_schedules(state: &SharedState) -> Result<Vec<ScheduleEntity>, ServiceError> {
    Ok(state.store().load_schedules().await?)
}

/// Create or update the schedule for `(pool, cron)`, merging settings field by field, and ask
/// the scheduler to reload.
pub async fn upsert_schedule(
    state: &SharedState,
    upsert: ScheduleUpsert,
) -> Result<ScheduleEntity, ServiceError> {
    let cron = upsert.cron.trim().to_string();
    let timezone = state.config().current().timezone;
    CronTimetable::parse(&cron, timezone)
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
    let pool = upsert
        .pool
        .filter(|pool| !pool.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_POOL.to_string());

    let store = state.store();
    let saved = {
        let _schedules_guard = state.locks().schedules.lock().await;
        let mut schedules = store.load_schedules().await?;

        let position = schedules.iter().position(|schedule| {
            schedule.pool.as_deref().unwrap_or(DEFAULT_POOL) == pool
                && schedule.cron.trim() == cron
        });
        let schedule = match position {
            Some(position) => &mut schedules[position],
            None => {
                schedules.push(ScheduleEntity {
                    id: Uuid::new_v4(),
                    pool: Some(pool.clone()),
                    cron: cron.clone(),
                    settings: ServerSettings::default(),
                    mapvote_enabled: true,
                    mapvote_cooldown: None,
                    minimum_votes: None,
                });
                let last = schedules.len() - 1;
                &mut schedules[last]
            }
        };

        schedule.settings.merge(upsert.settings);
        if let Some(enabled) = upsert.mapvote_enabled {
            schedule.mapvote_enabled = enabled;
        }
        if upsert.mapvote_cooldown.is_some() {
            schedule.mapvote_cooldown = upsert.mapvote_cooldown;
        }
        if upsert.minimum_votes.is_some() {
            schedule.minimum_votes = upsert.minimum_votes;
        }
        let saved = schedule.clone();

        store.save_schedules(schedules).await?;
        saved
    };

    info!(schedule = %saved.id, pool = %pool, cron = %cron, "schedule saved");
    state.request_schedule_reload();
    Ok(saved)
}

/// Remove schedule `id` and ask the scheduler to reload.
pub async fn delete_schedule(state: &SharedState, id: Uuid) -> Result<(), ServiceError> {
    let store = state.store();
    {
        let _schedules_guard = state.locks().schedules.lock().await;
        let mut schedules = store.load_schedules().await?;
        let before = schedules.len();
        schedules.retain(|schedule| schedule.id != id);
        if schedules.len() == before {
            return Err(ServiceError::NotFound(format!("schedule {id}")));
        }
        store.save_schedules(schedules).await?;
    }

    info!(schedule = %id, "schedule deleted");
    state.request_schedule_reload();
    Ok(())
}

//! DTO definitions used by the admin REST API.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    dao::models::ServerSettings,
    dto::{rounds::PushStatus, validation::validate_crontab},
    services::{
        round_service::{QueuedMap, StartRound},
        schedule_service::ScheduleUpsert,
        scheduler::DEFAULT_POOL,
    },
    state::cooldowns::CooldownLedger,
};

/// Manual round start. Unset fields use the configured defaults.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct StartRoundRequest {
    #[validate(length(min = 1, max = 64))]
    pub pool: Option<String>,
    pub mapvote_cooldown: Option<u32>,
    pub minimum_votes: Option<u32>,
    #[validate(range(min = 1, max = 25))]
    pub candidate_count: Option<usize>,
}

impl From<StartRoundRequest> for StartRound {
    fn from(value: StartRoundRequest) -> Self {
        Self {
            pool: value.pool.unwrap_or_else(|| DEFAULT_POOL.to_string()),
            mapvote_cooldown: value.mapvote_cooldown,
            minimum_votes: value.minimum_votes,
            candidate_count: value.candidate_count,
        }
    }
}

/// Remaining cooldown of one map.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CooldownEntry {
    pub map_code: String,
    pub rounds: u32,
}

/// Maps still cooling down, by base code.
pub fn cooldown_entries(ledger: &CooldownLedger) -> Vec<CooldownEntry> {
    ledger
        .iter()
        .filter(|(_, rounds)| *rounds > 0)
        .map(|(code, rounds)| CooldownEntry {
            map_code: code.to_string(),
            rounds,
        })
        .collect()
}

/// Queue a map without a vote.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct QueueMapRequest {
    #[validate(length(min = 1, max = 64))]
    pub pool: Option<String>,
    pub mapvote_cooldown: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct QueueMapResponse {
    pub map_code: Option<String>,
    pub label: Option<String>,
    pub push: PushStatus,
}

impl From<Option<QueuedMap>> for QueueMapResponse {
    fn from(value: Option<QueuedMap>) -> Self {
        match value {
            Some(queued) => Self {
                push: PushStatus::from_result(Some(&queued.push)),
                map_code: Some(queued.map_code),
                label: Some(queued.label),
            },
            None => Self {
                map_code: None,
                label: None,
                push: PushStatus::Skipped,
            },
        }
    }
}

/// Create or update the schedule matching `(pool, cron)`.
#[derive(Debug, Deserialize, Validate)]
pub struct ScheduleRequest {
    #[validate(length(min = 1, max = 64))]
    pub pool: Option<String>,
    #[validate(custom(function = "validate_crontab"))]
    pub cron: String,
    #[serde(default)]
    pub settings: ServerSettings,
    pub mapvote_enabled: Option<bool>,
    pub mapvote_cooldown: Option<u32>,
    pub minimum_votes: Option<u32>,
}

impl From<ScheduleRequest> for ScheduleUpsert {
    fn from(value: ScheduleRequest) -> Self {
        Self {
            pool: value.pool,
            cron: value.cron,
            settings: value.settings,
            mapvote_enabled: value.mapvote_enabled,
            mapvote_cooldown: value.mapvote_cooldown,
            minimum_votes: value.minimum_votes,
        }
    }
}

/// Generic action acknowledgement used by admin endpoints.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub message: String,
}

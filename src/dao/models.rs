use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::state::{resolution::Resolution, round::RoundId};

/// Catalog entry as stored in `maps.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MapEntity {
    /// Map code understood by the game server.
    pub code: String,
    /// Human readable name.
    #[serde(default, alias = "display_name")]
    pub name: String,
    /// Whether the map may be offered in votes.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Named subset of the catalog as stored in `pools.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolEntity {
    /// Pool name.
    #[serde(default)]
    pub name: String,
    /// Map codes belonging to the pool.
    #[serde(default, alias = "map_codes")]
    pub maps: Vec<String>,
    /// Whether the pool restricts candidate selection.
    #[serde(default)]
    pub active: bool,
}

/// Persisted lifecycle marker of a round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatusEntity {
    /// Accepting ballots.
    Open,
    /// Closed and handed to the game server.
    #[serde(alias = "closed")]
    Pushed,
}

/// Per-round settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundMetaEntity {
    /// Cooldown applied to the winner.
    #[serde(default, deserialize_with = "lenient_count")]
    pub mapvote_cooldown: Option<u32>,
    /// Quorum below which the winner is drawn at random.
    #[serde(default, deserialize_with = "lenient_count")]
    pub minimum_votes: Option<u32>,
}

/// Option of a round as stored in `votes.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundOptionEntity {
    /// 1-based position shown to voters.
    pub index: usize,
    /// Map code of the option.
    pub map: String,
    /// Label shown to voters.
    pub label: String,
    /// Tally computed at close time.
    #[serde(default)]
    pub votes: u32,
}

/// Vote round record stored in `votes.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundEntity {
    /// Round identifier.
    pub id: RoundId,
    /// Pool the round was started for.
    #[serde(default = "default_pool")]
    pub pool: String,
    /// Chat channel the round is rendered in.
    #[serde(default)]
    pub channel_id: Option<String>,
    /// Opening time.
    pub started_at: DateTime<Utc>,
    /// Time the timer closes the round.
    pub ends_at: DateTime<Utc>,
    /// Lifecycle marker.
    pub status: RoundStatusEntity,
    /// Settings captured at open time.
    #[serde(default)]
    pub meta: RoundMetaEntity,
    /// Options in display order.
    #[serde(default)]
    pub options: Vec<RoundOptionEntity>,
    /// Voter identifier to chosen option index.
    #[serde(default)]
    pub ballots: IndexMap<String, usize>,
    /// Winner chosen at close time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Resolution>,
    /// Reason the winner could not be pushed, if it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_error: Option<String>,
    /// Reason the cooldowns could not be updated at close time, if it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_error: Option<String>,
}

/// Server settings applied by a schedule before its round starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSettings {
    /// Ping above which players are kicked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_ping_threshold_ms: Option<u32>,
    /// Whether vote kicks are allowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votekick_enabled: Option<bool>,
    /// Vote kick thresholds as the game server expects them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votekick_threshold: Option<String>,
    /// Reset pending vote kicks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votekick_reset: Option<bool>,
    /// Whether teams are auto-balanced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autobalance_enabled: Option<bool>,
    /// Player difference tolerated before auto-balance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autobalance_threshold: Option<u32>,
    /// Minutes before a player may switch teams again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_switch_cooldown_minutes: Option<u32>,
    /// Minutes of inactivity before a kick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idlekick_duration_minutes: Option<u32>,
}

impl ServerSettings {
    /// Overwrite every field that is set in `other`.
    pub fn merge(&mut self, other: ServerSettings) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        take!(
            high_ping_threshold_ms,
            votekick_enabled,
            votekick_threshold,
            votekick_reset,
            autobalance_enabled,
            autobalance_threshold,
            team_switch_cooldown_minutes,
            idlekick_duration_minutes
        );
    }

    /// Whether no setting is present.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Timetable entry stored in `schedules.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleEntity {
    /// Schedule identifier.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Pool to start rounds for; unset means the default pool.
    #[serde(default)]
    pub pool: Option<String>,
    /// Five-field crontab expression.
    #[serde(default)]
    pub cron: String,
    /// Settings applied before the round starts.
    #[serde(default)]
    pub settings: ServerSettings,
    /// Start a vote; otherwise queue a map directly.
    #[serde(default = "default_true")]
    pub mapvote_enabled: bool,
    /// Cooldown override for the winner.
    #[serde(default, deserialize_with = "lenient_count")]
    pub mapvote_cooldown: Option<u32>,
    /// Quorum override for the round.
    #[serde(default, deserialize_with = "lenient_count")]
    pub minimum_votes: Option<u32>,
}

/// Match watcher bookkeeping stored in `watch.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchEntity {
    /// Match marker seen on the last poll.
    #[serde(default)]
    pub last_session_id: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_pool() -> String {
    "default".into()
}

/// Accept hand-edited counts: `null` means unset, numbers and numeric strings are read as-is
/// (negatives clamp to zero) and anything else counts as zero.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match value {
        Value::Null => None,
        Value::Number(number) => Some(clamp_count(number.as_i64().unwrap_or(0))),
        Value::String(text) => Some(clamp_count(text.trim().parse::<i64>().unwrap_or(0))),
        _ => Some(0),
    }))
}

fn clamp_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn schedule_counts_are_lenient() {
        let raw = json!([
            { "cron": "0 0 * * *", "mapvote_cooldown": null, "minimum_votes": "" },
            { "cron": "0 0 * * *", "mapvote_enabled": false, "minimum_votes": "4" },
            { "cron": "0 0 * * *", "mapvote_cooldown": -3 }
        ]);

        let schedules: Vec<ScheduleEntity> = serde_json::from_value(raw).expect("valid schedules");

        assert_eq!(schedules[0].mapvote_cooldown, None);
        assert_eq!(schedules[0].minimum_votes, Some(0));
        assert!(schedules[0].mapvote_enabled);
        assert!(!schedules[1].mapvote_enabled);
        assert_eq!(schedules[1].minimum_votes, Some(4));
        assert_eq!(schedules[2].mapvote_cooldown, Some(0));
        assert_eq!(schedules[2].minimum_votes, None);
    }

    #[test]
    fn legacy_round_records_load() {
        let raw = json!({
            "id": 2,
            "pool": "default",
            "channel_id": "42",
            "started_at": "2024-01-01T12:00:00+11:00",
            "ends_at": "2024-01-01T13:00:00+11:00",
            "status": "open",
            "meta": { "mapvote_cooldown": 2 },
            "options": [
                { "index": 1, "map": "FOY", "label": "Foy", "votes": 0 }
            ],
            "ballots": { "123": 1 }
        });

        let round: RoundEntity = serde_json::from_value(raw).expect("valid round");

        assert_eq!(round.status, RoundStatusEntity::Open);
        assert_eq!(round.meta.mapvote_cooldown, Some(2));
        assert_eq!(round.meta.minimum_votes, None);
        assert_eq!(round.ballots.get("123"), Some(&1));
        assert_eq!(round.started_at.to_rfc3339(), "2024-01-01T01:00:00+00:00");
        assert_eq!(round.winner, None);
    }

    #[test]
    fn closed_status_reads_as_pushed() {
        let raw = json!({
            "id": 3,
            "started_at": "2024-01-01T12:00:00Z",
            "ends_at": "2024-01-01T13:00:00Z",
            "status": "closed"
        });

        let round: RoundEntity = serde_json::from_value(raw).expect("valid round");

        assert_eq!(round.status, RoundStatusEntity::Pushed);
        assert_eq!(
            serde_json::to_value(round.status).expect("serializes"),
            json!("pushed")
        );
    }

    #[test]
    fn maps_default_to_enabled() {
        let map: MapEntity =
            serde_json::from_value(json!({ "code": "FOY", "name": "Foy" })).expect("valid map");
        assert!(map.enabled);
    }

    #[test]
    fn settings_merge_keeps_unset_fields() {
        let mut base = ServerSettings {
            high_ping_threshold_ms: Some(200),
            votekick_enabled: Some(true),
            ..ServerSettings::default()
        };
        base.merge(ServerSettings {
            votekick_enabled: Some(false),
            idlekick_duration_minutes: Some(15),
            ..ServerSettings::default()
        });

        assert_eq!(base.high_ping_threshold_ms, Some(200));
        assert_eq!(base.votekick_enabled, Some(false));
        assert_eq!(base.idlekick_duration_minutes, Some(15));
    }
}

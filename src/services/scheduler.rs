//! Cron-driven round starts.
//!
//! Every stored schedule becomes one tokio task sleeping until its next fire time. The job set is
//! rebuilt periodically and whenever [`AppState::request_schedule_reload`] is called.
//!
//! [`AppState::request_schedule_reload`]: crate::state::AppState::request_schedule_reload

use std::{collections::BTreeSet, str::FromStr, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use thiserror::Error;
use tokio::{sync::Mutex, task::JoinHandle, time::sleep};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::models::{ScheduleEntity, ServerSettings},
    error::ServiceError,
    services::{
        game_server::rotation::apply_server_settings,
        round_service::{self, StartRound},
        round_timer,
    },
    state::SharedState,
};

/// Pool used by schedules that do not name one.
pub const DEFAULT_POOL: &str = "default";

/// Failures while interpreting a schedule.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The expression is not a valid crontab.
    #[error("invalid cron expression `{expr}`")]
    InvalidCron {
        /// Expression as stored.
        expr: String,
        /// Underlying error.
        #[source]
        source: cron::error::Error,
    },
}

/// A stored schedule with every default resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    /// Schedule identifier.
    pub id: Uuid,
    /// Pool rounds are started for.
    pub pool: String,
    /// Trimmed crontab expression.
    pub cron: String,
    /// Settings applied before the round starts.
    pub settings: ServerSettings,
    /// Start a vote; otherwise queue a map directly.
    pub mapvote_enabled: bool,
    /// Cooldown applied to the winner.
    pub mapvote_cooldown: u32,
    /// Quorum for the round.
    pub minimum_votes: u32,
}

impl ScheduleEntry {
    /// Resolve the defaults of `entity` against `config`.
    pub fn shape(entity: ScheduleEntity, config: &AppConfig) -> Self {
        Self {
            id: entity.id,
            pool: entity
                .pool
                .filter(|pool| !pool.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_POOL.to_string()),
            cron: entity.cron.trim().to_string(),
            settings: entity.settings,
            mapvote_enabled: entity.mapvote_enabled,
            mapvote_cooldown: entity.mapvote_cooldown.unwrap_or(config.mapvote_cooldown),
            minimum_votes: entity.minimum_votes.unwrap_or(config.minimum_votes),
        }
    }
}

/// Cron expression bound to the time zone it is evaluated in.
#[derive(Debug, Clone)]
pub struct CronTimetable {
    schedule: Schedule,
    timezone: Tz,
}

impl CronTimetable {
    /// Parse a schedule expression.
    ///
    /// Five-field expressions are standard crontab: they get a leading seconds field and their
    /// day-of-week numbers (0-7, Sunday is 0 or 7) are renumbered for `cron`, which counts
    /// Sunday as 1. Six and seven field expressions are passed through unchanged.
    pub fn parse(expr: &str, timezone: Tz) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let normalized = match fields.as_slice() {
            [minute, hour, day, month, weekday] => format!(
                "0 {minute} {hour} {day} {month} {}",
                crontab_weekdays(weekday)
            ),
            _ => fields.join(" "),
        };

        let schedule =
            Schedule::from_str(&normalized).map_err(|source| ScheduleError::InvalidCron {
                expr: expr.to_string(),
                source,
            })?;
        Ok(Self { schedule, timezone })
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&self.timezone))
            .next()
            .map(|fire| fire.with_timezone(&Utc))
    }
}

/// Renumber every numeric item of a crontab day-of-week field. Named days stay as written and
/// items that do not parse are left for `cron` to reject.
fn crontab_weekdays(field: &str) -> String {
    field
        .split(',')
        .map(|item| crontab_weekday_item(item).unwrap_or_else(|| item.to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

fn crontab_weekday_item(item: &str) -> Option<String> {
    if item == "*" {
        return None;
    }

    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, step.parse::<u32>().ok().filter(|step| *step > 0)?),
        None => (item, 1),
    };
    let (start, end) = match range.split_once('-') {
        _ if range == "*" => (0, 6),
        Some((start, end)) => (start.parse::<u32>().ok()?, end.parse::<u32>().ok()?),
        None => {
            let day = range.parse::<u32>().ok()?;
            if item.contains('/') {
                (day, day.max(6))
            } else {
                (day, day)
            }
        }
    };
    if start > end || end > 7 {
        return None;
    }

    let days: BTreeSet<u32> = (start..=end)
        .step_by(step as usize)
        .map(|day| day % 7 + 1)
        .collect();
    Some(
        days.iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Stored schedules with defaults resolved against the current configuration.
pub async fn load_schedules(state: &SharedState) -> Result<Vec<ScheduleEntry>, ServiceError> {
    let config = state.config().current();
    Ok(state
        .store()
        .load_schedules()
        .await?
        .into_iter()
        .map(|entity| ScheduleEntry::shape(entity, &config))
        .collect())
}

/// Run one schedule: apply its server settings, then start a vote or queue a map directly.
pub async fn trigger_round_start(
    state: &SharedState,
    entry: &ScheduleEntry,
) -> Result<(), ServiceError> {
    if !entry.settings.is_empty() {
        let game_server = state.game_server();
        match apply_server_settings(game_server.as_ref(), &entry.settings).await {
            Ok(count) => info!(schedule = %entry.id, count, "applied server settings"),
            Err(err) => warn!(schedule = %entry.id, error = %err, "failed to apply server settings"),
        }
    }

    if entry.mapvote_enabled {
        let request = StartRound {
            pool: entry.pool.clone(),
            mapvote_cooldown: Some(entry.mapvote_cooldown),
            minimum_votes: Some(entry.minimum_votes),
            candidate_count: None,
        };
        let round = round_timer::start_timed_round(state, request).await?;
        info!(schedule = %entry.id, round_id = round.id, "scheduled vote started");
    } else {
        round_service::queue_next_map(state, &entry.pool, Some(entry.mapvote_cooldown)).await?;
    }

    Ok(())
}

/// Owns the running schedule jobs.
pub struct VoteScheduler {
    state: SharedState,
    jobs: Mutex<Vec<JoinHandle<()>>>,
}

impl VoteScheduler {
    /// Scheduler with no jobs loaded yet.
    pub fn new(state: SharedState) -> Arc<Self> {
        Arc::new(Self {
            state,
            jobs: Mutex::new(Vec::new()),
        })
    }

    /// Replace every running job with one per valid stored schedule. Returns the job count.
    pub async fn reload_jobs(&self) -> Result<usize, ServiceError> {
        let schedules = load_schedules(&self.state).await?;
        let timezone = self.state.config().current().timezone;

        let mut jobs = self.jobs.lock().await;
        for job in jobs.drain(..) {
            job.abort();
        }

        for entry in schedules {
            if entry.cron.is_empty() {
                continue;
            }
            match CronTimetable::parse(&entry.cron, timezone) {
                Ok(timetable) => {
                    jobs.push(tokio::spawn(run_job(self.state.clone(), entry, timetable)));
                }
                Err(err) => warn!(schedule = %entry.id, error = %err, "skipping schedule"),
            }
        }

        info!(jobs = jobs.len(), %timezone, "schedule jobs loaded");
        Ok(jobs.len())
    }

    /// Load the jobs, then reload them periodically and on request. Never returns.
    pub async fn run(self: Arc<Self>) {
        loop {
            if let Err(err) = self.reload_jobs().await {
                error!(error = %err, "failed to load schedules");
            }

            let minutes = self.state.config().current().scheduler_reload_minutes;
            if minutes == 0 {
                self.state.schedule_reload_requested().await;
            } else {
                tokio::select! {
                    _ = sleep(Duration::from_secs(minutes * 60)) => {}
                    _ = self.state.schedule_reload_requested() => {}
                }
            }
        }
    }
}

async fn run_job(state: SharedState, entry: ScheduleEntry, timetable: CronTimetable) {
    loop {
        let now = Utc::now();
        let Some(next) = timetable.next_after(now) else {
            warn!(schedule = %entry.id, "schedule has no future fire time");
            return;
        };
        sleep((next - now).to_std().unwrap_or_default()).await;

        info!(schedule = %entry.id, pool = %entry.pool, "schedule fired");
        let state = state.clone();
        let entry = entry.clone();
        // A reload aborts this job, not a start already in progress.
        tokio::spawn(async move {
            if let Err(err) = trigger_round_start(&state, &entry).await {
                error!(schedule = %entry.id, error = %err, "scheduled round start failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::{config::AppConfig, test_support::Harness};

    fn entity(pool: Option<&str>, cron: &str) -> ScheduleEntity {
        ScheduleEntity {
            id: Uuid::new_v4(),
            pool: pool.map(str::to_string),
            cron: cron.into(),
            settings: ServerSettings::default(),
            mapvote_enabled: true,
            mapvote_cooldown: None,
            minimum_votes: None,
        }
    }

    #[test]
    fn five_field_crontab_is_accepted() {
        let timetable =
            CronTimetable::parse("30 19 * * *", chrono_tz::UTC).expect("valid crontab");
        let after = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp");

        let next = timetable.next_after(after).expect("has a next fire");

        assert_eq!(
            next,
            Utc.with_ymd_and_hms(2024, 5, 1, 19, 30, 0)
                .single()
                .expect("valid timestamp")
        );
    }

    #[test]
    fn fire_times_follow_the_configured_zone() {
        let timetable = CronTimetable::parse("0 20 * * *", chrono_tz::Australia::Sydney)
            .expect("valid crontab");
        let after = Utc
            .with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
            .single()
            .expect("valid timestamp");

        let next = timetable.next_after(after).expect("has a next fire");

        // Sydney is UTC+10 in June.
        assert_eq!(
            next,
            Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0)
                .single()
                .expect("valid timestamp")
        );
    }

    fn saturday_evening() -> DateTime<Utc> {
        // 2024-06-01 is a Saturday.
        Utc.with_ymd_and_hms(2024, 6, 1, 21, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn next_fire(expr: &str) -> DateTime<Utc> {
        CronTimetable::parse(expr, chrono_tz::UTC)
            .expect("valid crontab")
            .next_after(saturday_evening())
            .expect("has a next fire")
    }

    fn evening_of(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 20, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn crontab_sunday_is_zero_or_seven() {
        assert_eq!(next_fire("0 20 * * 0"), evening_of(2));
        assert_eq!(next_fire("0 20 * * 7"), evening_of(2));
        assert_eq!(next_fire("0 20 * * SUN"), evening_of(2));
    }

    #[test]
    fn crontab_weekday_ranges_use_standard_numbering() {
        assert_eq!(next_fire("0 20 * * 1-5"), evening_of(3));
        assert_eq!(next_fire("0 20 * * MON-FRI"), evening_of(3));
        assert_eq!(next_fire("0 20 * * 6"), evening_of(8));
        assert_eq!(next_fire("0 20 * * 5-7"), evening_of(2));
        assert_eq!(next_fire("0 20 * * 2,4"), evening_of(4));
    }

    #[test]
    fn crontab_weekday_fields_are_renumbered() {
        assert_eq!(crontab_weekdays("0"), "1");
        assert_eq!(crontab_weekdays("7"), "1");
        assert_eq!(crontab_weekdays("1-5"), "2,3,4,5,6");
        assert_eq!(crontab_weekdays("*/2"), "1,3,5,7");
        assert_eq!(crontab_weekdays("*"), "*");
        assert_eq!(crontab_weekdays("MON,3"), "MON,4");
        assert!(CronTimetable::parse("0 20 * * 8", chrono_tz::UTC).is_err());
    }

    #[test]
    fn invalid_crontab_is_rejected() {
        assert!(CronTimetable::parse("every evening", chrono_tz::UTC).is_err());
    }

    #[test]
    fn shape_fills_defaults_from_config() {
        let config = AppConfig {
            mapvote_cooldown: 5,
            minimum_votes: 2,
            ..AppConfig::default()
        };
        let mut raw = entity(None, " 0 20 * * * ");
        raw.minimum_votes = Some(0);

        let entry = ScheduleEntry::shape(raw, &config);

        assert_eq!(entry.pool, DEFAULT_POOL);
        assert_eq!(entry.cron, "0 20 * * *");
        assert_eq!(entry.mapvote_cooldown, 5);
        assert_eq!(entry.minimum_votes, 0);
    }

    #[tokio::test]
    async fn trigger_applies_settings_then_starts_round() {
        let harness = Harness::new(&["FOY", "UTAH"]);
        let mut raw = entity(Some("night"), "0 20 * * *");
        raw.settings.autobalance_enabled = Some(false);
        raw.mapvote_cooldown = Some(6);
        let entry = ScheduleEntry::shape(raw, &AppConfig::default());

        trigger_round_start(&harness.state, &entry)
            .await
            .expect("trigger succeeds");

        assert_eq!(harness.server.sent_names()[0], "SetAutoBalanceEnabled");
        let rounds = harness.store.rounds();
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].pool, "night");
        assert_eq!(rounds[0].meta.mapvote_cooldown, Some(6));
    }

    #[tokio::test]
    async fn settings_failure_does_not_stop_the_round() {
        let harness = Harness::new(&["FOY"]);
        harness.server.fail_command("SetIdleKickDuration");
        let mut raw = entity(None, "0 20 * * *");
        raw.settings.idlekick_duration_minutes = Some(15);
        let entry = ScheduleEntry::shape(raw, &AppConfig::default());

        trigger_round_start(&harness.state, &entry)
            .await
            .expect("trigger succeeds");

        assert_eq!(harness.store.rounds().len(), 1);
    }

    #[tokio::test]
    async fn disabled_vote_queues_a_map_directly() {
        let harness = Harness::new(&["FOY"]);
        let mut raw = entity(None, "0 20 * * *");
        raw.mapvote_enabled = false;
        let entry = ScheduleEntry::shape(
            raw,
            &AppConfig {
                mapvote_cooldown: 4,
                ..AppConfig::default()
            },
        );

        trigger_round_start(&harness.state, &entry)
            .await
            .expect("trigger succeeds");

        assert!(harness.store.rounds().is_empty());
        assert_eq!(harness.server.queued_maps(), vec!["FOY"]);
        assert_eq!(harness.store.cooldowns().get("FOY"), Some(&json!(4)));
    }

    #[tokio::test]
    async fn reload_skips_invalid_and_empty_expressions() {
        let harness = Harness::new(&["FOY"]);
        harness.store.set_schedules(vec![
            entity(None, "0 20 * * *"),
            entity(None, "not a cron"),
            entity(None, ""),
        ]);
        let scheduler = VoteScheduler::new(harness.state.clone());

        let jobs = scheduler.reload_jobs().await.expect("reload succeeds");

        assert_eq!(jobs, 1);
        assert!(harness.store.rounds().is_empty());
    }
}

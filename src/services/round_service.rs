use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::{
    config::AppConfig,
    dao::models::RoundEntity,
    error::ServiceError,
    services::game_server::{
        GameServerError, GameServerResult,
        rotation::{PushOutcome, push_map_to_rotation},
    },
    state::{
        SharedState,
        cooldowns::CooldownLedger,
        pool::{Candidate, MapEntry, Pool, select_candidates},
        resolution::{Resolution, resolve},
        round::{RoundId, RoundMeta, RoundParams, VoteRound},
    },
};

/// Parameters of a round start. Unset fields fall back to the configuration.
#[derive(Debug, Clone, Default)]
pub struct StartRound {
    /// Pool the round is started for.
    pub pool: String,
    /// Cooldown applied to the winner.
    pub mapvote_cooldown: Option<u32>,
    /// Quorum below which the winner is drawn at random.
    pub minimum_votes: Option<u32>,
    /// Number of options offered.
    pub candidate_count: Option<usize>,
}

impl StartRound {
    /// Start request for `pool` with every other setting from the configuration.
    pub fn for_pool(pool: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            ..Self::default()
        }
    }
}

/// What closing a round did.
#[derive(Debug)]
pub struct CloseOutcome {
    /// The round as persisted after the close.
    pub round: VoteRound,
    /// `None` only for a round without options.
    pub resolution: Option<Resolution>,
    /// Result of the rotation push, when there was a winner to push.
    pub push: Option<GameServerResult<PushOutcome>>,
}

/// Map queued directly, without a vote.
#[derive(Debug)]
pub struct QueuedMap {
    /// Code of the queued map.
    pub map_code: String,
    /// Display name of the queued map.
    pub label: String,
    /// Result of the rotation push.
    pub push: GameServerResult<PushOutcome>,
}

/// Open a new round for `request.pool` and announce it.
pub async fn start_round(
    state: &SharedState,
    request: StartRound,
) -> Result<VoteRound, ServiceError> {
    let config = state.config().current();
    let count = request.candidate_count.unwrap_or(config.candidate_count);
    if count == 0 {
        return Err(ServiceError::InvalidInput(
            "candidate count must be at least 1".into(),
        ));
    }

    let candidates = pick_candidates(state, count).await?;
    if candidates.is_empty() {
        return Err(ServiceError::InvalidState(
            "no enabled maps are available for a vote".into(),
        ));
    }

    let params = RoundParams {
        pool: request.pool,
        channel_ref: config.vote_channel_id.clone(),
        meta: RoundMeta {
            mapvote_cooldown: Some(request.mapvote_cooldown.unwrap_or(config.mapvote_cooldown)),
            minimum_votes: request.minimum_votes.unwrap_or(config.minimum_votes),
        },
        duration: config.vote_duration(),
    };

    let store = state.store();
    let round = {
        let _rounds_guard = state.locks().rounds.lock().await;
        let mut rounds = store.load_rounds().await?;
        let round = VoteRound::open(next_round_id(&rounds), params, candidates, Utc::now());
        rounds.push(round.clone().into());
        store.save_rounds(rounds).await?;
        round
    };

    info!(
        round_id = round.id,
        pool = %round.pool,
        options = round.options.len(),
        ends_at = %round.ends_at,
        "vote round opened"
    );

    if let Err(err) = state
        .publisher()
        .post_or_update_round(round.clone())
        .await
    {
        warn!(round_id = round.id, error = %err, "failed to publish round message");
    }

    Ok(round)
}

/// Record `voter`'s ballot for option `index` of round `round_id`.
///
/// Returns the option the voter previously chose, if any.
pub async fn accept_ballot(
    state: &SharedState,
    round_id: RoundId,
    voter: &str,
    index: usize,
) -> Result<Option<usize>, ServiceError> {
    let lock = state.round_lock(round_id);
    let guard = lock.lock().await;
    let result = record_ballot(state, round_id, voter, index).await;
    drop(guard);
    drop(lock);
    state.release_round_lock(round_id);
    result
}

async fn record_ballot(
    state: &SharedState,
    round_id: RoundId,
    voter: &str,
    index: usize,
) -> Result<Option<usize>, ServiceError> {
    let _rounds_guard = state.locks().rounds.lock().await;

    let store = state.store();
    let mut rounds = store.load_rounds().await?;
    let entity = find_round_mut(&mut rounds, round_id)?;

    let mut round = VoteRound::from(entity.clone());
    let previous = round.record_ballot(voter, index)?;
    *entity = round.into();
    store.save_rounds(rounds).await?;

    debug!(round_id, voter, index, ?previous, "ballot recorded");
    Ok(previous)
}

/// Close round `round_id`: tally, pick a winner, apply cooldowns and push the winner.
///
/// Returns `Ok(None)` when the round is unknown or already closed, so a repeated close is a
/// no-op. Once the closed round and its winner are saved, later failures do not undo the close:
/// a failed cooldown update or push is stored on the round and the winner is still pushed and
/// announced.
pub async fn close_round(
    state: &SharedState,
    round_id: RoundId,
) -> Result<Option<CloseOutcome>, ServiceError> {
    let lock = state.round_lock(round_id);
    let guard = lock.lock().await;
    let closed = close_locked(state, round_id).await;
    drop(guard);
    drop(lock);
    state.release_round_lock(round_id);

    let Some(outcome) = closed? else {
        return Ok(None);
    };

    if let Err(err) = state
        .publisher()
        .post_or_update_summary(outcome.round.clone(), outcome.resolution.clone())
        .await
    {
        warn!(round_id, error = %err, "failed to publish round summary");
    }

    Ok(Some(outcome))
}

async fn close_locked(
    state: &SharedState,
    round_id: RoundId,
) -> Result<Option<CloseOutcome>, ServiceError> {
    let config = state.config().current();
    let store = state.store();

    let (mut round, resolution) = {
        let _rounds_guard = state.locks().rounds.lock().await;
        let mut rounds = store.load_rounds().await?;
        let Some(entity) = rounds.iter_mut().find(|round| round.id == round_id) else {
            debug!(round_id, "close requested for unknown round");
            return Ok(None);
        };

        let mut round = VoteRound::from(entity.clone());
        if !round.is_open() {
            debug!(round_id, "round already closed");
            return Ok(None);
        }

        round.retally();
        let resolution =
            state.with_rng(|rng| resolve(&round.options, round.meta.minimum_votes, rng));
        round.mark_pushed()?;
        round.winner = resolution.clone();
        *entity = round.clone().into();
        store.save_rounds(rounds).await?;

        if let Err(err) = apply_cooldowns(state, &config, &round, resolution.as_ref()).await {
            error!(round_id, error = %err, "failed to update cooldowns; round stays closed");
            round.cooldown_error = Some(err.to_string());
        }

        (round, resolution)
    };

    match resolution.as_ref() {
        Some(resolution) => info!(
            round_id,
            map = %resolution.map_code,
            votes = round.total_votes(),
            reason = %resolution.describe(),
            "vote round closed"
        ),
        None => warn!(round_id, "vote round closed without options"),
    }

    let push = match resolution.as_ref() {
        Some(resolution) => Some(push_winner(state, &config, &resolution.map_code).await),
        None => None,
    };

    if let Some(Err(err)) = push.as_ref() {
        error!(round_id, error = %err, "failed to push winning map; round stays closed");
        round.push_error = Some(err.to_string());
    }

    if round.push_error.is_some() || round.cooldown_error.is_some() {
        let recorded = record_close_errors(state, &round).await;
        if let Err(save_err) = recorded {
            warn!(round_id, error = %save_err, "failed to persist close errors");
        }
    }

    Ok(Some(CloseOutcome {
        round,
        resolution,
        push,
    }))
}

/// Pick a single map for `pool` and queue it next without a vote.
///
/// Returns `Ok(None)` when no map is available.
pub async fn queue_next_map(
    state: &SharedState,
    pool: &str,
    mapvote_cooldown: Option<u32>,
) -> Result<Option<QueuedMap>, ServiceError> {
    let config = state.config().current();
    let Some(pick) = pick_candidates(state, 1).await?.into_iter().next() else {
        warn!(pool, "no map available to queue");
        return Ok(None);
    };

    {
        let _cooldowns_guard = state.locks().cooldowns.lock().await;
        let cooldown = mapvote_cooldown.unwrap_or(config.mapvote_cooldown);
        let ledger = load_ledger(state)
            .await?
            .decrement_all()
            .set_cooldown(&pick.code, i64::from(cooldown));
        state.store().save_cooldowns(ledger.to_raw()).await?;
    }

    let push = push_winner(state, &config, &pick.code).await;
    match push.as_ref() {
        Ok(outcome) => info!(pool, map = %pick.code, ?outcome, "queued map without a vote"),
        Err(err) => error!(pool, map = %pick.code, error = %err, "failed to queue map"),
    }

    Ok(Some(QueuedMap {
        map_code: pick.code,
        label: pick.label,
        push,
    }))
}

/// Every persisted round, newest first.
pub async fn list_rounds(state: &SharedState) -> Result<Vec<VoteRound>, ServiceError> {
    let mut rounds: Vec<VoteRound> = state
        .store()
        .load_rounds()
        .await?
        .into_iter()
        .map(VoteRound::from)
        .collect();
    rounds.sort_by(|a, b| b.id.cmp(&a.id));
    Ok(rounds)
}

/// Rounds still accepting ballots.
pub async fn open_rounds(state: &SharedState) -> Result<Vec<VoteRound>, ServiceError> {
    let mut rounds = list_rounds(state).await?;
    rounds.retain(VoteRound::is_open);
    Ok(rounds)
}

/// Round `round_id`, or `NotFound`.
pub async fn find_round(state: &SharedState, round_id: RoundId) -> Result<VoteRound, ServiceError> {
    state
        .store()
        .load_rounds()
        .await?
        .into_iter()
        .find(|round| round.id == round_id)
        .map(VoteRound::from)
        .ok_or_else(|| ServiceError::NotFound(format!("round {round_id}")))
}

/// Current cooldown ledger.
pub async fn cooldowns(state: &SharedState) -> Result<CooldownLedger, ServiceError> {
    load_ledger(state).await
}

async fn pick_candidates(state: &SharedState, count: usize) -> Result<Vec<Candidate>, ServiceError> {
    let store = state.store();
    let maps: Vec<MapEntry> = store
        .load_maps()
        .await?
        .into_iter()
        .map(MapEntry::from)
        .collect();
    let pools: Vec<Pool> = store
        .load_pools()
        .await?
        .into_iter()
        .map(Pool::from)
        .collect();
    let ledger = load_ledger(state).await?;

    Ok(state.with_rng(|rng| select_candidates(&maps, &pools, &ledger, count, rng)))
}

async fn load_ledger(state: &SharedState) -> Result<CooldownLedger, ServiceError> {
    let raw = state.store().load_cooldowns().await?;
    Ok(CooldownLedger::normalize(&raw))
}

async fn push_winner(
    state: &SharedState,
    config: &AppConfig,
    map_code: &str,
) -> GameServerResult<PushOutcome> {
    let game_server = state.game_server();
    let push = push_map_to_rotation(game_server.as_ref(), map_code);

    if config.push_timeout_secs == 0 {
        return push.await;
    }

    let limit = Duration::from_secs(config.push_timeout_secs);
    timeout(limit, push)
        .await
        .unwrap_or(Err(GameServerError::Timeout(limit)))
}

/// Decrement every cooldown and start the winner's. Takes the cooldowns lock.
async fn apply_cooldowns(
    state: &SharedState,
    config: &AppConfig,
    round: &VoteRound,
    resolution: Option<&Resolution>,
) -> Result<(), ServiceError> {
    let _cooldowns_guard = state.locks().cooldowns.lock().await;
    let mut ledger = load_ledger(state).await?.decrement_all();
    if let Some(resolution) = resolution {
        let cooldown = round.meta.mapvote_cooldown.unwrap_or(config.mapvote_cooldown);
        ledger = ledger.set_cooldown(&resolution.map_code, i64::from(cooldown));
    }
    state.store().save_cooldowns(ledger.to_raw()).await?;
    Ok(())
}

async fn record_close_errors(state: &SharedState, round: &VoteRound) -> Result<(), ServiceError> {
    let _rounds_guard = state.locks().rounds.lock().await;
    let store = state.store();
    let mut rounds = store.load_rounds().await?;
    let entity = find_round_mut(&mut rounds, round.id)?;
    entity.push_error = round.push_error.clone();
    entity.cooldown_error = round.cooldown_error.clone();
    store.save_rounds(rounds).await?;
    Ok(())
}

fn find_round_mut(
    rounds: &mut [RoundEntity],
    round_id: RoundId,
) -> Result<&mut RoundEntity, ServiceError> {
    rounds
        .iter_mut()
        .find(|round| round.id == round_id)
        .ok_or_else(|| ServiceError::NotFound(format!("round {round_id}")))
}

/// Ids grow from the largest persisted id so they stay unique across restarts.
fn next_round_id(rounds: &[RoundEntity]) -> RoundId {
    rounds
        .iter()
        .map(|round| round.id)
        .max()
        .map_or(1, |max| max + 1)
}

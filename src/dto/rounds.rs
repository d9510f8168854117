//! DTO definitions used by the public round endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    services::{
        game_server::{GameServerResult, rotation::PushOutcome},
        round_service::CloseOutcome,
    },
    state::{
        resolution::Resolution,
        round::{RoundId, RoundStatus, VoteRound},
    },
};

/// Public projection of a round.
#[derive(Debug, Serialize)]
pub struct RoundSummary {
    pub id: RoundId,
    pub pool: String,
    pub status: RoundStatusDto,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub options: Vec<OptionSummary>,
    pub total_votes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Resolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatusDto {
    Open,
    Pushed,
}

/// One option with the ballots currently counted for it.
#[derive(Debug, Serialize)]
pub struct OptionSummary {
    pub index: usize,
    pub map_code: String,
    pub label: String,
    pub votes: u32,
}

impl From<VoteRound> for RoundSummary {
    fn from(mut round: VoteRound) -> Self {
        round.retally();
        let total_votes = round.total_votes();
        Self {
            id: round.id,
            pool: round.pool,
            status: match round.status {
                RoundStatus::Open => RoundStatusDto::Open,
                RoundStatus::Pushed => RoundStatusDto::Pushed,
            },
            started_at: round.started_at,
            ends_at: round.ends_at,
            options: round
                .options
                .into_iter()
                .map(|option| OptionSummary {
                    index: option.index,
                    map_code: option.map_code,
                    label: option.label,
                    votes: option.tally,
                })
                .collect(),
            total_votes,
            winner: round.winner,
            push_error: round.push_error,
            cooldown_error: round.cooldown_error,
        }
    }
}

/// Ballot cast by a voter.
#[derive(Debug, Deserialize, Validate)]
pub struct BallotRequest {
    #[validate(length(min = 1, max = 128))]
    pub voter_id: String,
    /// 1-based option index.
    #[validate(range(min = 1))]
    pub index: usize,
}

#[derive(Debug, Serialize)]
pub struct BallotResponse {
    pub round_id: RoundId,
    pub index: usize,
    /// Option the voter chose before this ballot, if any.
    pub replaced: Option<usize>,
}

/// What happened when the winner was handed to the game server.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PushStatus {
    Queued { index: usize },
    AlreadyNext,
    Failed { error: String },
    Skipped,
}

impl PushStatus {
    pub fn from_result(result: Option<&GameServerResult<PushOutcome>>) -> Self {
        match result {
            Some(Ok(PushOutcome::Queued { index })) => PushStatus::Queued { index: *index },
            Some(Ok(PushOutcome::AlreadyNext)) => PushStatus::AlreadyNext,
            Some(Err(err)) => PushStatus::Failed {
                error: err.to_string(),
            },
            None => PushStatus::Skipped,
        }
    }
}

/// Result of closing a round.
#[derive(Debug, Serialize)]
pub struct CloseRoundResponse {
    /// `false` when the round was already closed and nothing changed.
    pub closed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<RoundSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    pub push: PushStatus,
}

impl From<Option<CloseOutcome>> for CloseRoundResponse {
    fn from(outcome: Option<CloseOutcome>) -> Self {
        match outcome {
            Some(outcome) => Self {
                closed: true,
                push: PushStatus::from_result(outcome.push.as_ref()),
                round: Some(outcome.round.into()),
                resolution: outcome.resolution,
            },
            None => Self {
                closed: false,
                round: None,
                resolution: None,
                push: PushStatus::Skipped,
            },
        }
    }
}

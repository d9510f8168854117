use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use thiserror::Error;

use crate::{
    dao::models::{RoundEntity, RoundMetaEntity, RoundOptionEntity, RoundStatusEntity},
    state::{pool::Candidate, resolution::Resolution},
};

/// Identifier of a vote round, unique across restarts.
pub type RoundId = u64;

/// Lifecycle of a vote round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStatus {
    /// Accepting ballots.
    Open,
    /// Tally frozen, cooldowns applied and the winner handed to the game server.
    Pushed,
}

/// Per-round settings captured when the round opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundMeta {
    /// Cooldown applied to the winner; `None` falls back to the configured default at close.
    pub mapvote_cooldown: Option<u32>,
    /// Quorum below which the winner is drawn at random; zero disables the quorum.
    pub minimum_votes: u32,
}

/// One selectable map of a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOption {
    /// 1-based position shown to voters.
    pub index: usize,
    /// Map code pushed if the option wins.
    pub map_code: String,
    /// Label shown to voters.
    pub label: String,
    /// Ballots counted for this option at close time.
    pub tally: u32,
}

/// A single vote cycle from candidate selection to winner push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRound {
    /// Round identifier.
    pub id: RoundId,
    /// Name of the pool the round was started for.
    pub pool: String,
    /// Chat channel the round is rendered in.
    pub channel_ref: Option<String>,
    /// Opening time.
    pub started_at: DateTime<Utc>,
    /// Time the timer closes the round.
    pub ends_at: DateTime<Utc>,
    /// Lifecycle state.
    pub status: RoundStatus,
    /// Settings captured at open time.
    pub meta: RoundMeta,
    /// Options in display order.
    pub options: Vec<RoundOption>,
    /// Latest option index chosen by each voter.
    pub ballots: IndexMap<String, usize>,
    /// Winner chosen when the round closed.
    pub winner: Option<Resolution>,
    /// Reason the winner could not be pushed to the game server, if it failed.
    pub push_error: Option<String>,
    /// Reason the cooldowns could not be updated at close, if it failed.
    pub cooldown_error: Option<String>,
}

/// Reasons a ballot is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BallotError {
    /// The round no longer accepts ballots.
    #[error("round {id} is closed")]
    RoundClosed {
        /// Round the ballot was cast in.
        id: RoundId,
    },
    /// The ballot names an option the round does not have.
    #[error("round {id} has no option {index}")]
    InvalidIndex {
        /// Round the ballot was cast in.
        id: RoundId,
        /// Option index the ballot named.
        index: usize,
    },
}

/// Settings used to open a new round.
#[derive(Debug, Clone)]
pub struct RoundParams {
    /// Pool the round is started for.
    pub pool: String,
    /// Chat channel the round is rendered in.
    pub channel_ref: Option<String>,
    /// Settings captured for the round.
    pub meta: RoundMeta,
    /// How long the round stays open.
    pub duration: Duration,
}

impl VoteRound {
    /// Open a round offering `candidates` in order, numbered from 1.
    pub fn open(
        id: RoundId,
        params: RoundParams,
        candidates: Vec<Candidate>,
        now: DateTime<Utc>,
    ) -> Self {
        let options = candidates
            .into_iter()
            .enumerate()
            .map(|(position, candidate)| RoundOption {
                index: position + 1,
                map_code: candidate.code,
                label: candidate.label,
                tally: 0,
            })
            .collect();

        Self {
            id,
            pool: params.pool,
            channel_ref: params.channel_ref,
            started_at: now,
            ends_at: now + params.duration,
            status: RoundStatus::Open,
            meta: params.meta,
            options,
            ballots: IndexMap::new(),
            winner: None,
            push_error: None,
            cooldown_error: None,
        }
    }

    /// Whether ballots are still accepted.
    pub fn is_open(&self) -> bool {
        self.status == RoundStatus::Open
    }

    /// Record `voter`'s choice, replacing any earlier ballot from the same voter.
    ///
    /// Returns the previously chosen index, if any.
    pub fn record_ballot(
        &mut self,
        voter: &str,
        index: usize,
    ) -> Result<Option<usize>, BallotError> {
        if !self.is_open() {
            return Err(BallotError::RoundClosed { id: self.id });
        }

        if !self.options.iter().any(|option| option.index == index) {
            return Err(BallotError::InvalidIndex { id: self.id, index });
        }

        Ok(self.ballots.insert(voter.to_string(), index))
    }

    /// Recount every option from the ballots. Ballots naming unknown options count for nothing.
    pub fn retally(&mut self) {
        for option in &mut self.options {
            option.tally = 0;
        }

        for index in self.ballots.values() {
            if let Some(option) = self
                .options
                .iter_mut()
                .find(|option| option.index == *index)
            {
                option.tally += 1;
            }
        }
    }

    /// Freeze the round. Fails when it has already been closed.
    pub fn mark_pushed(&mut self) -> Result<(), BallotError> {
        if !self.is_open() {
            return Err(BallotError::RoundClosed { id: self.id });
        }
        self.status = RoundStatus::Pushed;
        Ok(())
    }

    /// Sum of all tallies.
    pub fn total_votes(&self) -> u32 {
        self.options.iter().map(|option| option.tally).sum()
    }
}

impl From<RoundStatusEntity> for RoundStatus {
    fn from(value: RoundStatusEntity) -> Self {
        match value {
            RoundStatusEntity::Open => RoundStatus::Open,
            RoundStatusEntity::Pushed => RoundStatus::Pushed,
        }
    }
}

impl From<RoundStatus> for RoundStatusEntity {
    fn from(value: RoundStatus) -> Self {
        match value {
            RoundStatus::Open => RoundStatusEntity::Open,
            RoundStatus::Pushed => RoundStatusEntity::Pushed,
        }
    }
}

impl From<RoundOptionEntity> for RoundOption {
    fn from(value: RoundOptionEntity) -> Self {
        Self {
            index: value.index,
            map_code: value.map,
            label: value.label,
            tally: value.votes,
        }
    }
}

impl From<RoundOption> for RoundOptionEntity {
    fn from(value: RoundOption) -> Self {
        Self {
            index: value.index,
            map: value.map_code,
            label: value.label,
            votes: value.tally,
        }
    }
}

impl From<RoundEntity> for VoteRound {
    fn from(value: RoundEntity) -> Self {
        Self {
            id: value.id,
            pool: value.pool,
            channel_ref: value.channel_id,
            started_at: value.started_at,
            ends_at: value.ends_at,
            status: value.status.into(),
            meta: RoundMeta {
                mapvote_cooldown: value.meta.mapvote_cooldown,
                minimum_votes: value.meta.minimum_votes.unwrap_or(0),
            },
            options: value.options.into_iter().map(Into::into).collect(),
            ballots: value.ballots,
            winner: value.winner,
            push_error: value.push_error,
            cooldown_error: value.cooldown_error,
        }
    }
}

impl From<VoteRound> for RoundEntity {
    fn from(value: VoteRound) -> Self {
        Self {
            id: value.id,
            pool: value.pool,
            channel_id: value.channel_ref,
            started_at: value.started_at,
            ends_at: value.ends_at,
            status: value.status.into(),
            meta: RoundMetaEntity {
                mapvote_cooldown: value.meta.mapvote_cooldown,
                minimum_votes: Some(value.meta.minimum_votes),
            },
            options: value.options.into_iter().map(Into::into).collect(),
            ballots: value.ballots,
            winner: value.winner,
            push_error: value.push_error,
            cooldown_error: value.cooldown_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::state::resolution::ResolutionReason;

    fn sample_round() -> VoteRound {
        let now = Utc
            .with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp");
        VoteRound::open(
            42,
            RoundParams {
                pool: "default".into(),
                channel_ref: Some("2".into()),
                meta: RoundMeta {
                    mapvote_cooldown: Some(3),
                    minimum_votes: 0,
                },
                duration: Duration::minutes(5),
            },
            vec![
                Candidate {
                    code: "FOY".into(),
                    label: "Foy".into(),
                },
                Candidate {
                    code: "OMAHA".into(),
                    label: "Omaha".into(),
                },
            ],
            now,
        )
    }

    #[test]
    fn open_numbers_options_from_one() {
        let round = sample_round();

        assert!(round.is_open());
        assert_eq!(round.ends_at - round.started_at, Duration::minutes(5));
        let indices: Vec<_> = round.options.iter().map(|o| (o.index, o.tally)).collect();
        assert_eq!(indices, vec![(1, 0), (2, 0)]);
    }

    #[test]
    fn last_ballot_wins() {
        let mut round = sample_round();

        assert_eq!(round.record_ballot("alice", 1), Ok(None));
        assert_eq!(round.record_ballot("alice", 2), Ok(Some(1)));
        round.record_ballot("bob", 2).expect("open round");
        round.retally();

        assert_eq!(round.options[0].tally, 0);
        assert_eq!(round.options[1].tally, 2);
        assert_eq!(round.total_votes(), 2);
    }

    #[test]
    fn rejects_unknown_option() {
        let mut round = sample_round();

        let err = round.record_ballot("alice", 3).unwrap_err();

        assert_eq!(err, BallotError::InvalidIndex { id: 42, index: 3 });
        assert!(round.ballots.is_empty());
    }

    #[test]
    fn closed_round_refuses_ballots() {
        let mut round = sample_round();
        round.record_ballot("alice", 1).expect("open round");
        round.mark_pushed().expect("first close");

        let err = round.record_ballot("alice", 2).unwrap_err();

        assert_eq!(err, BallotError::RoundClosed { id: 42 });
        assert_eq!(round.ballots.get("alice"), Some(&1));
        assert!(round.mark_pushed().is_err());
    }

    #[test]
    fn retally_ignores_dangling_ballots_and_resets_counts() {
        let mut round = sample_round();
        round.options[0].tally = 9;
        round.ballots.insert("legacy".into(), 7);
        round.ballots.insert("carol".into(), 2);

        round.retally();

        assert_eq!(round.options[0].tally, 0);
        assert_eq!(round.options[1].tally, 1);
    }

    #[test]
    fn entity_conversion_keeps_round_intact() {
        let mut round = sample_round();
        round.record_ballot("alice", 2).expect("open round");
        round.mark_pushed().expect("open round");
        round.winner = Some(Resolution {
            map_code: "OMAHA".into(),
            label: "Omaha".into(),
            reason: ResolutionReason::Highest,
        });
        round.push_error = Some("timeout".into());
        round.cooldown_error = Some("disk full".into());

        let restored: VoteRound = RoundEntity::from(round.clone()).into();

        assert_eq!(restored, round);
    }
}

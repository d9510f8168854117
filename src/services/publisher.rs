//! Outbound chat surface for round announcements and result summaries.

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::info;

use crate::state::{resolution::Resolution, round::VoteRound};

/// Failure reported by a chat publisher.
#[derive(Debug, Error)]
#[error("failed to publish {what} for round {round_id}: {message}")]
pub struct PublishError {
    /// What was being published.
    pub what: &'static str,
    /// Round the publication belongs to.
    pub round_id: u64,
    /// Failure reported by the chat backend.
    pub message: String,
}

/// Posts (or edits in place) the message tied to a round.
///
/// Failures never abort the operation that triggered the publication; callers log them.
pub trait RoundPublisher: Send + Sync {
    /// Post the ballot message for an open round, or refresh it when it already exists.
    fn post_or_update_round(&self, round: VoteRound) -> BoxFuture<'static, Result<(), PublishError>>;
    /// Post the result of a closed round.
    fn post_or_update_summary(
        &self,
        round: VoteRound,
        resolution: Option<Resolution>,
    ) -> BoxFuture<'static, Result<(), PublishError>>;
}

/// Publisher that writes rendered messages to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

impl RoundPublisher for LogPublisher {
    fn post_or_update_round(&self, round: VoteRound) -> BoxFuture<'static, Result<(), PublishError>> {
        Box::pin(async move {
            info!(
                round_id = round.id,
                channel = round.channel_ref.as_deref().unwrap_or("-"),
                message = %render_round(&round),
                "round message published"
            );
            Ok(())
        })
    }

    fn post_or_update_summary(
        &self,
        round: VoteRound,
        resolution: Option<Resolution>,
    ) -> BoxFuture<'static, Result<(), PublishError>> {
        Box::pin(async move {
            info!(
                round_id = round.id,
                channel = round.channel_ref.as_deref().unwrap_or("-"),
                message = %render_summary(&round, resolution.as_ref()),
                "round summary published"
            );
            Ok(())
        })
    }
}

/// Plain-text ballot listing.
pub fn render_round(round: &VoteRound) -> String {
    let mut lines = vec![format!(
        "Map vote #{} open until {}",
        round.id,
        round.ends_at.format("%Y-%m-%d %H:%M UTC")
    )];
    lines.extend(
        round
            .options
            .iter()
            .map(|option| format!("{}. {}", option.index, option.label)),
    );
    lines.join("\n")
}

/// Plain-text result of a closed round.
pub fn render_summary(round: &VoteRound, resolution: Option<&Resolution>) -> String {
    let mut lines = vec![format!(
        "Map vote #{} closed with {} vote(s)",
        round.id,
        round.total_votes()
    )];
    lines.extend(
        round
            .options
            .iter()
            .map(|option| format!("{}. {}: {}", option.index, option.label, option.tally)),
    );
    match resolution {
        Some(resolution) => lines.push(resolution.describe()),
        None => lines.push("No map could be chosen.".into()),
    }
    if let Some(error) = round.push_error.as_deref() {
        lines.push(format!("Rotation update failed: {error}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::state::{
        pool::Candidate,
        resolution::ResolutionReason,
        round::{RoundMeta, RoundParams},
    };

    fn closed_round() -> VoteRound {
        let now = Utc
            .with_ymd_and_hms(2024, 3, 1, 18, 0, 0)
            .single()
            .expect("valid timestamp");
        let mut round = VoteRound::open(
            4,
            RoundParams {
                pool: "default".into(),
                channel_ref: None,
                meta: RoundMeta::default(),
                duration: chrono::Duration::minutes(30),
            },
            vec![
                Candidate {
                    code: "FOY".into(),
                    label: "Foy".into(),
                },
                Candidate {
                    code: "UTAH".into(),
                    label: "Utah Beach".into(),
                },
            ],
            now,
        );
        round.record_ballot("alice", 2).expect("open round");
        round.retally();
        round.mark_pushed().expect("first close");
        round
    }

    #[test]
    fn round_message_lists_options() {
        let mut round = closed_round();
        round.status = crate::state::round::RoundStatus::Open;

        let text = render_round(&round);

        assert!(text.starts_with("Map vote #4 open until 2024-03-01 18:30 UTC"));
        assert!(text.contains("1. Foy"));
        assert!(text.contains("2. Utah Beach"));
    }

    #[test]
    fn summary_includes_tallies_and_push_error() {
        let mut round = closed_round();
        round.push_error = Some("game server is not configured".into());
        let resolution = Resolution {
            map_code: "UTAH".into(),
            label: "Utah Beach".into(),
            reason: ResolutionReason::Highest,
        };

        let text = render_summary(&round, Some(&resolution));

        assert!(text.contains("closed with 1 vote(s)"));
        assert!(text.contains("2. Utah Beach: 1"));
        assert!(text.contains(&resolution.describe()));
        assert!(text.ends_with("Rotation update failed: game server is not configured"));
    }
}

//! Starts a vote whenever the game server reports a new match.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    dao::models::WatchEntity,
    error::ServiceError,
    services::{game_server::rotation::latest_match_marker, round_service::StartRound, round_timer},
    state::{SharedState, round::RoundId},
};

/// Pool used for rounds started by a new match.
const MATCH_POOL: &str = "default";

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPoll {
    /// The server does not report a match marker.
    NoMarker,
    /// First marker seen; remembered without starting a vote.
    FirstSeen,
    /// The marker matches the stored one.
    Unchanged,
    /// A new match began and this round was started for it.
    NewMatch(RoundId),
}

/// Poll the game server once and start a round when the match changed.
pub async fn poll_once(state: &SharedState) -> Result<MatchPoll, ServiceError> {
    let game_server = state.game_server();
    let Some(marker) = latest_match_marker(game_server.as_ref()).await? else {
        return Ok(MatchPoll::NoMarker);
    };

    let store = state.store();
    let watch = store.load_watch().await?;
    let previous = watch.last_session_id;
    if previous.as_deref() == Some(marker.as_str()) {
        return Ok(MatchPoll::Unchanged);
    }

    store
        .save_watch(WatchEntity {
            last_session_id: Some(marker.clone()),
        })
        .await?;

    if previous.is_none() {
        info!(marker = %marker, "match marker recorded");
        return Ok(MatchPoll::FirstSeen);
    }

    info!(marker = %marker, "new match detected; starting vote");
    let round = round_timer::start_timed_round(state, StartRound::for_pool(MATCH_POOL)).await?;
    Ok(MatchPoll::NewMatch(round.id))
}

/// Poll every `match_watch_interval_secs` until the interval is set to zero.
pub async fn run(state: SharedState) {
    loop {
        let interval = state.config().current().match_watch_interval_secs;
        if interval == 0 {
            info!("match watcher disabled");
            return;
        }

        match poll_once(&state).await {
            Ok(poll) => debug!(?poll, "match watcher polled"),
            Err(err) => warn!(error = %err, "match watcher poll failed"),
        }

        sleep(Duration::from_secs(interval)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;

    #[tokio::test]
    async fn first_marker_is_recorded_without_vote() {
        let harness = Harness::new(&["FOY", "UTAH"]);
        harness.server.set_match_marker(Some("match-1"));

        let poll = poll_once(&harness.state).await.expect("poll succeeds");

        assert_eq!(poll, MatchPoll::FirstSeen);
        assert_eq!(harness.store.watch().last_session_id.as_deref(), Some("match-1"));
        assert!(harness.store.rounds().is_empty());
    }

    #[tokio::test]
    async fn changed_marker_starts_a_round() {
        let harness = Harness::new(&["FOY", "UTAH"]);
        harness.server.set_match_marker(Some("match-1"));
        poll_once(&harness.state).await.expect("first poll");

        let unchanged = poll_once(&harness.state).await.expect("second poll");
        harness.server.set_match_marker(Some("match-2"));
        let changed = poll_once(&harness.state).await.expect("third poll");

        assert_eq!(unchanged, MatchPoll::Unchanged);
        assert_eq!(changed, MatchPoll::NewMatch(1));
        assert_eq!(harness.store.rounds().len(), 1);
        assert_eq!(harness.store.watch().last_session_id.as_deref(), Some("match-2"));
    }

    #[tokio::test]
    async fn missing_marker_changes_nothing() {
        let harness = Harness::new(&["FOY"]);

        let poll = poll_once(&harness.state).await.expect("poll succeeds");

        assert_eq!(poll, MatchPoll::NoMarker);
        assert_eq!(harness.store.watch().last_session_id, None);
    }

    #[tokio::test]
    async fn server_failure_is_reported() {
        let harness = Harness::new(&["FOY"]);
        harness.server.fail_command("GetServerInformation");

        let err = poll_once(&harness.state).await.unwrap_err();

        assert!(matches!(err, ServiceError::GameServer(_)));
    }
}

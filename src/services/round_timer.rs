//! Timers closing rounds when their voting window ends.

use chrono::Utc;
use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, error, info};

use crate::{
    error::ServiceError,
    services::round_service::{self, StartRound},
    state::{SharedState, round::VoteRound},
};

/// Start a round and arm the timer that closes it.
pub async fn start_timed_round(
    state: &SharedState,
    request: StartRound,
) -> Result<VoteRound, ServiceError> {
    let round = round_service::start_round(state, request).await?;
    arm(state, &round);
    Ok(round)
}

/// Close `round` once its end time has passed. Rounds already past their end close right away.
pub fn arm(state: &SharedState, round: &VoteRound) -> JoinHandle<()> {
    let state = state.clone();
    let round_id = round.id;
    let wait = (round.ends_at - Utc::now()).to_std().unwrap_or_default();
    debug!(round_id, wait_secs = wait.as_secs(), "round timer armed");

    tokio::spawn(async move {
        sleep(wait).await;
        match round_service::close_round(&state, round_id).await {
            Ok(Some(outcome)) => info!(
                round_id,
                pushed = matches!(outcome.push, Some(Ok(_))),
                "round closed by timer"
            ),
            Ok(None) => debug!(round_id, "timer fired for a round that was already closed"),
            Err(err) => error!(round_id, error = %err, "failed to close round on timer"),
        }
    })
}

/// Re-arm timers for every round left open by a previous run.
pub async fn rearm_open_rounds(state: &SharedState) -> Result<usize, ServiceError> {
    let open = round_service::open_rounds(state).await?;
    for round in &open {
        arm(state, round);
    }
    if !open.is_empty() {
        info!(count = open.len(), "re-armed timers for open rounds");
    }
    Ok(open.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{state::round::RoundStatus, test_support::Harness};

    #[tokio::test]
    async fn expired_round_is_closed_by_timer() {
        let harness = Harness::new(&["FOY", "UTAH"]);
        let mut round = round_service::start_round(&harness.state, StartRound::for_pool("default"))
            .await
            .expect("round opens");
        round.ends_at = Utc::now() - chrono::Duration::minutes(1);

        arm(&harness.state, &round).await.expect("timer task runs");

        let stored = VoteRound::from(harness.store.rounds().remove(0));
        assert_eq!(stored.status, RoundStatus::Pushed);
    }

    #[tokio::test]
    async fn rearm_counts_only_open_rounds() {
        let harness = Harness::new(&["FOY", "UTAH"]);
        let closed = round_service::start_round(&harness.state, StartRound::for_pool("default"))
            .await
            .expect("first round");
        round_service::close_round(&harness.state, closed.id)
            .await
            .expect("close succeeds");
        round_service::start_round(&harness.state, StartRound::for_pool("default"))
            .await
            .expect("second round");

        let armed = rearm_open_rounds(&harness.state).await.expect("rearm");

        assert_eq!(armed, 1);
    }
}

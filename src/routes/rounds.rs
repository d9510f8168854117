use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::rounds::{BallotRequest, BallotResponse, RoundSummary},
    error::AppError,
    services::round_service,
    state::{SharedState, round::RoundId},
};

/// Public endpoints for browsing rounds and casting ballots.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rounds", get(list_rounds))
        .route("/rounds/{id}", get(get_round))
        .route("/rounds/{id}/ballots", post(cast_ballot))
}

/// List every round, newest first.
pub async fn list_rounds(
    State(state): State<SharedState>,
) -> Result<Json<Vec<RoundSummary>>, AppError> {
    let rounds = round_service::list_rounds(&state).await?;
    Ok(Json(rounds.into_iter().map(RoundSummary::from).collect()))
}

pub async fn get_round(
    State(state): State<SharedState>,
    Path(id): Path<RoundId>,
) -> Result<Json<RoundSummary>, AppError> {
    let round = round_service::find_round(&state, id).await?;
    Ok(Json(round.into()))
}

/// Cast or replace a ballot. Closed rounds answer `409`, unknown options `400`.
pub async fn cast_ballot(
    State(state): State<SharedState>,
    Path(id): Path<RoundId>,
    Json(payload): Json<BallotRequest>,
) -> Result<Json<BallotResponse>, AppError> {
    payload.validate()?;
    let replaced =
        round_service::accept_ballot(&state, id, &payload.voter_id, payload.index).await?;
    Ok(Json(BallotResponse {
        round_id: id,
        index: payload.index,
        replaced,
    }))
}

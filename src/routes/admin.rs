use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::ScheduleEntity,
    dto::{
        admin::{
            ActionResponse, CooldownEntry, QueueMapRequest, QueueMapResponse, ScheduleRequest,
            StartRoundRequest, cooldown_entries,
        },
        rounds::{CloseRoundResponse, RoundSummary},
    },
    error::AppError,
    services::{admin_service, round_service, round_timer, schedule_service, scheduler},
    state::{SharedState, round::RoundId},
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Admin-only endpoints driving rounds, the rotation, schedules and configuration.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/admin/rounds", post(start_round))
        .route("/admin/rounds/{id}/close", post(close_round))
        .route("/admin/cooldowns", get(list_cooldowns))
        .route("/admin/rotation/queue", post(queue_map))
        .route("/admin/schedules", get(list_schedules).put(upsert_schedule))
        .route("/admin/schedules/{id}", delete(delete_schedule))
        .route("/admin/schedules/reload", post(reload_schedules))
        .route("/admin/config/reload", post(reload_config))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

/// Start a round now and arm its close timer.
pub async fn start_round(
    State(state): State<SharedState>,
    payload: Option<Json<StartRoundRequest>>,
) -> Result<Json<RoundSummary>, AppError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    payload.validate()?;
    let round = round_timer::start_timed_round(&state, payload.into()).await?;
    Ok(Json(round.into()))
}

/// Close a round before its end time.
pub async fn close_round(
    State(state): State<SharedState>,
    Path(id): Path<RoundId>,
) -> Result<Json<CloseRoundResponse>, AppError> {
    let outcome = round_service::close_round(&state, id).await?;
    Ok(Json(outcome.into()))
}

pub async fn list_cooldowns(
    State(state): State<SharedState>,
) -> Result<Json<Vec<CooldownEntry>>, AppError> {
    let ledger = round_service::cooldowns(&state).await?;
    Ok(Json(cooldown_entries(&ledger)))
}

/// Queue a map next without a vote.
pub async fn queue_map(
    State(state): State<SharedState>,
    payload: Option<Json<QueueMapRequest>>,
) -> Result<Json<QueueMapResponse>, AppError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    payload.validate()?;
    let pool = payload
        .pool
        .unwrap_or_else(|| scheduler::DEFAULT_POOL.to_string());
    let queued = round_service::queue_next_map(&state, &pool, payload.mapvote_cooldown).await?;
    Ok(Json(queued.into()))
}

pub async fn list_schedules(
    State(state): State<SharedState>,
) -> Result<Json<Vec<ScheduleEntity>>, AppError> {
    Ok(Json(schedule_service::list_schedules(&state).await?))
}

/// Create or merge the schedule matching `(pool, cron)`.
pub async fn upsert_schedule(
    State(state): State<SharedState>,
    Json(payload): Json<ScheduleRequest>,
) -> Result<Json<ScheduleEntity>, AppError> {
    payload.validate()?;
    let saved = schedule_service::upsert_schedule(&state, payload.into()).await?;
    Ok(Json(saved))
}

pub async fn delete_schedule(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, AppError> {
    schedule_service::delete_schedule(&state, id).await?;
    Ok(Json(ActionResponse {
        message: format!("schedule {id} deleted"),
    }))
}

pub async fn reload_schedules(State(state): State<SharedState>) -> Json<ActionResponse> {
    Json(admin_service::reload_schedules(&state))
}

/// Re-read the configuration file.
pub async fn reload_config(
    State(state): State<SharedState>,
) -> Result<Json<ActionResponse>, AppError> {
    Ok(Json(admin_service::reload_config(&state).await?))
}

/// Reject requests without the configured admin token. Open when no token is configured.
async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config().current().admin_token.clone() else {
        return Ok(next.run(req).await);
    };

    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| {
            AppError::Unauthorized("missing admin token header `X-Admin-Token`".into())
        })?;

    if provided == expected {
        Ok(next.run(req).await)
    } else {
        Err(AppError::Unauthorized("invalid admin token".into()))
    }
}

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    config::ConfigError,
    dao::storage::StorageError,
    services::game_server::GameServerError,
    state::round::{BallotError, RoundId},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The round no longer accepts ballots.
    #[error("round {0} is closed")]
    RoundClosed(RoundId),
    /// The ballot names an option the round does not have.
    #[error("round {round_id} has no option {index}")]
    InvalidBallot {
        /// Round the ballot was cast in.
        round_id: RoundId,
        /// Option index the ballot named.
        index: usize,
    },
    /// The game server could not serve a request the operation depends on.
    #[error("game server unavailable")]
    GameServer(#[source] GameServerError),
    /// The configuration file could not be reloaded.
    #[error("configuration reload failed")]
    Config(#[source] ConfigError),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<GameServerError> for ServiceError {
    fn from(err: GameServerError) -> Self {
        ServiceError::GameServer(err)
    }
}

impl From<ConfigError> for ServiceError {
    fn from(err: ConfigError) -> Self {
        ServiceError::Config(err)
    }
}

impl From<BallotError> for ServiceError {
    fn from(err: BallotError) -> Self {
        match err {
            BallotError::RoundClosed { id } => ServiceError::RoundClosed(id),
            BallotError::InvalidIndex { id, index } => ServiceError::InvalidBallot {
                round_id: id,
                index,
            },
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// An upstream dependency answered badly.
    #[error("bad gateway: {0}")]
    BadGateway(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            closed @ ServiceError::RoundClosed(_) => AppError::Conflict(closed.to_string()),
            invalid @ ServiceError::InvalidBallot { .. } => {
                AppError::BadRequest(invalid.to_string())
            }
            ServiceError::GameServer(source) => AppError::BadGateway(source.to_string()),
            ServiceError::Config(source) => AppError::Internal(source.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

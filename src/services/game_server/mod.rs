//! Remote game-server administration seam.
//!
//! Everything the service asks of the game server goes through [`GameServerClient::execute`];
//! the helpers in [`rotation`] build rotation pushes and settings changes on top of it.

/// HTTP client for a CRCON administration API.
pub mod crcon;
/// Rotation pushes, server information and settings commands.
pub mod rotation;

use std::{error::Error, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{config::CrconConfig, services::game_server::crcon::CrconClient};

/// Result alias for game-server calls.
pub type GameServerResult<T> = Result<T, GameServerError>;

/// One remote administration command and its JSON arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct RconCommand {
    /// Command name, also the last path segment of the API endpoint.
    pub name: &'static str,
    /// JSON arguments.
    pub body: Value,
}

impl RconCommand {
    /// Command `name` with `body` as arguments.
    pub fn new(name: &'static str, body: Value) -> Self {
        Self { name, body }
    }
}

/// Failures talking to the game server.
#[derive(Debug, Error)]
pub enum GameServerError {
    /// No administration endpoint is configured.
    #[error("game server client is not configured")]
    NotConfigured,
    /// The request did not complete.
    #[error("failed to reach game server for `{command}`")]
    Transport {
        /// Command being sent.
        command: &'static str,
        /// Underlying error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The endpoint answered with a non-success HTTP status.
    #[error("game server answered {status} for `{command}`")]
    Status {
        /// Command being sent.
        command: &'static str,
        /// HTTP status code.
        status: u16,
    },
    /// The endpoint accepted the request but reported a failure.
    #[error("game server rejected `{command}`: {message}")]
    Rejected {
        /// Command being sent.
        command: &'static str,
        /// Error reported by the game server.
        message: String,
    },
    /// The push did not finish in time.
    #[error("game server did not answer within {0:?}")]
    Timeout(Duration),
}

/// Transport-agnostic access to the game server.
pub trait GameServerClient: Send + Sync {
    /// Send `command` and return the unwrapped result payload.
    fn execute(&self, command: RconCommand) -> BoxFuture<'static, GameServerResult<Value>>;
}

/// Client used when no endpoint is configured: every command fails with
/// [`GameServerError::NotConfigured`] so rounds still close and the failure is logged.
pub struct DisabledGameServer;

impl GameServerClient for DisabledGameServer {
    fn execute(&self, _command: RconCommand) -> BoxFuture<'static, GameServerResult<Value>> {
        Box::pin(async { Err(GameServerError::NotConfigured) })
    }
}

/// Client for the configured endpoint, or [`DisabledGameServer`] when there is none or the
/// client cannot be built.
pub fn client_for(config: Option<&CrconConfig>) -> Arc<dyn GameServerClient> {
    let Some(crcon) = config else {
        warn!("no game server configured; winning maps will not be pushed");
        return Arc::new(DisabledGameServer);
    };

    match CrconClient::new(crcon) {
        Ok(client) => {
            info!(base_url = %crcon.base_url, "game server client configured");
            Arc::new(client)
        }
        Err(err) => {
            error!(error = %err, "failed to build game server client; pushes disabled");
            Arc::new(DisabledGameServer)
        }
    }
}

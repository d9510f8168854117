use tracing::{info, warn};

use crate::{
    dto::admin::ActionResponse,
    error::ServiceError,
    services::game_server,
    state::SharedState,
};

/// Re-read the configuration file. The previous configuration stays active on failure.
///
/// A changed game-server endpoint rebuilds the client. The data directory is only read at
/// startup, so a change to it is reported and waits for a restart.
pub async fn reload_config(state: &SharedState) -> Result<ActionResponse, ServiceError> {
    let previous = state.config().current();
    let config = state.config().reload()?;
    // The reload period and time zone are read when the jobs are rebuilt.
    state.request_schedule_reload();

    let mut message = format!(
        "configuration reloaded (vote duration {} min, cooldown {})",
        config.vote_duration_minutes, config.mapvote_cooldown
    );
    if config.crcon != previous.crcon {
        state.replace_game_server(game_server::client_for(config.crcon.as_ref()));
        message.push_str("; game server client rebuilt");
    }
    if config.data_dir != previous.data_dir {
        warn!(
            current = %previous.data_dir.display(),
            requested = %config.data_dir.display(),
            "data directory change takes effect after a restart"
        );
        message.push_str("; data directory change takes effect after a restart");
    }

    Ok(ActionResponse { message })
}

/// Ask the scheduler to rebuild its jobs from the stored schedules.
pub fn reload_schedules(state: &SharedState) -> ActionResponse {
    state.request_schedule_reload();
    info!("schedule reload requested");
    ActionResponse {
        message: "schedule reload requested".into(),
    }
}

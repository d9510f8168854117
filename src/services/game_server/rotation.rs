use serde_json::{Value, json};
use tracing::{debug, info};

use crate::dao::models::ServerSettings;

use super::{GameServerClient, GameServerResult, RconCommand};

const GET_SERVER_INFORMATION: &str = "GetServerInformation";
const ADD_MAP_TO_ROTATION: &str = "AddMapToRotation";
const SERVER_BROADCAST: &str = "ServerBroadcast";

/// Parts of the server information the rotation logic relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// Map currently being played.
    pub current_map: Option<String>,
    /// Map codes of the rotation in play order.
    pub rotation: Vec<String>,
    /// Opaque value that changes whenever a new match starts.
    pub match_marker: Option<String>,
}

impl ServerInfo {
    fn from_value(value: &Value) -> Self {
        let rotation = value
            .get("maprotation")
            .or_else(|| value.get("mapsequence"))
            .and_then(Value::as_array)
            .map(|maps| {
                maps.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            current_map: value
                .get("current_map")
                .and_then(Value::as_str)
                .map(str::to_string),
            rotation,
            match_marker: value.get("match_start").and_then(marker_text),
        }
    }
}

fn marker_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// What a rotation push did on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The map was inserted at this rotation index.
    Queued {
        /// Rotation position the map was inserted at.
        index: usize,
    },
    /// The map already follows the current map; nothing was changed.
    AlreadyNext,
}

/// Position right after the current map, or the end of the rotation when the current map is
/// not part of it. `None` when the map is already queued next.
pub fn insertion_index(info: &ServerInfo, map_code: &str) -> Option<usize> {
    let current = info
        .current_map
        .as_deref()
        .and_then(|current| info.rotation.iter().position(|map| map == current));

    match current {
        None => Some(info.rotation.len()),
        Some(position) => {
            let next = (position + 1).min(info.rotation.len());
            if info.rotation.get(next).map(String::as_str) == Some(map_code) {
                None
            } else {
                Some(next)
            }
        }
    }
}

/// Fetch the current server information.
pub async fn server_info(client: &dyn GameServerClient) -> GameServerResult<ServerInfo> {
    let value = client
        .execute(RconCommand::new(GET_SERVER_INFORMATION, json!({})))
        .await?;
    Ok(ServerInfo::from_value(&value))
}

/// Marker of the match currently being played, when the server reports one.
pub async fn latest_match_marker(
    client: &dyn GameServerClient,
) -> GameServerResult<Option<String>> {
    Ok(server_info(client).await?.match_marker)
}

/// Queue `map_code` as the next map and announce it in game.
pub async fn push_map_to_rotation(
    client: &dyn GameServerClient,
    map_code: &str,
) -> GameServerResult<PushOutcome> {
    let info = server_info(client).await?;

    let Some(index) = insertion_index(&info, map_code) else {
        info!(map = map_code, "map already queued next; rotation untouched");
        return Ok(PushOutcome::AlreadyNext);
    };

    client
        .execute(RconCommand::new(
            ADD_MAP_TO_ROTATION,
            json!({ "MapName": map_code, "Index": index }),
        ))
        .await?;
    info!(map = map_code, index, "queued map in rotation");

    if let Err(err) = client
        .execute(RconCommand::new(
            SERVER_BROADCAST,
            json!({ "Message": format!("Next map set by vote: {map_code}") }),
        ))
        .await
    {
        debug!(error = %err, "next-map broadcast failed");
    }

    Ok(PushOutcome::Queued { index })
}

/// Commands needed to apply `settings`, in a stable order.
pub fn settings_commands(settings: &ServerSettings) -> Vec<RconCommand> {
    let mut commands = Vec::new();

    if let Some(ms) = settings.high_ping_threshold_ms {
        commands.push(RconCommand::new(
            "SetHighPingThreshold",
            json!({ "HighPingThresholdMs": ms }),
        ));
    }
    if let Some(enable) = settings.votekick_enabled {
        commands.push(RconCommand::new(
            "SetVoteKickEnabled",
            json!({ "Enable": enable }),
        ));
    }
    if let Some(threshold) = settings.votekick_threshold.as_ref() {
        commands.push(RconCommand::new(
            "SetVoteKickThreshold",
            json!({ "ThresholdValue": threshold }),
        ));
    }
    if settings.votekick_reset == Some(true) {
        commands.push(RconCommand::new("ResetVoteKickThreshold", json!({})));
    }
    if let Some(enable) = settings.autobalance_enabled {
        commands.push(RconCommand::new(
            "SetAutoBalanceEnabled",
            json!({ "Enable": enable }),
        ));
    }
    if let Some(threshold) = settings.autobalance_threshold {
        commands.push(RconCommand::new(
            "SetAutoBalanceThreshold",
            json!({ "AutoBalanceThreshold": threshold }),
        ));
    }
    if let Some(minutes) = settings.team_switch_cooldown_minutes {
        commands.push(RconCommand::new(
            "SetTeamSwitchCooldown",
            json!({ "TeamSwitchTimer": minutes }),
        ));
    }
    if let Some(minutes) = settings.idlekick_duration_minutes {
        commands.push(RconCommand::new(
            "SetIdleKickDuration",
            json!({ "IdleTimeoutMinutes": minutes }),
        ));
    }

    commands
}

/// Apply every present setting, stopping at the first failure. Returns the number of commands
/// sent.
pub async fn apply_server_settings(
    client: &dyn GameServerClient,
    settings: &ServerSettings,
) -> GameServerResult<usize> {
    let commands = settings_commands(settings);
    let count = commands.len();
    for command in commands {
        client.execute(command).await?;
    }
    Ok(count)
}

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::CrconConfig;

use super::{GameServerClient, GameServerError, GameServerResult, RconCommand};

/// HTTP client for a CRCON-style administration API exposing one `POST /api/<command>`
/// endpoint per command.
#[derive(Clone)]
pub struct CrconClient {
    client: Client,
    base_url: Arc<str>,
    api_token: Option<Arc<str>>,
}

impl CrconClient {
    /// Client for the endpoint in `config`.
    pub fn new(config: &CrconConfig) -> GameServerResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| GameServerError::Transport {
                command: "connect",
                source: Box::new(source),
            })?;

        Ok(Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            api_token: config.api_token.as_deref().map(Arc::from),
        })
    }
}

impl GameServerClient for CrconClient {
    fn execute(&self, command: RconCommand) -> BoxFuture<'static, GameServerResult<Value>> {
        let url = format!("{}/api/{}", self.base_url, command.name);
        let mut builder = self.client.post(url).json(&command.body);
        if let Some(token) = self.api_token.as_ref() {
            builder = builder.bearer_auth(token);
        }
        let name = command.name;

        Box::pin(async move {
            debug!(command = name, "sending game server command");
            let response = builder
                .send()
                .await
                .map_err(|source| GameServerError::Transport {
                    command: name,
                    source: Box::new(source),
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(GameServerError::Status {
                    command: name,
                    status: status.as_u16(),
                });
            }

            let payload = response
                .json::<Value>()
                .await
                .map_err(|source| GameServerError::Transport {
                    command: name,
                    source: Box::new(source),
                })?;

            unwrap_envelope(name, payload)
        })
    }
}

/// CRCON wraps results as `{"result": ..., "failed": bool, "error": ...}`.
fn unwrap_envelope(command: &'static str, payload: Value) -> GameServerResult<Value> {
    if payload.get("failed").and_then(Value::as_bool) == Some(true) {
        let message = payload
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(GameServerError::Rejected { command, message });
    }

    match payload {
        Value::Object(mut map) if map.contains_key("result") => {
            Ok(map.remove("result").unwrap_or(Value::Null))
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn envelope_result_is_unwrapped() {
        let value = unwrap_envelope(
            "GetServerInformation",
            json!({ "result": { "current_map": "FOY" }, "failed": false }),
        )
        .expect("successful envelope");
        assert_eq!(value, json!({ "current_map": "FOY" }));
    }

    #[test]
    fn failed_envelope_is_rejected() {
        let err = unwrap_envelope(
            "AddMapToRotation",
            json!({ "result": null, "failed": true, "error": "bad map" }),
        )
        .unwrap_err();

        match err {
            GameServerError::Rejected { command, message } => {
                assert_eq!(command, "AddMapToRotation");
                assert_eq!(message, "bad map");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn bare_payload_passes_through() {
        let value = unwrap_envelope("ServerBroadcast", json!(true)).expect("bare payload");
        assert_eq!(value, json!(true));
    }

    #[test]
    fn base_url_is_normalized() {
        let client = CrconClient::new(&CrconConfig {
            base_url: "http://127.0.0.1:8010/".into(),
            api_token: Some("secret".into()),
        })
        .expect("client builds");
        assert_eq!(&*client.base_url, "http://127.0.0.1:8010");
    }
}

#![forbid(unsafe_code)]

use std::env;

/// Where the local daemon lives. Shared by the audit REST client and the
/// native command bridge; absence of the endpoint env var is the signal to
/// run detached against the simulated bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonEndpointConfig {
    pub base_url: String,
    pub bearer_token: Option<String>,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl DaemonEndpointConfig {
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("VESTA_DAEMON_ENDPOINT").ok()?;
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return None;
        }
        let bearer_token = env::var("VESTA_DAEMON_BEARER").ok().and_then(|v| {
            let s = v.trim().to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        });
        let connect_timeout_ms = env::var("VESTA_DAEMON_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (100..=60_000).contains(v))
            .unwrap_or(3_000);
        let request_timeout_ms = env::var("VESTA_DAEMON_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (100..=120_000).contains(v))
            .unwrap_or(10_000);

        Some(Self {
            base_url,
            bearer_token,
            connect_timeout_ms,
            request_timeout_ms,
        })
    }

    pub fn local_default(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bearer_token: None,
            connect_timeout_ms: 3_000,
            request_timeout_ms: 10_000,
        }
    }

    /// Derive the push endpoint from the REST base: scheme http→ws
    /// (https→wss), path `/ws`.
    pub fn push_url(&self) -> Result<String, String> {
        let mut parsed = url::Url::parse(&self.base_url)
            .map_err(|err| format!("daemon endpoint is not a valid url: {err}"))?;
        let scheme = match parsed.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(format!("unsupported daemon endpoint scheme: {other}")),
        };
        parsed
            .set_scheme(scheme)
            .map_err(|_| "failed to derive websocket scheme".to_string())?;
        parsed.set_path("/ws");
        parsed.set_query(None);
        Ok(parsed.to_string())
    }
}

/// Actor identity header expected by the daemon on every REST call.
pub const ACTOR_HEADER: &str = "x-vesta-actor";

/// Salted PIN digest carried alongside the identity on privileged commands.
/// The raw PIN never leaves the process.
pub const PIN_DIGEST_HEADER: &str = "x-vesta-pin-digest";

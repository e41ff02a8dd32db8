#![forbid(unsafe_code)]

use std::time::Duration;

use vesta_engines::secret;
use vesta_kernel_contracts::actor::ActorRef;
use vesta_kernel_contracts::bridge::{
    BridgeRefuse, BridgeRequest, BridgeResponse, FamilyMemberRecord, SharedDocRecord,
};
use vesta_kernel_contracts::role::Role;
use vesta_kernel_contracts::status::DaemonStatus;
use vesta_kernel_contracts::{MonotonicTimeNs, ReasonCodeId, Validate};

use crate::daemon_endpoint::{DaemonEndpointConfig, ACTOR_HEADER, PIN_DIGEST_HEADER};

pub mod reason_codes {
    use vesta_kernel_contracts::ReasonCodeId;

    pub const BRIDGE_REFUSE_INVALID_REQUEST: ReasonCodeId = ReasonCodeId(0x4252_00F1);
    pub const BRIDGE_REFUSE_TRANSPORT: ReasonCodeId = ReasonCodeId(0x4252_00F2);
    pub const BRIDGE_REFUSE_BACKEND_STATUS: ReasonCodeId = ReasonCodeId(0x4252_00F3);
    pub const BRIDGE_REFUSE_BACKEND_DECODE: ReasonCodeId = ReasonCodeId(0x4252_00F4);
    pub const BRIDGE_REFUSE_UNKNOWN_VOICE: ReasonCodeId = ReasonCodeId(0x4252_00F5);
}

const INVITE_TTL_MS: u64 = 72 * 60 * 60 * 1_000;

/// In-memory stand-in for the native bridge. Same success shapes, data that
/// is deterministic apart from invite codes.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedBridgeState {
    status: DaemonStatus,
    voices: Vec<String>,
    docs: Vec<SharedDocRecord>,
    members: Vec<FamilyMemberRecord>,
    invites_issued: u32,
}

impl SimulatedBridgeState {
    pub fn detached_v1() -> Self {
        Self {
            status: DaemonStatus {
                online: true,
                project: "family_room".to_string(),
                voice: "amber".to_string(),
                listening: false,
                speaking: false,
                hotword: false,
                vu_level: 0.0,
                lat_stt_ms: 0,
                lat_llm_ms: 0,
                lat_tts_ms: 0,
                lat_total_ms: 0,
            },
            voices: vec![
                "amber".to_string(),
                "birch".to_string(),
                "cedar".to_string(),
            ],
            docs: vec![
                SharedDocRecord {
                    name: "chore_chart.pdf".to_string(),
                    size_bytes: 18_432,
                    uploaded_at_ns: 1,
                    uploader_family_name: "marta".to_string(),
                },
                SharedDocRecord {
                    name: "school_calendar.pdf".to_string(),
                    size_bytes: 52_201,
                    uploaded_at_ns: 2,
                    uploader_family_name: "jonas".to_string(),
                },
            ],
            members: vec![
                FamilyMemberRecord {
                    family_name: "marta".to_string(),
                    email: "marta@example.com".to_string(),
                    role: Role::Admin,
                    created_at_ns: 1,
                },
                FamilyMemberRecord {
                    family_name: "jonas".to_string(),
                    email: "jonas@example.com".to_string(),
                    role: Role::Kid,
                    created_at_ns: 2,
                },
            ],
            invites_issued: 0,
        }
    }

    pub fn invites_issued(&self) -> u32 {
        self.invites_issued
    }
}

/// The one capability surface, selected once at construction: a native
/// daemon over HTTP when an endpoint is configured, otherwise the simulated
/// bridge so detached development sees identical shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandBridgeRuntime {
    Native(DaemonEndpointConfig),
    Simulated(SimulatedBridgeState),
}

impl CommandBridgeRuntime {
    pub fn from_env_or_simulated() -> Self {
        match DaemonEndpointConfig::from_env() {
            Some(config) => Self::Native(config),
            None => Self::Simulated(SimulatedBridgeState::detached_v1()),
        }
    }

    pub fn detached() -> Self {
        Self::Simulated(SimulatedBridgeState::detached_v1())
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native(_))
    }

    /// Execute an already-authorized request. Every outcome is a value; the
    /// caller never sees a panic or an exception from this surface.
    pub fn run(
        &mut self,
        actor: Option<&ActorRef>,
        req: &BridgeRequest,
        now: MonotonicTimeNs,
    ) -> BridgeResponse {
        if req.validate().is_err() {
            return refuse(
                reason_codes::BRIDGE_REFUSE_INVALID_REQUEST,
                "request failed contract validation",
            );
        }
        match self {
            Self::Native(config) => run_native(config, actor, req),
            Self::Simulated(state) => run_simulated(state, req, now),
        }
    }
}

fn refuse(reason_code: ReasonCodeId, message: &str) -> BridgeResponse {
    BridgeResponse::Refuse(BridgeRefuse {
        reason_code,
        message: message.to_string(),
    })
}

fn run_simulated(
    state: &mut SimulatedBridgeState,
    req: &BridgeRequest,
    now: MonotonicTimeNs,
) -> BridgeResponse {
    match req {
        BridgeRequest::Status => BridgeResponse::Status {
            status: state.status.clone(),
        },
        BridgeRequest::SendText { .. } | BridgeRequest::Speak { .. } => {
            BridgeResponse::Ack { handled: true }
        }
        BridgeRequest::ListDocs => BridgeResponse::Docs {
            docs: state.docs.clone(),
        },
        BridgeRequest::ListVoices => BridgeResponse::Voices {
            voices: state.voices.clone(),
            active: state.status.voice.clone(),
        },
        BridgeRequest::SelectVoice { voice } => {
            if !state.voices.iter().any(|v| v == voice) {
                return refuse(
                    reason_codes::BRIDGE_REFUSE_UNKNOWN_VOICE,
                    "voice is not installed",
                );
            }
            state.status.voice = voice.clone();
            BridgeResponse::Ack { handled: true }
        }
        BridgeRequest::InviteUser {
            family_name,
            email,
            role,
        } => {
            state.invites_issued += 1;
            state.members.push(FamilyMemberRecord {
                family_name: family_name.clone(),
                email: email.clone(),
                role: *role,
                created_at_ns: now.0,
            });
            BridgeResponse::InviteCreated {
                code: secret::generate_invite_code(),
                expires_at_ns: now.saturating_add_ms(INVITE_TTL_MS).0,
            }
        }
        BridgeRequest::ListFamilyMembers => BridgeResponse::FamilyMembers {
            members: state.members.clone(),
        },
    }
}

fn run_native(
    config: &DaemonEndpointConfig,
    actor: Option<&ActorRef>,
    req: &BridgeRequest,
) -> BridgeResponse {
    let payload = match serde_json::to_string(req) {
        Ok(payload) => payload,
        Err(_) => {
            return refuse(
                reason_codes::BRIDGE_REFUSE_INVALID_REQUEST,
                "request encode failed",
            )
        }
    };
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
        .timeout_read(Duration::from_millis(config.request_timeout_ms))
        .timeout_write(Duration::from_millis(config.request_timeout_ms))
        .build();
    let url = format!("{}/bridge/command", config.base_url);
    let mut request = agent.post(&url).set("content-type", "application/json");
    if let Some(actor) = actor {
        request = request.set(ACTOR_HEADER, actor.actor_id.as_str());
        if let Some(digest) = actor.pin_digest.as_ref() {
            request = request.set(PIN_DIGEST_HEADER, digest.as_str());
        }
    }
    if let Some(token) = config.bearer_token.as_ref() {
        request = request.set("authorization", &format!("Bearer {token}"));
    }
    match request.send_string(&payload) {
        Ok(resp) => match resp.into_json::<BridgeResponse>() {
            Ok(response) => response,
            Err(_) => refuse(
                reason_codes::BRIDGE_REFUSE_BACKEND_DECODE,
                "daemon response did not match the bridge contract",
            ),
        },
        Err(ureq::Error::Status(code, _)) => BridgeResponse::Refuse(BridgeRefuse {
            reason_code: reason_codes::BRIDGE_REFUSE_BACKEND_STATUS,
            message: format!("daemon rejected the command with http status {code}"),
        }),
        Err(ureq::Error::Transport(_)) => refuse(
            reason_codes::BRIDGE_REFUSE_TRANSPORT,
            "daemon is unreachable",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> MonotonicTimeNs {
        MonotonicTimeNs(1_000)
    }

    #[test]
    fn at_command_bridge_01_simulated_status_is_success_shaped() {
        let mut bridge = CommandBridgeRuntime::detached();
        match bridge.run(None, &BridgeRequest::Status, now()) {
            BridgeResponse::Status { status } => {
                assert!(status.online);
                assert!(status.validate().is_ok());
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn at_command_bridge_02_invite_returns_code_and_expiry() {
        let mut bridge = CommandBridgeRuntime::detached();
        let req = BridgeRequest::InviteUser {
            family_name: "ada".to_string(),
            email: "ada@example.com".to_string(),
            role: Role::Kid,
        };
        match bridge.run(None, &req, now()) {
            BridgeResponse::InviteCreated {
                code,
                expires_at_ns,
            } => {
                assert_eq!(code.len(), 8);
                assert!(expires_at_ns > now().0);
            }
            other => panic!("expected InviteCreated, got {other:?}"),
        }
        match bridge {
            CommandBridgeRuntime::Simulated(state) => {
                assert_eq!(state.invites_issued(), 1);
                assert!(state.members.iter().any(|m| m.family_name == "ada"));
            }
            _ => panic!("expected simulated bridge"),
        }
    }

    #[test]
    fn at_command_bridge_03_unknown_voice_is_refused_known_voice_sticks() {
        let mut bridge = CommandBridgeRuntime::detached();
        let refused = bridge.run(
            None,
            &BridgeRequest::SelectVoice {
                voice: "tundra".to_string(),
            },
            now(),
        );
        match refused {
            BridgeResponse::Refuse(r) => {
                assert_eq!(r.reason_code, reason_codes::BRIDGE_REFUSE_UNKNOWN_VOICE)
            }
            other => panic!("expected Refuse, got {other:?}"),
        }

        bridge.run(
            None,
            &BridgeRequest::SelectVoice {
                voice: "cedar".to_string(),
            },
            now(),
        );
        match bridge.run(None, &BridgeRequest::ListVoices, now()) {
            BridgeResponse::Voices { active, .. } => assert_eq!(active, "cedar"),
            other => panic!("expected Voices, got {other:?}"),
        }
    }

    #[test]
    fn at_command_bridge_04_invalid_request_is_refused_before_any_io() {
        let mut bridge = CommandBridgeRuntime::Native(DaemonEndpointConfig::local_default(
            "http://127.0.0.1:1",
        ));
        let refused = bridge.run(
            None,
            &BridgeRequest::SendText {
                text: String::new(),
            },
            now(),
        );
        match refused {
            BridgeResponse::Refuse(r) => assert_eq!(
                r.reason_code,
                reason_codes::BRIDGE_REFUSE_INVALID_REQUEST
            ),
            other => panic!("expected Refuse, got {other:?}"),
        }
    }
}

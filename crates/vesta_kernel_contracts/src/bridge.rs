#![forbid(unsafe_code)]

use crate::common::{validate_id, validate_text, ContractViolation, ReasonCodeId, SchemaVersion, Validate};
use crate::role::{Capability, Role};
use crate::status::DaemonStatus;

pub const BRIDGE_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// The capability surface the rendering layer dispatches through, identical
/// whether a native bridge or the simulated one answers.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeRequest {
    Status,
    SendText { text: String },
    Speak { text: String },
    ListDocs,
    ListVoices,
    SelectVoice { voice: String },
    InviteUser {
        family_name: String,
        email: String,
        role: Role,
    },
    ListFamilyMembers,
}

impl BridgeRequest {
    /// Static request → capability mapping. `None` means ungated.
    pub fn required_capability(&self) -> Option<Capability> {
        match self {
            BridgeRequest::Status => None,
            BridgeRequest::SendText { .. } | BridgeRequest::Speak { .. } => {
                Some(Capability::AccessHands)
            }
            BridgeRequest::ListDocs => Some(Capability::AccessDocs),
            BridgeRequest::ListVoices | BridgeRequest::SelectVoice { .. } => {
                Some(Capability::AccessVoiceSelection)
            }
            BridgeRequest::InviteUser { .. } => Some(Capability::InviteUsers),
            BridgeRequest::ListFamilyMembers => Some(Capability::AccessSettings),
        }
    }

    pub fn op_name(&self) -> &'static str {
        match self {
            BridgeRequest::Status => "status",
            BridgeRequest::SendText { .. } => "send_text",
            BridgeRequest::Speak { .. } => "speak",
            BridgeRequest::ListDocs => "list_docs",
            BridgeRequest::ListVoices => "list_voices",
            BridgeRequest::SelectVoice { .. } => "select_voice",
            BridgeRequest::InviteUser { .. } => "invite_user",
            BridgeRequest::ListFamilyMembers => "list_family_members",
        }
    }
}

impl Validate for BridgeRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        match self {
            BridgeRequest::Status
            | BridgeRequest::ListDocs
            | BridgeRequest::ListVoices
            | BridgeRequest::ListFamilyMembers => Ok(()),
            BridgeRequest::SendText { text } => {
                validate_text("bridge_request.send_text.text", text, 4_000)
            }
            BridgeRequest::Speak { text } => {
                validate_text("bridge_request.speak.text", text, 4_000)
            }
            BridgeRequest::SelectVoice { voice } => {
                validate_id("bridge_request.select_voice.voice", voice, 64)
            }
            BridgeRequest::InviteUser {
                family_name, email, ..
            } => {
                validate_id("bridge_request.invite_user.family_name", family_name, 64)?;
                validate_text("bridge_request.invite_user.email", email, 128)?;
                if !email.contains('@') {
                    return Err(ContractViolation::InvalidValue {
                        field: "bridge_request.invite_user.email",
                        reason: "must contain '@'",
                    });
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FamilyMemberRecord {
    pub family_name: String,
    pub email: String,
    pub role: Role,
    pub created_at_ns: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SharedDocRecord {
    pub name: String,
    pub size_bytes: u64,
    pub uploaded_at_ns: u64,
    pub uploader_family_name: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BridgeRefuse {
    pub reason_code: ReasonCodeId,
    pub message: String,
}

/// Discriminated result of a bridge dispatch. A refusal is a normal value;
/// nothing on this surface panics or throws past the caller.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BridgeResponse {
    Status { status: DaemonStatus },
    Ack { handled: bool },
    Docs { docs: Vec<SharedDocRecord> },
    Voices { voices: Vec<String>, active: String },
    InviteCreated { code: String, expires_at_ns: u64 },
    FamilyMembers { members: Vec<FamilyMemberRecord> },
    Refuse(BridgeRefuse),
}

impl BridgeResponse {
    pub fn is_refusal(&self) -> bool {
        matches!(self, BridgeResponse::Refuse(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ungated_and_gated_requests_map_to_the_declared_capabilities() {
        assert_eq!(BridgeRequest::Status.required_capability(), None);
        assert_eq!(
            BridgeRequest::InviteUser {
                family_name: "marta".to_string(),
                email: "marta@example.com".to_string(),
                role: Role::Kid,
            }
            .required_capability(),
            Some(Capability::InviteUsers)
        );
        assert_eq!(
            BridgeRequest::ListDocs.required_capability(),
            Some(Capability::AccessDocs)
        );
        assert_eq!(
            BridgeRequest::ListFamilyMembers.required_capability(),
            Some(Capability::AccessSettings)
        );
    }

    #[test]
    fn invite_request_requires_plausible_email() {
        let req = BridgeRequest::InviteUser {
            family_name: "marta".to_string(),
            email: "not-an-email".to_string(),
            role: Role::Kid,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn request_wire_shape_is_tagged_by_op() {
        let wire = serde_json::to_string(&BridgeRequest::ListVoices).unwrap();
        assert!(wire.contains("\"op\":\"list_voices\""));
        let back: BridgeRequest = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, BridgeRequest::ListVoices);
    }
}

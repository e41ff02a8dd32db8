#![forbid(unsafe_code)]

use crate::audit::AuditEntry;
use crate::common::{ContractViolation, SchemaVersion, Validate};
use crate::status::DaemonStatus;

pub const EVENT_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Permission,
    Audit,
    Heartbeat,
    Status,
}

impl EventCategory {
    pub const ALL: [EventCategory; 4] = [
        EventCategory::Permission,
        EventCategory::Audit,
        EventCategory::Heartbeat,
        EventCategory::Status,
    ];

    pub fn as_wire_str(self) -> &'static str {
        match self {
            EventCategory::Permission => "permission",
            EventCategory::Audit => "audit",
            EventCategory::Heartbeat => "heartbeat",
            EventCategory::Status => "status",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "permission" => Some(EventCategory::Permission),
            "audit" => Some(EventCategory::Audit),
            "heartbeat" => Some(EventCategory::Heartbeat),
            "status" => Some(EventCategory::Status),
            _ => None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PermissionChange {
    Created,
    Updated,
}

/// A permission-record change. The record body is backend-shaped; the core
/// fans it out without interpreting it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PermissionEvent {
    pub event: PermissionChange,
    pub record: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AuditEvent {
    pub entry: AuditEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HeartbeatEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StatusEvent {
    pub status: DaemonStatus,
}

/// One inbound push frame. Ephemeral: consumed by the router, never stored
/// by the core itself.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundEvent {
    Permission(PermissionEvent),
    Audit(AuditEvent),
    Heartbeat(HeartbeatEvent),
    Status(StatusEvent),
}

impl InboundEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            InboundEvent::Permission(_) => EventCategory::Permission,
            InboundEvent::Audit(_) => EventCategory::Audit,
            InboundEvent::Heartbeat(_) => EventCategory::Heartbeat,
            InboundEvent::Status(_) => EventCategory::Status,
        }
    }
}

impl Validate for InboundEvent {
    fn validate(&self) -> Result<(), ContractViolation> {
        match self {
            InboundEvent::Audit(event) => event.entry.validate(),
            InboundEvent::Status(event) => event.status.validate(),
            InboundEvent::Permission(_) | InboundEvent::Heartbeat(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditEntryId, AuditOutcome};

    #[test]
    fn audit_frame_wire_shape_is_tagged_by_type() {
        let event = InboundEvent::Audit(AuditEvent {
            entry: AuditEntry::v1(
                AuditEntryId::new("a1").unwrap(),
                7,
                "bob",
                "deleteUser",
                "carol",
                None,
                AuditOutcome::Blocked,
            )
            .unwrap(),
        });
        let wire = serde_json::to_string(&event).unwrap();
        assert!(wire.contains("\"type\":\"audit\""));
        let back: InboundEvent = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.category(), EventCategory::Audit);
    }

    #[test]
    fn heartbeat_frame_parses_without_seq() {
        let back: InboundEvent = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(back, InboundEvent::Heartbeat(HeartbeatEvent { seq: None }));
    }

    #[test]
    fn category_wire_strings_roundtrip() {
        for category in EventCategory::ALL {
            assert_eq!(
                EventCategory::from_wire(category.as_wire_str()),
                Some(category)
            );
        }
        assert_eq!(EventCategory::from_wire("telemetry"), None);
    }
}

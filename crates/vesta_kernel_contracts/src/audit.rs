#![forbid(unsafe_code)]

use crate::common::{validate_id, validate_text, ContractViolation, SchemaVersion, Validate};

pub const AUDIT_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct AuditEntryId(String);

impl AuditEntryId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(id.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for AuditEntryId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id("audit_entry_id", &self.0, 64)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Allowed,
    Blocked,
    Error,
}

/// One row of the backend's audit log, mirrored read-only. Identity is `id`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub ts_ns: u64,
    pub actor: String,
    pub action: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub result: AuditOutcome,
}

impl AuditEntry {
    pub fn v1(
        id: AuditEntryId,
        ts_ns: u64,
        actor: impl Into<String>,
        action: impl Into<String>,
        target: impl Into<String>,
        note: Option<String>,
        result: AuditOutcome,
    ) -> Result<Self, ContractViolation> {
        let v = Self {
            id,
            ts_ns,
            actor: actor.into(),
            action: action.into(),
            target: target.into(),
            note,
            result,
        };
        v.validate()?;
        Ok(v)
    }
}

impl Validate for AuditEntry {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.id.validate()?;
        validate_text("audit_entry.actor", &self.actor, 96)?;
        validate_text("audit_entry.action", &self.action, 128)?;
        validate_text("audit_entry.target", &self.target, 128)?;
        if let Some(note) = &self.note {
            validate_text("audit_entry.note", note, 512)?;
        }
        Ok(())
    }
}

/// The single consistent audit view produced from the poll and push paths.
/// Invariants: each id appears at most once; newest-first; `has_unseen` is
/// set only by push inserts and cleared only by acknowledge.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReconciledAuditState {
    pub entries: Vec<AuditEntry>,
    pub has_unseen: bool,
}

impl ReconciledAuditState {
    pub fn contains(&self, id: &AuditEntryId) -> bool {
        self.entries.iter().any(|e| &e.id == id)
    }

    pub fn head(&self) -> Option<&AuditEntry> {
        self.entries.first()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AuditSnapshotResponse {
    pub ok: bool,
    #[serde(default)]
    pub entries: Vec<AuditEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AuditAckResponse {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_entry_requires_non_empty_fields() {
        let entry = AuditEntry::v1(
            AuditEntryId::new("a1").unwrap(),
            10,
            "",
            "deleteUser",
            "carol",
            None,
            AuditOutcome::Blocked,
        );
        assert!(entry.is_err());
    }

    #[test]
    fn audit_entry_wire_roundtrip_keeps_note_optional() {
        let entry = AuditEntry::v1(
            AuditEntryId::new("a1").unwrap(),
            10,
            "bob",
            "deleteUser",
            "carol",
            None,
            AuditOutcome::Blocked,
        )
        .unwrap();
        let wire = serde_json::to_string(&entry).unwrap();
        assert!(!wire.contains("note"));
        let back: AuditEntry = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, entry);
    }
}

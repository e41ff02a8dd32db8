#![forbid(unsafe_code)]

use crate::common::{ContractViolation, SchemaVersion};

pub const ROLE_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Family-member role. Declaration order is ascending authority so the
/// derived `Ord` is the total order every capability check reduces to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    Kid,
    Adult,
    Admin,
    Superadmin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Guest,
        Role::Kid,
        Role::Adult,
        Role::Admin,
        Role::Superadmin,
    ];

    pub fn rank(self) -> u8 {
        match self {
            Role::Guest => 1,
            Role::Kid => 2,
            Role::Adult => 3,
            Role::Admin => 4,
            Role::Superadmin => 5,
        }
    }

    pub fn as_wire_str(self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Kid => "kid",
            Role::Adult => "adult",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }

    /// Unknown role strings are rejected, never mapped to a default.
    pub fn from_wire(s: &str) -> Result<Self, ContractViolation> {
        match s {
            "guest" => Ok(Role::Guest),
            "kid" => Ok(Role::Kid),
            "adult" => Ok(Role::Adult),
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::Superadmin),
            _ => Err(ContractViolation::InvalidValue {
                field: "role",
                reason: "unknown role string",
            }),
        }
    }
}

/// A named privileged operation gated by a minimum role.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    InviteUsers,
    AccessSettings,
    AccessHands,
    AccessVoiceSelection,
    AccessDocs,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::InviteUsers,
        Capability::AccessSettings,
        Capability::AccessHands,
        Capability::AccessVoiceSelection,
        Capability::AccessDocs,
    ];

    pub fn as_wire_str(self) -> &'static str {
        match self {
            Capability::InviteUsers => "inviteUsers",
            Capability::AccessSettings => "accessSettings",
            Capability::AccessHands => "accessHands",
            Capability::AccessVoiceSelection => "accessVoiceSelection",
            Capability::AccessDocs => "accessDocs",
        }
    }
}

/// One row of the static capability table: the weakest role allowed to use
/// the capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityGrant {
    pub capability: Capability,
    pub min_role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_order_matches_rank() {
        assert!(Role::Guest < Role::Kid);
        assert!(Role::Kid < Role::Adult);
        assert!(Role::Adult < Role::Admin);
        assert!(Role::Admin < Role::Superadmin);
        for pair in Role::ALL.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn role_wire_strings_roundtrip_and_unknown_is_rejected() {
        for role in Role::ALL {
            assert_eq!(Role::from_wire(role.as_wire_str()).unwrap(), role);
        }
        assert!(Role::from_wire("owner").is_err());
        assert!(Role::from_wire("Admin").is_err());
    }
}

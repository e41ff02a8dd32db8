#![forbid(unsafe_code)]

use vesta_kernel_contracts::actor::ActorRef;
use vesta_kernel_contracts::role::{Capability, CapabilityGrant, Role};
use vesta_kernel_contracts::{ContractViolation, ReasonCodeId, Validate};

pub mod reason_codes {
    use vesta_kernel_contracts::ReasonCodeId;

    pub const ROLE_AUTHORITY_OK_ALLOW: ReasonCodeId = ReasonCodeId(0x524F_0001);

    pub const ROLE_AUTHORITY_DENY_NO_ACTOR: ReasonCodeId = ReasonCodeId(0x524F_00F1);
    pub const ROLE_AUTHORITY_DENY_MIN_ROLE: ReasonCodeId = ReasonCodeId(0x524F_00F2);
    pub const ROLE_AUTHORITY_DENY_UNDECLARED: ReasonCodeId = ReasonCodeId(0x524F_00F3);
}

/// The static capability table. Immutable once the runtime is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAuthorityConfig {
    pub grants: Vec<CapabilityGrant>,
}

impl RoleAuthorityConfig {
    pub fn mvp_v1() -> Self {
        Self {
            grants: vec![
                CapabilityGrant {
                    capability: Capability::InviteUsers,
                    min_role: Role::Admin,
                },
                CapabilityGrant {
                    capability: Capability::AccessSettings,
                    min_role: Role::Admin,
                },
                CapabilityGrant {
                    capability: Capability::AccessHands,
                    min_role: Role::Kid,
                },
                CapabilityGrant {
                    capability: Capability::AccessVoiceSelection,
                    min_role: Role::Admin,
                },
                CapabilityGrant {
                    capability: Capability::AccessDocs,
                    min_role: Role::Kid,
                },
            ],
        }
    }
}

impl Validate for RoleAuthorityConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        for capability in Capability::ALL {
            let declared = self
                .grants
                .iter()
                .filter(|g| g.capability == capability)
                .count();
            if declared == 0 {
                return Err(ContractViolation::InvalidValue {
                    field: "role_authority_config.grants",
                    reason: "every capability must declare a minimum role",
                });
            }
            if declared > 1 {
                return Err(ContractViolation::InvalidValue {
                    field: "role_authority_config.grants",
                    reason: "capability declared more than once",
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    pub capability: Capability,
    pub min_role: Option<Role>,
    pub actor_role: Option<Role>,
    pub allowed: bool,
    pub reason_code: ReasonCodeId,
}

/// Pure authorization decisions over the total role order. No transport,
/// no view state, no request parameters.
#[derive(Debug, Clone)]
pub struct RoleAuthorityRuntime {
    config: RoleAuthorityConfig,
}

impl RoleAuthorityRuntime {
    pub fn new(config: RoleAuthorityConfig) -> Result<Self, ContractViolation> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn mvp_v1() -> Self {
        Self {
            config: RoleAuthorityConfig::mvp_v1(),
        }
    }

    pub fn min_role(&self, capability: Capability) -> Option<Role> {
        self.config
            .grants
            .iter()
            .find(|g| g.capability == capability)
            .map(|g| g.min_role)
    }

    pub fn is_allowed(&self, actor: Option<&ActorRef>, capability: Capability) -> bool {
        self.decide(actor, capability).allowed
    }

    /// An absent actor or an undeclared capability is denied. An allow is
    /// exactly `rank(actor.role) >= rank(min_role)`.
    pub fn decide(&self, actor: Option<&ActorRef>, capability: Capability) -> AccessDecision {
        let min_role = self.min_role(capability);
        let Some(actor) = actor else {
            return AccessDecision {
                capability,
                min_role,
                actor_role: None,
                allowed: false,
                reason_code: reason_codes::ROLE_AUTHORITY_DENY_NO_ACTOR,
            };
        };
        let Some(min_role) = min_role else {
            return AccessDecision {
                capability,
                min_role: None,
                actor_role: Some(actor.role),
                allowed: false,
                reason_code: reason_codes::ROLE_AUTHORITY_DENY_UNDECLARED,
            };
        };
        let allowed = actor.role.rank() >= min_role.rank();
        AccessDecision {
            capability,
            min_role: Some(min_role),
            actor_role: Some(actor.role),
            allowed,
            reason_code: if allowed {
                reason_codes::ROLE_AUTHORITY_OK_ALLOW
            } else {
                reason_codes::ROLE_AUTHORITY_DENY_MIN_ROLE
            },
        }
    }
}

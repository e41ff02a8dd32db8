#![forbid(unsafe_code)]

use crate::common::{validate_id, validate_text, ContractViolation, Validate};
use crate::role::Role;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(id.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for ActorId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id("actor_id", &self.0, 64)
    }
}

/// Salted digest of the actor's PIN. The raw PIN never crosses a contract
/// boundary; only the digest travels with privileged calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinDigest(String);

impl PinDigest {
    pub fn from_b64(digest: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(digest.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for PinDigest {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id("pin_digest", &self.0, 128)
    }
}

/// The identity operating the UI. Owned by the session layer; the role
/// authority only ever borrows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorRef {
    pub actor_id: ActorId,
    pub display_name: String,
    pub role: Role,
    pub pin_digest: Option<PinDigest>,
}

impl ActorRef {
    pub fn v1(
        actor_id: ActorId,
        display_name: impl Into<String>,
        role: Role,
        pin_digest: Option<PinDigest>,
    ) -> Result<Self, ContractViolation> {
        let v = Self {
            actor_id,
            display_name: display_name.into(),
            role,
            pin_digest,
        };
        v.validate()?;
        Ok(v)
    }
}

impl Validate for ActorRef {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.actor_id.validate()?;
        validate_text("actor_ref.display_name", &self.display_name, 96)?;
        if let Some(digest) = &self.pin_digest {
            digest.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_id_rejects_empty_and_non_ascii() {
        assert!(ActorId::new("").is_err());
        assert!(ActorId::new("   ").is_err());
        assert!(ActorId::new("zoë").is_err());
        assert!(ActorId::new("marta").is_ok());
    }

    #[test]
    fn actor_ref_requires_display_name() {
        let actor = ActorRef::v1(ActorId::new("marta").unwrap(), "", Role::Admin, None);
        assert!(actor.is_err());
    }
}

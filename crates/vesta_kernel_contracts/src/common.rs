#![forbid(unsafe_code)]

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonotonicTimeNs(pub u64);

impl MonotonicTimeNs {
    pub fn saturating_add_ms(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms.saturating_mul(1_000_000)))
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ReasonCodeId(pub u32);

/// Lifecycle of the push channel. A torn-down channel never reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Connecting,
    Open,
    ClosedClean,
    ClosedError,
    TornDown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContractViolation {
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
        got: f64,
    },
    NotFinite {
        field: &'static str,
    },
}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}

pub(crate) fn validate_id(
    field: &'static str,
    s: &str,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if s.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    if s.len() > max_len {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "too long",
        });
    }
    if !s.is_ascii() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be ASCII",
        });
    }
    Ok(())
}

pub(crate) fn validate_text(
    field: &'static str,
    s: &str,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if s.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    if s.len() > max_len {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "too long",
        });
    }
    Ok(())
}

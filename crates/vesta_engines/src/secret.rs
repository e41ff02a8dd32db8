#![forbid(unsafe_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

use vesta_kernel_contracts::actor::{ActorId, PinDigest};
use vesta_kernel_contracts::ContractViolation;

const PIN_MAX_LEN: usize = 128;
const INVITE_CODE_LEN: usize = 8;
const INVITE_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Salted digest of a PIN. The actor id is the salt so equal PINs on
/// different accounts never produce equal digests.
pub fn derive_pin_digest(actor_id: &ActorId, pin: &str) -> Result<PinDigest, ContractViolation> {
    if pin.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field: "pin",
            reason: "must not be empty",
        });
    }
    if pin.len() > PIN_MAX_LEN {
        return Err(ContractViolation::InvalidValue {
            field: "pin",
            reason: "too long",
        });
    }
    let mut hasher = Sha256::new();
    hasher.update(actor_id.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(pin.as_bytes());
    PinDigest::from_b64(BASE64.encode(hasher.finalize()))
}

pub fn verify_pin(digest: &PinDigest, actor_id: &ActorId, pin: &str) -> bool {
    match derive_pin_digest(actor_id, pin) {
        Ok(candidate) => &candidate == digest,
        Err(_) => false,
    }
}

/// Short invite code from an ambiguity-free alphabet (no 0/O/1/I/L).
pub fn generate_invite_code() -> String {
    let mut rng = rand::thread_rng();
    (0..INVITE_CODE_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..INVITE_CODE_ALPHABET.len());
            INVITE_CODE_ALPHABET[idx] as char
        })
        .collect()
}

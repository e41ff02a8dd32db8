#![forbid(unsafe_code)]

use crate::common::{validate_text, ContractViolation, SchemaVersion, Validate};

pub const STATUS_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// The daemon's self-reported surface state, pushed on the `status` channel.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DaemonStatus {
    pub online: bool,
    pub project: String,
    pub voice: String,
    pub listening: bool,
    pub speaking: bool,
    pub hotword: bool,
    pub vu_level: f32,
    pub lat_stt_ms: u32,
    pub lat_llm_ms: u32,
    pub lat_tts_ms: u32,
    pub lat_total_ms: u32,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            online: false,
            project: "default".to_string(),
            voice: "default".to_string(),
            listening: false,
            speaking: false,
            hotword: false,
            vu_level: 0.0,
            lat_stt_ms: 0,
            lat_llm_ms: 0,
            lat_tts_ms: 0,
            lat_total_ms: 0,
        }
    }
}

impl Validate for DaemonStatus {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("daemon_status.project", &self.project, 128)?;
        validate_text("daemon_status.voice", &self.voice, 64)?;
        if !self.vu_level.is_finite() {
            return Err(ContractViolation::NotFinite {
                field: "daemon_status.vu_level",
            });
        }
        if !(0.0..=1.0).contains(&self.vu_level) {
            return Err(ContractViolation::InvalidRange {
                field: "daemon_status.vu_level",
                min: 0.0,
                max: 1.0,
                got: f64::from(self.vu_level),
            });
        }
        Ok(())
    }
}

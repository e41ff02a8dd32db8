#![forbid(unsafe_code)]

use vesta_kernel_contracts::event::{EventCategory, InboundEvent};
use vesta_kernel_contracts::{ReasonCodeId, Validate};

pub mod reason_codes {
    use vesta_kernel_contracts::ReasonCodeId;

    pub const FRAME_DISCARD_MALFORMED_JSON: ReasonCodeId = ReasonCodeId(0x4652_00F1);
    pub const FRAME_DISCARD_TYPE_MISSING: ReasonCodeId = ReasonCodeId(0x4652_00F2);
    pub const FRAME_DISCARD_TYPE_UNKNOWN: ReasonCodeId = ReasonCodeId(0x4652_00F3);
    pub const FRAME_DISCARD_PAYLOAD_INVALID: ReasonCodeId = ReasonCodeId(0x4652_00F4);
}

/// Why a frame was dropped. A discard is diagnostic data, never an error
/// that tears anything down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDiscard {
    pub reason_code: ReasonCodeId,
    pub detail: &'static str,
}

fn discard(reason_code: ReasonCodeId, detail: &'static str) -> FrameDiscard {
    FrameDiscard {
        reason_code,
        detail,
    }
}

/// Classify one raw inbound frame. Two-stage parse: the `type` tag decides
/// known vs. unknown before the typed payload is decoded, so the two failure
/// modes stay distinguishable in counters.
pub fn classify_frame(raw: &str) -> Result<InboundEvent, FrameDiscard> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|_| {
        discard(
            reason_codes::FRAME_DISCARD_MALFORMED_JSON,
            "frame body is not valid JSON",
        )
    })?;
    let Some(type_str) = value.get("type").and_then(|v| v.as_str()) else {
        return Err(discard(
            reason_codes::FRAME_DISCARD_TYPE_MISSING,
            "frame has no string `type` field",
        ));
    };
    if EventCategory::from_wire(type_str).is_none() {
        return Err(discard(
            reason_codes::FRAME_DISCARD_TYPE_UNKNOWN,
            "frame type is not a known category",
        ));
    }
    let event: InboundEvent = serde_json::from_value(value).map_err(|_| {
        discard(
            reason_codes::FRAME_DISCARD_PAYLOAD_INVALID,
            "payload does not match the declared type",
        )
    })?;
    event.validate().map_err(|_| {
        discard(
            reason_codes::FRAME_DISCARD_PAYLOAD_INVALID,
            "payload failed contract validation",
        )
    })?;
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_frame_01_audit_frame_classifies_with_entry_intact() {
        let raw = r#"{"type":"audit","entry":{"id":"a1","ts_ns":7,"actor":"bob","action":"deleteUser","target":"carol","result":"blocked"}}"#;
        let event = classify_frame(raw).unwrap();
        assert_eq!(event.category(), EventCategory::Audit);
        match event {
            InboundEvent::Audit(audit) => {
                assert_eq!(audit.entry.id.as_str(), "a1");
                assert_eq!(audit.entry.actor, "bob");
            }
            _ => panic!("expected audit event"),
        }
    }

    #[test]
    fn at_frame_02_malformed_json_is_discarded() {
        let err = classify_frame("{not json").unwrap_err();
        assert_eq!(
            err.reason_code,
            reason_codes::FRAME_DISCARD_MALFORMED_JSON
        );
    }

    #[test]
    fn at_frame_03_missing_and_unknown_types_are_distinct_discards() {
        let missing = classify_frame(r#"{"entry":{}}"#).unwrap_err();
        assert_eq!(
            missing.reason_code,
            reason_codes::FRAME_DISCARD_TYPE_MISSING
        );
        let unknown = classify_frame(r#"{"type":"telemetry","value":1}"#).unwrap_err();
        assert_eq!(
            unknown.reason_code,
            reason_codes::FRAME_DISCARD_TYPE_UNKNOWN
        );
    }

    #[test]
    fn at_frame_04_known_type_with_invalid_payload_is_discarded() {
        let err = classify_frame(r#"{"type":"audit","entry":{"id":"a1"}}"#).unwrap_err();
        assert_eq!(
            err.reason_code,
            reason_codes::FRAME_DISCARD_PAYLOAD_INVALID
        );
        let err = classify_frame(
            r#"{"type":"audit","entry":{"id":"","ts_ns":1,"actor":"bob","action":"x","target":"y","result":"blocked"}}"#,
        )
        .unwrap_err();
        assert_eq!(
            err.reason_code,
            reason_codes::FRAME_DISCARD_PAYLOAD_INVALID
        );
    }

    #[test]
    fn at_frame_05_heartbeat_and_status_frames_classify() {
        assert_eq!(
            classify_frame(r#"{"type":"heartbeat","seq":42}"#)
                .unwrap()
                .category(),
            EventCategory::Heartbeat
        );
        let raw = r#"{"type":"status","status":{"online":true,"project":"kitchen","voice":"amber","listening":false,"speaking":false,"hotword":true,"vu_level":0.25,"lat_stt_ms":120,"lat_llm_ms":300,"lat_tts_ms":90,"lat_total_ms":510}}"#;
        assert_eq!(classify_frame(raw).unwrap().category(), EventCategory::Status);
    }
}

#![forbid(unsafe_code)]

use std::env;
use std::time::Duration;

use vesta_engines::audit_merge;
use vesta_kernel_contracts::actor::ActorId;
use vesta_kernel_contracts::audit::{
    AuditAckResponse, AuditEntry, AuditSnapshotResponse, ReconciledAuditState,
};
use vesta_kernel_contracts::{ContractViolation, MonotonicTimeNs, Validate};

use crate::daemon_endpoint::{DaemonEndpointConfig, ACTOR_HEADER};

pub mod reason_codes {
    use vesta_kernel_contracts::ReasonCodeId;

    pub const AUDIT_OK_SNAPSHOT_APPLIED: ReasonCodeId = ReasonCodeId(0x4155_0001);
    pub const AUDIT_OK_PUSH_INSERTED: ReasonCodeId = ReasonCodeId(0x4155_0002);
    pub const AUDIT_OK_ACKNOWLEDGED: ReasonCodeId = ReasonCodeId(0x4155_0003);

    pub const AUDIT_PUSH_DUPLICATE_IGNORED: ReasonCodeId = ReasonCodeId(0x4155_00A1);
    pub const AUDIT_SNAPSHOT_FETCH_FAILED: ReasonCodeId = ReasonCodeId(0x4155_00F1);
    pub const AUDIT_ACK_SEND_FAILED: ReasonCodeId = ReasonCodeId(0x4155_00F2);
}

pub const AUDIT_POLL_INTERVAL_MS_DEFAULT: u32 = 10_000;
pub const AUDIT_SNAPSHOT_LIMIT_DEFAULT: u16 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditReconcilerConfig {
    pub poll_interval_ms: u32,
    pub snapshot_limit: u16,
}

impl AuditReconcilerConfig {
    pub fn mvp_v1() -> Self {
        Self {
            poll_interval_ms: AUDIT_POLL_INTERVAL_MS_DEFAULT,
            snapshot_limit: AUDIT_SNAPSHOT_LIMIT_DEFAULT,
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::mvp_v1();
        let poll_interval_ms = env::var("VESTA_AUDIT_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| (1_000..=300_000).contains(v))
            .unwrap_or(defaults.poll_interval_ms);
        let snapshot_limit = env::var("VESTA_AUDIT_SNAPSHOT_LIMIT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .filter(|v| (1..=500).contains(v))
            .unwrap_or(defaults.snapshot_limit);
        Self {
            poll_interval_ms,
            snapshot_limit,
        }
    }
}

impl Validate for AuditReconcilerConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.poll_interval_ms == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_reconciler_config.poll_interval_ms",
                reason: "must be > 0",
            });
        }
        if self.snapshot_limit == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_reconciler_config.snapshot_limit",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditFetchError {
    pub message: String,
}

impl AuditFetchError {
    pub fn new(message: impl Into<String>) -> Self {
        let msg = message.into();
        let bounded = if msg.len() > 256 {
            msg.chars().take(256).collect::<String>()
        } else {
            msg
        };
        Self { message: bounded }
    }
}

/// Source of authoritative snapshots. `Loopback` serves a canned list for
/// detached mode and tests; `AlwaysFail` exists for failure-path tests.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditSnapshotFetcherRuntime {
    Loopback(Vec<AuditEntry>),
    Http(DaemonEndpointConfig),
    AlwaysFail { message: String },
}

impl AuditSnapshotFetcherRuntime {
    pub fn from_env_or_loopback() -> Self {
        match DaemonEndpointConfig::from_env() {
            Some(config) => Self::Http(config),
            None => Self::Loopback(Vec::new()),
        }
    }

    #[cfg(test)]
    pub fn always_fail_for_tests(message: &str) -> Self {
        Self::AlwaysFail {
            message: message.to_string(),
        }
    }

    pub fn fetch(
        &self,
        actor_id: &ActorId,
        limit: u16,
    ) -> Result<Vec<AuditEntry>, AuditFetchError> {
        match self {
            Self::Loopback(entries) => {
                Ok(entries.iter().take(limit as usize).cloned().collect())
            }
            Self::AlwaysFail { message } => Err(AuditFetchError::new(message.clone())),
            Self::Http(config) => fetch_http_snapshot(config, actor_id, limit),
        }
    }
}

/// One-way acknowledgement channel back to the daemon.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditAckSenderRuntime {
    LoopbackAck,
    Http(DaemonEndpointConfig),
    AlwaysFail { message: String },
}

impl AuditAckSenderRuntime {
    pub fn from_env_or_loopback() -> Self {
        match DaemonEndpointConfig::from_env() {
            Some(config) => Self::Http(config),
            None => Self::LoopbackAck,
        }
    }

    #[cfg(test)]
    pub fn always_fail_for_tests(message: &str) -> Self {
        Self::AlwaysFail {
            message: message.to_string(),
        }
    }

    pub fn send_ack(&self, actor_id: &ActorId) -> Result<(), AuditFetchError> {
        match self {
            Self::LoopbackAck => Ok(()),
            Self::AlwaysFail { message } => Err(AuditFetchError::new(message.clone())),
            Self::Http(config) => send_http_ack(config, actor_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuditReconcilerCounters {
    pub polls_total: u64,
    pub poll_failures_total: u64,
    pub last_snapshot_entry_count: u16,
    pub push_inserts_total: u64,
    pub push_duplicates_total: u64,
    pub acks_total: u64,
    pub ack_send_failures_total: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuditPollOutcome {
    Applied { entry_count: u16 },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditAckOutcome {
    pub cleared: bool,
    pub backend_notified: bool,
}

/// One consistent audit view from two independently-arriving sources. Both
/// writers reduce to the pure merge steps, so poll and push in the same tick
/// cannot lose each other's update.
#[derive(Debug)]
pub struct AuditReconcilerRuntime {
    config: AuditReconcilerConfig,
    state: ReconciledAuditState,
    fetcher: AuditSnapshotFetcherRuntime,
    acker: AuditAckSenderRuntime,
    next_poll_due_at: MonotonicTimeNs,
    counters: AuditReconcilerCounters,
}

impl AuditReconcilerRuntime {
    pub fn new(
        config: AuditReconcilerConfig,
        fetcher: AuditSnapshotFetcherRuntime,
        acker: AuditAckSenderRuntime,
    ) -> Self {
        Self {
            config,
            state: ReconciledAuditState::default(),
            fetcher,
            acker,
            next_poll_due_at: MonotonicTimeNs(0),
            counters: AuditReconcilerCounters::default(),
        }
    }

    pub fn state(&self) -> &ReconciledAuditState {
        &self.state
    }

    pub fn counters(&self) -> AuditReconcilerCounters {
        self.counters
    }

    pub fn config(&self) -> AuditReconcilerConfig {
        self.config
    }

    /// Interval gate: polls at most once per configured interval.
    pub fn tick(&mut self, now: MonotonicTimeNs, actor_id: &ActorId) -> Option<AuditPollOutcome> {
        if now < self.next_poll_due_at {
            return None;
        }
        Some(self.refresh(now, actor_id))
    }

    /// On-demand snapshot fetch. A failure leaves the current list exactly
    /// as it was; the next tick retries.
    pub fn refresh(&mut self, now: MonotonicTimeNs, actor_id: &ActorId) -> AuditPollOutcome {
        self.next_poll_due_at = now.saturating_add_ms(u64::from(self.config.poll_interval_ms));
        self.counters.polls_total += 1;
        match self.fetcher.fetch(actor_id, self.config.snapshot_limit) {
            Ok(entries) => {
                let valid: Vec<AuditEntry> = entries
                    .into_iter()
                    .filter(|e| e.validate().is_ok())
                    .collect();
                let entry_count = valid.len() as u16;
                self.state = audit_merge::merge_snapshot(&self.state, valid);
                self.counters.last_snapshot_entry_count = entry_count;
                AuditPollOutcome::Applied { entry_count }
            }
            Err(err) => {
                self.counters.poll_failures_total += 1;
                AuditPollOutcome::Failed {
                    message: err.message,
                }
            }
        }
    }

    /// Push path. Idempotent per entry id.
    pub fn on_push(&mut self, entry: AuditEntry) -> bool {
        let merged = audit_merge::merge_push(&self.state, entry);
        if merged.inserted {
            self.counters.push_inserts_total += 1;
        } else {
            self.counters.push_duplicates_total += 1;
        }
        self.state = merged.state;
        merged.inserted
    }

    /// Clears the unseen flag and notifies the backend. The clear is local
    /// and unconditional: the signal is one-way, and the backend may re-flag.
    pub fn acknowledge(&mut self, actor_id: &ActorId) -> AuditAckOutcome {
        self.state = audit_merge::acknowledge(&self.state);
        self.counters.acks_total += 1;
        let backend_notified = match self.acker.send_ack(actor_id) {
            Ok(()) => true,
            Err(_) => {
                self.counters.ack_send_failures_total += 1;
                false
            }
        };
        AuditAckOutcome {
            cleared: true,
            backend_notified,
        }
    }
}

fn fetch_http_snapshot(
    config: &DaemonEndpointConfig,
    actor_id: &ActorId,
    limit: u16,
) -> Result<Vec<AuditEntry>, AuditFetchError> {
    let agent = http_agent(config);
    let url = format!("{}/audit/superadmin?limit={limit}", config.base_url);
    let mut req = agent.get(&url).set(ACTOR_HEADER, actor_id.as_str());
    if let Some(token) = config.bearer_token.as_ref() {
        req = req.set("authorization", &format!("Bearer {token}"));
    }
    match req.call() {
        Ok(resp) => {
            let body: AuditSnapshotResponse = resp
                .into_json()
                .map_err(|err| AuditFetchError::new(format!("snapshot decode failed: {err}")))?;
            if !body.ok {
                return Err(AuditFetchError::new("snapshot endpoint returned ok=false"));
            }
            Ok(body.entries)
        }
        Err(ureq::Error::Status(code, _)) => Err(AuditFetchError::new(format!(
            "snapshot fetch failed with http status {code}"
        ))),
        Err(ureq::Error::Transport(err)) => Err(AuditFetchError::new(format!(
            "snapshot transport error: {err}"
        ))),
    }
}

fn send_http_ack(
    config: &DaemonEndpointConfig,
    actor_id: &ActorId,
) -> Result<(), AuditFetchError> {
    let agent = http_agent(config);
    let url = format!("{}/audit/superadmin/ack", config.base_url);
    let mut req = agent.post(&url).set(ACTOR_HEADER, actor_id.as_str());
    if let Some(token) = config.bearer_token.as_ref() {
        req = req.set("authorization", &format!("Bearer {token}"));
    }
    match req.send_string("") {
        Ok(resp) => {
            let body: AuditAckResponse = resp
                .into_json()
                .map_err(|err| AuditFetchError::new(format!("ack decode failed: {err}")))?;
            if !body.ok {
                return Err(AuditFetchError::new("ack endpoint returned ok=false"));
            }
            Ok(())
        }
        Err(ureq::Error::Status(code, _)) => Err(AuditFetchError::new(format!(
            "ack failed with http status {code}"
        ))),
        Err(ureq::Error::Transport(err)) => {
            Err(AuditFetchError::new(format!("ack transport error: {err}")))
        }
    }
}

fn http_agent(config: &DaemonEndpointConfig) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
        .timeout_read(Duration::from_millis(config.request_timeout_ms))
        .timeout_write(Duration::from_millis(config.request_timeout_ms))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesta_kernel_contracts::audit::{AuditEntryId, AuditOutcome};

    fn entry(id: &str, ts_ns: u64) -> AuditEntry {
        AuditEntry::v1(
            AuditEntryId::new(id).unwrap(),
            ts_ns,
            "bob",
            "deleteUser",
            "carol",
            None,
            AuditOutcome::Blocked,
        )
        .unwrap()
    }

    fn poll_actor() -> ActorId {
        ActorId::new("marta").unwrap()
    }

    fn config() -> AuditReconcilerConfig {
        AuditReconcilerConfig {
            poll_interval_ms: 10_000,
            snapshot_limit: 50,
        }
    }

    #[test]
    fn at_audit_reconciler_01_snapshot_poll_replaces_baseline() {
        let mut runtime = AuditReconcilerRuntime::new(
            config(),
            AuditSnapshotFetcherRuntime::Loopback(vec![entry("z0", 100), entry("z1", 50)]),
            AuditAckSenderRuntime::LoopbackAck,
        );
        let outcome = runtime.refresh(MonotonicTimeNs(1), &poll_actor());
        assert_eq!(outcome, AuditPollOutcome::Applied { entry_count: 2 });
        assert_eq!(runtime.state().entries.len(), 2);
        assert!(!runtime.state().has_unseen);
    }

    #[test]
    fn at_audit_reconciler_02_failed_poll_leaves_state_untouched() {
        let mut runtime = AuditReconcilerRuntime::new(
            config(),
            AuditSnapshotFetcherRuntime::Loopback(vec![entry("z0", 100)]),
            AuditAckSenderRuntime::LoopbackAck,
        );
        runtime.refresh(MonotonicTimeNs(1), &poll_actor());
        runtime.on_push(entry("a1", 200));
        let before = runtime.state().clone();

        runtime.fetcher = AuditSnapshotFetcherRuntime::always_fail_for_tests("daemon down");
        let outcome = runtime.refresh(MonotonicTimeNs(2), &poll_actor());
        assert!(matches!(outcome, AuditPollOutcome::Failed { .. }));
        assert_eq!(runtime.state(), &before);
        assert_eq!(runtime.counters().poll_failures_total, 1);
    }

    #[test]
    fn at_audit_reconciler_03_tick_respects_the_poll_interval() {
        let mut runtime = AuditReconcilerRuntime::new(
            config(),
            AuditSnapshotFetcherRuntime::Loopback(Vec::new()),
            AuditAckSenderRuntime::LoopbackAck,
        );
        let t0 = MonotonicTimeNs(1_000_000_000);
        assert!(runtime.tick(t0, &poll_actor()).is_some());
        assert!(runtime.tick(t0.saturating_add_ms(5_000), &poll_actor()).is_none());
        assert!(runtime.tick(t0.saturating_add_ms(10_000), &poll_actor()).is_some());
        assert_eq!(runtime.counters().polls_total, 2);
    }

    #[test]
    fn at_audit_reconciler_04_push_then_duplicate_counts_once() {
        let mut runtime = AuditReconcilerRuntime::new(
            config(),
            AuditSnapshotFetcherRuntime::Loopback(Vec::new()),
            AuditAckSenderRuntime::LoopbackAck,
        );
        assert!(runtime.on_push(entry("a1", 10)));
        assert!(!runtime.on_push(entry("a1", 10)));
        assert_eq!(runtime.state().entries.len(), 1);
        assert!(runtime.state().has_unseen);
        assert_eq!(runtime.counters().push_inserts_total, 1);
        assert_eq!(runtime.counters().push_duplicates_total, 1);
    }

    #[test]
    fn at_audit_reconciler_05_ack_clears_flag_even_when_send_fails() {
        let mut runtime = AuditReconcilerRuntime::new(
            config(),
            AuditSnapshotFetcherRuntime::Loopback(Vec::new()),
            AuditAckSenderRuntime::always_fail_for_tests("daemon down"),
        );
        runtime.on_push(entry("a1", 10));
        let outcome = runtime.acknowledge(&poll_actor());
        assert!(outcome.cleared);
        assert!(!outcome.backend_notified);
        assert!(!runtime.state().has_unseen);
        assert_eq!(runtime.state().entries.len(), 1);
        assert_eq!(runtime.counters().ack_send_failures_total, 1);
    }

    #[test]
    fn at_audit_reconciler_06_snapshot_after_ack_does_not_resurrect_flag() {
        let mut runtime = AuditReconcilerRuntime::new(
            config(),
            AuditSnapshotFetcherRuntime::Loopback(vec![entry("a1", 10), entry("z0", 5)]),
            AuditAckSenderRuntime::LoopbackAck,
        );
        runtime.on_push(entry("a1", 10));
        runtime.acknowledge(&poll_actor());
        runtime.refresh(MonotonicTimeNs(1), &poll_actor());
        assert!(!runtime.state().has_unseen);
        assert_eq!(runtime.state().entries.len(), 2);
    }

    #[test]
    fn at_audit_reconciler_07_invalid_snapshot_rows_are_dropped_not_fatal() {
        let mut bad = entry("z0", 100);
        bad.actor = String::new();
        let mut runtime = AuditReconcilerRuntime::new(
            config(),
            AuditSnapshotFetcherRuntime::Loopback(vec![bad, entry("z1", 50)]),
            AuditAckSenderRuntime::LoopbackAck,
        );
        let outcome = runtime.refresh(MonotonicTimeNs(1), &poll_actor());
        assert_eq!(outcome, AuditPollOutcome::Applied { entry_count: 1 });
        assert_eq!(runtime.state().entries.len(), 1);
        assert_eq!(runtime.state().entries[0].id.as_str(), "z1");
    }
}

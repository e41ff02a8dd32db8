#![forbid(unsafe_code)]

use std::cmp::min;
use std::env;

use vesta_kernel_contracts::{ChannelState, ContractViolation, MonotonicTimeNs, Validate};

pub const RECONNECT_BASE_DELAY_MS_DEFAULT: u32 = 1_000;
pub const RECONNECT_MULTIPLIER_DEFAULT: u32 = 2;
pub const RECONNECT_MAX_DELAY_MS_DEFAULT: u32 = 30_000;
pub const DEGRADED_AFTER_FAILURES_DEFAULT: u16 = 5;

/// Capped exponential backoff parameters for the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay_ms: u32,
    pub multiplier: u32,
    pub max_delay_ms: u32,
    pub degraded_after_failures: u16,
}

impl ReconnectPolicy {
    pub fn mvp_v1() -> Self {
        Self {
            base_delay_ms: RECONNECT_BASE_DELAY_MS_DEFAULT,
            multiplier: RECONNECT_MULTIPLIER_DEFAULT,
            max_delay_ms: RECONNECT_MAX_DELAY_MS_DEFAULT,
            degraded_after_failures: DEGRADED_AFTER_FAILURES_DEFAULT,
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::mvp_v1();
        let base_delay_ms = env::var("VESTA_RECONNECT_BASE_DELAY_MS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| (100..=60_000).contains(v))
            .unwrap_or(defaults.base_delay_ms);
        let multiplier = env::var("VESTA_RECONNECT_MULTIPLIER")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| (1..=10).contains(v))
            .unwrap_or(defaults.multiplier);
        let max_delay_ms = env::var("VESTA_RECONNECT_MAX_DELAY_MS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| (1_000..=600_000).contains(v))
            .unwrap_or(defaults.max_delay_ms);
        let degraded_after_failures = env::var("VESTA_DEGRADED_AFTER_FAILURES")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .filter(|v| (1..=100).contains(v))
            .unwrap_or(defaults.degraded_after_failures);
        Self {
            base_delay_ms,
            multiplier,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
            degraded_after_failures,
        }
    }

    /// Delay before retry number `failure_count` (1-based). Saturating and
    /// capped so a long outage cannot overflow or storm.
    pub fn delay_ms_for_failure(&self, failure_count: u16) -> u32 {
        let mut delay = u64::from(self.base_delay_ms);
        let cap = u64::from(self.max_delay_ms);
        for _ in 1..failure_count {
            delay = min(delay.saturating_mul(u64::from(self.multiplier)), cap);
            if delay == cap {
                break;
            }
        }
        min(delay, cap) as u32
    }
}

impl Validate for ReconnectPolicy {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.base_delay_ms == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "reconnect_policy.base_delay_ms",
                reason: "must be > 0",
            });
        }
        if self.multiplier == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "reconnect_policy.multiplier",
                reason: "must be > 0",
            });
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ContractViolation::InvalidValue {
                field: "reconnect_policy.max_delay_ms",
                reason: "must be >= base_delay_ms",
            });
        }
        if self.degraded_after_failures == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "reconnect_policy.degraded_after_failures",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportCounters {
    pub dial_attempts_total: u64,
    pub dials_succeeded_total: u64,
    pub dials_failed_total: u64,
    pub remote_closes_total: u64,
    pub frames_seen_total: u64,
    pub sends_accepted_total: u64,
    pub sends_dropped_not_open_total: u64,
}

/// What the socket driver should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelDirective {
    Dial,
    Wait { delay_ms: u32 },
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityIndicator {
    Connected,
    Reconnecting,
    Degraded,
    Offline,
}

/// Reconnect state machine for the one logical push channel. Sans-io: the
/// driver owns the socket (a fresh one per dial) and reports observations;
/// this supervisor owns the lifecycle and hands back directives.
#[derive(Debug, Clone)]
pub struct ChannelSupervisor {
    policy: ReconnectPolicy,
    state: ChannelState,
    consecutive_failures: u16,
    counters: TransportCounters,
    outbound: Vec<String>,
    last_frame_at: Option<MonotonicTimeNs>,
    last_heartbeat_at: Option<MonotonicTimeNs>,
}

impl ChannelSupervisor {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ChannelState::ClosedClean,
            consecutive_failures: 0,
            counters: TransportCounters::default(),
            outbound: Vec::new(),
            last_frame_at: None,
            last_heartbeat_at: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn counters(&self) -> TransportCounters {
        self.counters
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    pub fn last_frame_at(&self) -> Option<MonotonicTimeNs> {
        self.last_frame_at
    }

    pub fn last_heartbeat_at(&self) -> Option<MonotonicTimeNs> {
        self.last_heartbeat_at
    }

    /// Begin connecting. Idempotent: a channel that is already connecting or
    /// open ignores the call, and a torn-down channel stays down.
    pub fn open(&mut self) -> Option<ChannelDirective> {
        match self.state {
            ChannelState::Connecting | ChannelState::Open | ChannelState::TornDown => None,
            ChannelState::ClosedClean | ChannelState::ClosedError => {
                self.state = ChannelState::Connecting;
                self.counters.dial_attempts_total += 1;
                Some(ChannelDirective::Dial)
            }
        }
    }

    pub fn on_dial_succeeded(&mut self, _now: MonotonicTimeNs) {
        if self.state == ChannelState::TornDown {
            return;
        }
        self.state = ChannelState::Open;
        self.consecutive_failures = 0;
        self.counters.dials_succeeded_total += 1;
    }

    /// A dial that never reached Open. Schedules the next attempt with the
    /// backoff that matches the failure streak.
    pub fn on_dial_failed(&mut self) -> ChannelDirective {
        self.counters.dials_failed_total += 1;
        self.outbound.clear();
        if self.state == ChannelState::TornDown {
            return ChannelDirective::Stop;
        }
        self.state = ChannelState::ClosedError;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        ChannelDirective::Wait {
            delay_ms: self.policy.delay_ms_for_failure(self.consecutive_failures),
        }
    }

    /// An open connection went away. A clean close still reconnects: only an
    /// explicit `close()` by the owner is permanent.
    pub fn on_remote_closed(&mut self, clean: bool) -> ChannelDirective {
        self.counters.remote_closes_total += 1;
        self.outbound.clear();
        if self.state == ChannelState::TornDown {
            return ChannelDirective::Stop;
        }
        self.state = if clean {
            ChannelState::ClosedClean
        } else {
            ChannelState::ClosedError
        };
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        ChannelDirective::Wait {
            delay_ms: self.policy.delay_ms_for_failure(self.consecutive_failures),
        }
    }

    /// The reconnect delay elapsed; dial again on a fresh connection.
    pub fn on_wait_elapsed(&mut self) -> ChannelDirective {
        if self.state == ChannelState::TornDown {
            return ChannelDirective::Stop;
        }
        self.state = ChannelState::Connecting;
        self.counters.dial_attempts_total += 1;
        ChannelDirective::Dial
    }

    pub fn on_frame(&mut self, now: MonotonicTimeNs) {
        self.counters.frames_seen_total += 1;
        self.last_frame_at = Some(now);
    }

    pub fn on_heartbeat(&mut self, now: MonotonicTimeNs) {
        self.last_heartbeat_at = Some(now);
    }

    /// Permanent teardown. Disables auto-reconnect for this instance.
    pub fn close(&mut self) {
        self.outbound.clear();
        self.state = ChannelState::TornDown;
    }

    pub fn send_allowed(&self) -> bool {
        self.state == ChannelState::Open
    }

    /// Queue an outbound frame on the live connection's outbox. A send while
    /// the channel is not Open is dropped and counted, never an error, and
    /// pending frames do not survive a disconnect: delivery across a
    /// reconnect is the caller's concern.
    pub fn send(&mut self, frame: impl Into<String>) -> bool {
        if self.state != ChannelState::Open {
            self.counters.sends_dropped_not_open_total += 1;
            return false;
        }
        self.counters.sends_accepted_total += 1;
        self.outbound.push(frame.into());
        true
    }

    /// Frames accepted since the last drain, for the driver to write.
    pub fn take_outbound(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbound)
    }

    pub fn connectivity(&self) -> ConnectivityIndicator {
        match self.state {
            ChannelState::Open => ConnectivityIndicator::Connected,
            ChannelState::TornDown => ConnectivityIndicator::Offline,
            ChannelState::Connecting
            | ChannelState::ClosedClean
            | ChannelState::ClosedError => {
                if self.consecutive_failures >= self.policy.degraded_after_failures {
                    ConnectivityIndicator::Degraded
                } else {
                    ConnectivityIndicator::Reconnecting
                }
            }
        }
    }
}

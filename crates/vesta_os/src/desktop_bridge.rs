#![forbid(unsafe_code)]

use vesta_engines::frame::{self, reason_codes as frame_reason_codes};
use vesta_engines::role_authority::RoleAuthorityRuntime;
use vesta_kernel_contracts::actor::{ActorId, ActorRef};
use vesta_kernel_contracts::audit::ReconciledAuditState;
use vesta_kernel_contracts::bridge::{BridgeRefuse, BridgeRequest, BridgeResponse};
use vesta_kernel_contracts::event::{EventCategory, InboundEvent};
use vesta_kernel_contracts::role::Capability;
use vesta_kernel_contracts::status::DaemonStatus;
use vesta_kernel_contracts::{ChannelState, MonotonicTimeNs};

use crate::audit_reconciler::{
    AuditAckOutcome, AuditAckSenderRuntime, AuditPollOutcome, AuditReconcilerConfig,
    AuditReconcilerRuntime, AuditSnapshotFetcherRuntime,
};
use crate::command_bridge::CommandBridgeRuntime;
use crate::event_router::{
    AuditHandler, EventRouter, HeartbeatHandler, PermissionHandler, RouterCounters, StatusHandler,
};
use crate::transport::{
    ChannelDirective, ChannelSupervisor, ConnectivityIndicator, ReconnectPolicy, TransportCounters,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FacadeCounters {
    pub frames_total: u64,
    pub frames_classified_total: u64,
    pub frames_discarded_malformed_total: u64,
    pub frames_discarded_type_missing_total: u64,
    pub frames_discarded_type_unknown_total: u64,
    pub frames_discarded_payload_invalid_total: u64,
    pub gated_denials_total: u64,
    pub dispatches_total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesktopBridgeConfig {
    pub reconnect: ReconnectPolicy,
    pub audit: AuditReconcilerConfig,
}

impl DesktopBridgeConfig {
    pub fn mvp_v1() -> Self {
        Self {
            reconnect: ReconnectPolicy::mvp_v1(),
            audit: AuditReconcilerConfig::mvp_v1(),
        }
    }

    pub fn from_env() -> Self {
        Self {
            reconnect: ReconnectPolicy::from_env(),
            audit: AuditReconcilerConfig::from_env(),
        }
    }
}

/// The single entry point the rendering layer depends on. Owns the channel
/// supervisor, the router, the audit reconciler, the role authority and the
/// command bridge; the rendering layer never touches any of them directly.
pub struct DesktopBridgeRuntime {
    supervisor: ChannelSupervisor,
    router: EventRouter,
    reconciler: AuditReconcilerRuntime,
    authority: RoleAuthorityRuntime,
    commands: CommandBridgeRuntime,
    session_actor: Option<ActorRef>,
    last_status: Option<DaemonStatus>,
    counters: FacadeCounters,
}

impl DesktopBridgeRuntime {
    pub fn new(
        config: DesktopBridgeConfig,
        fetcher: AuditSnapshotFetcherRuntime,
        acker: AuditAckSenderRuntime,
        commands: CommandBridgeRuntime,
    ) -> Self {
        Self {
            supervisor: ChannelSupervisor::new(config.reconnect),
            router: EventRouter::new(),
            reconciler: AuditReconcilerRuntime::new(config.audit, fetcher, acker),
            authority: RoleAuthorityRuntime::mvp_v1(),
            commands,
            session_actor: None,
            last_status: None,
            counters: FacadeCounters::default(),
        }
    }

    /// Probe the environment once: a configured daemon endpoint selects the
    /// native bridge and HTTP audit plumbing, otherwise everything runs
    /// against in-process substitutes with identical contracts.
    pub fn from_env(config: DesktopBridgeConfig) -> Self {
        Self::new(
            config,
            AuditSnapshotFetcherRuntime::from_env_or_loopback(),
            AuditAckSenderRuntime::from_env_or_loopback(),
            CommandBridgeRuntime::from_env_or_simulated(),
        )
    }

    /// The session layer owns the actor; the bridge only mirrors the current
    /// one for polling identity and command gating.
    pub fn set_session_actor(&mut self, actor: Option<ActorRef>) {
        self.session_actor = actor;
    }

    pub fn session_actor(&self) -> Option<&ActorRef> {
        self.session_actor.as_ref()
    }

    pub fn open(&mut self) -> Option<ChannelDirective> {
        self.supervisor.open()
    }

    pub fn on_dial_succeeded(&mut self, now: MonotonicTimeNs) {
        self.supervisor.on_dial_succeeded(now);
    }

    pub fn on_dial_failed(&mut self) -> ChannelDirective {
        self.supervisor.on_dial_failed()
    }

    pub fn on_remote_closed(&mut self, clean: bool) -> ChannelDirective {
        self.supervisor.on_remote_closed(clean)
    }

    pub fn on_wait_elapsed(&mut self) -> ChannelDirective {
        self.supervisor.on_wait_elapsed()
    }

    pub fn close(&mut self) {
        self.supervisor.close();
    }

    pub fn channel_state(&self) -> ChannelState {
        self.supervisor.state()
    }

    pub fn connectivity(&self) -> ConnectivityIndicator {
        self.supervisor.connectivity()
    }

    pub fn send_allowed(&self) -> bool {
        self.supervisor.send_allowed()
    }

    /// Outbound send primitive. Accepted only while the channel is Open;
    /// anything else is dropped and counted. Callers that need delivery
    /// across a reconnect retry at their own layer.
    pub fn send(&mut self, frame: impl Into<String>) -> bool {
        self.supervisor.send(frame)
    }

    pub fn take_outbound(&mut self) -> Vec<String> {
        self.supervisor.take_outbound()
    }

    pub fn on_permission(&mut self, handler: PermissionHandler) {
        self.router.on_permission(handler);
    }

    pub fn on_audit(&mut self, handler: AuditHandler) {
        self.router.on_audit(handler);
    }

    pub fn on_heartbeat(&mut self, handler: HeartbeatHandler) {
        self.router.on_heartbeat(handler);
    }

    pub fn on_status(&mut self, handler: StatusHandler) {
        self.router.on_status(handler);
    }

    /// One raw inbound frame: classify, update channel health, feed the
    /// reconciler, fan out. Returns the category for delivered frames and
    /// `None` for discards; either way nothing here is fatal.
    pub fn handle_frame(&mut self, now: MonotonicTimeNs, raw: &str) -> Option<EventCategory> {
        self.counters.frames_total += 1;
        let event = match frame::classify_frame(raw) {
            Ok(event) => event,
            Err(discard) => {
                if discard.reason_code == frame_reason_codes::FRAME_DISCARD_MALFORMED_JSON {
                    self.counters.frames_discarded_malformed_total += 1;
                } else if discard.reason_code == frame_reason_codes::FRAME_DISCARD_TYPE_MISSING {
                    self.counters.frames_discarded_type_missing_total += 1;
                } else if discard.reason_code == frame_reason_codes::FRAME_DISCARD_TYPE_UNKNOWN {
                    self.counters.frames_discarded_type_unknown_total += 1;
                } else {
                    self.counters.frames_discarded_payload_invalid_total += 1;
                }
                return None;
            }
        };
        self.counters.frames_classified_total += 1;
        self.supervisor.on_frame(now);
        match &event {
            InboundEvent::Heartbeat(_) => self.supervisor.on_heartbeat(now),
            InboundEvent::Audit(audit) => {
                self.reconciler.on_push(audit.entry.clone());
            }
            InboundEvent::Status(status) => {
                self.last_status = Some(status.status.clone());
            }
            InboundEvent::Permission(_) => {}
        }
        let metrics = self.router.dispatch(&event);
        Some(metrics.category)
    }

    /// Periodic work: the audit snapshot poll, gated on its own interval.
    /// Polling needs a session identity; detached ticks are a no-op.
    pub fn tick(&mut self, now: MonotonicTimeNs) -> Option<AuditPollOutcome> {
        let actor_id = self.session_actor.as_ref()?.actor_id.clone();
        self.reconciler.tick(now, &actor_id)
    }

    pub fn refresh_audit(&mut self, now: MonotonicTimeNs) -> Option<AuditPollOutcome> {
        let actor_id = self.session_actor.as_ref()?.actor_id.clone();
        Some(self.reconciler.refresh(now, &actor_id))
    }

    pub fn acknowledge_audit(&mut self) -> Option<AuditAckOutcome> {
        let actor_id = self.session_actor.as_ref()?.actor_id.clone();
        Some(self.reconciler.acknowledge(&actor_id))
    }

    pub fn audit_state(&self) -> &ReconciledAuditState {
        self.reconciler.state()
    }

    pub fn last_status(&self) -> Option<&DaemonStatus> {
        self.last_status.as_ref()
    }

    /// The authority runs before anything leaves the process: a denied actor
    /// gets a refusal here even on a direct, scripted call, and the daemon
    /// is still expected to re-check on its side.
    pub fn dispatch(
        &mut self,
        actor: Option<&ActorRef>,
        req: &BridgeRequest,
        now: MonotonicTimeNs,
    ) -> BridgeResponse {
        self.counters.dispatches_total += 1;
        if let Some(capability) = req.required_capability() {
            let decision = self.authority.decide(actor, capability);
            if !decision.allowed {
                self.counters.gated_denials_total += 1;
                return BridgeResponse::Refuse(BridgeRefuse {
                    reason_code: decision.reason_code,
                    message: format!(
                        "not permitted: {} requires role {} or above",
                        capability.as_wire_str(),
                        decision
                            .min_role
                            .map(|r| r.as_wire_str())
                            .unwrap_or("undeclared")
                    ),
                });
            }
        }
        self.commands.run(actor, req, now)
    }

    pub fn is_allowed(&self, actor: Option<&ActorRef>, capability: Capability) -> bool {
        self.authority.is_allowed(actor, capability)
    }

    pub fn poll_actor_id(&self) -> Option<&ActorId> {
        self.session_actor.as_ref().map(|a| &a.actor_id)
    }

    pub fn counters(&self) -> FacadeCounters {
        self.counters
    }

    pub fn transport_counters(&self) -> TransportCounters {
        self.supervisor.counters()
    }

    pub fn router_counters(&self) -> RouterCounters {
        self.router.counters()
    }

    pub fn audit_counters(&self) -> crate::audit_reconciler::AuditReconcilerCounters {
        self.reconciler.counters()
    }

    pub fn is_native_bridge(&self) -> bool {
        self.commands.is_native()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use vesta_engines::role_authority::reason_codes as role_reason_codes;
    use vesta_kernel_contracts::audit::{AuditEntry, AuditEntryId, AuditOutcome};
    use vesta_kernel_contracts::role::Role;

    fn detached_bridge() -> DesktopBridgeRuntime {
        DesktopBridgeRuntime::new(
            DesktopBridgeConfig::mvp_v1(),
            AuditSnapshotFetcherRuntime::Loopback(Vec::new()),
            AuditAckSenderRuntime::LoopbackAck,
            CommandBridgeRuntime::detached(),
        )
    }

    fn actor(id: &str, role: Role) -> ActorRef {
        ActorRef::v1(
            vesta_kernel_contracts::actor::ActorId::new(id).unwrap(),
            id.to_string(),
            role,
            None,
        )
        .unwrap()
    }

    fn snapshot_entry(id: &str, ts_ns: u64) -> AuditEntry {
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

    #[test]
    fn at_desktop_bridge_01_audit_frame_reaches_reconciler_and_handlers_once() {
        let mut bridge = detached_bridge();
        let delivered = Arc::new(AtomicU32::new(0));
        let d = delivered.clone();
        bridge.on_audit(Box::new(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let raw = r#"{"type":"audit","entry":{"id":"a1","ts_ns":200,"actor":"bob","action":"deleteUser","target":"carol","result":"blocked"}}"#;
        let category = bridge.handle_frame(MonotonicTimeNs(1), raw);
        assert_eq!(category, Some(EventCategory::Audit));
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.audit_state().entries.len(), 1);
        assert!(bridge.audit_state().has_unseen);

        // A reconnect replaying the same event must not duplicate the row.
        bridge.handle_frame(MonotonicTimeNs(2), raw);
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
        assert_eq!(bridge.audit_state().entries.len(), 1);
    }

    #[test]
    fn at_desktop_bridge_02_unknown_frame_invokes_no_handler() {
        let mut bridge = detached_bridge();
        let delivered = Arc::new(AtomicU32::new(0));
        let d = delivered.clone();
        bridge.on_audit(Box::new(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        assert_eq!(
            bridge.handle_frame(MonotonicTimeNs(1), r#"{"type":"telemetry","x":1}"#),
            None
        );
        assert_eq!(bridge.handle_frame(MonotonicTimeNs(2), "{broken"), None);
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        let counters = bridge.counters();
        assert_eq!(counters.frames_discarded_type_unknown_total, 1);
        assert_eq!(counters.frames_discarded_malformed_total, 1);
        assert_eq!(counters.frames_classified_total, 0);
    }

    #[test]
    fn at_desktop_bridge_03_dispatch_gates_before_the_bridge_runs() {
        let mut bridge = detached_bridge();
        let kid = actor("jonas", Role::Kid);
        let req = BridgeRequest::InviteUser {
            family_name: "ada".to_string(),
            email: "ada@example.com".to_string(),
            role: Role::Kid,
        };

        match bridge.dispatch(Some(&kid), &req, MonotonicTimeNs(1)) {
            BridgeResponse::Refuse(refuse) => assert_eq!(
                refuse.reason_code,
                role_reason_codes::ROLE_AUTHORITY_DENY_MIN_ROLE
            ),
            other => panic!("expected Refuse, got {other:?}"),
        }
        // The denied call never reached the simulated bridge.
        match &bridge.commands {
            CommandBridgeRuntime::Simulated(state) => assert_eq!(state.invites_issued(), 0),
            _ => panic!("expected simulated bridge"),
        }
        assert_eq!(bridge.counters().gated_denials_total, 1);

        let admin = actor("marta", Role::Admin);
        match bridge.dispatch(Some(&admin), &req, MonotonicTimeNs(2)) {
            BridgeResponse::InviteCreated { .. } => {}
            other => panic!("expected InviteCreated, got {other:?}"),
        }
    }

    #[test]
    fn at_desktop_bridge_04_dispatch_without_actor_fails_closed() {
        let mut bridge = detached_bridge();
        match bridge.dispatch(None, &BridgeRequest::ListDocs, MonotonicTimeNs(1)) {
            BridgeResponse::Refuse(refuse) => assert_eq!(
                refuse.reason_code,
                role_reason_codes::ROLE_AUTHORITY_DENY_NO_ACTOR
            ),
            other => panic!("expected Refuse, got {other:?}"),
        }
        // Ungated status still answers.
        assert!(!bridge
            .dispatch(None, &BridgeRequest::Status, MonotonicTimeNs(2))
            .is_refusal());
    }

    #[test]
    fn at_desktop_bridge_05_heartbeat_and_status_update_channel_view() {
        let mut bridge = detached_bridge();
        bridge.open();
        bridge.on_dial_succeeded(MonotonicTimeNs(1));

        bridge.handle_frame(MonotonicTimeNs(2), r#"{"type":"heartbeat","seq":7}"#);
        let raw = r#"{"type":"status","status":{"online":true,"project":"kitchen","voice":"amber","listening":true,"speaking":false,"hotword":false,"vu_level":0.5,"lat_stt_ms":100,"lat_llm_ms":250,"lat_tts_ms":80,"lat_total_ms":430}}"#;
        bridge.handle_frame(MonotonicTimeNs(3), raw);

        assert_eq!(bridge.last_status().map(|s| s.project.as_str()), Some("kitchen"));
        assert_eq!(bridge.transport_counters().frames_seen_total, 2);
        assert_eq!(bridge.connectivity(), ConnectivityIndicator::Connected);

        assert!(bridge.send(r#"{"type":"hello"}"#));
        assert_eq!(bridge.take_outbound().len(), 1);
        bridge.close();
        assert!(!bridge.send(r#"{"type":"hello"}"#));
    }

    #[test]
    fn at_desktop_bridge_06_tick_polls_only_with_a_session() {
        let mut bridge = DesktopBridgeRuntime::new(
            DesktopBridgeConfig::mvp_v1(),
            AuditSnapshotFetcherRuntime::Loopback(vec![snapshot_entry("z0", 100)]),
            AuditAckSenderRuntime::LoopbackAck,
            CommandBridgeRuntime::detached(),
        );
        assert!(bridge.tick(MonotonicTimeNs(1)).is_none());

        bridge.set_session_actor(Some(actor("marta", Role::Superadmin)));
        assert_eq!(
            bridge.tick(MonotonicTimeNs(2)),
            Some(AuditPollOutcome::Applied { entry_count: 1 })
        );
        assert_eq!(bridge.audit_state().entries.len(), 1);
    }

    #[test]
    fn at_desktop_bridge_07_snapshot_then_push_example_scenario() {
        let mut bridge = DesktopBridgeRuntime::new(
            DesktopBridgeConfig::mvp_v1(),
            AuditSnapshotFetcherRuntime::Loopback(vec![snapshot_entry("z0", 100)]),
            AuditAckSenderRuntime::LoopbackAck,
            CommandBridgeRuntime::detached(),
        );
        bridge.set_session_actor(Some(actor("marta", Role::Superadmin)));
        bridge.refresh_audit(MonotonicTimeNs(1));

        let raw = r#"{"type":"audit","entry":{"id":"a1","ts_ns":200,"actor":"bob","action":"deleteUser","target":"carol","result":"blocked"}}"#;
        bridge.handle_frame(MonotonicTimeNs(2), raw);

        let state = bridge.audit_state();
        let ids: Vec<&str> = state.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "z0"]);
        assert!(state.has_unseen);

        let outcome = bridge.acknowledge_audit().unwrap();
        assert!(outcome.cleared);
        assert!(!bridge.audit_state().has_unseen);
    }
}

#![forbid(unsafe_code)]

use vesta_kernel_contracts::event::{
    AuditEvent, EventCategory, HeartbeatEvent, InboundEvent, PermissionEvent, StatusEvent,
};

/// A handler refused a frame. The fault is isolated to that handler; the
/// remaining handlers for the frame still run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFault {
    pub message: String,
}

impl HandlerFault {
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

pub type PermissionHandler = Box<dyn FnMut(&PermissionEvent) -> Result<(), HandlerFault> + Send>;
pub type AuditHandler = Box<dyn FnMut(&AuditEvent) -> Result<(), HandlerFault> + Send>;
pub type HeartbeatHandler = Box<dyn FnMut(&HeartbeatEvent) -> Result<(), HandlerFault> + Send>;
pub type StatusHandler = Box<dyn FnMut(&StatusEvent) -> Result<(), HandlerFault> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouterCounters {
    pub frames_dispatched_total: u64,
    pub delivered_permission_total: u64,
    pub delivered_audit_total: u64,
    pub delivered_heartbeat_total: u64,
    pub delivered_status_total: u64,
    pub handler_faults_total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterPassMetrics {
    pub category: EventCategory,
    pub handlers_invoked: u16,
    pub handler_faults: u16,
}

/// Stateless fan-out of classified frames. Handlers per category run in
/// registration order, each at most once per frame.
#[derive(Default)]
pub struct EventRouter {
    permission: Vec<PermissionHandler>,
    audit: Vec<AuditHandler>,
    heartbeat: Vec<HeartbeatHandler>,
    status: Vec<StatusHandler>,
    counters: RouterCounters,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> RouterCounters {
        self.counters
    }

    pub fn on_permission(&mut self, handler: PermissionHandler) {
        self.permission.push(handler);
    }

    pub fn on_audit(&mut self, handler: AuditHandler) {
        self.audit.push(handler);
    }

    pub fn on_heartbeat(&mut self, handler: HeartbeatHandler) {
        self.heartbeat.push(handler);
    }

    pub fn on_status(&mut self, handler: StatusHandler) {
        self.status.push(handler);
    }

    pub fn dispatch(&mut self, event: &InboundEvent) -> RouterPassMetrics {
        self.counters.frames_dispatched_total += 1;
        let mut invoked: u16 = 0;
        let mut faults: u16 = 0;
        match event {
            InboundEvent::Permission(payload) => {
                for handler in self.permission.iter_mut() {
                    invoked = invoked.saturating_add(1);
                    if handler(payload).is_err() {
                        faults = faults.saturating_add(1);
                    }
                }
                self.counters.delivered_permission_total += 1;
            }
            InboundEvent::Audit(payload) => {
                for handler in self.audit.iter_mut() {
                    invoked = invoked.saturating_add(1);
                    if handler(payload).is_err() {
                        faults = faults.saturating_add(1);
                    }
                }
                self.counters.delivered_audit_total += 1;
            }
            InboundEvent::Heartbeat(payload) => {
                for handler in self.heartbeat.iter_mut() {
                    invoked = invoked.saturating_add(1);
                    if handler(payload).is_err() {
                        faults = faults.saturating_add(1);
                    }
                }
                self.counters.delivered_heartbeat_total += 1;
            }
            InboundEvent::Status(payload) => {
                for handler in self.status.iter_mut() {
                    invoked = invoked.saturating_add(1);
                    if handler(payload).is_err() {
                        faults = faults.saturating_add(1);
                    }
                }
                self.counters.delivered_status_total += 1;
            }
        }
        self.counters.handler_faults_total += u64::from(faults);
        RouterPassMetrics {
            category: event.category(),
            handlers_invoked: invoked,
            handler_faults: faults,
        }
    }
}

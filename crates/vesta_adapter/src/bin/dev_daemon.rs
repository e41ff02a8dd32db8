#![forbid(unsafe_code)]

use std::{
    env,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tokio::sync::broadcast;

use vesta_adapter::now_ns;
use vesta_kernel_contracts::audit::{
    AuditAckResponse, AuditEntry, AuditEntryId, AuditOutcome, AuditSnapshotResponse,
};
use vesta_kernel_contracts::event::{AuditEvent, HeartbeatEvent, InboundEvent, StatusEvent};
use vesta_kernel_contracts::status::DaemonStatus;
use vesta_os::daemon_endpoint::ACTOR_HEADER;

/// Stand-in daemon for detached development: pushes heartbeat and status
/// frames on `/ws`, serves the audit REST surface, and lets an operator
/// inject blocked-attempt events to exercise the push path.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bind = env::var("VESTA_DEV_BIND").unwrap_or_else(|_| "127.0.0.1:11500".to_string());
    let addr: SocketAddr = bind.parse()?;

    let (frames_tx, _) = broadcast::channel::<String>(64);
    let state = DevDaemonState {
        inner: Arc::new(Mutex::new(DevDaemonInner {
            entries: Vec::new(),
            next_entry_seq: 1,
            heartbeat_seq: 0,
            status: DaemonStatus {
                online: true,
                project: "family_room".to_string(),
                voice: "amber".to_string(),
                listening: false,
                speaking: false,
                hotword: true,
                vu_level: 0.0,
                lat_stt_ms: 0,
                lat_llm_ms: 0,
                lat_tts_ms: 0,
                lat_total_ms: 0,
            },
        })),
        frames: frames_tx,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(push_channel))
        .route("/audit/superadmin", get(audit_snapshot))
        .route("/audit/superadmin/ack", post(audit_ack))
        .route("/dev/audit/attempt", post(inject_audit_attempt))
        .with_state(state);

    println!("vesta_dev_daemon listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Clone)]
struct DevDaemonState {
    inner: Arc<Mutex<DevDaemonInner>>,
    frames: broadcast::Sender<String>,
}

struct DevDaemonInner {
    entries: Vec<AuditEntry>,
    next_entry_seq: u64,
    heartbeat_seq: u64,
    status: DaemonStatus,
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn push_channel(
    ws: WebSocketUpgrade,
    State(state): State<DevDaemonState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_frames(socket, state))
}

async fn stream_frames(mut socket: WebSocket, state: DevDaemonState) {
    let mut pushed = state.frames.subscribe();
    let mut ticker = tokio::time::interval(Duration::from_millis(2_000));
    let mut ticks: u64 = 0;
    loop {
        let frame = tokio::select! {
            _ = ticker.tick() => {
                ticks += 1;
                let Ok(mut inner) = state.inner.lock() else { return };
                if ticks % 3 == 0 {
                    inner.heartbeat_seq += 1;
                    encode_frame(&InboundEvent::Heartbeat(HeartbeatEvent {
                        seq: Some(inner.heartbeat_seq),
                    }))
                } else {
                    encode_frame(&InboundEvent::Status(StatusEvent {
                        status: inner.status.clone(),
                    }))
                }
            }
            injected = pushed.recv() => match injected {
                Ok(frame) => Some(frame),
                // Lagged receiver: skip, the poll path reconciles.
                Err(_) => None,
            },
            inbound = socket.recv() => match inbound {
                // Push-only endpoint: inbound frames are drained so a
                // closing client is noticed without waiting for a send.
                Some(Ok(_)) => None,
                _ => return,
            },
        };
        if let Some(frame) = frame {
            if socket.send(Message::Text(frame)).await.is_err() {
                return;
            }
        }
    }
}

fn encode_frame(event: &InboundEvent) -> Option<String> {
    serde_json::to_string(event).ok()
}

#[derive(serde::Deserialize)]
struct AuditSnapshotQuery {
    limit: Option<u16>,
}

async fn audit_snapshot(
    State(state): State<DevDaemonState>,
    headers: HeaderMap,
    Query(query): Query<AuditSnapshotQuery>,
) -> (StatusCode, Json<AuditSnapshotResponse>) {
    if headers.get(ACTOR_HEADER).is_none() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(AuditSnapshotResponse {
                ok: false,
                entries: Vec::new(),
            }),
        );
    }
    let Ok(inner) = state.inner.lock() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AuditSnapshotResponse {
                ok: false,
                entries: Vec::new(),
            }),
        );
    };
    let limit = query.limit.unwrap_or(50).clamp(1, 500) as usize;
    let mut entries = inner.entries.clone();
    entries.sort_by(|a, b| b.ts_ns.cmp(&a.ts_ns));
    entries.truncate(limit);
    (
        StatusCode::OK,
        Json(AuditSnapshotResponse { ok: true, entries }),
    )
}

async fn audit_ack(
    State(_state): State<DevDaemonState>,
    headers: HeaderMap,
) -> (StatusCode, Json<AuditAckResponse>) {
    if headers.get(ACTOR_HEADER).is_none() {
        return (StatusCode::UNAUTHORIZED, Json(AuditAckResponse { ok: false }));
    }
    (StatusCode::OK, Json(AuditAckResponse { ok: true }))
}

#[derive(serde::Deserialize)]
struct AuditAttemptRequest {
    actor: String,
    action: String,
    target: String,
    note: Option<String>,
}

#[derive(serde::Serialize)]
struct AuditAttemptResponse {
    ok: bool,
    reason: Option<String>,
}

/// Dev-only: record a blocked attempt and broadcast it as a push frame, the
/// way the real daemon alerts the superadmin panel.
async fn inject_audit_attempt(
    State(state): State<DevDaemonState>,
    Json(request): Json<AuditAttemptRequest>,
) -> (StatusCode, Json<AuditAttemptResponse>) {
    let entry = {
        let Ok(mut inner) = state.inner.lock() else {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AuditAttemptResponse {
                    ok: false,
                    reason: Some("daemon state lock poisoned".to_string()),
                }),
            );
        };
        let seq = inner.next_entry_seq;
        let id = match AuditEntryId::new(format!("audit_{seq:06}")) {
            Ok(id) => id,
            Err(_) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(AuditAttemptResponse {
                        ok: false,
                        reason: Some("failed to mint audit entry id".to_string()),
                    }),
                )
            }
        };
        let entry = match AuditEntry::v1(
            id,
            now_ns().0,
            request.actor,
            request.action,
            request.target,
            request.note,
            AuditOutcome::Blocked,
        ) {
            Ok(entry) => entry,
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(AuditAttemptResponse {
                        ok: false,
                        reason: Some("attempt fields failed validation".to_string()),
                    }),
                )
            }
        };
        inner.next_entry_seq += 1;
        inner.entries.push(entry.clone());
        entry
    };
    if let Some(frame) = encode_frame(&InboundEvent::Audit(AuditEvent { entry })) {
        // No subscribers is fine; the snapshot poll will pick it up.
        let _ = state.frames.send(frame);
    }
    (
        StatusCode::OK,
        Json(AuditAttemptResponse {
            ok: true,
            reason: None,
        }),
    )
}

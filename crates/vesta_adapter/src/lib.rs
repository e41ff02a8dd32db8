#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use vesta_kernel_contracts::MonotonicTimeNs;
use vesta_os::desktop_bridge::DesktopBridgeRuntime;
use vesta_os::transport::ChannelDirective;

/// Cadence of the driver's background tick while a connection is up. The
/// audit poll gates itself on its own interval, so this only bounds latency.
pub const DRIVER_TICK_MS: u64 = 1_000;

pub fn now_ns() -> MonotonicTimeNs {
    let ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    MonotonicTimeNs(ns)
}

fn lock(
    bridge: &Arc<Mutex<DesktopBridgeRuntime>>,
) -> Result<MutexGuard<'_, DesktopBridgeRuntime>, String> {
    bridge.lock().map_err(|_| "bridge lock poisoned".to_string())
}

/// Drive the push channel until the facade tears it down. Each dial creates
/// a fresh socket; the facade's supervisor owns the lifecycle and this loop
/// just obeys its directives.
pub async fn run_channel_driver(
    bridge: Arc<Mutex<DesktopBridgeRuntime>>,
    push_url: String,
) -> Result<(), String> {
    let mut directive = match lock(&bridge)?.open() {
        Some(directive) => directive,
        None => return Ok(()),
    };
    loop {
        match directive {
            ChannelDirective::Stop => return Ok(()),
            ChannelDirective::Wait { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(u64::from(delay_ms))).await;
                directive = lock(&bridge)?.on_wait_elapsed();
            }
            ChannelDirective::Dial => match connect_async(push_url.as_str()).await {
                Err(_) => {
                    directive = lock(&bridge)?.on_dial_failed();
                }
                Ok((stream, _response)) => {
                    lock(&bridge)?.on_dial_succeeded(now_ns());
                    let clean = pump_frames(&bridge, stream).await?;
                    directive = lock(&bridge)?.on_remote_closed(clean);
                }
            },
        }
    }
}

/// Read frames off one live connection until it goes away. Returns whether
/// the close was clean. Lock scopes are kept inside the select arms so no
/// guard is held across an await.
async fn pump_frames(
    bridge: &Arc<Mutex<DesktopBridgeRuntime>>,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
) -> Result<bool, String> {
    let (mut write, mut read) = stream.split();
    let mut poll = tokio::time::interval(Duration::from_millis(DRIVER_TICK_MS));
    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        lock(bridge)?.handle_frame(now_ns(), &text);
                        if !flush_outbound(bridge, &mut write).await? {
                            return Ok(false);
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if write.send(Message::Pong(payload)).await.is_err() {
                            return Ok(false);
                        }
                    }
                    Some(Ok(Message::Close(_))) => return Ok(true),
                    Some(Ok(_)) => {}
                    Some(Err(_)) => return Ok(false),
                    None => return Ok(true),
                }
            }
            _ = poll.tick() => {
                let _ = lock(bridge)?.tick(now_ns());
                if !flush_outbound(bridge, &mut write).await? {
                    return Ok(false);
                }
            }
        }
    }
}

/// Write every frame the facade accepted since the last drain. A write
/// failure means the connection is gone; the supervisor reschedules.
async fn flush_outbound(
    bridge: &Arc<Mutex<DesktopBridgeRuntime>>,
    write: &mut SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
) -> Result<bool, String> {
    let pending = lock(bridge)?.take_outbound();
    for frame in pending {
        if write.send(Message::Text(frame)).await.is_err() {
            return Ok(false);
        }
    }
    Ok(true)
}

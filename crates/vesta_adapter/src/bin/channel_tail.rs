#![forbid(unsafe_code)]

use std::env;
use std::sync::{Arc, Mutex};

use vesta_adapter::{now_ns, run_channel_driver};
use vesta_kernel_contracts::actor::{ActorId, ActorRef};
use vesta_kernel_contracts::role::Role;
use vesta_os::daemon_endpoint::DaemonEndpointConfig;
use vesta_os::desktop_bridge::{DesktopBridgeConfig, DesktopBridgeRuntime};

/// Dials the daemon's push endpoint and prints every classified event with
/// the current connectivity indicator. Kill the daemon mid-run to watch the
/// channel back off and converge again.
#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

async fn run() -> Result<(), String> {
    let endpoint = DaemonEndpointConfig::from_env()
        .unwrap_or_else(|| DaemonEndpointConfig::local_default("http://127.0.0.1:11500"));
    let push_url = endpoint.push_url()?;

    let actor_name = env::var("VESTA_ACTOR").unwrap_or_else(|_| "operator".to_string());
    let role_str = env::var("VESTA_ROLE").unwrap_or_else(|_| "superadmin".to_string());
    let role = Role::from_wire(&role_str)
        .map_err(|_| format!("unknown VESTA_ROLE value: {role_str}"))?;
    let actor_id =
        ActorId::new(actor_name.clone()).map_err(|err| format!("invalid VESTA_ACTOR: {err:?}"))?;
    let actor = ActorRef::v1(actor_id, actor_name, role, None)
        .map_err(|err| format!("invalid actor: {err:?}"))?;

    let mut runtime = DesktopBridgeRuntime::from_env(DesktopBridgeConfig::from_env());
    runtime.set_session_actor(Some(actor));
    runtime.on_audit(Box::new(|event| {
        println!(
            "audit   {} {} -> {} ({:?})",
            event.entry.actor, event.entry.action, event.entry.target, event.entry.result
        );
        Ok(())
    }));
    runtime.on_permission(Box::new(|event| {
        println!("perm    {:?} {}", event.event, event.record);
        Ok(())
    }));
    runtime.on_status(Box::new(|event| {
        println!(
            "status  project={} voice={} listening={}",
            event.status.project, event.status.voice, event.status.listening
        );
        Ok(())
    }));
    runtime.on_heartbeat(Box::new(|event| {
        println!("beat    seq={:?}", event.seq);
        Ok(())
    }));

    let bridge = Arc::new(Mutex::new(runtime));
    println!("vesta_channel_tail dialing {push_url}");

    let driver = run_channel_driver(bridge.clone(), push_url);
    tokio::select! {
        result = driver => result,
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|err| format!("signal handler failed: {err}"))?;
            if let Ok(mut guard) = bridge.lock() {
                guard.close();
                let counters = guard.transport_counters();
                println!(
                    "closing at {:?}: dials={} frames={}",
                    now_ns(),
                    counters.dial_attempts_total,
                    counters.frames_seen_total
                );
            }
            Ok(())
        }
    }
}

#![forbid(unsafe_code)]

use std::env;
use std::io::{self, IsTerminal, Read};
use std::time::{SystemTime, UNIX_EPOCH};

use vesta_engines::secret::derive_pin_digest;
use vesta_kernel_contracts::actor::{ActorId, ActorRef};
use vesta_kernel_contracts::role::Role;
use vesta_kernel_contracts::MonotonicTimeNs;
use vesta_os::desktop_bridge::{DesktopBridgeConfig, DesktopBridgeRuntime};
use vesta_tools::bridge_cli::{command_needs_pin, execute_command, parse_command};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let command = parse_command(&args)?;

    let actor = session_actor_from_env(command_needs_pin(&command))?;
    let mut bridge = DesktopBridgeRuntime::from_env(DesktopBridgeConfig::from_env());
    bridge.set_session_actor(actor.clone());

    let output = execute_command(&mut bridge, actor.as_ref(), &command, now_ns())?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

/// The session layer proper lives in the app shell; the CLI stands in for it
/// with env-supplied identity plus an interactive PIN for gated commands.
fn session_actor_from_env(needs_pin: bool) -> Result<Option<ActorRef>, String> {
    let Ok(name) = env::var("VESTA_ACTOR") else {
        return Ok(None);
    };
    let name = name.trim().to_string();
    if name.is_empty() {
        return Ok(None);
    }
    let role_str = env::var("VESTA_ROLE").unwrap_or_else(|_| "guest".to_string());
    let role = Role::from_wire(role_str.trim())
        .map_err(|_| format!("unknown VESTA_ROLE value: {role_str}"))?;
    let actor_id =
        ActorId::new(name.clone()).map_err(|err| format!("invalid VESTA_ACTOR: {err:?}"))?;

    let pin_digest = if needs_pin {
        let pin = read_pin(&name)?;
        Some(derive_pin_digest(&actor_id, &pin).map_err(|err| format!("invalid PIN: {err:?}"))?)
    } else {
        None
    };

    let actor = ActorRef::v1(actor_id, name, role, pin_digest)
        .map_err(|err| format!("invalid actor: {err:?}"))?;
    Ok(Some(actor))
}

fn read_pin(actor_name: &str) -> Result<String, String> {
    if io::stdin().is_terminal() {
        let prompt = format!("PIN for {actor_name}:");
        let value = rpassword::prompt_password(prompt).map_err(|e| e.to_string())?;
        if value.trim().is_empty() {
            return Err("PIN must not be empty".to_string());
        }
        Ok(value)
    } else {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| e.to_string())?;
        let trimmed = input.trim().to_string();
        if trimmed.is_empty() {
            return Err("PIN must not be empty".to_string());
        }
        Ok(trimmed)
    }
}

fn now_ns() -> MonotonicTimeNs {
    let ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    MonotonicTimeNs(ns)
}

#![forbid(unsafe_code)]

use vesta_kernel_contracts::actor::ActorRef;
use vesta_kernel_contracts::bridge::BridgeRequest;
use vesta_kernel_contracts::role::Role;
use vesta_kernel_contracts::MonotonicTimeNs;
use vesta_os::desktop_bridge::DesktopBridgeRuntime;

pub const USAGE: &str = "usage: vesta <whoami|status|send-text|speak|docs|voices|select-voice|invite|family|audit|ack> [args]";

#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    Whoami,
    Bridge(BridgeRequest),
    Audit,
    Ack,
}

pub fn parse_command(args: &[String]) -> Result<CliCommand, String> {
    let Some(verb) = args.first() else {
        return Err(USAGE.to_string());
    };
    match verb.as_str() {
        "whoami" => Ok(CliCommand::Whoami),
        "status" => Ok(CliCommand::Bridge(BridgeRequest::Status)),
        "send-text" => {
            let text = rest_as_text(args)?;
            Ok(CliCommand::Bridge(BridgeRequest::SendText { text }))
        }
        "speak" => {
            let text = rest_as_text(args)?;
            Ok(CliCommand::Bridge(BridgeRequest::Speak { text }))
        }
        "docs" => Ok(CliCommand::Bridge(BridgeRequest::ListDocs)),
        "voices" => Ok(CliCommand::Bridge(BridgeRequest::ListVoices)),
        "select-voice" => {
            let voice = args
                .get(1)
                .ok_or_else(|| "usage: vesta select-voice <voice>".to_string())?
                .clone();
            Ok(CliCommand::Bridge(BridgeRequest::SelectVoice { voice }))
        }
        "invite" => {
            let family_name = args.get(1).ok_or_else(invite_usage)?.clone();
            let email = args.get(2).ok_or_else(invite_usage)?.clone();
            let role_str = args.get(3).ok_or_else(invite_usage)?;
            let role = Role::from_wire(role_str)
                .map_err(|_| format!("unknown role: {role_str}"))?;
            Ok(CliCommand::Bridge(BridgeRequest::InviteUser {
                family_name,
                email,
                role,
            }))
        }
        "family" => Ok(CliCommand::Bridge(BridgeRequest::ListFamilyMembers)),
        "audit" => Ok(CliCommand::Audit),
        "ack" => Ok(CliCommand::Ack),
        _ => Err(USAGE.to_string()),
    }
}

fn invite_usage() -> String {
    "usage: vesta invite <family_name> <email> <role>".to_string()
}

fn rest_as_text(args: &[String]) -> Result<String, String> {
    let text = args[1..].join(" ");
    if text.trim().is_empty() {
        return Err(format!("usage: vesta {} <text>", args[0]));
    }
    Ok(text)
}

/// Privileged commands carry a PIN digest on the actor; the caller prompts
/// before building the session.
pub fn command_needs_pin(command: &CliCommand) -> bool {
    match command {
        CliCommand::Bridge(req) => req.required_capability().is_some(),
        CliCommand::Whoami | CliCommand::Audit | CliCommand::Ack => false,
    }
}

pub fn execute_command(
    bridge: &mut DesktopBridgeRuntime,
    actor: Option<&ActorRef>,
    command: &CliCommand,
    now: MonotonicTimeNs,
) -> Result<String, String> {
    match command {
        CliCommand::Whoami => {
            let Some(actor) = actor else {
                return Err("no session actor configured".to_string());
            };
            render(&serde_json::json!({
                "actor_id": actor.actor_id.as_str(),
                "display_name": actor.display_name,
                "role": actor.role.as_wire_str(),
            }))
        }
        CliCommand::Bridge(req) => {
            let response = bridge.dispatch(actor, req, now);
            serde_json::to_string_pretty(&response).map_err(|err| err.to_string())
        }
        CliCommand::Audit => {
            bridge
                .refresh_audit(now)
                .ok_or_else(|| "audit view requires a session actor".to_string())?;
            let state = bridge.audit_state();
            render(&serde_json::json!({
                "has_unseen": state.has_unseen,
                "entries": state.entries,
            }))
        }
        CliCommand::Ack => {
            let outcome = bridge
                .acknowledge_audit()
                .ok_or_else(|| "acknowledge requires a session actor".to_string())?;
            render(&serde_json::json!({
                "cleared": outcome.cleared,
                "backend_notified": outcome.backend_notified,
            }))
        }
    }
}

fn render(value: &serde_json::Value) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|err| err.to_string())
}

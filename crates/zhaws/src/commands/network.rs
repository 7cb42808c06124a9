//! Network command handlers.

use serde_json::{Map, Value};
use zhaws_core::Controller;

use crate::cli::{GlobalOpts, NetworkArgs, NetworkCommand};
use crate::error::CliError;
use crate::output;

use super::util;

fn state_detail(state: &Map<String, Value>) -> String {
    if state.is_empty() {
        return "(no application state reported)".into();
    }
    state
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{key}: {s}"),
            other => format!("{key}: {other}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn handle(
    controller: &Controller,
    args: NetworkArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        NetworkCommand::PermitJoin { duration, via } => {
            let granted = controller.permit_joining(duration, via).await?;
            let message = match (granted, via) {
                (0, _) => "Joining closed".to_owned(),
                (secs, Some(router)) => format!("Joining open via {router} for {secs}s"),
                (secs, None) => format!("Joining open for {secs}s"),
            };
            output::status(&message, global.quiet);
            Ok(())
        }

        NetworkCommand::Start => {
            controller.start_network().await?;
            output::status("Network started", global.quiet);
            Ok(())
        }

        NetworkCommand::Stop => {
            controller.stop_network().await?;
            output::status("Network stopped", global.quiet);
            Ok(())
        }

        NetworkCommand::Topology => {
            controller.update_topology().await?;
            output::status("Topology scan requested", global.quiet);
            Ok(())
        }

        NetworkCommand::State => {
            let state = controller.application_state().await?;
            let out = output::render_single(util::format(global), &state, state_detail, |s| {
                s.keys().cloned().collect::<Vec<_>>().join("\n")
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

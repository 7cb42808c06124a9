//! Event streaming: print every gateway event until Ctrl-C or disconnect.

use owo_colors::OwoColorize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use zhaws_api::Event;
use zhaws_core::Controller;

use crate::cli::{EventsArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

/// Identifying fields worth showing on a one-line event summary.
const SUMMARY_KEYS: &[&str] = &["device_ieee", "ieee", "unique_id", "group_id", "endpoint_id", "cluster_id"];

fn summary(fields: &Map<String, Value>) -> String {
    SUMMARY_KEYS
        .iter()
        .filter_map(|key| fields.get(*key).map(|value| (key, value)))
        .map(|(key, value)| match value {
            Value::String(s) => format!("{key}={s}"),
            other => format!("{key}={other}"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_event(event: &Event, format: OutputFormat, color: bool) -> Result<String, CliError> {
    let fields = event
        .to_fields()
        .map_err(|e| CliError::Render(e.to_string()))?;
    match format {
        OutputFormat::Json => output::render_json_compact(&fields),
        OutputFormat::Yaml => Ok(format!("---\n{}", output::render_yaml(&fields)?.trim_end())),
        OutputFormat::Plain => Ok(format!("{} {}", event.kind(), summary(&fields))),
        OutputFormat::Table => {
            let time = chrono::Local::now().format("%H:%M:%S%.3f").to_string();
            let kind = event.kind().to_string();
            let line = if color {
                format!("{} {} {}", time.dimmed(), kind.cyan().bold(), summary(&fields))
            } else {
                format!("{time} {kind} {}", summary(&fields))
            };
            Ok(line)
        }
    }
}

pub async fn handle(
    controller: &Controller,
    args: EventsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.raw_zcl {
        controller.listen_raw_zcl().await?;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = controller.on_any(move |event: &Event| {
        tx.send(event.clone()).ok();
        Ok(())
    });

    let format = util::format(global);
    let color = output::should_color();
    output::status("Streaming events, Ctrl-C to stop", global.quiet);

    let ctrl_c = tokio::signal::ctrl_c();
    let closed = controller.closed();
    tokio::pin!(ctrl_c, closed);

    let result = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),
            ended = &mut closed => break ended.map_err(CliError::from),
            Some(event) = rx.recv() => {
                match render_event(&event, format, color) {
                    Ok(line) => output::print_output(&line, false),
                    Err(e) => tracing::warn!(event = %event.kind(), error = %e, "cannot render event"),
                }
            }
        }
    };

    controller.off(listener);
    result
}

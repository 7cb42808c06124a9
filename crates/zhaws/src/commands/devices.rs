//! Device command handlers.

use std::sync::Arc;

use tabled::Tabled;
use zhaws_core::{Controller, DeviceMirror};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "IEEE")]
    ieee: String,
    #[tabled(rename = "NWK")]
    nwk: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Manufacturer")]
    manufacturer: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Available")]
    available: &'static str,
    #[tabled(rename = "Entities")]
    entities: usize,
}

impl From<&Arc<DeviceMirror>> for DeviceRow {
    fn from(d: &Arc<DeviceMirror>) -> Self {
        Self {
            ieee: d.ieee.to_string(),
            nwk: d.nwk.to_string(),
            name: d.display_name(),
            manufacturer: d.manufacturer.clone().unwrap_or_default(),
            model: d.model.clone().unwrap_or_default(),
            available: util::yes_no(d.available),
            entities: d.entities.len(),
        }
    }
}

fn detail(d: &Arc<DeviceMirror>) -> String {
    let mut lines = vec![
        format!("IEEE:         {}", d.ieee),
        format!("NWK:          {}", d.nwk),
        format!("Name:         {}", d.name.as_deref().unwrap_or("-")),
        format!("Manufacturer: {}", d.manufacturer.as_deref().unwrap_or("-")),
        format!("Model:        {}", d.model.as_deref().unwrap_or("-")),
        format!("Available:    {}", util::yes_no(d.available)),
        format!("On network:   {}", util::yes_no(d.on_network)),
    ];
    if !d.is_initialized() {
        lines.push("Interview:    in progress".into());
    }
    if !d.entities.is_empty() {
        lines.push("Entities:".into());
        for (key, entity) in &d.entities {
            lines.push(format!("  {key:<32} {}", util::state_summary(&entity.state)));
        }
    }
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    controller: &Controller,
    args: DevicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List => {
            let snap = controller.devices_snapshot();
            let out = output::render_list(
                util::format(global),
                &snap,
                |d| DeviceRow::from(d),
                |d| d.ieee.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Get { ieee } => {
            let device = controller.device(&ieee).ok_or_else(|| CliError::NotFound {
                resource_type: "device",
                identifier: ieee.to_string(),
                list_command: "devices list",
            })?;
            let out = output::render_single(util::format(global), &device, detail, |d| {
                d.ieee.to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Remove { ieee } => {
            controller.remove_device(ieee).await?;
            output::status(&format!("Device {ieee} removed"), global.quiet);
            Ok(())
        }

        DevicesCommand::Reconfigure { ieee } => {
            controller.reconfigure_device(ieee).await?;
            output::status(&format!("Device {ieee} reconfigured"), global.quiet);
            Ok(())
        }
    }
}

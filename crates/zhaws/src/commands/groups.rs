//! Group command handlers.

use std::sync::Arc;

use tabled::Tabled;
use zhaws_api::model::GroupInfo;
use zhaws_core::{Controller, GroupMirror};

use crate::cli::{GlobalOpts, GroupsArgs, GroupsCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Members")]
    members: usize,
    #[tabled(rename = "Entities")]
    entities: String,
}

impl From<&Arc<GroupMirror>> for GroupRow {
    fn from(g: &Arc<GroupMirror>) -> Self {
        Self {
            id: format!("{} (0x{:04x})", g.group_id, g.group_id),
            name: g.name.clone(),
            members: g.members.len(),
            entities: g.entities.keys().cloned().collect::<Vec<_>>().join(", "),
        }
    }
}

fn detail(g: &Arc<GroupMirror>) -> String {
    let mut lines = vec![
        format!("ID:      {} (0x{:04x})", g.group_id, g.group_id),
        format!("Name:    {}", g.name),
    ];
    if g.members.is_empty() {
        lines.push("Members: -".into());
    } else {
        lines.push("Members:".into());
        for member in &g.members {
            lines.push(format!("  {} endpoint {}", member.ieee, member.endpoint_id));
        }
    }
    for (unique_id, entity) in &g.entities {
        lines.push(format!(
            "Entity:  {unique_id} ({}) {}",
            entity.platform,
            util::state_summary(&entity.state)
        ));
    }
    lines.join("\n")
}

fn created(g: &GroupInfo) -> String {
    format!("Group {} created with id {}", g.name, g.group_id)
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    controller: &Controller,
    args: GroupsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        GroupsCommand::List => {
            let snap = controller.groups_snapshot();
            let out = output::render_list(
                util::format(global),
                &snap,
                |g| GroupRow::from(g),
                |g| g.group_id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        GroupsCommand::Get { group_id } => {
            let group = controller.group(group_id).ok_or_else(|| CliError::NotFound {
                resource_type: "group",
                identifier: group_id.to_string(),
                list_command: "groups list",
            })?;
            let out = output::render_single(util::format(global), &group, detail, |g| {
                g.group_id.to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        GroupsCommand::Create { name, members, id } => {
            let group = controller.create_group(name, members, id).await?;
            let out = output::render_single(util::format(global), &group, created, |g| {
                g.group_id.to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        GroupsCommand::Remove { group_ids } => {
            let remaining = controller.remove_groups(group_ids.clone()).await?;
            let removed = group_ids
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            output::status(
                &format!("Removed group(s) {removed}; {} remain", remaining.len()),
                global.quiet,
            );
            Ok(())
        }
    }
}

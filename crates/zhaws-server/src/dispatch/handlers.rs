// Default handlers: network, device and group commands forward to the
// gateway; entity commands forward to the resolved entity.

use strum::IntoEnumIterator;

use zhaws_api::command::{DeviceTarget, GroupMembersParams, RemoveGroupsParams};
use zhaws_api::model::Ieee;
use zhaws_api::response::ResponsePayload;
use zhaws_api::{Command, CommandKind};

use super::{CommandDispatcher, HandlerContext, HandlerResult};
use crate::error::OperationError;

/// Unwrap the parameters of the variant a handler was registered for.
macro_rules! params {
    ($command:expr, $variant:path) => {
        match $command {
            $variant(params) => params,
            other => return Err(mismatch(&other)),
        }
    };
}

fn mismatch(command: &Command) -> OperationError {
    OperationError::Invalid(format!("{} routed to the wrong handler", command.kind()))
}

fn known_device(ctx: &HandlerContext, ieee: Ieee) -> Result<(), OperationError> {
    if ctx.gateway.devices().contains_key(&ieee) {
        Ok(())
    } else {
        Err(OperationError::DeviceNotFound(ieee))
    }
}

fn known_group(ctx: &HandlerContext, group_id: u16) -> Result<(), OperationError> {
    if ctx.gateway.groups().contains_key(&group_id) {
        Ok(())
    } else {
        Err(OperationError::GroupNotFound(group_id))
    }
}

pub(super) fn install(dispatcher: &mut CommandDispatcher) {
    install_network(dispatcher);
    install_devices(dispatcher);
    install_groups(dispatcher);

    for kind in CommandKind::iter().filter(|kind| kind.is_entity_command()) {
        dispatcher.insert(kind, execute_entity_command);
    }
}

async fn execute_entity_command(ctx: HandlerContext, command: Command) -> HandlerResult {
    ctx.entity()?.execute(&command).await?;
    Ok(ResponsePayload::Empty)
}

// ── Network ─────────────────────────────────────────────────────────

fn install_network(dispatcher: &mut CommandDispatcher) {
    dispatcher.insert(CommandKind::PermitJoining, |ctx, command| async move {
        let params = params!(command, Command::PermitJoining);
        if let Some(ieee) = params.ieee {
            known_device(&ctx, ieee)?;
        }
        ctx.gateway.permit_joining(params.duration, params.ieee).await?;
        Ok(ResponsePayload::PermitJoining {
            duration: Some(params.duration),
            ieee: params.ieee,
        })
    });
    dispatcher.insert(CommandKind::StartNetwork, |ctx, _| async move {
        ctx.gateway.start_network().await?;
        Ok(ResponsePayload::Empty)
    });
    dispatcher.insert(CommandKind::StopNetwork, |ctx, _| async move {
        ctx.gateway.stop_network().await?;
        Ok(ResponsePayload::Empty)
    });
    dispatcher.insert(CommandKind::UpdateNetworkTopology, |ctx, _| async move {
        ctx.gateway.update_topology().await?;
        Ok(ResponsePayload::Empty)
    });
    dispatcher.insert(CommandKind::GetApplicationState, |ctx, _| async move {
        let state = ctx.gateway.application_state().await?;
        Ok(ResponsePayload::ApplicationState(state))
    });
}

// ── Devices ─────────────────────────────────────────────────────────

fn install_devices(dispatcher: &mut CommandDispatcher) {
    dispatcher.insert(CommandKind::GetDevices, |ctx, _| async move {
        Ok(ResponsePayload::Devices(ctx.gateway.devices()))
    });
    dispatcher.insert(CommandKind::RemoveDevice, |ctx, command| async move {
        let DeviceTarget { ieee } = params!(command, Command::RemoveDevice);
        known_device(&ctx, ieee)?;
        ctx.gateway.remove_device(ieee).await?;
        Ok(ResponsePayload::Empty)
    });
    dispatcher.insert(CommandKind::ReconfigureDevice, |ctx, command| async move {
        let DeviceTarget { ieee } = params!(command, Command::ReconfigureDevice);
        known_device(&ctx, ieee)?;
        ctx.gateway.reconfigure_device(ieee).await?;
        Ok(ResponsePayload::Empty)
    });
    dispatcher.insert(CommandKind::ReadClusterAttributes, |ctx, command| async move {
        let params = params!(command, Command::ReadClusterAttributes);
        known_device(&ctx, params.ieee)?;
        let result = ctx.gateway.read_cluster_attributes(params).await?;
        Ok(ResponsePayload::ClusterAttributes(Box::new(result)))
    });
    dispatcher.insert(CommandKind::WriteClusterAttribute, |ctx, command| async move {
        let params = params!(command, Command::WriteClusterAttribute);
        known_device(&ctx, params.ieee)?;
        let result = ctx.gateway.write_cluster_attribute(params).await?;
        Ok(ResponsePayload::AttributeWrite(Box::new(result)))
    });
}

// ── Groups ──────────────────────────────────────────────────────────

fn install_groups(dispatcher: &mut CommandDispatcher) {
    dispatcher.insert(CommandKind::GetGroups, |ctx, _| async move {
        Ok(ResponsePayload::Groups(ctx.gateway.groups()))
    });
    dispatcher.insert(CommandKind::CreateGroup, |ctx, command| async move {
        let params = params!(command, Command::CreateGroup);
        for member in &params.members {
            known_device(&ctx, member.ieee)?;
        }
        let group = ctx.gateway.create_group(params).await?;
        Ok(ResponsePayload::Group(Box::new(group)))
    });
    dispatcher.insert(CommandKind::RemoveGroups, |ctx, command| async move {
        let RemoveGroupsParams { group_ids } = params!(command, Command::RemoveGroups);
        for group_id in &group_ids {
            known_group(&ctx, *group_id)?;
        }
        ctx.gateway.remove_groups(&group_ids).await?;
        // The reply lists the groups that remain.
        Ok(ResponsePayload::Groups(ctx.gateway.groups()))
    });
    dispatcher.insert(CommandKind::AddGroupMembers, |ctx, command| async move {
        let GroupMembersParams { group_id, members } = params!(command, Command::AddGroupMembers);
        known_group(&ctx, group_id)?;
        let group = ctx.gateway.add_group_members(group_id, &members).await?;
        Ok(ResponsePayload::Group(Box::new(group)))
    });
    dispatcher.insert(CommandKind::RemoveGroupMembers, |ctx, command| async move {
        let GroupMembersParams { group_id, members } =
            params!(command, Command::RemoveGroupMembers);
        known_group(&ctx, group_id)?;
        let group = ctx.gateway.remove_group_members(group_id, &members).await?;
        Ok(ResponsePayload::Group(Box::new(group)))
    });
}

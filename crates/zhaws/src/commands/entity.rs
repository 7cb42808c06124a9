//! Entity command handlers.

use zhaws_core::{Controller, EntityRef};

use crate::cli::{EntityArgs, EntityCommand, EntityTargetArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

fn entity_ref(target: EntityTargetArgs) -> Result<EntityRef, CliError> {
    match (target.device, target.group) {
        (Some(ieee), None) => Ok(EntityRef::Device {
            ieee,
            unique_id: target.unique_id,
        }),
        (None, Some(group_id)) => Ok(EntityRef::Group {
            group_id,
            unique_id: target.unique_id,
        }),
        _ => Err(CliError::Validation {
            field: "target".into(),
            reason: "pass exactly one of --device or --group".into(),
        }),
    }
}

#[derive(Clone, Copy)]
enum Verb {
    On,
    Off,
    Press,
    Refresh,
}

impl Verb {
    fn done(self) -> &'static str {
        match self {
            Self::On => "turned on",
            Self::Off => "turned off",
            Self::Press => "pressed",
            Self::Refresh => "refresh requested",
        }
    }
}

pub async fn handle(
    controller: &Controller,
    args: EntityArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (verb, target) = match args.command {
        EntityCommand::On(target) => (Verb::On, target),
        EntityCommand::Off(target) => (Verb::Off, target),
        EntityCommand::Press(target) => (Verb::Press, target),
        EntityCommand::Refresh(target) => (Verb::Refresh, target),
    };
    let entity = controller.entity(&entity_ref(target)?)?;

    match verb {
        Verb::On => entity.turn_on().await?,
        Verb::Off => entity.turn_off().await?,
        Verb::Press => entity.press().await?,
        Verb::Refresh => entity.refresh_state().await?,
    }
    output::status(&format!("{}: {}", entity.entity_ref(), verb.done()), global.quiet);
    Ok(())
}

//! Shared helpers for command handlers.

use zhaws_core::EntityState;

use crate::cli::{GlobalOpts, OutputFormat};

/// Output format after config defaults were applied.
pub fn format(global: &GlobalOpts) -> OutputFormat {
    global.output.unwrap_or(OutputFormat::Table)
}

/// Short human-readable rendering of an entity state.
pub fn state_summary(state: &EntityState) -> String {
    match state.is_on() {
        Some(true) => "on".into(),
        Some(false) => "off".into(),
        None => serde_json::to_string(state).unwrap_or_else(|_| "-".into()),
    }
}

pub fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

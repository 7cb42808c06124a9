//! Clap derive structures for the `zhaws` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

use zhaws_core::Ieee;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// zhaws -- talk to a ZHA WebSocket server from the command line
#[derive(Debug, Parser)]
#[command(
    name = "zhaws",
    version,
    about = "Control a Zigbee network through a ZHA WebSocket server",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Server profile to use
    #[arg(long, short = 'p', env = "ZHAWS_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Server URL, e.g. ws://127.0.0.1:8001 (overrides profile)
    #[arg(long, short = 'u', env = "ZHAWS_URL", global = true)]
    pub url: Option<String>,

    /// Output format [default: from config, else table]
    #[arg(long, short = 'o', env = "ZHAWS_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// Seconds to wait for each command's result
    #[arg(long, env = "ZHAWS_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect and manage paired devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Inspect and manage Zigbee groups
    #[command(alias = "g")]
    Groups(GroupsArgs),

    /// Network-wide operations
    #[command(alias = "net", alias = "n")]
    Network(NetworkArgs),

    /// Act on a single entity
    #[command(alias = "e")]
    Entity(EntityArgs),

    /// Stream gateway events until interrupted
    Events(EventsArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List every device the server knows
    #[command(alias = "ls")]
    List,

    /// Show one device and its entities
    Get {
        /// Device IEEE address (aa:bb:cc:dd:ee:ff:00:11)
        ieee: Ieee,
    },

    /// Remove a device from the network
    #[command(alias = "rm")]
    Remove { ieee: Ieee },

    /// Re-run binding and reporting configuration
    Reconfigure { ieee: Ieee },
}

// ── Groups ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GroupsArgs {
    #[command(subcommand)]
    pub command: GroupsCommand,
}

#[derive(Debug, Subcommand)]
pub enum GroupsCommand {
    /// List every group
    #[command(alias = "ls")]
    List,

    /// Show one group and its members
    Get { group_id: u16 },

    /// Create a group
    Create {
        name: String,

        /// Member endpoint as IEEE/ENDPOINT (repeatable)
        #[arg(long = "member", short = 'm', value_parser = parse_member)]
        members: Vec<zhaws_api::model::GroupMemberReference>,

        /// Request a specific group id
        #[arg(long)]
        id: Option<u16>,
    },

    /// Remove one or more groups
    #[command(alias = "rm")]
    Remove {
        #[arg(required = true)]
        group_ids: Vec<u16>,
    },
}

fn parse_member(raw: &str) -> Result<zhaws_api::model::GroupMemberReference, String> {
    let (ieee, endpoint) = raw
        .rsplit_once('/')
        .ok_or_else(|| format!("expected IEEE/ENDPOINT, got '{raw}'"))?;
    Ok(zhaws_api::model::GroupMemberReference {
        ieee: ieee.parse().map_err(|e| format!("{e}"))?,
        endpoint_id: endpoint
            .parse()
            .map_err(|_| format!("invalid endpoint '{endpoint}'"))?,
    })
}

// ── Network ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct NetworkArgs {
    #[command(subcommand)]
    pub command: NetworkCommand,
}

#[derive(Debug, Subcommand)]
pub enum NetworkCommand {
    /// Allow new devices to join
    PermitJoin {
        /// Seconds to keep joining open (0 closes it)
        #[arg(long, short = 'd', default_value = "60")]
        duration: u8,

        /// Only allow joining through this router
        #[arg(long)]
        via: Option<Ieee>,
    },

    /// Start the radio network
    Start,

    /// Stop the radio network
    Stop,

    /// Request a topology scan
    Topology,

    /// Show the coordinator's application state
    State,
}

// ── Entity ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct EntityArgs {
    #[command(subcommand)]
    pub command: EntityCommand,
}

#[derive(Debug, Subcommand)]
pub enum EntityCommand {
    /// Turn a light, switch, fan or siren on
    On(EntityTargetArgs),
    /// Turn a light, switch, fan or siren off
    Off(EntityTargetArgs),
    /// Press a button
    Press(EntityTargetArgs),
    /// Ask the server to re-read the entity's state
    Refresh(EntityTargetArgs),
}

#[derive(Debug, Args)]
pub struct EntityTargetArgs {
    /// Entity unique id
    pub unique_id: String,

    /// Owning device
    #[arg(long, required_unless_present = "group", conflicts_with = "group")]
    pub device: Option<Ieee>,

    /// Owning group
    #[arg(long)]
    pub group: Option<u16>,
}

// ── Events ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct EventsArgs {
    /// Also receive raw ZCL attribute reports
    #[arg(long)]
    pub raw_zcl: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Print the config file location
    Path,

    /// Write a starter config file
    Init {
        /// Host of the default profile
        #[arg(long, default_value = "localhost")]
        host: String,

        /// Port of the default profile
        #[arg(long, default_value_t = zhaws_config::ServerSettings::default().port)]
        port: u16,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn member_takes_ieee_and_endpoint() {
        let member = parse_member("aa:bb:cc:dd:ee:ff:00:01/11").unwrap();
        assert_eq!(member.endpoint_id, 11);
        assert_eq!(member.ieee.to_string(), "aa:bb:cc:dd:ee:ff:00:01");
        assert!(parse_member("aa:bb:cc:dd:ee:ff:00:01").is_err());
        assert!(parse_member("aa:bb:cc:dd:ee:ff:00:01/x").is_err());
    }

    #[test]
    fn entity_needs_exactly_one_owner() {
        let parsed = Cli::try_parse_from(["zhaws", "entity", "on", "switch_1", "--group", "3"]);
        assert!(parsed.is_ok());
        assert!(Cli::try_parse_from(["zhaws", "entity", "on", "switch_1"]).is_err());
        assert!(
            Cli::try_parse_from([
                "zhaws",
                "entity",
                "on",
                "switch_1",
                "--group",
                "3",
                "--device",
                "aa:bb:cc:dd:ee:ff:00:01",
            ])
            .is_err()
        );
    }
}

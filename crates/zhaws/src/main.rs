mod cli;
mod commands;
mod error;
mod output;

use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use zhaws_config::Config;
use zhaws_core::{Controller, ControllerConfig};

use crate::cli::{Cli, Command, GlobalOpts, OutputFormat};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let Cli {
        mut global,
        command,
    } = cli;

    match command {
        // Config commands don't need a server connection
        Command::Config(args) => commands::config_cmd::handle(args, &global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "zhaws", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let cfg = zhaws_config::load_config()?;
            if global.output.is_none() {
                global.output = Some(default_output(&cfg));
            }
            let controller = Controller::new(build_controller_config(&global, &cfg)?);

            tracing::debug!(command = ?cmd, url = %controller.config().url, "dispatching command");
            controller.connect().await?;
            let result = commands::dispatch(cmd, &controller, &global).await;
            controller.disconnect().await;
            result
        }
    }
}

fn default_output(cfg: &Config) -> OutputFormat {
    OutputFormat::from_str(&cfg.defaults.output, true).unwrap_or_else(|_| {
        tracing::warn!(output = %cfg.defaults.output, "unknown output format in config, using table");
        OutputFormat::Table
    })
}

/// Build a `ControllerConfig` from the config file, profile, and CLI overrides.
fn build_controller_config(global: &GlobalOpts, cfg: &Config) -> Result<ControllerConfig, CliError> {
    let mut config = match global.url.as_deref() {
        Some(url) => ControllerConfig::new(zhaws_config::parse_ws_url(url)?)
            .with_request_timeout(Duration::from_secs(cfg.defaults.request_timeout)),
        None => cfg.controller_config(global.profile.as_deref())?,
    };
    if let Some(secs) = global.timeout {
        if secs == 0 {
            return Err(CliError::Validation {
                field: "--timeout".into(),
                reason: "must be at least one second".into(),
            });
        }
        config = config.with_request_timeout(Duration::from_secs(secs));
    }
    Ok(config)
}

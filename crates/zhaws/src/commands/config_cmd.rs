//! Config subcommand handlers.

use zhaws_config::{self as config, Config, DEFAULT_PROFILE, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

fn render_toml(cfg: &Config) -> Result<String, CliError> {
    toml::to_string_pretty(cfg).map_err(|e| CliError::Render(e.to_string()))
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = config::load_config()?;
            let out = match global.output.unwrap_or(OutputFormat::Table) {
                OutputFormat::Json => output::render_json(&cfg)?,
                OutputFormat::Yaml => output::render_yaml(&cfg)?,
                OutputFormat::Table | OutputFormat::Plain => render_toml(&cfg)?,
            };
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        // ── Init ────────────────────────────────────────────────────
        ConfigCommand::Init { host, port, force } => {
            let path = config::config_path();
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }

            let profile = Profile {
                host,
                port,
                ..Profile::default()
            };
            profile.url()?;

            let mut cfg = Config::default();
            cfg.profiles.insert(DEFAULT_PROFILE.into(), profile);
            let written = config::save_config(&cfg)?;
            output::status(&format!("Wrote {}", written.display()), global.quiet);
            Ok(())
        }
    }
}

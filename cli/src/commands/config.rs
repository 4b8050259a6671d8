use crate::error::{CliError, Result};
use crate::output::OutputManager;
use clap::Args;
use havoc::HavocConfig;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Configuration action
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Show configuration file path
        #[arg(long)]
        path: bool,
    },

    /// Validate configuration
    Validate {
        /// Configuration file path (defaults to --config or the default location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        /// Destination (defaults to the platform config directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn run(
    args: ConfigArgs,
    config_path: Option<&Path>,
    dir: Option<&Path>,
    output: OutputManager,
) -> Result<()> {
    match args.action {
        ConfigAction::Show { path } => show_config(&output, config_path, dir, path),
        ConfigAction::Validate { file } => {
            validate_config(&output, file.as_deref().or(config_path), dir)
        }
        ConfigAction::Init { path, force } => init_config(&output, path, force),
    }
}

fn show_config(
    output: &OutputManager,
    config_path: Option<&Path>,
    dir: Option<&Path>,
    show_path: bool,
) -> Result<()> {
    let (config, source) = crate::load_configuration(config_path, dir)?;

    if show_path && !output.is_json() {
        let source = source
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(defaults and environment)".to_string());
        output.print_key_value("Configuration file", &source)?;
        println!();
    }

    output.print_config(&config)
}

fn validate_config(output: &OutputManager, file: Option<&Path>, dir: Option<&Path>) -> Result<()> {
    let (config, source) = crate::load_configuration(file, dir)?;

    match source {
        Some(path) => output.print_success(&format!("Configuration file {} is valid", path.display()))?,
        None => output.print_success("Default configuration is valid")?,
    }
    output.print_key_value("Experiments dir", &config.dir.display().to_string())?;
    output.print_key_value(
        "Fault kinds",
        &config
            .experiment_kinds
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    )?;
    output.print_key_value("Monkey mode", &config.monkey.mode)?;

    if config.grafana.url.is_none() || config.grafana.token.is_none() || config.grafana.dashboard_uid.is_none() {
        output.print_warning("Grafana credentials are incomplete; 'havocctl run' will refuse to start")?;
    }
    Ok(())
}

fn init_config(output: &OutputManager, path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => HavocConfig::default_config_path()?,
    };

    if path.exists() && !force {
        return Err(CliError::AlreadyExists { path: path.display().to_string() });
    }

    HavocConfig::default().save_to_file(&path)?;
    output.print_success(&format!("Wrote default configuration to {}", path.display()))
}

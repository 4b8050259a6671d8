use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod error;
mod output;

use commands::*;
use error::{CliError, Result};
use havoc::{Controller, HavocConfig, Kubectl};
use output::{OutputFormat, OutputManager};

#[derive(Parser)]
#[command(name = "havocctl")]
#[command(about = "Havoc CLI - generate Chaos Mesh experiments from namespace topology and run them")]
#[command(version)]
#[command(long_about = "
havocctl reads the pods of a Kubernetes namespace, groups them by shared labels,
renders Chaos Mesh experiments for single pods, groups, network partitions and
external targets, and runs them one by one as a chaos monkey.

Examples:
  havocctl generate my-namespace                  # Write experiments to havoc-experiments/
  havocctl apply failure                          # List generated pod failure experiments
  havocctl apply failure api-0                    # Apply one and wait for it to recover
  havocctl run my-namespace                       # Generate and run the monkey until its deadline
  havocctl config init                            # Write a default configuration file
")]
struct Cli {
    /// Configuration file path
    #[arg(long, global = true, env = "HAVOC_CONFIG")]
    config: Option<PathBuf>,

    /// Experiments directory (overrides the configuration)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "HAVOC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    format: OutputFormatArg,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum OutputFormatArg {
    Text,
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Text => OutputFormat::Text,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate experiments for every pod, group and partition of a namespace
    Generate(GenerateArgs),

    /// Apply a generated experiment, or list the experiments of a kind
    Apply(ApplyArgs),

    /// Run the chaos monkey
    Run(RunArgs),

    /// Manage havoc configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Handle completion generation
    if let Commands::Completions { shell } = cli.command {
        generate_completions(shell);
        return;
    }

    // Run the command
    if let Err(e) = run_command(cli).await {
        let error_msg = error::format_error(&e);
        eprintln!("{}", error_msg);
        process::exit(e.exit_code());
    }
}

async fn run_command(cli: Cli) -> Result<()> {
    let colored = !cli.no_color && console::Term::stdout().features().colors_supported();
    let output = OutputManager::new(OutputFormat::from(cli.format), colored);

    // Config commands report their own load errors
    if let Commands::Config(args) = cli.command {
        initialize_logging(cli.log_level.as_deref().unwrap_or("warn"), cli.json_logs)?;
        return commands::config::run(args, cli.config.as_deref(), cli.dir.as_deref(), output).await;
    }

    let (config, source) = load_configuration(cli.config.as_deref(), cli.dir.as_deref())?;
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level).to_string();
    initialize_logging(&level, cli.json_logs || config.logging.json)?;
    match source {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => info!("Using default configuration"),
    }

    let controller = Controller::new(config, Arc::new(Kubectl::new()));
    let cancel = shutdown_token();

    // Route to appropriate command
    match cli.command {
        Commands::Generate(args) => commands::generate::run(args, controller, output).await,
        Commands::Apply(args) => commands::apply::run(args, controller, output, cancel).await,
        Commands::Run(args) => commands::run::run(args, controller, output, cancel).await,
        Commands::Config(_) | Commands::Completions { .. } => Ok(()),
    }
}

/// Load configuration: explicit path, then the default location, then defaults and environment
pub(crate) fn load_configuration(path: Option<&Path>, dir: Option<&Path>) -> Result<(HavocConfig, Option<PathBuf>)> {
    let (mut config, source) = match path {
        Some(path) => (HavocConfig::from_file(path)?, Some(path.to_path_buf())),
        None => {
            let default_path = HavocConfig::default_config_path()?;
            if default_path.exists() {
                (HavocConfig::from_file(&default_path)?, Some(default_path))
            } else {
                (HavocConfig::from_env()?, None)
            }
        }
    };

    if let Some(dir) = dir {
        config.dir = dir.to_path_buf();
    }
    Ok((config, source))
}

fn initialize_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" => "error",
        other => return Err(CliError::InvalidArgument(format!("unknown log level {:?}", other))),
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(directive(&format!("havoc={}", level))?)
        .add_directive(directive(&format!("havocctl={}", level))?)
        .add_directive(directive("hyper=warn")?)
        .add_directive(directive("reqwest=warn")?);

    let registry = tracing_subscriber::registry().with(filter);
    let initialized = if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false).with_writer(std::io::stderr)).try_init()
    };
    initialized.map_err(|e| CliError::Logging(e.to_string()))
}

fn directive(value: &str) -> Result<Directive> {
    value
        .parse()
        .map_err(|e: ParseError| CliError::Logging(format!("{}: {}", value, e)))
}

/// Token cancelled on Ctrl-C
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current experiment");
            signal_cancel.cancel();
        }
    });
    cancel
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::{generate, Generator};
    use std::io;

    fn print_completions<G: Generator>(gen: G, cmd: &mut clap::Command) {
        generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
    }

    let mut cmd = Cli::command();
    eprintln!("Generating completion file for {shell}...");
    print_completions(shell, &mut cmd);
}

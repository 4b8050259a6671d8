use crate::error::Result;
use console::{style, Term};
use havoc::{ExperimentAction, FaultCollection, FaultKind, HavocConfig};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

#[derive(Serialize)]
struct ExperimentEntry<'a> {
    kind: FaultKind,
    name: &'a str,
}

pub struct OutputManager {
    format: OutputFormat,
    colored: bool,
    term: Term,
}

impl OutputManager {
    pub fn new(format: OutputFormat, colored: bool) -> Self {
        Self {
            format,
            colored,
            term: Term::stdout(),
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Generated experiments, grouped by kind
    pub fn print_collection(&self, collection: &FaultCollection) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let entries: Vec<ExperimentEntry> = collection
                    .iter()
                    .map(|(kind, name, _)| ExperimentEntry { kind, name })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            }
            OutputFormat::Text => {
                for kind in collection.kinds() {
                    let names: Vec<&str> = collection.names(kind).collect();
                    self.print_heading(&format!("{} ({})", kind, names.len()))?;
                    for name in names {
                        self.term.write_line(&format!("  {}", name))?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Experiment names stored for one kind
    pub fn print_names(&self, kind: FaultKind, names: &[String]) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let entries: Vec<ExperimentEntry> = names
                    .iter()
                    .map(|name| ExperimentEntry { kind, name })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            }
            OutputFormat::Text => {
                if names.is_empty() {
                    self.print_warning(&format!("No {} experiments found", kind))?;
                    return Ok(());
                }
                self.print_heading(&format!("Available {} experiments", kind))?;
                for name in names {
                    self.term.write_line(&format!("  {}", name))?;
                }
            }
        }
        Ok(())
    }

    /// Applications made by a monkey run
    pub fn print_actions(&self, actions: &[ExperimentAction]) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(actions)?);
            }
            OutputFormat::Text => {
                if actions.is_empty() {
                    return self.print_info("No experiments were applied");
                }
                self.print_heading("Applied experiments")?;
                println!("{:<24} {:<14} {:<10} {}", "Started", "Kind", "Took", "Name");
                for action in actions {
                    let took = action
                        .ended_at
                        .map(|end| format_duration((end - action.started_at).num_seconds().max(0) as u64))
                        .unwrap_or_else(|| "-".to_string());
                    let started = action.started_at.format("%Y-%m-%d %H:%M:%S").to_string();
                    if self.colored {
                        println!(
                            "{:<24} {:<14} {:<10} {}",
                            style(started).dim(),
                            style(action.kind).cyan(),
                            took,
                            action.name
                        );
                    } else {
                        println!("{:<24} {:<14} {:<10} {}", started, action.kind, took, action.name);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn print_config(&self, config: &HavocConfig) -> Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
            OutputFormat::Text => print!("{}", toml::to_string_pretty(config)?),
        }
        Ok(())
    }

    pub fn print_key_value(&self, key: &str, value: &str) -> Result<()> {
        if self.colored {
            println!("{}: {}", style(key).bold().blue(), style(value).green());
        } else {
            println!("{}: {}", key, value);
        }
        Ok(())
    }

    pub fn print_success(&self, message: &str) -> Result<()> {
        if self.colored {
            println!("{} {}", style("✓").green().bold(), message);
        } else {
            println!("✓ {}", message);
        }
        Ok(())
    }

    pub fn print_warning(&self, message: &str) -> Result<()> {
        if self.colored {
            println!("{} {}", style("⚠").yellow().bold(), message);
        } else {
            println!("⚠ {}", message);
        }
        Ok(())
    }

    pub fn print_info(&self, message: &str) -> Result<()> {
        if self.colored {
            println!("{} {}", style("ℹ").blue().bold(), message);
        } else {
            println!("ℹ {}", message);
        }
        Ok(())
    }

    fn print_heading(&self, title: &str) -> Result<()> {
        if self.colored {
            println!("{}", style(title).bold().underlined());
        } else {
            println!("{}", title);
        }
        Ok(())
    }

    /// Spinner for long cluster operations; hidden for JSON output
    pub fn create_spinner(&self, message: &str) -> ProgressBar {
        if self.is_json() {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        let spinner_style = ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        pb.set_style(spinner_style);
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

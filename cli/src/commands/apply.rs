use crate::error::{CliError, Result};
use crate::output::OutputManager;
use clap::Args;
use havoc::config::parse_duration;
use havoc::controller::TrackOptions;
use havoc::{ChaosStatus, Controller, FaultKind};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Fault kind, e.g. failure, group-latency, partition
    pub kind: FaultKind,

    /// Experiment name; lists the available names when omitted
    pub name: Option<String>,

    /// Return right after applying instead of waiting for recovery
    #[arg(long)]
    pub no_wait: bool,

    /// Follow the experiment's status conditions and annotate transitions
    #[arg(long, conflicts_with = "no_wait")]
    pub track: bool,

    /// Delay before applying, as a duration such as 30s (only with --track)
    #[arg(long, value_parser = parse_delay, requires = "track")]
    pub delay: Option<Duration>,
}

fn parse_delay(value: &str) -> std::result::Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

pub async fn run(
    args: ApplyArgs,
    controller: Controller,
    output: OutputManager,
    cancel: CancellationToken,
) -> Result<()> {
    let Some(name) = args.name else {
        let names = controller.store().list_names(args.kind).map_err(havoc::HavocError::from)?;
        return output.print_names(args.kind, &names);
    };

    if args.track {
        return track(&controller, &output, args.kind, &name, args.delay, &cancel).await;
    }

    let message = if args.no_wait {
        format!("Applying {} {}...", args.kind, name)
    } else {
        format!("Applying {} {} and waiting for recovery...", args.kind, name)
    };
    let spinner = output.create_spinner(&message);

    match controller.apply_chaos_file(args.kind, &name, !args.no_wait).await {
        Ok(experiment) => {
            spinner.finish_and_clear();
            let verb = if args.no_wait { "Applied" } else { "Applied and recovered" };
            output.print_success(&format!("{} {}", verb, experiment.resource_name()))
        }
        Err(e) => {
            spinner.finish_with_message("✗ Apply failed");
            Err(e.into())
        }
    }
}

async fn track(
    controller: &Controller,
    output: &OutputManager,
    kind: FaultKind,
    name: &str,
    delay: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut options = TrackOptions {
        delay: delay.unwrap_or(Duration::ZERO),
        ..TrackOptions::default()
    };
    match controller.dashboard_listener()? {
        Some(listener) => options.listeners.push(listener),
        None => output.print_info("Grafana credentials not set, transitions will not be annotated")?,
    }

    let spinner = output.create_spinner(&format!("Tracking {} {}...", kind, name));
    let status = controller.track_chaos_file(kind, name, options, cancel).await;
    spinner.finish_and_clear();

    match status? {
        ChaosStatus::Ended => output.print_success(&format!("{}-{} ended", kind, name)),
        ChaosStatus::Deleted | ChaosStatus::Pending if cancel.is_cancelled() => Err(CliError::Cancelled),
        other => {
            output.print_warning(&format!("{}-{} stopped being tracked while {}", kind, name, other))
        }
    }
}

use crate::error::Result;
use crate::output::OutputManager;
use clap::Args;
use havoc::Controller;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Namespace to generate experiments from when monkey.dir is not set
    pub namespace: Option<String>,
}

pub async fn run(
    args: RunArgs,
    controller: Controller,
    output: OutputManager,
    cancel: CancellationToken,
) -> Result<()> {
    let monkey = &controller.config().monkey;
    output.print_info(&format!(
        "Starting chaos monkey in {} mode for {} with {} cooldown (Ctrl-C to stop)",
        monkey.mode, monkey.duration, monkey.cooldown
    ))?;

    let actions = controller.run_monkey(args.namespace.as_deref(), cancel.clone()).await?;
    info!(count = actions.len(), stopped = cancel.is_cancelled(), "Monkey run finished");

    output.print_actions(&actions)?;
    if cancel.is_cancelled() && !output.is_json() {
        output.print_warning("Monkey was stopped before its deadline")?;
    }
    Ok(())
}

use crate::error::Result;
use crate::output::OutputManager;
use clap::Args;
use havoc::Controller;
use tracing::info;

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Namespace whose pods are analyzed
    pub namespace: String,
}

pub async fn run(args: GenerateArgs, controller: Controller, output: OutputManager) -> Result<()> {
    let dir = controller.config().dir.clone();
    let spinner = output.create_spinner(&format!("Reading topology of {}...", args.namespace));

    let collection = match controller.generate_specs(&args.namespace).await {
        Ok(collection) => {
            spinner.finish_and_clear();
            collection
        }
        Err(e) => {
            spinner.finish_with_message("✗ Generation failed");
            return Err(e.into());
        }
    };

    info!(
        namespace = %args.namespace,
        count = collection.len(),
        dir = %dir.display(),
        "Generated experiments"
    );

    output.print_collection(&collection)?;
    if !output.is_json() {
        output.print_success(&format!(
            "Generated {} experiments for {} into {}",
            collection.len(),
            args.namespace,
            dir.display()
        ))?;
    }
    Ok(())
}

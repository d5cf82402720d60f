use clap::{Args, Subcommand};
use filetrigger_azure::FileTrigger;

use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct ContainerArgs {
    #[command(subcommand)]
    pub command: ContainerCommand,
}

#[derive(Subcommand, Debug)]
pub enum ContainerCommand {
    /// Create a blob container.
    Create {
        /// Container name.
        name: String,
    },
    /// Delete a blob container and every blob in it.
    Delete {
        /// Container name.
        name: String,
    },
}

pub async fn run(
    trigger: &FileTrigger,
    args: &ContainerArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let blob = trigger.blob()?;
    match &args.command {
        ContainerCommand::Create { name } => {
            let created = blob.create_container(name).await?;
            match format {
                OutputFormat::Json => {
                    let resp = serde_json::json!({ "container": name, "created": created });
                    println!("{}", serde_json::to_string_pretty(&resp)?);
                }
                OutputFormat::Text if created => println!("Created container {name}."),
                OutputFormat::Text => println!("Container {name} already exists."),
            }
        }
        ContainerCommand::Delete { name } => {
            let deleted = blob.delete_container(name).await?;
            match format {
                OutputFormat::Json => {
                    let resp = serde_json::json!({ "container": name, "deleted": deleted });
                    println!("{}", serde_json::to_string_pretty(&resp)?);
                }
                OutputFormat::Text if deleted => println!("Deleted container {name}."),
                OutputFormat::Text => println!("Container {name} does not exist."),
            }
        }
    }
    Ok(())
}

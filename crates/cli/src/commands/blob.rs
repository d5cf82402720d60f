use std::path::PathBuf;

use clap::{Args, Subcommand};
use filetrigger_azure::FileTrigger;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::body_field;
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct BlobArgs {
    #[command(subcommand)]
    pub command: BlobCommand,
}

#[derive(Subcommand, Debug)]
pub enum BlobCommand {
    /// Upload a blob from a file, a directory entry, inline text, or stdin.
    Upload {
        /// Blob name.
        blob: String,
        /// Container. Defaults to the configured container.
        #[arg(long)]
        container: Option<String>,
        /// Local file to upload.
        #[arg(long, conflicts_with_all = ["dir", "data"])]
        file: Option<PathBuf>,
        /// Directory holding a file named like the blob.
        #[arg(long, conflicts_with = "data")]
        dir: Option<PathBuf>,
        /// Inline blob body.
        #[arg(long)]
        data: Option<String>,
    },
    /// Download a blob to a file, or to stdout.
    Download {
        /// Blob name.
        blob: String,
        /// Container. Defaults to the configured container.
        #[arg(long)]
        container: Option<String>,
        /// Local file to write.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete a blob.
    Delete {
        /// Blob name.
        blob: String,
        /// Container. Defaults to the configured container.
        #[arg(long)]
        container: Option<String>,
    },
}

pub async fn run(trigger: &FileTrigger, args: &BlobArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let store = trigger.blob()?;
    match &args.command {
        BlobCommand::Upload {
            blob,
            container,
            file,
            dir,
            data,
        } => {
            let container = container.as_deref();
            let size = if let Some(path) = file {
                store.upload_file(container, blob, path).await?
            } else if let Some(dir) = dir {
                store.upload_from_dir(container, dir, blob).await?
            } else if let Some(text) = data {
                store
                    .upload_buffer(container, blob, text.clone().into_bytes())
                    .await?
            } else {
                let mut buf = Vec::new();
                tokio::io::stdin().read_to_end(&mut buf).await?;
                store.upload_buffer(container, blob, buf).await?
            };
            match format {
                OutputFormat::Json => {
                    let resp = serde_json::json!({
                        "blob_name": blob,
                        "size": size,
                        "status": "uploaded"
                    });
                    println!("{}", serde_json::to_string_pretty(&resp)?);
                }
                OutputFormat::Text => println!("Uploaded {blob} ({size} bytes)."),
            }
        }
        BlobCommand::Download {
            blob,
            container,
            output,
        } => {
            let container = container.as_deref();
            if let Some(path) = output {
                let size = store.download_file(container, blob, path).await?;
                match format {
                    OutputFormat::Json => {
                        let resp = serde_json::json!({
                            "blob_name": blob,
                            "path": path.display().to_string(),
                            "size": size,
                            "status": "downloaded"
                        });
                        println!("{}", serde_json::to_string_pretty(&resp)?);
                    }
                    OutputFormat::Text => {
                        eprintln!("Downloaded {blob} to {} ({size} bytes).", path.display());
                    }
                }
            } else {
                let data = store.download_buffer(container, blob).await?;
                match format {
                    OutputFormat::Json => {
                        let (field, value) = body_field(&data);
                        let resp = serde_json::json!({
                            "blob_name": blob,
                            "content_length": data.len(),
                            field: value,
                        });
                        println!("{}", serde_json::to_string_pretty(&resp)?);
                    }
                    OutputFormat::Text => {
                        let mut stdout = tokio::io::stdout();
                        stdout.write_all(&data).await?;
                        stdout.flush().await?;
                    }
                }
            }
        }
        BlobCommand::Delete { blob, container } => {
            store.delete_blob(container.as_deref(), blob).await?;
            match format {
                OutputFormat::Json => {
                    let resp = serde_json::json!({ "blob_name": blob, "status": "deleted" });
                    println!("{}", serde_json::to_string_pretty(&resp)?);
                }
                OutputFormat::Text => println!("Deleted {blob}."),
            }
        }
    }
    Ok(())
}

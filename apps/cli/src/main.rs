//! complaintkit: submit complaints and upload evidence from the command line.

mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use complaintkit_client::Client;
use complaintkit_protocol::{CHUNK_SIZE, Priority};
use complaintkit_submit::Submitter;
use serde_json::{Map, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::commands::SubmitArgs;
use crate::config::{BASE_URL_ENV, Config};

#[derive(Parser)]
#[command(name = "complaintkit", version, about = "Complaint submission and evidence upload client")]
struct Cli {
    /// API base URL (overrides the config file and COMPLAINTKIT_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Path to an alternative config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a complaint with evidence files
    Submit {
        /// Complaint text
        #[arg(long)]
        text: String,

        #[arg(long)]
        category: Option<String>,

        /// low, medium, high or critical
        #[arg(long)]
        priority: Option<Priority>,

        /// Extra fields as a JSON object
        #[arg(long, value_parser = commands::parse_metadata)]
        metadata: Option<Map<String, Value>>,

        /// Report each attachment instead of failing on the first error
        #[arg(long)]
        report: bool,

        /// Evidence files
        files: Vec<PathBuf>,
    },
    /// Check files against the attachment policy without uploading
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show a complaint and its attachments
    Show { complaint_id: String },
    /// Continue an interrupted chunked upload
    Resume { session_id: String, file: PathBuf },
    /// Follow server-side processing of an upload session
    Watch { session_id: String },
    /// Remove an attachment from a complaint
    DeleteAttachment {
        complaint_id: String,
        attachment_id: String,
    },
    /// Print the chunk layout for a file size
    Plan {
        /// File size in bytes
        size: u64,

        #[arg(long, default_value_t = CHUNK_SIZE)]
        chunk_size: u64,
    },
}

fn submitter(cli_base_url: Option<&str>, config: &Config) -> anyhow::Result<Submitter> {
    let env = std::env::var(BASE_URL_ENV).ok();
    let base_url = config.resolve_base_url(cli_base_url, env.as_deref());
    let client = Client::with_timeout(&base_url, config.request_timeout())
        .with_context(|| format!("Invalid base URL {base_url}"))?;
    info!(base_url = %base_url, "using complaint service");
    Ok(Submitter::with_config(Arc::new(client), config.submit_config()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    let base_url = cli.base_url.as_deref();

    match cli.command {
        Commands::Submit {
            text,
            category,
            priority,
            metadata,
            report,
            files,
        } => {
            let args = SubmitArgs {
                text,
                category,
                priority,
                metadata,
                files,
                report,
            };
            commands::submit(submitter(base_url, &config)?, args).await
        }
        Commands::Validate { files } => commands::validate(config.policy(), &files),
        Commands::Show { complaint_id } => {
            commands::show(&submitter(base_url, &config)?, &complaint_id).await
        }
        Commands::Resume { session_id, file } => {
            commands::resume(submitter(base_url, &config)?, &session_id, &file).await
        }
        Commands::Watch { session_id } => {
            commands::watch(&submitter(base_url, &config)?, &session_id).await
        }
        Commands::DeleteAttachment {
            complaint_id,
            attachment_id,
        } => {
            commands::delete_attachment(
                &submitter(base_url, &config)?,
                &complaint_id,
                &attachment_id,
            )
            .await
        }
        Commands::Plan { size, chunk_size } => commands::print_plan(size, chunk_size),
    }
}

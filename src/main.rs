use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use diagnostics_uploader::config::{AppConfig, CliConfig, FileConfig};
use diagnostics_uploader::upload_queue::{
    BatchController, HttpUploader, QueueEvent, QueueItemView, QueueStatus, StaticCredentials,
    UploadFile,
};

/// Environment variable read when --token is not given.
const TOKEN_ENV_VAR: &str = "UPLOAD_TOKEN";

#[derive(Parser, Debug)]
#[clap(about = "Upload statement and ledger files for analysis, one at a time")]
struct CliArgs {
    /// Files to upload.
    #[clap(required = true)]
    pub files: Vec<PathBuf>,

    /// Path to a TOML config file. Values in the file override CLI arguments.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// URL of the analysis upload endpoint.
    #[clap(long)]
    pub upload_url: Option<String>,

    /// Bearer token. Falls back to the UPLOAD_TOKEN environment variable.
    #[clap(long)]
    pub token: Option<String>,

    /// Client tag forwarded with every upload.
    #[clap(long)]
    pub client_id: Option<String>,

    /// Timeout in seconds for each upload request.
    #[clap(long)]
    pub request_timeout_sec: Option<u64>,

    /// Maximum number of files held by the queue.
    #[clap(long)]
    pub max_queue_size: Option<usize>,

    /// Run one retry pass over failed and cancelled files.
    #[clap(long)]
    pub retry_failed: bool,

    /// Print the final queue as JSON instead of a table.
    #[clap(long)]
    pub json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config = CliConfig {
        upload_url: cli_args.upload_url.clone(),
        request_timeout_sec: cli_args.request_timeout_sec,
        max_queue_size: cli_args.max_queue_size,
        client_id: cli_args.client_id.clone(),
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    let token = cli_args
        .token
        .clone()
        .or_else(|| std::env::var(TOKEN_ENV_VAR).ok());
    let credentials = Arc::new(StaticCredentials::new(token));

    let uploader = Arc::new(HttpUploader::new(
        config.upload_url.clone(),
        config.request_timeout_secs,
    )?);
    let controller = Arc::new(BatchController::from_settings(
        uploader,
        credentials,
        &config.upload_queue,
    ));

    let mut files = Vec::with_capacity(cli_args.files.len());
    for path in &cli_args.files {
        files.push(UploadFile::from_path(path).await?);
    }
    let ids = controller.add_files(files, config.client_id.as_deref());
    if ids.len() < cli_args.files.len() {
        warn!(
            "Only {} of {} files were queued (max queue size {})",
            ids.len(),
            cli_args.files.len(),
            config.upload_queue.max_queue_size
        );
    }
    for item in controller.files() {
        if let Some(error) = item.error.as_ref().filter(|e| e.code.is_validation()) {
            warn!("Skipping {}: {}", item.name(), error);
        }
    }

    info!("Uploading to {}", config.upload_url);

    let events = controller.subscribe();
    let progress_task = tokio::spawn(render_progress(controller.clone(), events, cli_args.json));

    // Every Ctrl-C cancels whatever pass is running, including the retry pass
    let interrupted = Arc::new(AtomicBool::new(false));
    let ctrl_c_task = tokio::spawn({
        let controller = controller.clone();
        let interrupted = interrupted.clone();
        async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling remaining uploads");
                interrupted.store(true, Ordering::SeqCst);
                controller.cancel_processing();
            }
        }
    });

    controller.process_all().await;

    let failed = controller.failed_files();
    if should_run_retry_pass(
        cli_args.retry_failed,
        interrupted.load(Ordering::SeqCst),
        failed,
    ) {
        info!("Retrying {} failed files", failed);
        controller.retry_failed().await;
    } else if cli_args.retry_failed && failed > 0 {
        info!("Skipping retry pass after interrupt");
    }

    ctrl_c_task.abort();
    progress_task.abort();

    let items: Vec<QueueItemView> = controller
        .files()
        .iter()
        .map(QueueItemView::from_queue_item)
        .collect();
    let summary = controller.summary();

    if cli_args.json {
        let output = serde_json::json!({ "summary": &summary, "files": &items });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for item in &items {
            print_item(item);
        }
        println!(
            "{} files: {} completed, {} failed",
            summary.total_files, summary.completed_files, summary.failed_files
        );
    }

    if summary.failed_files > 0 {
        bail!("{} of {} uploads failed", summary.failed_files, summary.total_files);
    }
    Ok(())
}

/// Whether to start the retry pass. Never after a Ctrl-C.
fn should_run_retry_pass(requested: bool, interrupted: bool, failed: usize) -> bool {
    requested && !interrupted && failed > 0
}

fn print_item(item: &QueueItemView) {
    match item.status {
        QueueStatus::Completed => println!(
            "{:<10} {} ({} rows, {} flagged)",
            item.status.as_str(),
            item.name,
            item.row_count.unwrap_or(0),
            item.flagged_count.unwrap_or(0)
        ),
        _ => match &item.error {
            Some(error) => match &error.details {
                Some(details) => println!(
                    "{:<10} {}: {} ({})",
                    item.status.as_str(),
                    item.name,
                    error.message,
                    details
                ),
                None => println!(
                    "{:<10} {}: {}",
                    item.status.as_str(),
                    item.name,
                    error.message
                ),
            },
            None => println!("{:<10} {}", item.status.as_str(), item.name),
        },
    }
}

/// Redraw a progress bar from queue events. Runs until aborted.
async fn render_progress(
    controller: Arc<BatchController>,
    mut events: broadcast::Receiver<QueueEvent>,
    hidden: bool,
) {
    let bar = if hidden {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(100)
    };
    match ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}") {
        Ok(style) => bar.set_style(style.progress_chars("=> ")),
        Err(e) => error!("Invalid progress template: {}", e),
    }

    loop {
        match events.recv().await {
            Ok(QueueEvent::BatchFinished { .. }) => {
                bar.set_position(controller.overall_progress() as u64);
                bar.finish_with_message("done");
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {
                bar.set_position(controller.overall_progress() as u64);
                bar.set_message(format!(
                    "{}/{} done",
                    controller.completed_files() + controller.failed_files(),
                    controller.total_files()
                ));
            }
            Err(RecvError::Closed) => break,
        }
    }
}

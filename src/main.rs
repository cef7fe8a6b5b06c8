use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use dropship::config::{Config, DEFAULT_CONFIG_PATH};
use dropship::upload::{
    CandidateFile,
    FileId,
    FileRecord,
    HttpAuthorizationProvider,
    HttpObjectTransfer,
    UploadEvent,
    UploadManager,
    UploadStatus,
};
use dropship::utils::{format_bytes, format_duration};

#[derive(Parser, Debug)]
#[command(name = "dropship", about = "Upload images and videos straight to a storage bucket")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// How many times to retry failed files
    #[arg(long, default_value = "0")]
    retries: u32,

    /// Files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let all_succeeded = run(cli).await?;

    if !all_succeeded {
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = Config::load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    let manager_config = config.manager_config().context("Invalid config")?;

    let provider = HttpAuthorizationProvider::new(&config.endpoint, config.request_timeout())
        .context("Failed to create authorization client")?;
    let transfer = HttpObjectTransfer::new(config.request_timeout())
        .context("Failed to create transfer client")?;

    let handle = UploadManager::new(Arc::new(provider), Arc::new(transfer), manager_config);
    let manager = handle.manager.clone();

    let mut all_succeeded = true;
    let mut candidates = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        match CandidateFile::from_path(path).await {
            Ok(candidate) => candidates.push(candidate),
            Err(err) => {
                eprintln!("Skipping {}: {}", path.display(), err);
                all_succeeded = false;
            }
        }
    }

    let started = Instant::now();
    let printer = tokio::spawn(print_events(manager.subscribe_events(), manager.clone()));

    let report = manager.add_files(candidates).await.context("Failed to add files")?;
    if let Some(summary) = &report.summary {
        eprintln!("{}", summary);
        all_succeeded = false;
    }

    let mut records = manager.wait_settled().await?;
    for round in 1..=cli.retries {
        let failed: Vec<FileId> = records
            .iter()
            .filter(|record| record.can_retry())
            .map(|record| record.id)
            .collect();

        if failed.is_empty() {
            break;
        }

        println!("Retry round {}/{}: {} file(s)", round, cli.retries, failed.len());
        for file_id in failed {
            manager.retry(file_id).await?;
        }
        records = manager.wait_settled().await?;
    }

    printer.abort();
    print_table(&records);
    println!("Done in {}", format_duration(started.elapsed()));

    if records.iter().any(|record| record.remote_url().is_none()) {
        all_succeeded = false;
    }

    handle.shutdown().await.context("Failed to shut down upload manager")?;
    Ok(all_succeeded)
}

async fn print_events(mut events: broadcast::Receiver<UploadEvent>, manager: UploadManager) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "event printer lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let name = manager
            .snapshot()
            .into_iter()
            .find(|record| record.id == event.file_id())
            .map(|record| record.name)
            .unwrap_or_else(|| event.file_id().to_string());

        match event {
            UploadEvent::Added { .. } => println!("[{}] queued", name),
            UploadEvent::StateChanged { new_state, .. } => println!("[{}] {:?}", name, new_state),
            UploadEvent::Progress { percent, .. } => println!("[{}] {}%", name, percent),
            UploadEvent::Completed { remote_url, .. } => println!("[{}] uploaded to {}", name, remote_url),
            UploadEvent::Failed { error, .. } => println!("[{}] failed: {}", name, error),
            UploadEvent::Removed { .. } => println!("[{}] removed", name),
        }
    }
}

fn print_table(records: &[FileRecord]) {
    let width = records
        .iter()
        .map(|record| record.name.len())
        .max()
        .unwrap_or(4)
        .max(4);

    println!();
    println!("{:<width$}  {:>10}  {:<9}  {}", "NAME", "SIZE", "STATUS", "URL / ERROR", width = width);
    for record in records {
        let (status, detail) = match &record.status {
            UploadStatus::Success { remote_url } => ("success", remote_url.as_str()),
            UploadStatus::Error { error_message } => ("error", error_message.as_str()),
            UploadStatus::Uploading { .. } => ("uploading", ""),
            UploadStatus::Pending => ("pending", ""),
        };

        println!(
            "{:<width$}  {:>10}  {:<9}  {}",
            record.name,
            format_bytes(record.size_bytes),
            status,
            detail,
            width = width,
        );
    }
}

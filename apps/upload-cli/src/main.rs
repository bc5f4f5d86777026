mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use forge_local_storage::LocalObjectStorage;
use forge_session_store::{JsonFileStore, SessionStore, default_sessions_path};
use forge_upload::{
    CancellationToken, ObjectStorage, ProgressTracker, ResumableUploader, UploadOutcome,
    UploadTarget, content_type_for, delete_all_objects, upload_files,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Settings;

#[derive(Debug, Parser)]
#[command(name = "forge-upload")]
#[command(about = "Resumable uploads to bucket storage", long_about = None)]
struct Cli {
    /// Settings file (defaults to ~/.config/forge-tools/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Environment title from the settings file
    #[arg(long, global = true)]
    env: Option<String>,

    /// Session file (defaults to ~/.config/forge-tools/upload-sessions.json)
    #[arg(long, global = true)]
    sessions: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Upload one or more files, resuming interrupted uploads
    Upload {
        bucket: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Object name (single file only, defaults to the file name)
        #[arg(long)]
        name: Option<String>,
        /// Content type (single file only, defaults to detection by extension)
        #[arg(long)]
        content_type: Option<String>,
    },
    /// List objects in a bucket
    List { bucket: String },
    /// Delete every object in a bucket
    DeleteAll { bucket: String },
    /// List configured environments
    Environments,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,forge=debug")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    if let Commands::Environments = cli.command {
        for title in settings.environment_titles() {
            println!("{title}");
        }
        return Ok(());
    }

    let env = settings.environment(cli.env.as_deref())?;
    info!(env = %env.title, root = %env.storage_root.display(), "using environment");
    let storage = Arc::new(LocalObjectStorage::new(&env.storage_root));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current request");
            ctrl_c.cancel();
        }
    });

    match cli.command {
        Commands::Upload {
            bucket,
            files,
            name,
            content_type,
        } => {
            let sessions_path = match cli.sessions {
                Some(p) => p,
                None => default_sessions_path().context("cannot determine session file path")?,
            };
            let kv = JsonFileStore::open(sessions_path.clone())
                .with_context(|| format!("failed to open {}", sessions_path.display()))?;
            let uploader = ResumableUploader::new(
                storage,
                SessionStore::new(Arc::new(kv)),
                settings.uploader_config(),
            );

            if let [file] = files.as_slice() {
                upload_single(&uploader, &bucket, file, name, content_type, &cancel).await
            } else {
                if name.is_some() || content_type.is_some() {
                    bail!("--name and --content-type apply to single-file uploads only");
                }
                upload_many(&uploader, &bucket, &files, &cancel).await
            }
        }
        Commands::List { bucket } => {
            let objects = storage.list_objects(&bucket).await?;
            for obj in &objects {
                println!(
                    "{}\t{}\t{}",
                    obj.object_key,
                    obj.size,
                    obj.content_type.as_deref().unwrap_or("-")
                );
            }
            info!(bucket = %bucket, count = objects.len(), "listed objects");
            Ok(())
        }
        Commands::DeleteAll { bucket } => {
            let batch_size = settings.uploader_config().delete_batch_size;
            let progress = logging_progress(format!("deleting objects in {bucket}"));
            let summary =
                delete_all_objects(&*storage, &bucket, batch_size, &progress, &cancel)
                    .await?;
            if summary.cancelled {
                println!("cancelled after deleting {} of {} objects", summary.deleted, summary.listed);
            } else {
                println!("deleted {} objects", summary.deleted);
            }
            Ok(())
        }
        Commands::Environments => Ok(()),
    }
}

async fn upload_single(
    uploader: &ResumableUploader,
    bucket: &str,
    file: &Path,
    name: Option<String>,
    content_type: Option<String>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let name = match name {
        Some(n) => n,
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("file path has no file name")?,
    };
    let content_type = content_type
        .or_else(|| content_type_for(&name).map(str::to_string))
        .or_else(|| uploader.config().default_content_type.clone());
    let target = UploadTarget::for_file(bucket, &name, file)
        .await
        .with_context(|| format!("cannot read {}", file.display()))?
        .with_content_type(content_type);

    let progress = logging_progress(format!("uploading {}", file.display()));
    let outcome = uploader.upload(&target, &progress, cancel).await?;
    print_outcome(file, &outcome);
    Ok(())
}

async fn upload_many(
    uploader: &ResumableUploader,
    bucket: &str,
    files: &[PathBuf],
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let progress = logging_progress(format!("uploading {} files", files.len()));
    let results = upload_files(uploader, bucket, files, &progress, cancel).await;

    let mut failed = 0;
    for (path, result) in &results {
        match result {
            Ok(outcome) => print_outcome(path, outcome),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {e}", path.display());
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} uploads failed", results.len());
    }
    Ok(())
}

fn print_outcome(path: &Path, outcome: &UploadOutcome) {
    match outcome {
        UploadOutcome::Completed { object, .. } => {
            println!("{}: uploaded as {}", path.display(), object.object_id);
        }
        UploadOutcome::Cancelled {
            session_id,
            next_byte,
            ..
        } => {
            println!(
                "{}: cancelled at byte {next_byte} (session {session_id}), rerun to resume",
                path.display()
            );
        }
    }
}

/// Progress tracker that logs each time the total crosses a 10% step.
fn logging_progress(label: String) -> ProgressTracker {
    let tracker = ProgressTracker::new();
    let last_step = AtomicU32::new(0);
    tracker.on_progress(Box::new(move |_increment, percent| {
        let step = (percent / 10.0).floor() as u32;
        if step > last_step.fetch_max(step, Ordering::Relaxed) {
            info!("{label}: {:.0}%", percent);
        }
    }));
    tracker
}

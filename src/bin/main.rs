use anyhow::Result;
use cache_upload::config::DEFAULT_API_URL;
use cache_upload::file_config::FileConfig;
use cache_upload::upload::DEFAULT_PARALLEL;
use cache_upload::upload::part::{DEFAULT_ATTEMPTS, DEFAULT_BACKOFF_BASE};
use cache_upload::{Config, ProgressSink, RetryPolicy, UploadOptions, upload_file};
use clap::{Parser, Subcommand};
use env_logger::Env;
use futures::stream::{self, StreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "cache-upload")]
#[command(about = "Upload files to the OOMOL remote cache", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload one or more files
    Upload {
        /// Files to upload (can specify multiple files)
        files: Vec<String>,

        /// API key for authentication
        #[arg(short = 'k', long, env = "OOMOL_API_KEY")]
        api_key: Option<String>,

        /// API base URL
        #[arg(long, env = "OOMOL_API_URL")]
        api_url: Option<String>,

        /// Path to a JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of parts uploaded concurrently per file (1-32, default: 4).
        /// Total part requests in flight are at most `files-parallel * parallel`.
        #[arg(long)]
        parallel: Option<usize>,

        /// Number of files uploaded concurrently (1-8)
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(u16).range(1..=8))]
        files_parallel: u16,

        /// Attempts per part, including the first one (default: 3)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=20))]
        retries: Option<u32>,

        /// Base backoff between attempts in milliseconds, multiplied by the attempt number (default: 1000)
        #[arg(long)]
        backoff_ms: Option<u64>,

        /// Timeout for a single part attempt in seconds (0 disables)
        #[arg(long, default_value = "300")]
        attempt_timeout: u64,

        /// Overall deadline per file in seconds
        #[arg(long)]
        deadline: Option<u64>,

        /// Upload each file in a single request instead of in parts
        #[arg(long)]
        single: bool,

        /// Abort parts still in flight as soon as one part fails
        #[arg(long)]
        cancel_on_failure: bool,
    },
}

fn progress_bar(multi: &MultiProgress, file_path: &str) -> ProgressBar {
    let filename = Path::new(file_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_path)
        .to_string();

    let pb = multi.add(ProgressBar::new(100));
    #[allow(clippy::expect_used)]
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .expect("Failed to set progress bar template")
            .progress_chars("#>-"),
    );
    pb.set_message(filename);
    pb
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            debug!("Error loading .env file: {e}");
        }
    } else {
        debug!("Loaded environment from .env file");
    }

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result: Result<()> = match cli.command {
        Commands::Upload {
            files,
            api_key,
            api_url,
            config,
            parallel,
            files_parallel,
            retries,
            backoff_ms,
            attempt_timeout,
            deadline,
            single,
            cancel_on_failure,
        } => {
            if files.is_empty() {
                return Err(anyhow::anyhow!("No files specified for upload"));
            }

            let from_flags = FileConfig {
                api_key,
                api_url,
                parallel,
                retries,
                backoff_ms,
            };
            let settings = from_flags.merge_with(&FileConfig::load_with_fallback(config.as_ref())?);

            let parallel = settings.parallel.unwrap_or(DEFAULT_PARALLEL);
            if !(1..=32).contains(&parallel) {
                return Err(anyhow::anyhow!(
                    "Parallel value must be between 1 and 32, got {parallel}"
                ));
            }

            let api_url = settings
                .api_url
                .unwrap_or_else(|| DEFAULT_API_URL.to_string());
            let config = Config::new(settings.api_key.unwrap_or_default(), api_url)?;

            info!("Using API URL: {}", config.api_url);
            info!("Parallel parts per file: {parallel}, files at once: {files_parallel}");

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    error!("Interrupted, cancelling uploads");
                    ctrl_c.cancel();
                }
            });

            let options = UploadOptions {
                parallel,
                retry: RetryPolicy {
                    attempts: settings.retries.unwrap_or(DEFAULT_ATTEMPTS),
                    backoff_base: settings
                        .backoff_ms
                        .map_or(DEFAULT_BACKOFF_BASE, Duration::from_millis),
                    attempt_timeout: (attempt_timeout > 0)
                        .then(|| Duration::from_secs(attempt_timeout)),
                },
                cancel_on_failure,
                single,
                deadline: deadline.map(Duration::from_secs),
                cancel,
            };

            let multi = MultiProgress::new();

            // Up to `files_parallel` files at once, each with up to `parallel` parts in flight
            let results: Vec<(String, cache_upload::Result<String>)> = stream::iter(files)
                .map(|file_path| {
                    let config = config.clone();
                    let options = options.clone();
                    let pb = progress_bar(&multi, &file_path);

                    async move {
                        let sink_pb = pb.clone();
                        let sink: ProgressSink =
                            Arc::new(move |percent| sink_pb.set_position(u64::from(percent)));

                        let result = upload_file(&config, &file_path, options, sink).await;
                        match &result {
                            Ok(_) => pb.finish_with_message(format!("{file_path} uploaded")),
                            Err(_) => pb.abandon_with_message(format!("{file_path} failed")),
                        }
                        (file_path, result)
                    }
                })
                .buffer_unordered(usize::from(files_parallel))
                .collect()
                .await;

            let mut urls = Vec::new();
            let mut errors = Vec::new();

            for (file_path, result) in results {
                match result {
                    Ok(url) => {
                        info!("✅ {file_path} uploaded successfully - URL: {url}");
                        urls.push((file_path, url));
                    }
                    Err(e) => {
                        errors.push(format!("{file_path}: {e}"));
                    }
                }
            }

            if !urls.is_empty() {
                println!("\n✅ Successfully uploaded {} file(s):", urls.len());
                for (file, url) in &urls {
                    println!("  {file} → {url}");
                }
            }

            if errors.is_empty() {
                Ok(())
            } else {
                eprintln!("\n❌ Failed to upload {} file(s):", errors.len());
                for error in &errors {
                    eprintln!("  {error}");
                }
                Err(anyhow::anyhow!("{} file(s) failed to upload", errors.len()))
            }
        }
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Upload failed: {e}");
            std::process::exit(1);
        }
    }
}

//! s3up: 将本地目录上传到 S3

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use s3up_lib::config::{FileConfig, Overrides, Settings};
use s3up_lib::core::scanner::{ListEntry, SourceScanner};
use s3up_lib::core::{SkipReason, UploadEngine, UploadEvent};
use s3up_lib::logging::init_logging;
use s3up_lib::storage::S3Store;
use s3up_lib::SyncError;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "s3up")]
#[command(version)]
#[command(about = "Upload a local directory tree to an S3 bucket")]
struct Cli {
    /// Config file (JSON, or TOML with a .toml extension)
    #[arg(long)]
    config: Option<PathBuf>,

    /// S3 access key
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    access_key: Option<String>,

    /// S3 secret key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// S3 region, resolved from the bucket when omitted
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// S3 bucket
    #[arg(long)]
    bucket: Option<String>,

    /// S3 path prefix
    #[arg(long)]
    prefix: Option<String>,

    /// Local source path to upload
    #[arg(long)]
    source: Option<String>,

    /// Endpoint of an S3-compatible service
    #[arg(long)]
    endpoint: Option<String>,

    /// Don't upload anything, just list files to upload
    #[arg(long)]
    dryrun: bool,

    /// Confirm final settings before triggering upload
    #[arg(long)]
    confirm: bool,

    /// Number of parallel uploads
    #[arg(long, default_value_t = 10)]
    parallel: usize,

    /// Use the md5 hash of a file's contents as the path prefix
    #[arg(long)]
    auto_content_hash_prefix: bool,

    /// Number of bytes of md5 hash to use in the path prefix (max 16)
    #[arg(long, default_value_t = 6)]
    content_hash_bytes: usize,

    /// Only upload files that are new or have changed
    #[arg(long)]
    sync: bool,

    /// List files to be processed as JSON, without uploading
    #[arg(long)]
    list: bool,

    /// TTL for cache control headers (seconds)
    #[arg(long)]
    cache_ttl: Option<u64>,

    /// Log level: error, warn, info, debug, trace
    #[arg(long)]
    log_level: Option<String>,

    /// Keep uploading the remaining files after a file fails
    #[arg(long)]
    continue_on_error: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            region: self.region.clone(),
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
            source: self.source.clone(),
            endpoint: self.endpoint.clone(),
            cache_ttl: self.cache_ttl,
            log_level: self.log_level.clone(),
            dry_run: self.dryrun,
            sync: self.sync,
            list: self.list,
            hash_prefix: self.auto_content_hash_prefix,
            hash_prefix_bytes: self.content_hash_bytes,
            worker_count: self.parallel,
            continue_on_error: self.continue_on_error,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // 不带参数时打印帮助
    if std::env::args_os().len() <= 1 {
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    }

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let file = FileConfig::load(cli.config.as_deref()).context("failed to load config file")?;
    let settings = Settings::resolve(file, &cli.overrides()).context("invalid configuration")?;

    let _log_guard = init_logging(&settings.log);

    let scanner = SourceScanner::new(settings.source_root.clone(), &settings.scan_config())?;

    // 只列出文件，不连接 S3
    if settings.list_only {
        let items = scanner.scan().await?;
        let entries: Vec<ListEntry> = items.iter().map(|item| item.to_list_entry()).collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(ExitCode::SUCCESS);
    }

    let store = S3Store::connect(&settings.bucket, &settings.s3_options())
        .await
        .context("failed to connect to S3")?;
    info!("已连接 s3://{} ({})", settings.bucket, store.region());

    if cli.confirm && !confirm(&settings).await? {
        return Ok(ExitCode::SUCCESS);
    }

    let items = scanner.scan().await?;

    let (tx, rx) = mpsc::channel(256);
    let printer = tokio::spawn(print_events(rx));

    let engine = UploadEngine::new(Arc::new(store), settings.engine_config()).with_events(tx);

    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，正在停止上传...");
            cancel.cancel();
        }
    });

    let result = engine
        .run(items, settings.worker_count, settings.dry_run)
        .await;
    drop(engine);
    if let Err(e) = printer.await {
        warn!("进度输出任务异常退出: {}", e);
    }

    match result {
        Ok(report) => {
            println!("\n{}", summary_line(report.uploaded));
            if report.failed > 0 {
                eprintln!("failed to upload {} files:", report.failed);
                for failure in report.failures() {
                    eprintln!("  {}", failure.key);
                }
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(SyncError::Aborted { uploaded, source }) => {
            println!("\nAborted! uploaded {} files.", uploaded);
            Err(anyhow::Error::new(*source).context("upload aborted"))
        }
        Err(e) => Err(e.into()),
    }
}

/// 打印上传进度
async fn print_events(mut rx: mpsc::Receiver<UploadEvent>) {
    while let Some(event) = rx.recv().await {
        match &event {
            UploadEvent::Failed { .. } => eprintln!("{}", progress_line(&event)),
            _ => println!("{}", progress_line(&event)),
        }
    }
}

fn progress_line(event: &UploadEvent) -> String {
    match event {
        UploadEvent::Uploading { key } => format!("uploading {} ...", key),
        UploadEvent::DryRun { key } => format!("[DRYRUN] uploading {} ...", key),
        UploadEvent::Skipped {
            key,
            reason: SkipReason::AlreadyHashed,
        } => format!("File {} is already on S3", key),
        UploadEvent::Skipped { key, .. } => format!(
            "File {} hasn't been changed (copy on S3 has the same md5-hash in ETag)",
            key
        ),
        UploadEvent::Failed { key, error } => format!("failed to upload {}: {}", key, error),
    }
}

fn summary_line(uploaded: u64) -> String {
    format!("Done! uploaded {} files.", uploaded)
}

/// 打印最终配置并等待用户确认
async fn confirm(settings: &Settings) -> Result<bool> {
    println!("s3up config:");
    println!("------------");
    println!("BUCKET      :  {}", settings.bucket);
    println!("PREFIX      :  {}", settings.prefix);
    println!("SOURCE      :  {}", settings.source_root.display());
    println!("ACL         :  {}", settings.acl);
    println!("IGNORE      :  {:?}", settings.ignore);
    println!("HASH PREFIX :  {}", settings.hash_prefix_enabled);
    println!("SYNC        :  {}", settings.sync_enabled);
    println!();
    print!("upload? (y/n): ");
    use std::io::Write;
    std::io::stdout().flush()?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("failed to read answer")?;

    Ok(matches!(line.chars().next(), Some('y') | Some('Y')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_line() {
        assert_eq!(summary_line(3), "Done! uploaded 3 files.");
    }

    #[test]
    fn test_progress_lines() {
        let key = "/site/a.txt".to_string();
        assert_eq!(
            progress_line(&UploadEvent::Uploading { key: key.clone() }),
            "uploading /site/a.txt ..."
        );
        assert_eq!(
            progress_line(&UploadEvent::DryRun { key: key.clone() }),
            "[DRYRUN] uploading /site/a.txt ..."
        );
        assert_eq!(
            progress_line(&UploadEvent::Skipped {
                key: key.clone(),
                reason: SkipReason::AlreadyHashed,
            }),
            "File /site/a.txt is already on S3"
        );
        assert_eq!(
            progress_line(&UploadEvent::Skipped {
                key,
                reason: SkipReason::Unchanged,
            }),
            "File /site/a.txt hasn't been changed (copy on S3 has the same md5-hash in ETag)"
        );
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["s3up", "--source", "dist", "--bucket", "b"]);
        let overrides = cli.overrides();
        assert_eq!(overrides.worker_count, 10);
        assert_eq!(overrides.hash_prefix_bytes, 6);
        assert!(!overrides.dry_run);
    }
}

//! 日志模块 - 控制台输出和可选的文件日志

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// 日志文件名
pub const LOG_FILE_NAME: &str = "s3up.log";

/// 只保留 warn 以上日志的依赖
const NOISY_TARGETS: &[&str] = &["aws_smithy_runtime", "aws_config", "hyper"];

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否启用日志记录
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
    /// 日志文件目录，不设置时只输出到控制台
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_enabled() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            level: default_level(),
            dir: None,
        }
    }
}

impl LogConfig {
    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }

    /// 构建过滤器；`RUST_LOG` 中的设置优先
    pub fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(self.tracing_level()).into())
            .from_env_lossy();

        for target in NOISY_TARGETS {
            if let Ok(directive) = format!("{}=warn", target).parse() {
                filter = filter.add_directive(directive);
            }
        }
        filter
    }
}

/// 初始化日志系统
///
/// 配置了日志目录时返回文件写入线程的 guard，调用方需要持有到程序退出，
/// 否则缓冲中的日志会丢失。
pub fn init_logging(config: &LogConfig) -> Option<WorkerGuard> {
    if !config.enabled {
        // 日志已禁用，只初始化一个空的 subscriber
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return None;
    }

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let file = config.dir.as_ref().and_then(|dir| match std::fs::create_dir_all(dir) {
        Ok(()) => Some(tracing_appender::non_blocking(
            tracing_appender::rolling::never(dir, LOG_FILE_NAME),
        )),
        Err(e) => {
            // 文件日志创建失败，回退到控制台
            eprintln!("无法创建日志目录 {:?}: {}", dir, e);
            None
        }
    });

    match file {
        Some((writer, guard)) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);

            let subscriber = tracing_subscriber::registry()
                .with(config.env_filter())
                .with(console_layer)
                .with(file_layer);
            let _ = tracing::subscriber::set_global_default(subscriber);
            Some(guard)
        }
        None => {
            let subscriber = tracing_subscriber::registry()
                .with(config.env_filter())
                .with(console_layer);
            let _ = tracing::subscriber::set_global_default(subscriber);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: LogConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, LogConfig::default());
        assert!(config.enabled);
        assert_eq!(config.level, "info");
        assert!(config.dir.is_none());
    }

    #[test]
    fn test_tracing_level() {
        let mut config = LogConfig::default();
        config.level = "DEBUG".to_string();
        assert_eq!(config.tracing_level(), tracing::Level::DEBUG);
        config.level = "nonsense".to_string();
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_noisy_targets_clamped() {
        let filter = LogConfig::default().env_filter().to_string();
        for target in NOISY_TARGETS {
            assert!(filter.contains(&format!("{}=warn", target)), "{}", filter);
        }
    }
}

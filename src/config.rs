//! 应用配置模块 - 配置文件与命令行参数合并

use crate::core::content_type::ContentTypes;
use crate::core::engine::{EngineConfig, FailurePolicy, DEFAULT_WORKER_COUNT};
use crate::core::hasher::{effective_prefix_bytes, MAX_PREFIX_BYTES};
use crate::core::retry::RetryPolicy;
use crate::core::scanner::ScanConfig;
use crate::error::{SyncError, SyncResult};
use crate::logging::LogConfig;
use crate::storage::S3Options;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 默认 ACL
pub const DEFAULT_ACL: &str = "private";
/// 默认内容哈希前缀字节数
pub const DEFAULT_HASH_PREFIX_BYTES: usize = 6;

/// 配置文件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub s3: S3Section,
    #[serde(default)]
    pub log: LogConfig,
}

/// 配置文件中的 `s3` 部分，所有字段可省略
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Section {
    pub access_key: Option<String>,
    #[serde(alias = "access_secret_key")]
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub acl: Option<String>,
    pub cache_control: Option<String>,
    pub expires_after_seconds: Option<u64>,
    pub ignore: Vec<String>,
    pub source: Option<String>,
    /// S3 兼容服务的自定义地址
    pub endpoint: Option<String>,
    pub mime_types: Vec<MimeType>,
}

/// 自定义扩展名对应的 Content-Type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MimeType {
    pub ext: String,
    #[serde(rename = "type")]
    pub content_type: String,
}

impl FileConfig {
    /// 读取配置文件；`.toml` 后缀按 TOML 解析，其余按 JSON；未指定路径时返回空配置
    pub fn load(path: Option<&Path>) -> SyncResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = fs::read_to_string(path).map_err(|e| {
            SyncError::Configuration(format!("无法读取配置文件 {:?}: {}", path, e))
        })?;

        let is_toml = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));
        let parsed = if is_toml {
            toml::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|e| SyncError::Configuration(format!("配置文件格式错误 {:?}: {}", path, e)))
    }
}

/// 命令行中给出的值，优先于配置文件
#[derive(Debug, Clone)]
pub struct Overrides {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub source: Option<String>,
    pub endpoint: Option<String>,
    /// 大于 0 时同时设置过期时间和 Cache-Control
    pub cache_ttl: Option<u64>,
    pub log_level: Option<String>,
    pub dry_run: bool,
    pub sync: bool,
    pub list: bool,
    pub hash_prefix: bool,
    pub hash_prefix_bytes: usize,
    pub worker_count: usize,
    pub continue_on_error: bool,
}

impl Default for Overrides {
    fn default() -> Self {
        Self {
            access_key: None,
            secret_key: None,
            region: None,
            bucket: None,
            prefix: None,
            source: None,
            endpoint: None,
            cache_ttl: None,
            log_level: None,
            dry_run: false,
            sync: false,
            list: false,
            hash_prefix: false,
            hash_prefix_bytes: DEFAULT_HASH_PREFIX_BYTES,
            worker_count: DEFAULT_WORKER_COUNT,
            continue_on_error: false,
        }
    }
}

/// 合并并校验后的运行配置
#[derive(Debug, Clone)]
pub struct Settings {
    pub source_root: PathBuf,
    pub bucket: String,
    pub prefix: String,
    pub acl: String,
    pub cache_control: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub ignore: Vec<String>,
    pub hash_prefix_enabled: bool,
    /// 实际使用的前缀字节数，未开启时为 0
    pub hash_prefix_bytes: usize,
    pub sync_enabled: bool,
    pub dry_run: bool,
    pub list_only: bool,
    pub worker_count: usize,
    pub failure_policy: FailurePolicy,
    pub mime_types: Vec<MimeType>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub log: LogConfig,
}

/// 命令行的非空值优先
fn pick(cli: &Option<String>, file: Option<String>) -> Option<String> {
    cli.clone()
        .filter(|v| !v.is_empty())
        .or(file)
        .filter(|v| !v.is_empty())
}

impl Settings {
    pub fn resolve(file: FileConfig, overrides: &Overrides) -> SyncResult<Self> {
        Self::resolve_at(file, overrides, Utc::now())
    }

    /// 以 `now` 为基准计算过期时间
    pub fn resolve_at(
        file: FileConfig,
        overrides: &Overrides,
        now: DateTime<Utc>,
    ) -> SyncResult<Self> {
        let FileConfig { s3, mut log } = file;

        let source = pick(&overrides.source, s3.source)
            .ok_or_else(|| SyncError::Configuration("未指定源目录".to_string()))?;
        let source_root = fs::canonicalize(&source).map_err(|e| {
            SyncError::Configuration(format!("源目录无效 {}: {}", source, e))
        })?;
        if !source_root.is_dir() {
            return Err(SyncError::Configuration(format!(
                "源路径不是目录: {}",
                source
            )));
        }

        let bucket = pick(&overrides.bucket, s3.bucket).unwrap_or_default();
        if bucket.is_empty() && !overrides.list {
            return Err(SyncError::Configuration("未指定 bucket".to_string()));
        }

        if overrides.worker_count == 0 {
            return Err(SyncError::Configuration(
                "并行数必须大于 0".to_string(),
            ));
        }

        let (expires_after, cache_control) = match overrides.cache_ttl {
            Some(ttl) if ttl > 0 => (Some(ttl), Some(format!("public, max-age={}", ttl))),
            _ => (
                s3.expires_after_seconds,
                s3.cache_control.filter(|v| !v.is_empty()),
            ),
        };
        let expires = match expires_after {
            Some(secs) if secs > 0 => {
                let secs = i64::try_from(secs).map_err(|_| {
                    SyncError::Configuration(format!("过期时间过大: {}", secs))
                })?;
                Some(now + Duration::seconds(secs))
            }
            _ => None,
        };

        if let Some(level) = overrides.log_level.clone().filter(|v| !v.is_empty()) {
            log.level = level;
        }

        Ok(Self {
            source_root,
            bucket,
            prefix: pick(&overrides.prefix, s3.prefix).unwrap_or_default(),
            acl: s3
                .acl
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_ACL.to_string()),
            cache_control,
            expires,
            ignore: s3.ignore,
            hash_prefix_enabled: overrides.hash_prefix,
            hash_prefix_bytes: effective_prefix_bytes(
                overrides.hash_prefix,
                overrides.hash_prefix_bytes.min(MAX_PREFIX_BYTES),
            ),
            sync_enabled: overrides.sync,
            dry_run: overrides.dry_run,
            list_only: overrides.list,
            worker_count: overrides.worker_count,
            failure_policy: if overrides.continue_on_error {
                FailurePolicy::Continue
            } else {
                FailurePolicy::Abort
            },
            mime_types: s3.mime_types,
            access_key: pick(&overrides.access_key, s3.access_key),
            secret_key: pick(&overrides.secret_key, s3.secret_key),
            region: pick(&overrides.region, s3.region),
            endpoint: pick(&overrides.endpoint, s3.endpoint),
            log,
        })
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            ignore_patterns: self.ignore.clone(),
            configured_prefix: self.prefix.clone(),
            hash_prefix_bytes: self.hash_prefix_bytes,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            sync_enabled: self.sync_enabled,
            hash_prefix_enabled: self.hash_prefix_bytes > 0,
            acl: self.acl.clone(),
            cache_control: self.cache_control.clone(),
            expires: self.expires,
            content_types: ContentTypes::new(
                self.mime_types
                    .iter()
                    .map(|m| (m.ext.as_str(), m.content_type.clone())),
            ),
            retry: RetryPolicy::default(),
            failure_policy: self.failure_policy,
        }
    }

    pub fn s3_options(&self) -> S3Options {
        S3Options {
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

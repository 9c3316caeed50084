use crate::core::filter::PathFilter;
use crate::core::hasher::{digest_file, prefix_from_digest, MAX_PREFIX_BYTES};
use crate::core::keys::build_key;
use crate::error::{SyncError, SyncResult};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// 扫描配置
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// 忽略规则（glob patterns）
    pub ignore_patterns: Vec<String>,
    /// 远程 key 的路径前缀
    pub configured_prefix: String,
    /// 哈希前缀使用的摘要字节数，0 表示不使用哈希前缀
    pub hash_prefix_bytes: usize,
}

/// 待上传的文件，扫描时生成，之后不再修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    source_path: PathBuf,
    relative_path: String,
    destination_key: String,
    size_bytes: u64,
    content_digest: String,
    hash_prefix: String,
}

impl UploadItem {
    /// `destination_key` 由相对路径和两个前缀推导，不能单独指定
    pub fn new(
        source_path: PathBuf,
        relative_path: String,
        size_bytes: u64,
        content_digest: String,
        hash_prefix: String,
        configured_prefix: &str,
    ) -> Self {
        let destination_key = build_key(&hash_prefix, configured_prefix, &relative_path);
        Self {
            source_path,
            relative_path,
            destination_key,
            size_bytes,
            content_digest,
            hash_prefix,
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn destination_key(&self) -> &str {
        &self.destination_key
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// 十六进制 MD5
    pub fn content_digest(&self) -> &str {
        &self.content_digest
    }

    pub fn hash_prefix(&self) -> &str {
        &self.hash_prefix
    }

    pub fn to_list_entry(&self) -> ListEntry {
        ListEntry {
            path: self.destination_key.clone(),
            size: self.size_bytes,
            prefix: self.hash_prefix.clone(),
        }
    }
}

/// `--list` 输出的一条记录
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ListEntry {
    pub path: String,
    pub size: u64,
    pub prefix: String,
}

/// 源目录扫描器
#[derive(Debug, Clone)]
pub struct SourceScanner {
    root: PathBuf,
    filter: PathFilter,
    configured_prefix: String,
    hash_prefix_bytes: usize,
}

impl SourceScanner {
    /// 忽略规则在这里编译，规则错误会直接返回
    pub fn new(root: impl Into<PathBuf>, config: &ScanConfig) -> SyncResult<Self> {
        Ok(Self {
            root: root.into(),
            filter: PathFilter::new(&config.ignore_patterns)?,
            configured_prefix: config.configured_prefix.clone(),
            hash_prefix_bytes: config.hash_prefix_bytes.min(MAX_PREFIX_BYTES),
        })
    }

    /// 递归扫描源目录，返回待上传列表
    ///
    /// 同一目录内按文件名排序，结果对同一份文件系统快照是确定的。
    /// 任何 IO 错误都会中止整个扫描。
    pub fn enumerate(&self) -> SyncResult<Vec<UploadItem>> {
        info!("开始扫描源目录: {:?}", self.root);

        let mut items = Vec::new();
        let mut excluded_count = 0usize;

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| self.walk_error(e))?;

            // 跳过根目录本身
            if entry.depth() == 0 {
                continue;
            }

            let path = entry.path();
            let size = if entry.file_type().is_symlink() {
                // 链接指向文件时上传目标内容，指向目录时不展开
                let meta = std::fs::metadata(path).map_err(|source| SyncError::Traversal {
                    path: path.to_path_buf(),
                    source,
                })?;
                if !meta.is_file() {
                    continue;
                }
                meta.len()
            } else if entry.file_type().is_file() {
                entry.metadata().map_err(|e| self.walk_error(e))?.len()
            } else {
                continue;
            };

            let relative_path = self.relative_path(path)?;
            if !self.filter.is_uploadable(&relative_path) {
                debug!("排除文件: {}", relative_path);
                excluded_count += 1;
                continue;
            }

            let digest = digest_file(path).map_err(|source| SyncError::Traversal {
                path: path.to_path_buf(),
                source,
            })?;
            let hash_prefix = prefix_from_digest(&digest, self.hash_prefix_bytes);

            let item = UploadItem::new(
                path.to_path_buf(),
                relative_path,
                size,
                digest.to_hex(),
                hash_prefix,
                &self.configured_prefix,
            );
            debug!("待上传: {} -> {}", item.relative_path(), item.destination_key());
            items.push(item);
        }

        info!(
            "扫描完成: {} 个文件待上传, {} 个被排除",
            items.len(),
            excluded_count
        );

        Ok(items)
    }

    /// 在阻塞线程池中扫描，避免阻塞 async runtime
    pub async fn scan(self) -> SyncResult<Vec<UploadItem>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || self.enumerate())
            .await
            .map_err(|e| SyncError::Traversal {
                path: root,
                source: io::Error::new(io::ErrorKind::Other, e.to_string()),
            })?
    }

    /// 去掉根目录前缀，统一使用 `/` 分隔
    fn relative_path(&self, path: &Path) -> SyncResult<String> {
        let relative = path.strip_prefix(&self.root).map_err(|_| SyncError::Traversal {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "路径不在源目录内"),
        })?;

        let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
        parts
            .map(|p| p.join("/"))
            .ok_or_else(|| SyncError::Traversal {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidData, "文件名不是有效的 UTF-8"),
            })
    }

    fn walk_error(&self, err: walkdir::Error) -> SyncError {
        let path = err
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        let message = err.to_string();
        let source = err
            .into_io_error()
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, message));
        SyncError::Traversal { path, source }
    }
}

/// 按给定配置扫描 `source_root`
pub fn enumerate(source_root: &Path, config: &ScanConfig) -> SyncResult<Vec<UploadItem>> {
    SourceScanner::new(source_root, config)?.enumerate()
}

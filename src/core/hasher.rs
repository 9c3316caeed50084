//! 内容哈希
//!
//! 使用 MD5：S3 对单次 PUT 上传的对象返回的 ETag 就是内容的 MD5，
//! 同步模式下可以直接与远程 ETag 比较。

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use md5::{Digest, Md5};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// 哈希前缀最多使用的字节数（MD5 共 16 字节）
pub const MAX_PREFIX_BYTES: usize = 16;

/// 文件内容摘要
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 16]);

impl ContentDigest {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// 小写十六进制
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// 流式计算整个输入的摘要
pub fn digest<R: Read>(mut reader: R) -> io::Result<ContentDigest> {
    let mut hasher = Md5::new();
    io::copy(&mut reader, &mut hasher)?;

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hasher.finalize());
    Ok(ContentDigest(bytes))
}

/// 打开文件并计算摘要，文件句柄在返回前释放
pub fn digest_file(path: &Path) -> io::Result<ContentDigest> {
    let file = File::open(path)?;
    digest(BufReader::with_capacity(64 * 1024, file))
}

/// 取摘要前 `prefix_bytes` 个字节，编码为去掉填充的 URL 安全 base64
///
/// 超过 16 的值按 16 处理；0 返回空字符串。
pub fn prefix_from_digest(digest: &ContentDigest, prefix_bytes: usize) -> String {
    let n = prefix_bytes.min(MAX_PREFIX_BYTES);
    if n == 0 {
        return String::new();
    }
    URL_SAFE_NO_PAD.encode(&digest.as_bytes()[..n])
}

/// 实际生效的前缀字节数，未开启哈希前缀时为 0
pub fn effective_prefix_bytes(enabled: bool, requested: usize) -> usize {
    if enabled {
        requested.min(MAX_PREFIX_BYTES)
    } else {
        0
    }
}

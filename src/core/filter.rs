use crate::error::{SyncError, SyncResult};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// 忽略规则过滤器
///
/// 规则为 shell glob，`*` 不跨越 `/`，`**` 可以匹配任意层目录。
/// 任意一条规则命中即排除该路径。
#[derive(Debug, Clone)]
pub struct PathFilter {
    set: GlobSet,
}

impl PathFilter {
    /// 编译忽略规则，非法规则直接返回错误
    pub fn new(patterns: &[String]) -> SyncResult<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|source| SyncError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })?;
            builder.add(glob);
        }

        let set = builder.build().map_err(|source| SyncError::Pattern {
            pattern: patterns.join(", "),
            source,
        })?;

        Ok(Self { set })
    }

    /// 相对路径是否需要上传（未被任何规则命中）
    pub fn is_uploadable(&self, relative_path: &str) -> bool {
        if self.set.is_empty() {
            return true;
        }
        let normalized = relative_path.replace('\\', "/");
        !self.set.is_match(normalized.as_str())
    }
}

/// 单次判断，适合只检查少量路径的场景
pub fn is_uploadable(relative_path: &str, ignore_patterns: &[String]) -> SyncResult<bool> {
    Ok(PathFilter::new(ignore_patterns)?.is_uploadable(relative_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_patterns_allow_everything() {
        let filter = PathFilter::new(&[]).unwrap();
        assert!(filter.is_uploadable("a.txt"));
        assert!(filter.is_uploadable("deep/nested/file.bin"));
    }

    #[test]
    fn test_double_star_crosses_directories() {
        let filter = PathFilter::new(&patterns(&["skip/**"])).unwrap();
        assert!(!filter.is_uploadable("skip/b.txt"));
        assert!(!filter.is_uploadable("skip/x/y/z.txt"));
        assert!(filter.is_uploadable("a.txt"));
        assert!(filter.is_uploadable("keep/skip/b.txt"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let filter = PathFilter::new(&patterns(&["*.tmp"])).unwrap();
        assert!(!filter.is_uploadable("x.tmp"));
        assert!(filter.is_uploadable("dir/x.tmp"));

        let filter = PathFilter::new(&patterns(&["**/*.tmp"])).unwrap();
        assert!(!filter.is_uploadable("dir/x.tmp"));
        assert!(!filter.is_uploadable("x.tmp"));
    }

    #[test]
    fn test_any_pattern_excludes() {
        let filter = PathFilter::new(&patterns(&[".git/**", "**/.DS_Store"])).unwrap();
        assert!(!filter.is_uploadable(".git/config"));
        assert!(!filter.is_uploadable("img/.DS_Store"));
        assert!(filter.is_uploadable("img/logo.png"));
    }

    #[test]
    fn test_backslash_paths_are_normalized() {
        let filter = PathFilter::new(&patterns(&["skip/**"])).unwrap();
        assert!(!filter.is_uploadable("skip\\b.txt"));
    }

    #[test]
    fn test_malformed_pattern_is_error() {
        let err = PathFilter::new(&patterns(&["ok/**", "bad[pattern"])).unwrap_err();
        match err {
            SyncError::Pattern { pattern, .. } => assert_eq!(pattern, "bad[pattern"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(is_uploadable("a.txt", &patterns(&["{unclosed"])).is_err());
    }
}

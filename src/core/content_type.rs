use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// 按扩展名确定 Content-Type，配置中的自定义类型优先
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    overrides: HashMap<String, String>,
}

impl ContentTypes {
    /// `overrides` 的 key 为扩展名，可以带前导 `.`，大小写不敏感
    pub fn new<I, K, V>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let overrides = overrides
            .into_iter()
            .map(|(ext, typ)| (normalize_ext(ext.as_ref()), typ.into()))
            .filter(|(ext, _)| !ext.is_empty())
            .collect();
        Self { overrides }
    }

    pub fn for_path(&self, path: &Path) -> String {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(normalize_ext)
            .unwrap_or_default();

        if let Some(typ) = self.overrides.get(&ext) {
            return typ.clone();
        }

        mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string()
    }
}

fn normalize_ext(ext: &str) -> String {
    ext.trim_start_matches('.').to_lowercase()
}

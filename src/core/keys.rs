/// 生成远程对象 key：`/` + 哈希前缀 + 配置前缀 + 相对路径
///
/// 分隔符统一为 `/`，空段和 `.` 段被折叠，`..` 回退上一段，结果总是以 `/` 开头。
pub fn build_key(hash_prefix: &str, configured_prefix: &str, relative_path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for part in [hash_prefix, configured_prefix, relative_path] {
        for seg in part.split(['/', '\\']) {
            match seg {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s),
            }
        }
    }

    let mut key = String::with_capacity(
        hash_prefix.len() + configured_prefix.len() + relative_path.len() + 3,
    );
    key.push('/');
    key.push_str(&segments.join("/"));
    key
}

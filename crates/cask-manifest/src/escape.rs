/// Escape a stream or file name for manifest text.
pub fn escape_name(name: &str) -> String {
    name.replace(' ', "\\040")
}

/// Reverse [`escape_name`].
pub fn unescape_name(token: &str) -> String {
    token.replace("\\040", " ")
}

/// Canonical stream name: `.` or a path beginning with `./`.
pub fn normalize_stream_name(name: &str) -> String {
    if name.is_empty() || name == "." {
        ".".to_string()
    } else if name.starts_with("./") {
        name.to_string()
    } else {
        format!("./{name}")
    }
}

/// Returns `true` if a `/`-separated path has an empty component (empty,
/// leading or trailing `/`, or `//`).
pub(crate) fn has_empty_component(path: &str) -> bool {
    path.split('/').any(str::is_empty)
}

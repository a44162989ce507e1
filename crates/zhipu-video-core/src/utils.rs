//! Utility functions

/// Truncates a string to at most `max_chars` characters, respecting UTF-8 boundaries.
///
/// # Examples
///
/// ```
/// use zhipu_video_core::utils::truncate_str;
/// let s = "视频生成成功";
/// assert_eq!(truncate_str(s, 2), "视频");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Normalizes a free-form command argument: trims it and maps blank to `None`.
#[must_use]
pub fn non_blank(arg: &str) -> Option<&str> {
    let trimmed = arg.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

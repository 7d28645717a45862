//! Tail of the filtering program's log file

use std::path::Path;

/// Lines returned by `/api/logs`
pub const LOG_TAIL_LINES: usize = 100;

/// Last `count` non-blank lines of `path`, oldest first.
pub async fn read_recent_lines(path: &Path, count: usize) -> std::io::Result<Vec<String>> {
    let bytes = tokio::fs::read(path).await?;
    Ok(tail_lines(&String::from_utf8_lossy(&bytes), count))
}

pub(crate) fn tail_lines(text: &str, count: usize) -> Vec<String> {
    let mut lines: Vec<String> = text
        .lines()
        .rev()
        .filter(|line| !line.trim().is_empty())
        .take(count)
        .map(String::from)
        .collect();
    lines.reverse();
    lines
}

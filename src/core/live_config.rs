//! Reader for the filtering program's live configuration
//!
//! The filtering program keeps the ports it enforces in a plain text file:
//!
//! ```text
//! default_ports = 22,80,443
//! custom_ports = 8080,9000
//! ```
//!
//! This view is read-only here; it changes only through the program's own
//! `--add` / `--del` commands.

use crate::core::ports::PortSet;
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_KEY: &str = "default_ports";
const CUSTOM_KEY: &str = "custom_ports";

pub struct LiveConfigReader {
    path: PathBuf,
}

impl LiveConfigReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ports currently enforced, or `None` if the file is unreadable or holds
    /// no port declarations. `None` tells callers to fall back to the state
    /// record.
    pub async fn read_ports(&self) -> Option<PortSet> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => parse_ports(&text),
            Err(e) => {
                debug!("Live config {:?} unavailable: {e}", self.path);
                None
            }
        }
    }
}

/// Parses the union of the `default_ports` and `custom_ports` declarations.
///
/// The first line starting with each key wins. Entries that are empty,
/// non-numeric or outside `1..=65535` are dropped individually.
pub fn parse_ports(text: &str) -> Option<PortSet> {
    let defaults = declaration(text, DEFAULT_KEY);
    let custom = declaration(text, CUSTOM_KEY);

    if defaults.is_none() && custom.is_none() {
        return None;
    }

    Some(
        defaults
            .into_iter()
            .chain(custom)
            .flat_map(|value| value.split(','))
            .filter_map(|entry| entry.trim().parse::<u16>().ok())
            .collect(),
    )
}

/// Value of the first `key = value` line, up to any further `=`.
fn declaration<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let line = text.lines().map(str::trim).find(|l| l.starts_with(key))?;
    Some(line.split('=').nth(1).unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_sorted_and_deduplicated() {
        let ports = parse_ports("default_ports = 22,80\ncustom_ports = 80,443\n").unwrap();
        assert_eq!(ports.to_vec(), vec![22, 80, 443]);
    }

    #[test]
    fn test_malformed_entries_are_dropped() {
        let ports =
            parse_ports("default_ports = 22, abc, ,80\ncustom_ports = 0,70000,8080,-5\n").unwrap();
        assert_eq!(ports.to_vec(), vec![22, 80, 8080]);
    }

    #[test]
    fn test_missing_custom_line() {
        let ports = parse_ports("# comment\n  default_ports=53,25\n").unwrap();
        assert_eq!(ports.to_vec(), vec![25, 53]);
    }

    #[test]
    fn test_empty_declarations_are_authoritative() {
        let ports = parse_ports("default_ports =\ncustom_ports = \n").unwrap();
        assert!(ports.is_empty());
    }

    #[test]
    fn test_no_declarations_is_absent() {
        assert!(parse_ports("").is_none());
        assert!(parse_ports("interface = eth0\n").is_none());
    }

    #[test]
    fn test_first_declaration_wins() {
        let ports = parse_ports("custom_ports = 1\ncustom_ports = 2\n").unwrap();
        assert_eq!(ports.to_vec(), vec![1]);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let reader = LiveConfigReader::new(dir.path().join("firewall.conf"));
        assert!(reader.read_ports().await.is_none());
    }

    #[tokio::test]
    async fn test_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firewall.conf");
        std::fs::write(&path, "default_ports = 22\ncustom_ports = 3000\n").unwrap();

        let ports = LiveConfigReader::new(&path).read_ports().await.unwrap();
        assert_eq!(ports.to_vec(), vec![22, 3000]);
    }
}

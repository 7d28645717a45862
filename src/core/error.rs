use thiserror::Error;

/// Core error types for portgate
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Input validation failed
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// Operation is not allowed in the current firewall state
    #[error("{0}")]
    Conflict(String),

    /// Filtering program invocation failed (spawn error, non-zero exit, timeout)
    #[error("{message}")]
    Execution {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    /// Privilege escalation failed
    #[error("Elevation error: {0}")]
    Elevation(#[from] crate::elevation::ElevationError),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Builds an execution error from captured program output.
    ///
    /// The stderr text is surfaced verbatim when present, matching what the
    /// operator would see running the program by hand.
    pub fn execution(stderr: &str, exit_code: Option<i32>) -> Self {
        let trimmed = stderr.trim();
        let message = if trimmed.is_empty() {
            match exit_code {
                Some(code) => format!("Filtering program exited with status {code}"),
                None => "Filtering program terminated by signal".to_string(),
            }
        } else {
            trimmed.to_string()
        };
        Self::Execution {
            message,
            stderr: (!trimmed.is_empty()).then(|| trimmed.to_string()),
            exit_code,
        }
    }

    /// Stderr captured from the filtering program, if this is an execution failure.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Execution { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Database of filtering-program failure patterns and their translations
pub struct ExecutionErrorPattern;

impl ExecutionErrorPattern {
    /// Matches program stderr against known patterns.
    ///
    /// Returns `None` when nothing matches; the raw stderr is already the
    /// best message in that case.
    pub fn match_error(msg: &str) -> Option<ErrorTranslation> {
        let lower = msg.to_lowercase();

        // sudo -n refuses to prompt
        if lower.contains("a password is required") || lower.contains("a terminal is required") {
            return Some(
                ErrorTranslation::new("Elevation requires a password but the server cannot prompt")
                    .with_suggestion("Add a NOPASSWD sudoers rule for the filtering program")
                    .with_suggestion("Or run portgate as root"),
            );
        }

        if lower.contains("permission denied") || lower.contains("operation not permitted") {
            return Some(
                ErrorTranslation::new("Insufficient permissions to control the filtering program")
                    .with_suggestion("Check the configured elevation method")
                    .with_suggestion("Check if CAP_NET_ADMIN and CAP_BPF are available"),
            );
        }

        if lower.contains("no such file") || lower.contains("command not found") {
            return Some(
                ErrorTranslation::new("Filtering program or its interpreter was not found")
                    .with_suggestion("Verify `program` and `interpreter` in the configuration")
                    .with_suggestion("Relative paths are resolved against `root_dir`"),
            );
        }

        if lower.contains("no such device") || lower.contains("cannot find device") {
            return Some(
                ErrorTranslation::new("Network interface not found")
                    .with_suggestion("Check available interfaces: ip link show"),
            );
        }

        if lower.contains("bpf") && (lower.contains("failed") || lower.contains("error")) {
            return Some(
                ErrorTranslation::new("Failed to load the eBPF/XDP program")
                    .with_suggestion("Check the kernel supports XDP on this interface")
                    .with_suggestion("Verify the bcc toolchain is installed"),
            );
        }

        if lower.contains("timed out") {
            return Some(
                ErrorTranslation::new("Filtering program did not respond in time")
                    .with_suggestion("Increase `timeouts.command_ms` if the host is slow"),
            );
        }

        None
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_uses_stderr_verbatim() {
        let err = Error::execution("  Port already present\n", Some(1));
        assert_eq!(err.to_string(), "Port already present");
        assert_eq!(err.stderr(), Some("Port already present"));
    }

    #[test]
    fn test_execution_without_stderr_reports_exit_code() {
        let err = Error::execution("", Some(3));
        assert!(err.to_string().contains("status 3"));
        assert!(err.stderr().is_none());
    }

    #[test]
    fn test_sudo_password_required() {
        let translation =
            ExecutionErrorPattern::match_error("sudo: a password is required").unwrap();
        assert!(translation.user_message.contains("password"));
        assert!(translation.suggestions.iter().any(|s| s.contains("NOPASSWD")));
    }

    #[test]
    fn test_missing_interpreter() {
        let translation =
            ExecutionErrorPattern::match_error("python3: No such file or directory").unwrap();
        assert!(translation.user_message.contains("not found"));
    }

    #[test]
    fn test_bpf_failure() {
        let translation =
            ExecutionErrorPattern::match_error("Failed to load BPF program: error 22").unwrap();
        assert!(translation.user_message.contains("eBPF"));
    }

    #[test]
    fn test_unknown_error_has_no_translation() {
        assert!(ExecutionErrorPattern::match_error("something odd").is_none());
    }
}

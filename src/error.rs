use std::time::Duration;

/// Every failure the facade can report to its caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    #[error("{tool} is not installed or not in PATH")]
    ToolNotFound { tool: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    ResourceNotFound(String),

    #[error("{tool} failed ({}): {stderr}", exit_label(.code))]
    ExecutionFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} timed out after {}s", whole_secs(.after))]
    Timeout { tool: String, after: Duration },

    #[error("Unparsable tool output: {line:?}")]
    ParseFailure { line: String },
}

/// Fieldless view of [`OperationError`] for callers that only branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ToolNotFound,
    InvalidInput,
    ResourceNotFound,
    ExecutionFailed,
    Timeout,
    ParseFailure,
}

impl OperationError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        OperationError::InvalidInput(reason.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        OperationError::ResourceNotFound(what.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OperationError::ToolNotFound { .. } => ErrorKind::ToolNotFound,
            OperationError::InvalidInput(_) => ErrorKind::InvalidInput,
            OperationError::ResourceNotFound(_) => ErrorKind::ResourceNotFound,
            OperationError::ExecutionFailed { .. } => ErrorKind::ExecutionFailed,
            OperationError::Timeout { .. } => ErrorKind::Timeout,
            OperationError::ParseFailure { .. } => ErrorKind::ParseFailure,
        }
    }

    /// Message suitable for showing to an end user.
    ///
    /// Tool stderr is included only for execution failures; timeouts and
    /// missing tools get a fixed sentence.
    pub fn user_message(&self) -> String {
        match self {
            OperationError::ToolNotFound { tool } => {
                format!("{} is not installed or not in PATH.", tool)
            }
            OperationError::InvalidInput(reason) => format!("Invalid input: {}.", reason),
            OperationError::ResourceNotFound(what) => format!("{} does not exist.", what),
            OperationError::ExecutionFailed { tool, stderr, .. } => {
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    format!("{} reported a failure.", tool)
                } else {
                    format!("{} reported a failure:\n{}", tool, stderr)
                }
            }
            OperationError::Timeout { tool, .. } => {
                format!("{} did not finish in time and was stopped.", tool)
            }
            OperationError::ParseFailure { .. } => {
                "The tool produced output that could not be understood.".to_string()
            }
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

fn whole_secs(after: &Duration) -> u64 {
    after.as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_includes_stderr_only_for_execution_failures() {
        let failed = OperationError::ExecutionFailed {
            tool: "docker".into(),
            code: Some(1),
            stderr: "Error: No such container: abc\n".into(),
        };
        assert!(failed.user_message().contains("No such container: abc"));

        let timeout = OperationError::Timeout {
            tool: "docker".into(),
            after: Duration::from_secs(30),
        };
        assert_eq!(
            timeout.user_message(),
            "docker did not finish in time and was stopped."
        );

        let missing = OperationError::ToolNotFound {
            tool: "qemu-img".into(),
        };
        assert_eq!(
            missing.user_message(),
            "qemu-img is not installed or not in PATH."
        );
    }

    #[test]
    fn display_reports_signal_termination() {
        let err = OperationError::ExecutionFailed {
            tool: "virsh".into(),
            code: None,
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "virsh failed (terminated by signal): ");
        assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
    }
}

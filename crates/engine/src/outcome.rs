use std::fmt::{Display, Formatter, Result as FmtResult};

/// How a single engine invocation ended.
///
/// The exit code mapping is fixed by the engine: `0` success, `1` system
/// error, `2` success with warnings. Anything else (including death by
/// signal, where there is no code) is [`Unknown`](Self::Unknown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineStatus {
    Success,
    SystemError,
    ToolWarning,
    Unknown(Option<i32>),
    /// The wait bound elapsed and the process was killed.
    TimedOut,
    /// Cancellation was requested while waiting and the process was killed.
    Cancelled,
}

impl EngineStatus {
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => Self::Success,
            Some(1) => Self::SystemError,
            Some(2) => Self::ToolWarning,
            other => Self::Unknown(other),
        }
    }

    /// A fatal status aborts the remaining arrangements of the current
    /// container, and the container is not repacked.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SystemError | Self::TimedOut | Self::Cancelled)
    }

    /// Whether the arrangement was (re)written and its metadata can be
    /// derived from it.
    pub fn produced_output(&self) -> bool {
        matches!(self, Self::Success | Self::ToolWarning)
    }
}

impl Display for EngineStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Success => write!(f, "success"),
            Self::SystemError => write!(f, "system error"),
            Self::ToolWarning => write!(f, "completed with warnings"),
            Self::Unknown(Some(code)) => write!(f, "unknown failure (exit code {code})"),
            Self::Unknown(None) => write!(f, "unknown failure (terminated)"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The status of an engine run plus everything it wrote to standard output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutcome {
    pub status: EngineStatus,
    pub stdout: String,
}

impl EngineOutcome {
    pub fn new(status: EngineStatus, stdout: impl Into<String>) -> Self {
        Self { status, stdout: stdout.into() }
    }

    pub fn is_success(&self) -> bool {
        self.status == EngineStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(0), EngineStatus::Success)]
    #[case(Some(1), EngineStatus::SystemError)]
    #[case(Some(2), EngineStatus::ToolWarning)]
    #[case(Some(3), EngineStatus::Unknown(Some(3)))]
    #[case(Some(-1), EngineStatus::Unknown(Some(-1)))]
    #[case(Some(255), EngineStatus::Unknown(Some(255)))]
    #[case(None, EngineStatus::Unknown(None))]
    fn exit_code_mapping(#[case] code: Option<i32>, #[case] expected: EngineStatus) {
        assert_eq!(EngineStatus::from_exit_code(code), expected);
    }

    #[rstest]
    #[case(EngineStatus::Success, false, true)]
    #[case(EngineStatus::ToolWarning, false, true)]
    #[case(EngineStatus::SystemError, true, false)]
    #[case(EngineStatus::Unknown(Some(7)), false, false)]
    #[case(EngineStatus::TimedOut, true, false)]
    #[case(EngineStatus::Cancelled, true, false)]
    fn status_semantics(#[case] status: EngineStatus, #[case] fatal: bool, #[case] output: bool) {
        assert_eq!(status.is_fatal(), fatal);
        assert_eq!(status.produced_output(), output);
    }
}

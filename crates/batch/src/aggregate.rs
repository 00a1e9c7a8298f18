use ddforge_engine::{EngineOutcome, EngineStatus};
use ddforge_package::DifficultyMode;
use derive_more::Display;

/// Terminal status of a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum BatchStatus {
    #[display("all succeeded")]
    AllSucceeded,
    #[display("system error")]
    SystemError,
    #[display("succeeded with warnings")]
    SucceededWithWarnings,
    #[display("unknown failure")]
    UnknownFailure,
}

impl BatchStatus {
    /// Reduce a set of statuses; the order they arrived in does not matter.
    ///
    /// Nothing to reduce counts as success.
    pub fn reduce<'a>(statuses: impl IntoIterator<Item = &'a EngineStatus>) -> Self {
        let (mut all_success, mut system_error, mut warning) = (true, false, false);
        for status in statuses {
            all_success &= *status == EngineStatus::Success;
            system_error |= *status == EngineStatus::SystemError;
            warning |= *status == EngineStatus::ToolWarning;
        }
        match (all_success, system_error, warning) {
            (true, _, _) => Self::AllSucceeded,
            (_, true, _) => Self::SystemError,
            (_, _, true) => Self::SucceededWithWarnings,
            _ => Self::UnknownFailure,
        }
    }

    /// Whether the requested change was applied, possibly with warnings.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::AllSucceeded | Self::SucceededWithWarnings)
    }
}

/// The outcome of a batch as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub status: BatchStatus,
    /// Output of every run that did not plainly succeed, in processing order.
    pub transcript: String,
}

impl BatchResult {
    pub fn message(&self, mode: DifficultyMode) -> String {
        match self.status {
            BatchStatus::AllSucceeded => format!("Dynamic difficulty {}!", mode.verb()),
            BatchStatus::SystemError => format!("DDC error! System Error. See below:\n{}", self.transcript),
            BatchStatus::SucceededWithWarnings => {
                format!("Dynamic difficulty {} with errors! See below:\n{}", mode.verb(), self.transcript)
            },
            BatchStatus::UnknownFailure => "DDC error! See ddc.log".to_string(),
        }
    }
}

/// Collects engine outcomes over a batch and reduces them into a [`BatchResult`].
#[derive(Debug, Default)]
pub struct ResultAggregator {
    statuses: Vec<EngineStatus>,
    transcript: Vec<String>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome. Outcomes of arrangements inside a container carry
    /// the arrangement's name so the transcript says which one complained.
    pub fn record(&mut self, arrangement: Option<&str>, outcome: EngineOutcome) {
        let stdout = outcome.stdout.trim_end();
        if !outcome.is_success() && !stdout.is_empty() {
            self.transcript.push(match arrangement {
                Some(name) => format!("Arrangement file '{name}' => {stdout}"),
                None => stdout.to_string(),
            });
        }
        self.statuses.push(outcome.status);
    }

    /// Reduction of everything recorded from `mark` onwards.
    pub fn status_since(&self, mark: usize) -> BatchStatus {
        BatchStatus::reduce(self.statuses.get(mark..).unwrap_or_default())
    }

    /// Number of outcomes recorded so far, for use with [`status_since`](Self::status_since).
    pub fn mark(&self) -> usize {
        self.statuses.len()
    }

    pub fn finish(self) -> BatchResult {
        BatchResult { status: BatchStatus::reduce(&self.statuses), transcript: self.transcript.join("\n") }
    }
}

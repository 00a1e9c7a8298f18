use ddforge_engine::Invocation;
use ddforge_package::DifficultyMode;
use std::path::{Path, PathBuf};

pub const DEFAULT_PHRASE_LENGTH: u16 = 32;

/// Settings for one batch, fixed when the batch starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    pub phrase_length: u16,
    pub remove_sustain: bool,
    /// Absent means the engine falls back to its own default ramp-up.
    pub ramp_model: Option<PathBuf>,
    /// Delete superseded files once their replacement exists.
    pub clean: bool,
    pub keep_log: bool,
    pub mode: DifficultyMode,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            phrase_length: DEFAULT_PHRASE_LENGTH,
            remove_sustain: false,
            ramp_model: None,
            clean: false,
            keep_log: false,
            mode: DifficultyMode::Generate,
        }
    }
}

impl BatchOptions {
    /// Engine invocation for a loose arrangement.
    pub fn loose_invocation(&self, arrangement: &Path) -> Invocation {
        Invocation {
            arrangement: arrangement.to_path_buf(),
            phrase_length: self.phrase_length,
            remove_sustain: self.remove_sustain,
            ramp_model: self.ramp_model.clone(),
            clean: self.clean,
            keep_log: self.keep_log,
        }
    }

    /// Engine invocation for an arrangement inside an unpacked container.
    ///
    /// The scratch tree is repacked as-is, so the engine must replace the
    /// arrangement in place and must not leave a log behind.
    pub fn inner_invocation(&self, arrangement: &Path) -> Invocation {
        Invocation { clean: true, keep_log: false, ..self.loose_invocation(arrangement) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_runs_force_clean_without_log() {
        let options = BatchOptions { clean: false, keep_log: true, remove_sustain: true, ..Default::default() };
        let loose = options.loose_invocation(Path::new("/songs/a.xml"));
        assert!(!loose.clean && loose.keep_log && loose.remove_sustain);
        let inner = options.inner_invocation(Path::new("/tmp/x/a.xml"));
        assert!(inner.clean && !inner.keep_log && inner.remove_sustain);
        assert_eq!(inner.phrase_length, DEFAULT_PHRASE_LENGTH);
    }
}

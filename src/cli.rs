use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ddforge", version, about = "Generate or remove dynamic difficulty in arrangements and song packages")]
pub struct Cli {
    /// Configuration file, merged over the user configuration.
    #[arg(long, global = true, env = "DDFORGE_CONFIG")]
    pub config: Option<PathBuf>,
    /// More output; repeat for even more.
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,
    /// Only report warnings and errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process arrangement files and song packages.
    Run(RunArgs),
    /// List the available ramp-up models.
    Models,
    /// Copy a ramp-up model into the catalog.
    ImportModel {
        file: PathBuf,
    },
}

/// Options left unset fall back to the configured defaults.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Phrase length, in seconds.
    #[arg(short = 'l', long, value_parser = clap::value_parser!(u16).range(1..))]
    pub phrase_length: Option<u16>,
    /// Remove sustains while generating.
    #[arg(short = 's', long, overrides_with = "no_remove_sustain")]
    pub remove_sustain: bool,
    #[arg(long, overrides_with = "remove_sustain")]
    pub no_remove_sustain: bool,
    /// Ramp-up model, by catalog name or path.
    #[arg(short, long)]
    pub model: Option<String>,
    /// Remove dynamic difficulty instead of generating it; selects the remover model.
    #[arg(long)]
    pub remove: bool,
    /// Delete superseded files once their replacements exist.
    #[arg(long, overrides_with = "no_clean")]
    pub clean: bool,
    #[arg(long, overrides_with = "clean")]
    pub no_clean: bool,
    /// Keep the engine's log next to each arrangement.
    #[arg(long, overrides_with = "no_keep_log")]
    pub keep_log: bool,
    #[arg(long, overrides_with = "keep_log")]
    pub no_keep_log: bool,
    /// Seconds to wait on a single engine run before killing it.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,
    /// Arrangement XML files and song packages.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

impl RunArgs {
    pub fn remove_sustain_or(&self, default: bool) -> bool {
        toggle(self.remove_sustain, self.no_remove_sustain, default)
    }

    pub fn clean_or(&self, default: bool) -> bool {
        toggle(self.clean, self.no_clean, default)
    }

    pub fn keep_log_or(&self, default: bool) -> bool {
        toggle(self.keep_log, self.no_keep_log, default)
    }
}

/// A `--flag`/`--no-flag` pair; whichever came last wins, neither keeps `default`.
fn toggle(on: bool, off: bool, default: bool) -> bool {
    match (on, off) {
        (true, _) => true,
        (_, true) => false,
        _ => default,
    }
}

impl Cli {
    /// Default log filter when `RUST_LOG` is not set.
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }
}

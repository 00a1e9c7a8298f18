mod cli;
mod error;

use crate::cli::{Cli, Command, RunArgs};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use ddforge_batch::{Admission, BatchCoordinator, BatchEvent, BatchOptions, WorkSet};
use ddforge_config::Config;
use ddforge_engine::ramp::REMOVER_MODEL;
use ddforge_engine::{EngineInvoker, RampModel, RampModels};
use ddforge_package::backend::CommandPacker;
use ddforge_package::{ContainerAdapter, DifficultyMode};
use exn::{OptionExt, ResultExt};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level())))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match execute(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(2)
        },
    }
}

fn execute(cli: Cli) -> Result<ExitCode> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    match cli.command {
        Command::Run(args) => run(&config, args),
        Command::Models => list_models(&config),
        Command::ImportModel { file } => import_model(&config, &file),
    }
}

fn list_models(config: &Config) -> Result<ExitCode> {
    let models = RampModels::discover(config.engine_dir()).or_raise(|| ErrorKind::Models)?;
    if models.is_empty() {
        tracing::warn!(dir = %config.engine_dir().display(), "No ramp-up models installed");
    }
    let default = models.default_model().map(|model| model.name.as_str());
    for model in models.iter() {
        let marker = match Some(model.name.as_str()) == default {
            true => '*',
            false => ' ',
        };
        println!("{marker} {}\t{}", model.name, model.path.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn import_model(config: &Config, file: &Path) -> Result<ExitCode> {
    let model = RampModels::import(config.engine_dir(), file).or_raise(|| ErrorKind::Models)?;
    println!("Imported ramp-up model '{}'", model.name);
    Ok(ExitCode::SUCCESS)
}

/// A model named on the command line must exist; the configured default is
/// only a preference and falls back to the engine's own ramp-up. Removal
/// always runs the remover model.
fn select_model(config: &Config, requested: Option<&str>, remove: bool) -> Result<Option<RampModel>> {
    let models = RampModels::discover(config.engine_dir()).or_raise(|| ErrorKind::Models)?;
    if remove {
        let name = requested.unwrap_or(REMOVER_MODEL);
        let model = models.resolve(name).ok_or_raise(|| ErrorKind::UnknownModel(name.to_string()))?;
        if !model.is_remover() {
            exn::bail!(ErrorKind::NotARemover(model.name));
        }
        return Ok(Some(model));
    }
    if let Some(name) = requested {
        return models.resolve(name).ok_or_raise(|| ErrorKind::UnknownModel(name.to_string())).map(Some);
    }
    let Some(name) = config.defaults.ramp_model.as_deref() else {
        return Ok(None);
    };
    let model = models.resolve(name);
    if model.is_none() {
        tracing::warn!(model = name, "Configured ramp-up model is not installed; using the engine default");
    }
    Ok(model)
}

fn run(config: &Config, args: RunArgs) -> Result<ExitCode> {
    let mut work = WorkSet::new();
    for path in &args.paths {
        match work.add(path) {
            Admission::Added(id) => tracing::debug!(%id, "Queued"),
            Admission::AlreadyPresent(id) => tracing::debug!(%id, "Already queued"),
            Admission::Rejected(rejection) => tracing::warn!(path = %path.display(), %rejection, "Skipping"),
        }
    }
    if work.is_empty() {
        exn::bail!(ErrorKind::NoWork);
    }

    let model = select_model(config, args.model.as_deref(), args.remove)?;
    let mode = match model.as_ref().is_some_and(RampModel::is_remover) {
        true => DifficultyMode::Remove,
        false => DifficultyMode::Generate,
    };
    let options = BatchOptions {
        phrase_length: args.phrase_length.unwrap_or(config.defaults.phrase_length),
        remove_sustain: args.remove_sustain_or(config.defaults.remove_sustain),
        ramp_model: model.map(|model| model.path),
        clean: args.clean_or(config.defaults.clean),
        keep_log: args.keep_log_or(config.defaults.keep_log),
        mode,
    };

    let timeout = args.timeout.map(Duration::from_secs).unwrap_or_else(|| config.engine_timeout());
    let engine = EngineInvoker::discover(config.engine_executable(), timeout).or_raise(|| ErrorKind::Engine)?;
    tracing::info!(engine = %engine.executable().display(), "Using difficulty engine");
    let packer = CommandPacker::new(config.packer.unpack.clone(), config.packer.pack.clone());
    let coordinator = BatchCoordinator::new(Arc::new(engine), ContainerAdapter::new(Arc::new(packer)));

    let handle = coordinator
        .start(work.snapshot(), options)
        .or_raise(|| ErrorKind::Batch)?
        .ok_or_raise(|| ErrorKind::Batch)?;
    for event in handle.events().iter() {
        match event {
            BatchEvent::Started(count) => tracing::info!(count, "Batch started"),
            BatchEvent::Progress(percent) => tracing::info!("Progress: {percent}%"),
            BatchEvent::ItemFinished { id, status } => tracing::info!(%id, %status, "Item finished"),
            BatchEvent::Removed(id) => {
                if let Some(item) = work.remove(&id) {
                    tracing::info!(path = %item.path.display(), "Removed from the work list");
                }
            },
            BatchEvent::Finished(_) => break,
        }
    }
    let report = handle.join().or_raise(|| ErrorKind::Batch)?;
    if !work.is_empty() {
        tracing::warn!(remaining = work.len(), "Batch ended before every item was processed");
    }

    println!("{}", report.result.message(mode));
    Ok(match report.result.status.is_success() {
        true => ExitCode::SUCCESS,
        false => ExitCode::FAILURE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::ops::Deref;

    fn install(models: &[&str]) -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config { install_root: dir.path().to_path_buf(), ..Config::default() };
        fs::create_dir_all(config.engine_dir()).unwrap();
        for name in models {
            fs::write(config.engine_dir().join(format!("{name}.xml")), "<model/>").unwrap();
        }
        (dir, config)
    }

    #[test]
    fn remove_selects_the_remover_model() {
        let (_dir, config) = install(&["ddc_default", REMOVER_MODEL]);
        let model = select_model(&config, None, true).unwrap().unwrap();
        assert!(model.is_remover());
        assert!(model.path.ends_with("ddc_dd_remover.xml"));
    }

    #[test]
    fn remove_requires_an_installed_remover() {
        let (_dir, config) = install(&["ddc_default"]);
        let err = select_model(&config, None, true).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::UnknownModel(name) if name == REMOVER_MODEL));
    }

    #[test]
    fn remove_rejects_a_generating_model() {
        let (_dir, config) = install(&["ddc_default", REMOVER_MODEL]);
        let err = select_model(&config, Some("ddc_default"), true).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::NotARemover(_)));
    }

    #[test]
    fn generation_uses_the_configured_default() {
        let (_dir, config) = install(&["ddc_default", REMOVER_MODEL]);
        let model = select_model(&config, None, false).unwrap().unwrap();
        assert_eq!(model.name, "ddc_default");
        assert!(!model.is_remover());
    }

    #[test]
    fn missing_configured_default_falls_back_to_the_engine() {
        let (_dir, config) = install(&[]);
        assert_eq!(select_model(&config, None, false).unwrap(), None);
        let err = select_model(&config, Some("nope"), false).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::UnknownModel(_)));
    }
}

//! Layered configuration for the ddforge pipeline.
//!
//! Values are merged from (lowest to highest precedence):
//!
//! 1. Built-in defaults ([`Config::default`]),
//! 2. a `config.{toml,yaml,yml,json}` file in the platform configuration
//!    directory,
//! 3. an explicit file handed to [`Config::load`], and
//! 4. environment variables prefixed with `DDFORGE_`, nested keys separated
//!    by a double underscore (`DDFORGE_ENGINE__TIMEOUT_SECS=60`).
//!
//! The install root replaces any reliance on the process working directory:
//! the engine executable and the ramp-up model catalog are both resolved
//! relative to it.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "DDFORGE_";
/// Name of the ramp-up model selected when nothing else has been chosen.
pub const DEFAULT_RAMP_MODEL: &str = "ddc_default";
const CONFIG_FILE_NAMES: [&str; 4] = ["config.toml", "config.yaml", "config.yml", "config.json"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory the engine (`ddc/`) and its ramp-up models live under.
    pub install_root: PathBuf,
    pub engine: EngineConfig,
    pub defaults: Defaults,
    pub packer: PackerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Overrides the executable location derived from the install root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    /// Upper bound on a single engine invocation.
    pub timeout_secs: u64,
}

/// Defaults for the per-batch options; callers may override any of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub phrase_length: u16,
    pub remove_sustain: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ramp_model: Option<String>,
    pub clean: bool,
    pub keep_log: bool,
}

/// Argument templates for the external container pack/unpack tool.
///
/// The first element is the program, the rest are arguments. Placeholders
/// `{input}`, `{output}` and `{platform}` are substituted per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackerConfig {
    pub unpack: Vec<String>,
    pub pack: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let install_root = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            install_root,
            engine: EngineConfig::default(),
            defaults: Defaults::default(),
            packer: PackerConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { executable: None, timeout_secs: 3600 }
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            phrase_length: 32,
            remove_sustain: false,
            ramp_model: Some(DEFAULT_RAMP_MODEL.to_string()),
            clean: false,
            keep_log: false,
        }
    }
}

impl Default for PackerConfig {
    fn default() -> Self {
        let owned = |args: &[&str]| args.iter().map(|a| a.to_string()).collect();
        Self {
            unpack: owned(&["packer", "--unpack", "--input={input}", "--output={output}"]),
            pack: owned(&["packer", "--pack", "--input={input}", "--output={output}", "--platform={platform}"]),
        }
    }
}

impl Config {
    /// Load the fully merged configuration.
    ///
    /// `explicit` must exist if given; the user-level file is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(dirs) = ProjectDirs::from("", "", "ddforge") {
            for name in CONFIG_FILE_NAMES {
                let candidate = dirs.config_dir().join(name);
                if candidate.is_file() {
                    tracing::debug!(path = %candidate.display(), "Merging user configuration file");
                    figment = merge_file(figment, &candidate)?;
                }
            }
        }
        if let Some(path) = explicit {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            figment = merge_file(figment, path)?;
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate a configuration from an already assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.defaults.phrase_length == 0 {
            exn::bail!(ErrorKind::Invalid("defaults.phrase_length must be greater than zero"));
        }
        if self.engine.timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("engine.timeout_secs must be greater than zero"));
        }
        if self.packer.unpack.first().is_some_and(|p| p.trim().is_empty()) {
            exn::bail!(ErrorKind::Invalid("packer.unpack must start with a program name"));
        }
        if self.packer.pack.first().is_some_and(|p| p.trim().is_empty()) {
            exn::bail!(ErrorKind::Invalid("packer.pack must start with a program name"));
        }
        Ok(())
    }

    /// Directory holding the engine binary and its bundled ramp-up models.
    pub fn engine_dir(&self) -> PathBuf {
        self.install_root.join("ddc")
    }

    /// The configured engine executable, or the conventional location
    /// underneath the install root.
    pub fn engine_executable(&self) -> PathBuf {
        match &self.engine.executable {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.install_root.join(path),
            None => self.engine_dir().join(if cfg!(windows) { "ddc.exe" } else { "ddc" }),
        }
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.timeout_secs)
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    Ok(match ext.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;
    use std::ops::Deref;

    fn base() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::from_figment(base()).unwrap();
        assert_eq!(config.defaults.phrase_length, 32);
        assert_eq!(config.defaults.ramp_model.as_deref(), Some(DEFAULT_RAMP_MODEL));
        assert_eq!(config.engine_timeout(), Duration::from_secs(3600));
        assert!(!config.defaults.clean);
    }

    #[rstest]
    #[case("config.toml", "install_root = \"/opt/ddc\"\n[engine]\ntimeout_secs = 90\n")]
    #[case("config.yaml", "install_root: /opt/ddc\nengine:\n  timeout_secs: 90\n")]
    #[case("config.json", r#"{"install_root": "/opt/ddc", "engine": {"timeout_secs": 90}}"#)]
    fn file_formats_merge(#[case] name: &str, #[case] contents: &str) {
        Jail::expect_with(|jail| {
            jail.create_file(name, contents)?;
            let figment = merge_file(base(), Path::new(name)).unwrap();
            let config = Config::from_figment(figment).unwrap();
            assert_eq!(config.install_root, PathBuf::from("/opt/ddc"));
            assert_eq!(config.engine.timeout_secs, 90);
            // Untouched sections keep their defaults.
            assert_eq!(config.defaults, Defaults::default());
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("ddforge.toml", "[defaults]\nphrase_length = 48\nclean = true\n")?;
            jail.set_env("DDFORGE_DEFAULTS__PHRASE_LENGTH", "60");
            let figment = merge_file(base(), Path::new("ddforge.toml"))
                .unwrap()
                .merge(Env::prefixed(ENV_PREFIX).split("__"));
            let config = Config::from_figment(figment).unwrap();
            assert_eq!(config.defaults.phrase_length, 60);
            assert!(config.defaults.clean);
            Ok(())
        });
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = merge_file(base(), Path::new("config.ini")).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::UnsupportedFormat(_)));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::NotFound(_)));
    }

    #[rstest]
    #[case("[defaults]\nphrase_length = 0\n")]
    #[case("[engine]\ntimeout_secs = 0\n")]
    #[case("[packer]\npack = [\"\", \"--pack\"]\n")]
    fn invalid_values_are_rejected(#[case] contents: &str) {
        Jail::expect_with(|jail| {
            jail.create_file("bad.toml", contents)?;
            let err = Config::from_figment(merge_file(base(), Path::new("bad.toml")).unwrap()).unwrap_err();
            assert!(matches!(err.deref(), ErrorKind::Invalid(_)));
            Ok(())
        });
    }

    #[test]
    fn engine_executable_resolution() {
        let mut config = Config { install_root: PathBuf::from("/opt/toolkit"), ..Config::default() };
        let expected = if cfg!(windows) { "ddc.exe" } else { "ddc" };
        assert_eq!(config.engine_executable(), Path::new("/opt/toolkit/ddc").join(expected));
        config.engine.executable = Some(PathBuf::from("bin/engine"));
        assert_eq!(config.engine_executable(), Path::new("/opt/toolkit/bin/engine"));
        config.engine.executable = Some(PathBuf::from("/usr/local/bin/ddc"));
        assert_eq!(config.engine_executable(), Path::new("/usr/local/bin/ddc"));
    }
}

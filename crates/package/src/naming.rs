//! Names of the files the pipeline produces.
//!
//! Containers are rewritten as `<base>_<MODE>_<tag><ext>` next to the
//! original, where `<base>` has any platform end name and any previous
//! difficulty-mode marker stripped. Loose arrangements are processed in place
//! by the engine, which writes `DDC_<name>.xml` beside them.

use crate::error::{ErrorKind, Result};
use crate::platform::{Platform, PlatformFamily};
use std::path::{Path, PathBuf};

/// Prefix of every loose arrangement byproduct.
pub const OUTPUT_PREFIX: &str = "DDC_";
/// Suffix of lighting companion files; never arrangement data.
pub const SHOWLIGHTS_SUFFIX: &str = "_showlights.xml";
/// Suffix of reserved companion files written alongside arrangements.
pub const COMPANION_SUFFIX: &str = ".dlc.xml";

const PLATFORM_END_NAMES: [&str; 4] = ["_p", "_m", "_ps3", "_xbox"];

/// Whether difficulty levels are being generated or stripped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DifficultyMode {
    #[default]
    Generate,
    Remove,
}

impl DifficultyMode {
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Generate => "DD",
            Self::Remove => "NDD",
        }
    }

    /// Past tense, as used in user-facing confirmations.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Generate => "generated",
            Self::Remove => "removed",
        }
    }
}

/// Split a container file name into its stem and extension family.
///
/// PS3 containers keep their double extension (`.psarc.edat`) intact.
fn split_container_name(name: &str, platform: Platform) -> (&str, &str) {
    if platform.family == PlatformFamily::Ps3 {
        let lower = name.to_ascii_lowercase();
        for ext in [".psarc.edat", ".edat"] {
            if lower.ends_with(ext) {
                return name.split_at(name.len() - ext.len());
            }
        }
    }
    match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    }
}

fn strip_suffix_ignore_case<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    let split = value.len().checked_sub(suffix.len())?;
    match value.is_char_boundary(split) && value[split..].eq_ignore_ascii_case(suffix) {
        true => Some(&value[..split]),
        false => None,
    }
}

/// Remove the platform end name and any difficulty-mode markers.
///
/// Removing a marker that is not there is a no-op.
pub fn strip_base_name(stem: &str) -> &str {
    let mut base = stem.trim();
    if let Some(stripped) = PLATFORM_END_NAMES.iter().find_map(|end| strip_suffix_ignore_case(base, end)) {
        base = stripped;
    }
    loop {
        let stripped = [DifficultyMode::Remove, DifficultyMode::Generate]
            .iter()
            .find_map(|mode| base.strip_suffix(mode.marker()).and_then(|b| b.strip_suffix('_')));
        match stripped {
            Some(b) => base = b,
            None => return base,
        }
    }
}

/// Path of the container produced from `original` in the given mode.
pub fn derived_container_path(original: &Path, platform: Platform, mode: DifficultyMode) -> Result<PathBuf> {
    let Some(name) = original.file_name().and_then(|n| n.to_str()) else {
        exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
    };
    let (stem, ext) = split_container_name(name, platform);
    let base = strip_base_name(stem);
    if base.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
    }
    let derived = format!("{base}_{}_{}{ext}", mode.marker(), platform.tag());
    Ok(original.with_file_name(derived))
}

fn sibling(arrangement: &Path, name: String) -> PathBuf {
    arrangement.with_file_name(name)
}

fn arrangement_stem(arrangement: &Path) -> String {
    arrangement.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// `DDC_<name>.xml`, the engine's output for a loose arrangement.
pub fn processed_arrangement_path(arrangement: &Path) -> PathBuf {
    sibling(arrangement, format!("{OUTPUT_PREFIX}{}.xml", arrangement_stem(arrangement)))
}

/// `<name>_showlights.xml`, the lighting companion of a loose arrangement.
pub fn showlights_path(arrangement: &Path) -> PathBuf {
    sibling(arrangement, format!("{}{SHOWLIGHTS_SUFFIX}", arrangement_stem(arrangement)))
}

/// `DDC_<name>_showlights.xml`, the companion carried over to the output.
pub fn processed_showlights_path(arrangement: &Path) -> PathBuf {
    sibling(arrangement, format!("{OUTPUT_PREFIX}{}{SHOWLIGHTS_SUFFIX}", arrangement_stem(arrangement)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/dlc/song_p.psarc", DifficultyMode::Generate, "/dlc/song_DD_p.psarc")]
    #[case("/dlc/song_p.psarc", DifficultyMode::Remove, "/dlc/song_NDD_p.psarc")]
    #[case("/dlc/song_DD_p.psarc", DifficultyMode::Remove, "/dlc/song_NDD_p.psarc")]
    #[case("/dlc/song_NDD_p.psarc", DifficultyMode::Generate, "/dlc/song_DD_p.psarc")]
    #[case("/dlc/song_m.psarc", DifficultyMode::Generate, "/dlc/song_DD_m.psarc")]
    #[case("/dlc/song.dat", DifficultyMode::Generate, "/dlc/song_DD_p.dat")]
    #[case("/dlc/song_ps3.psarc.edat", DifficultyMode::Generate, "/dlc/song_DD_s.psarc.edat")]
    #[case("/dlc/song_xbox", DifficultyMode::Generate, "/dlc/song_DD_x")]
    #[case("/dlc/odd_DD_DD_p.psarc", DifficultyMode::Generate, "/dlc/odd_DD_p.psarc")]
    fn derived_names(#[case] original: &str, #[case] mode: DifficultyMode, #[case] expected: &str) {
        let platform = Platform::detect(original).unwrap();
        let derived = derived_container_path(Path::new(original), platform, mode).unwrap();
        assert_eq!(derived, Path::new(expected));
    }

    #[test]
    fn regenerating_keeps_the_same_name() {
        let original = Path::new("/dlc/song_DD_p.psarc");
        let platform = Platform::detect(original).unwrap();
        let derived = derived_container_path(original, platform, DifficultyMode::Generate).unwrap();
        assert_eq!(derived, original);
    }

    #[rstest]
    #[case("song", "song")]
    #[case("song_DD", "song")]
    #[case("song_NDD", "song")]
    #[case("ADD", "ADD")]
    #[case("song_p", "song")]
    #[case("song_DD_p", "song")]
    fn stripping_is_a_no_op_when_absent(#[case] stem: &str, #[case] expected: &str) {
        assert_eq!(strip_base_name(stem), expected);
    }

    #[test]
    fn loose_byproduct_names() {
        let arrangement = Path::new("/songs/lead.xml");
        assert_eq!(processed_arrangement_path(arrangement), Path::new("/songs/DDC_lead.xml"));
        assert_eq!(showlights_path(arrangement), Path::new("/songs/lead_showlights.xml"));
        assert_eq!(processed_showlights_path(arrangement), Path::new("/songs/DDC_lead_showlights.xml"));
    }
}

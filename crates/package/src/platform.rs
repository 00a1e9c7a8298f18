use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;

/// The hardware family a container was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformFamily {
    Pc,
    Mac,
    XBox360,
    Ps3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameVersion {
    Rs1,
    Rs2014,
}

/// Platform family and game version, both inferred from a container's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub family: PlatformFamily,
    pub version: GameVersion,
}

impl Platform {
    pub const fn new(family: PlatformFamily, version: GameVersion) -> Self {
        Self { family, version }
    }

    /// Infer the platform from the file name alone.
    ///
    /// | Name                      | Platform          |
    /// |---------------------------|-------------------|
    /// | `*_m.psarc`               | Mac, RS2014       |
    /// | `*.psarc`                 | PC, RS2014        |
    /// | `*.dat`                   | PC, RS1           |
    /// | `*.edat`, `*.psarc.edat`  | PS3, RS2014       |
    /// | no extension              | Xbox 360, RS2014  |
    pub fn detect(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let ext = path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase()).unwrap_or_default();
        let stem = path.file_stem()?.to_string_lossy().to_ascii_lowercase();
        Some(match ext.as_str() {
            "psarc" if stem.ends_with("_m") => Self::new(PlatformFamily::Mac, GameVersion::Rs2014),
            "psarc" => Self::new(PlatformFamily::Pc, GameVersion::Rs2014),
            "dat" => Self::new(PlatformFamily::Pc, GameVersion::Rs1),
            "edat" => Self::new(PlatformFamily::Ps3, GameVersion::Rs2014),
            "" => Self::new(PlatformFamily::XBox360, GameVersion::Rs2014),
            _ => return None,
        })
    }

    /// Single character identifying the platform family in derived names.
    pub fn tag(&self) -> char {
        match self.family {
            PlatformFamily::Pc => 'p',
            PlatformFamily::Mac => 'm',
            PlatformFamily::XBox360 => 'x',
            PlatformFamily::Ps3 => 's',
        }
    }

    /// Whether containers for this platform carry per-arrangement JSON
    /// manifests that must follow the arrangement's content.
    pub fn has_manifests(&self) -> bool {
        self.version == GameVersion::Rs2014
    }

    /// Name of the family as understood by packer tools.
    pub fn family_name(&self) -> &'static str {
        match self.family {
            PlatformFamily::Pc => "Pc",
            PlatformFamily::Mac => "Mac",
            PlatformFamily::XBox360 => "XBox360",
            PlatformFamily::Ps3 => "PS3",
        }
    }

    pub fn version_name(&self) -> &'static str {
        match self.version {
            GameVersion::Rs1 => "RS2012",
            GameVersion::Rs2014 => "RS2014",
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} ({})", self.family_name(), self.version_name())
    }
}

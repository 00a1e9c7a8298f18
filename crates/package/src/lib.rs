//! Packaged containers: platform detection, derived output names, and the
//! unpack/enumerate/repack cycle around an external container codec.

pub mod backend;
mod container;
pub mod error;
pub mod naming;
mod platform;

pub use self::container::{ContainerAdapter, UnpackedContainer};
pub use self::naming::DifficultyMode;
pub use self::platform::{GameVersion, Platform, PlatformFamily};

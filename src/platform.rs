use std::{fmt, path::Path};

use enum_iterator::Sequence;
use serde::Serialize;

/// Target hardware an archive was built for, taken from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence, Serialize)]
pub enum Platform {
    Ps2,
    Ps3,
    Xbox360,
    Wii,
}

impl Platform {
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Platform::Ps2 => &["milo_ps2", "rnd_ps2", "rnd"],
            Platform::Ps3 => &["milo_ps3"],
            Platform::Xbox360 => &["milo_xbox"],
            Platform::Wii => &["milo_wii"],
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        enum_iterator::all::<Platform>().find(|p| p.extensions().contains(&ext.as_str()))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Wii archives carry textures in TPL form, everything else in DDS.
    pub fn texture_extension(self) -> &'static str {
        match self {
            Platform::Wii => "tpl",
            _ => "dds",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Ps2 => "ps2",
            Platform::Ps3 => "ps3",
            Platform::Xbox360 => "xbox360",
            Platform::Wii => "wii",
        };
        f.write_str(name)
    }
}

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use configparser::ini::Ini;
use fs_err as fs;
use serde::Serialize;

use crate::{cursor::ByteOrder, texture::TextureProfile};

const SECTION: &str = "import";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportOptions {
    pub skip_low_lod: bool,
    pub skip_shadow_mesh: bool,
    pub import_venue: bool,
    #[serde(skip)]
    pub byte_order_override: Option<ByteOrder>,
    pub texture_profile: TextureProfile,
    pub export_textures: bool,
    pub output_dir: Option<PathBuf>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            skip_low_lod: true,
            skip_shadow_mesh: true,
            import_venue: false,
            byte_order_override: None,
            texture_profile: TextureProfile::Auto,
            export_textures: true,
            output_dir: None,
        }
    }
}

pub fn parse_byte_order(value: &str) -> Result<ByteOrder> {
    match value.to_ascii_lowercase().as_str() {
        "big" | "be" => Ok(ByteOrder::Big),
        "little" | "le" => Ok(ByteOrder::Little),
        other => bail!("unknown byte order {other:?}, expected big or little"),
    }
}

impl ImportOptions {
    /// Options from the `[import]` section of an INI document; absent keys keep their defaults.
    pub fn from_ini_str(text: &str) -> Result<Self> {
        let mut ini = Ini::new();
        ini.read(text.to_owned()).map_err(|e| anyhow!(e))?;
        let mut opts = Self::default();
        let flag = |key: &str, value: &mut bool| -> Result<()> {
            if let Some(v) = ini.getbool(SECTION, key).map_err(|e| anyhow!("{SECTION}.{key}: {e}"))? {
                *value = v;
            }
            Ok(())
        };
        flag("skip_low_lod", &mut opts.skip_low_lod)?;
        flag("skip_shadow", &mut opts.skip_shadow_mesh)?;
        flag("import_venue", &mut opts.import_venue)?;
        flag("export_textures", &mut opts.export_textures)?;
        if let Some(order) = ini.get(SECTION, "byte_order") {
            opts.byte_order_override = Some(parse_byte_order(&order)?);
        }
        if let Some(profile) = ini.get(SECTION, "texture_profile") {
            opts.texture_profile = profile.parse().map_err(|e: String| anyhow!(e))?;
        }
        if let Some(dir) = ini.get(SECTION, "output_dir") {
            opts.output_dir = Some(PathBuf::from(dir));
        }
        Ok(opts)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_ini_str(&text).with_context(|| format!("reading {}", path.as_ref().display()))
    }
}

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use fs_err as fs;
use log::{error, info};
use milo_import::{
    config::parse_byte_order, find_archives, texture::TextureProfile, ArchiveFile, DecodeSession,
    ImportOptions, Platform, SceneRecorder,
};

#[derive(Parser, Debug)]
#[command(name = "milo-import", version, about = "Decode milo/rnd scene archives")]
struct Args {
    /// Archives, or directories to search for them
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// INI file with an [import] section
    #[arg(short, long, env = "MILO_IMPORT_CONFIG")]
    config: Option<PathBuf>,

    /// Write the decoded scene as JSON
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Where to write converted textures (defaults to next to each archive)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Force the byte order of every payload (big|little)
    #[arg(long, value_parser = parse_byte_order)]
    byte_order: Option<milo_import::cursor::ByteOrder>,

    #[arg(long)]
    texture_profile: Option<TextureProfile>,

    #[arg(long)]
    keep_low_lod: bool,

    #[arg(long)]
    keep_shadow: bool,

    #[arg(long)]
    venue: bool,

    #[arg(long)]
    no_textures: bool,

    /// More logging, repeat for trace output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn options(&self) -> Result<ImportOptions> {
        let mut opts = match &self.config {
            Some(path) => ImportOptions::load(path)?,
            None => ImportOptions::default(),
        };
        if self.keep_low_lod {
            opts.skip_low_lod = false;
        }
        if self.keep_shadow {
            opts.skip_shadow_mesh = false;
        }
        if self.venue {
            opts.import_venue = true;
        }
        if self.no_textures {
            opts.export_textures = false;
        }
        if let Some(order) = self.byte_order {
            opts.byte_order_override = Some(order);
        }
        if let Some(profile) = self.texture_profile {
            opts.texture_profile = profile;
        }
        if let Some(dir) = &self.output_dir {
            opts.output_dir = Some(dir.clone());
        }
        Ok(opts)
    }
}

fn collect_archives(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = vec![];
    for path in paths {
        if path.is_dir() {
            files.extend(find_archives(path));
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("{} does not exist", path.display());
        }
    }
    Ok(files)
}

fn main() -> Result<()> {
    better_panic::install();
    let args = Args::parse();
    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let base = args.options()?;
    let files = collect_archives(&args.paths)?;
    if files.is_empty() {
        bail!("no archives found");
    }
    let mut recorder = SceneRecorder::new();
    let mut fatal = 0;
    for path in &files {
        let platform = Platform::from_path(path)
            .ok_or_else(|| anyhow!("{}: unknown archive extension", path.display()))?;
        let mut opts = base.clone();
        if opts.output_dir.is_none() {
            opts.output_dir = path.parent().map(|p| p.to_owned());
        }
        let file = match ArchiveFile::open(path, platform) {
            Ok(file) => file,
            Err(err) => {
                error!("{}: {err}", path.display());
                fatal += 1;
                continue;
            }
        };
        let mut session = DecodeSession::new(&opts, &mut recorder)?;
        match session.decode_archive(file.bytes(), platform) {
            Ok(report) => println!("{}: {report}", path.display()),
            Err(err) => {
                error!("{}: {err}", path.display());
                fatal += 1;
            }
        }
    }
    if let Some(dump) = &args.dump {
        let json = serde_json::to_string_pretty(&recorder)?;
        fs::write(dump, json).with_context(|| format!("writing {}", dump.display()))?;
        info!("Scene written to {}", dump.display());
    }
    if fatal > 0 {
        bail!("{fatal} of {} archives could not be decoded", files.len());
    }
    Ok(())
}

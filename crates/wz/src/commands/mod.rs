use std::{fs::File, io::BufReader, path::Path};

use clap::Args;
use miette::{Context, IntoDiagnostic, Result};
use wz_archive::{ArchiveOptions, WzArchive};
use wz_crypto::{KeyMaterial, WellKnownKey};

pub mod archive;
pub mod image;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Handle WZ archives
    Archive {
        #[command(subcommand)]
        command: archive::ArchiveCommands,
    },
    /// Inspect single images inside a WZ archive
    Image {
        #[command(subcommand)]
        command: image::ImageCommands,
    },
}

impl Commands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            Commands::Archive { command } => command.handle(),
            Commands::Image { command } => command.handle(),
        }
    }
}

/// Key and version settings shared by every command that opens an archive
#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// Client distribution the archive belongs to (gms, ems, plain)
    #[arg(short, long, default_value = "gms")]
    region: WellKnownKey,

    /// Custom IV as hex byte pairs, overrides the region
    #[arg(long, value_name = "HEX", requires = "key")]
    iv: Option<String>,

    /// Custom master key as 32 hex byte pairs
    #[arg(long, value_name = "HEX", requires = "iv")]
    key: Option<String>,

    /// Client version, detected from the header when missing
    #[arg(long, value_name = "NUMBER")]
    wz_version: Option<u16>,
}

impl KeyArgs {
    pub fn material(&self) -> Result<KeyMaterial> {
        match (&self.iv, &self.key) {
            (Some(iv), Some(key)) => Ok(KeyMaterial::from_hex(iv, key)?),
            _ => Ok(self.region.into()),
        }
    }

    pub fn options(&self) -> Result<ArchiveOptions> {
        Ok(ArchiveOptions {
            key: self.material()?,
            version: self.wz_version,
            ..Default::default()
        })
    }

    pub fn open(&self, path: &Path) -> Result<WzArchive<BufReader<File>>> {
        let f = File::open(path)
            .into_diagnostic()
            .context(format!("path: {}", path.display()))?;
        Ok(WzArchive::new(BufReader::new(f), self.options()?)?)
    }
}

use clap::Args;
use miette::{Context, IntoDiagnostic, Result};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    sync::Arc,
};
use tracing::info;
use wz_archive::{directory::Directory, ParseOptions, WzWriter, WzWriterOptions};
use wz_crypto::{Keystream, WellKnownKey};

use crate::commands::KeyArgs;

#[derive(Args)]
pub struct RepackArgs {
    /// An input WZ file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target WZ file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// Distribution to re-encrypt for, the input key is kept when missing
    #[arg(long, value_name = "REGION")]
    to_region: Option<WellKnownKey>,

    /// Version to write, the input version is kept when missing
    #[arg(long, value_name = "NUMBER")]
    to_version: Option<u16>,

    #[command(flatten)]
    key: KeyArgs,
}

impl RepackArgs {
    pub fn handle(&self) -> Result<()> {
        let mut wz = self.key.open(&self.file)?;

        let key = match self.to_region {
            Some(region) => region.into(),
            None => self.key.material()?,
        };
        let version = self.to_version.unwrap_or(wz.version().number);

        info!("creating {}", &self.output.display());
        let out = if !self.overwrite {
            File::create_new(&self.output)
                .into_diagnostic()
                .context(format!("creating {}", &self.output.display()))?
        } else {
            File::create(&self.output)
                .into_diagnostic()
                .context(format!("creating {}", &self.output.display()))?
        };

        let options = WzWriterOptions::builder()
            .key(key)
            .version(version)
            .copyright(wz.header().copyright())
            .build();
        let mut writer = WzWriter::new(BufWriter::new(out), options);

        let entries = wz
            .root()
            .all_images()
            .into_iter()
            .map(|(path, entry)| (path, entry.clone()))
            .collect::<Vec<_>>();
        let parse = ParseOptions::builder().eager_payloads(true).build();
        let keystream = Arc::new(Keystream::new(key));
        for (path, entry) in entries {
            let lazy = wz.open_image(&entry)?;
            if key == *wz.keystream().material() {
                writer.add_image_bytes(&path, lazy.data().to_vec())?;
            } else {
                let image = lazy.materialize(&parse)?;
                let image = image.with_keystream(keystream.clone())?;
                writer.add_image(&path, &image)?;
            }
            info!("packed {path}");
        }
        for path in empty_directories(wz.root(), "") {
            writer.add_directory(&path);
        }

        writer.finish()?.flush().into_diagnostic()?;
        Ok(())
    }
}

fn empty_directories(dir: &Directory, prefix: &str) -> Vec<String> {
    let mut out = Vec::new();
    for child in &dir.directories {
        let path = format!("{prefix}{}", child.name);
        if child.directories.is_empty() && child.images.is_empty() {
            out.push(path.clone());
        }
        out.extend(empty_directories(child, &format!("{path}/")));
    }
    out
}

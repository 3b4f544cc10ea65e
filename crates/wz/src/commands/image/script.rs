use clap::Args;
use miette::{miette, IntoDiagnostic, Result};
use std::{io::Write, path::PathBuf};
use wz_archive::ParseOptions;

use crate::commands::KeyArgs;

#[derive(Args)]
pub struct ScriptArgs {
    /// An input WZ file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Path of the image inside the archive
    #[arg(short, long, value_name = "PATH")]
    path: String,

    #[command(flatten)]
    key: KeyArgs,
}

impl ScriptArgs {
    pub fn handle(&self) -> Result<()> {
        let mut wz = self.key.open(&self.file)?;
        let image = wz.image(&self.path, &ParseOptions::default())?;
        let source = image
            .script_source()
            .ok_or_else(|| miette!("{} is not a script image", self.path))?;
        std::io::stdout().write_all(&source).into_diagnostic()
    }
}

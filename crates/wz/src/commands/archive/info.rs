use clap::Args;
use miette::Result;
use owo_colors::OwoColorize;
use std::path::PathBuf;

use crate::commands::KeyArgs;

#[derive(Args)]
pub struct InfoArgs {
    /// An input WZ file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    #[command(flatten)]
    key: KeyArgs,
}

impl InfoArgs {
    pub fn handle(&self) -> Result<()> {
        let wz = self.key.open(&self.file)?;
        let header = wz.header();

        println!("{} {}", "copyright:".bold(), header.copyright());
        println!("{} {}", "data start:".bold(), header.data_start);
        println!("{} {}", "size:".bold(), header.size);
        println!(
            "{} {} (hash {}, stored as {:#06x})",
            "version:".bold(),
            wz.version().number.green(),
            wz.version().hash,
            wz.version().encrypted()
        );
        println!("{} {}", "directories:".bold(), wz.root().directory_count());
        println!("{} {}", "images:".bold(), wz.root().all_images().len());
        Ok(())
    }
}

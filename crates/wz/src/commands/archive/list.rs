use clap::Args;
use miette::Result;
use owo_colors::OwoColorize;
use std::path::PathBuf;

use crate::commands::KeyArgs;

#[derive(Args)]
pub struct ListArgs {
    /// An input WZ file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Print the size and offset of each image
    #[arg(short, long, default_value_t = false)]
    long: bool,

    #[command(flatten)]
    key: KeyArgs,
}

impl ListArgs {
    pub fn handle(&self) -> Result<()> {
        let wz = self.key.open(&self.file)?;
        for (path, entry) in wz.root().all_images() {
            if self.long {
                println!(
                    "{:>10} {:>#12x} {}",
                    entry.size,
                    entry.offset.dimmed(),
                    path
                );
            } else {
                println!("{path}");
            }
        }
        Ok(())
    }
}

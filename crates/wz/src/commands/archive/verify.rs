use clap::Args;
use miette::{miette, Result};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use tracing::info;
use wz_archive::ParseOptions;

use crate::commands::KeyArgs;

#[derive(Args)]
pub struct VerifyArgs {
    /// An input WZ file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Read canvas and sound payloads while parsing
    #[arg(long, default_value_t = false)]
    eager: bool,

    /// Parse one image at a time
    #[arg(long, default_value_t = false)]
    sequential: bool,

    #[command(flatten)]
    key: KeyArgs,
}

impl VerifyArgs {
    pub fn handle(&self) -> Result<()> {
        let mut wz = self.key.open(&self.file)?;
        info!("verifying {}", self.file.display());

        let options = ParseOptions::builder()
            .eager_payloads(self.eager)
            .parallel(!self.sequential)
            .build();
        let report = wz.parse_all(&options)?;

        for (path, error) in &report.failures {
            println!("{} {path}: {error}", "failed".red());
        }
        for link in &report.broken_links {
            println!("{} {link}", "broken link".yellow());
        }
        for path in &report.checksum_mismatches {
            println!("{} {path}", "checksum".yellow());
        }
        println!("{report}");

        if !report.failures.is_empty() {
            return Err(miette!("{} images could not be parsed", report.failures.len()));
        }
        Ok(())
    }
}

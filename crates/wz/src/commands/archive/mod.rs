pub mod info;
pub mod list;
pub mod repack;
pub mod verify;

#[derive(clap::Subcommand)]
pub enum ArchiveCommands {
    /// Show the header and version of a WZ file
    Info(info::InfoArgs),
    /// List every image in a WZ file
    List(list::ListArgs),
    /// Parse every image and report failures and broken links
    Verify(verify::VerifyArgs),
    /// Read a WZ file and write it again, optionally with another key or version
    Repack(repack::RepackArgs),
}

impl ArchiveCommands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            ArchiveCommands::Info(info) => info.handle(),
            ArchiveCommands::List(list) => list.handle(),
            ArchiveCommands::Verify(verify) => verify.handle(),
            ArchiveCommands::Repack(repack) => repack.handle(),
        }
    }
}

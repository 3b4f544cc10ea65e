pub mod script;
pub mod tree;

#[derive(clap::Subcommand)]
pub enum ImageCommands {
    /// Print the property tree of an image
    Tree(tree::TreeArgs),
    /// Print the decrypted source of a script image
    Script(script::ScriptArgs),
}

impl ImageCommands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            ImageCommands::Tree(tree) => tree.handle(),
            ImageCommands::Script(script) => script.handle(),
        }
    }
}

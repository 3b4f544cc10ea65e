use clap::Args;
use miette::Result;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use tracing::warn;
use wz_archive::{value::Value, Image, NodeId, ParseOptions};
use wz_canvas::{CanvasCodec, CodecOptions};

use crate::commands::KeyArgs;

#[derive(Args)]
pub struct TreeArgs {
    /// An input WZ file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Path of the image inside the archive
    #[arg(short, long, value_name = "PATH")]
    path: String,

    /// Only print nodes up to this depth
    #[arg(short, long)]
    depth: Option<usize>,

    /// Decode every canvas and print its pixel format
    #[arg(long, default_value_t = false)]
    decode: bool,

    /// Decode block formats on a single thread
    #[arg(long, default_value_t = false)]
    sequential: bool,

    #[command(flatten)]
    key: KeyArgs,
}

impl TreeArgs {
    pub fn handle(&self) -> Result<()> {
        let mut wz = self.key.open(&self.file)?;
        let image = wz.image(&self.path, &ParseOptions::default())?;
        let codec = CanvasCodec::new(CodecOptions::builder().parallel(!self.sequential).build());

        let mut stack = vec![(image.root(), 0usize)];
        while let Some((id, depth)) = stack.pop() {
            self.print(&image, id, depth, &codec);
            if self.depth.map_or(true, |max| depth < max) {
                stack.extend(image.children(id).iter().rev().map(|&c| (c, depth + 1)));
            }
        }
        println!("{} nodes", image.len());
        Ok(())
    }

    fn print(&self, image: &Image, id: NodeId, depth: usize, codec: &CanvasCodec) {
        let indent = "  ".repeat(depth);
        let node = image.node(id);
        let value = node.value();
        match value {
            Value::Uol(_) => {
                let target = image.resolve(id);
                if target == id {
                    println!("{indent}{} {} {}", node.name().bold(), value, "(broken)".red());
                } else {
                    println!("{indent}{} {} ({})", node.name().bold(), value, image.path(target).cyan());
                }
            }
            Value::Canvas(_) if self.decode => match image.canvas_bitmap(id, codec, false) {
                Ok(bitmap) => println!(
                    "{indent}{} {} {}",
                    node.name().bold(),
                    value,
                    format!("decoded {}x{}", bitmap.width(), bitmap.height()).green()
                ),
                Err(e) => {
                    warn!(node = %image.path(id), error = %e, "canvas does not decode");
                    println!("{indent}{} {} {}", node.name().bold(), value, "(undecodable)".red());
                }
            },
            Value::Property | Value::Convex => {
                println!("{indent}{} {}", node.name().bold(), value.kind().dimmed())
            }
            _ => println!("{indent}{} {}", node.name().bold(), value),
        }
    }
}

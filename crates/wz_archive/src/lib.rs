//! This library handles reading from and creating **WZ** archives, the asset packages of a
//! long running 2D online game.
//!
//! # WZ Archive Format Documentation
//!
//! A WZ file bundles a tree of directories whose leaves are *images*. An image is a
//! serialized property tree holding numbers, strings, vectors, bitmaps, sounds and links
//! to other nodes. Names and strings are encrypted with a keystream derived from a
//! 4 byte IV, and offsets in the directory are obfuscated with a hash of the client
//! version.
//!
//! ## File Structure
//!
//! | Offset (bytes) | Field           | Description                                                 |
//! |----------------|-----------------|-------------------------------------------------------------|
//! | 0x0000         | Magic number    | 4 bytes: "PKG1"                                             |
//! | 0x0004         | Size            | 8 bytes: number of bytes after the data start               |
//! | 0x000C         | Data start      | 4 bytes: absolute position of the data                      |
//! | 0x0010         | Copyright       | NUL terminated text                                         |
//! | data start     | Version         | 2 bytes: `0xFF` XOR the bytes of the version hash           |
//! | data start + 2 | Root directory  | directory block                                             |
//!
//! ### Primitives
//!
//! - **Compressed int**: one signed byte, or `-128` followed by an `i32` (`i64` for longs).
//! - **Encrypted string**: a signed length byte. Positive lengths are UTF-16 (`127` means an
//!   `i32` length follows), negative lengths are single byte characters (`-128` means an
//!   `i32` length follows). Characters are XOR-ed with the keystream and a mask starting at
//!   `0xAAAA` or `0xAA` that grows by one per character.
//! - **String block**: `0x00`/`0x73` followed by an inline string, or `0x01`/`0x1B` followed
//!   by an `i32` position of an earlier string, relative to the start of the image.
//! - **Offset**: a `u32` XOR-ed with a key derived from its own position, the data start and
//!   the version hash.
//!
//! ### Directory Block
//!
//! A compressed count followed by entries of: a kind byte (`3` directory, `4` image,
//! `2` kind and name stored elsewhere, `1` skipped), the encrypted name, the compressed
//! size, the compressed checksum and the offset. Subdirectory blocks are parsed after
//! their parent.
//!
//! ### Image Body
//!
//! `0x73` "Property" `00 00` followed by a property list, or `0x01` followed by an
//! encrypted script. A property list is a compressed count of (name, tag, value) entries:
//!
//! | Tag      | Value                                                                  |
//! |----------|------------------------------------------------------------------------|
//! | 0        | null                                                                   |
//! | 2, 11    | `i16`                                                                  |
//! | 3, 19    | compressed int                                                         |
//! | 20       | compressed long                                                        |
//! | 4        | `0x80` then `f32`, or `0x00` for zero                                  |
//! | 5        | `f64`                                                                  |
//! | 8        | string block                                                           |
//! | 9        | `u32` length then an extended value, named by its type name            |
//!
//! Extended type names are `Property`, `Canvas`, `Shape2D#Vector2D`, `Shape2D#Convex2D`,
//! `Sound_DX8`, `UOL`, `RawData` and `Canvas#Video`.
//!
//! ## Additional Information
//!
//! - **File Extension**: `.wz`
//! - **Endianness**: Little-endian for all multi-byte integers
//! - **Canvas payloads**: see the `wz_canvas` crate
//!

pub mod cipher;
pub mod cursor;
pub mod directory;
pub mod encode;
pub mod error;
pub mod header;
pub mod link;
pub mod media;
pub mod parse;
pub mod read;
pub mod serialize;
pub mod tree;
pub mod value;
pub mod write;

pub use parse::ParseOptions;
pub use read::{ArchiveOptions, BatchReport, LazyImage, WzArchive};
pub use tree::{Image, Node, NodeId};
pub use value::Value;
pub use write::{WzWriter, WzWriterOptions};

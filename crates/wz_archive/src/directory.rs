//! The directory tree at the start of an archive.

use std::{
    collections::HashSet,
    io::{Read, Seek},
};

use tracing::{instrument, trace};

use crate::{
    cursor::WzCursor,
    error::{Error, Result},
};

/// Directory entry kinds
pub mod entry_kind {
    /// Placeholder the client skips
    pub const SKIP: u8 = 1;
    /// The kind and name are stored elsewhere, relative to the data start
    pub const REFERENCE: u8 = 2;
    pub const DIRECTORY: u8 = 3;
    pub const IMAGE: u8 = 4;
}

/// Directories nested deeper than this are treated as corrupt
pub const MAX_DEPTH: usize = 64;

/// An image stored in the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub name: String,
    /// Length of the image body in bytes
    pub size: usize,
    /// Wrapping sum of the body bytes
    pub checksum: i32,
    /// Absolute position of the image body
    pub offset: u64,
}

/// A directory and everything below it
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Directory {
    pub name: String,
    /// Size of the directory block, as stored
    pub size: usize,
    pub checksum: i32,
    /// Absolute position of the directory block
    pub offset: u64,
    pub directories: Vec<Directory>,
    pub images: Vec<ImageEntry>,
}

struct RawEntry {
    kind: u8,
    name: String,
    size: usize,
    checksum: i32,
    offset: u64,
}

impl Directory {
    /// Parse the directory block at the cursor position, then every
    /// directory below it
    #[instrument(skip(cursor), err)]
    pub(crate) fn parse<R: Read + Seek>(cursor: &mut WzCursor<R>, name: String) -> Result<Directory> {
        Self::parse_block(cursor, name, 0, &mut HashSet::new())
    }

    fn parse_block<R: Read + Seek>(
        cursor: &mut WzCursor<R>,
        name: String,
        depth: usize,
        visited: &mut HashSet<u64>,
    ) -> Result<Directory> {
        if depth > MAX_DEPTH {
            return Err(Error::Format(format!("directories nested deeper than {MAX_DEPTH}")));
        }

        let offset = cursor.position()? + cursor.start_offset();
        if !visited.insert(offset) {
            return Err(Error::Format(format!(
                "directory {name} at {offset} was already read"
            )));
        }

        let mut directory = Directory {
            name,
            offset,
            ..Default::default()
        };

        let count = cursor.read_compressed_len("directory entry count")?;
        let mut subdirectories = Vec::new();
        for _ in 0..count {
            let Some(entry) = Self::entry(cursor)? else {
                continue;
            };
            trace!(kind = entry.kind, name = %entry.name, offset = entry.offset, "directory entry");
            match entry.kind {
                entry_kind::DIRECTORY => subdirectories.push(entry),
                _ => directory.images.push(ImageEntry {
                    name: entry.name,
                    size: entry.size,
                    checksum: entry.checksum,
                    offset: entry.offset,
                }),
            }
        }

        for entry in subdirectories {
            cursor.seek_absolute(entry.offset)?;
            let mut child = Directory::parse_block(cursor, entry.name, depth + 1, visited)?;
            child.size = entry.size;
            child.checksum = entry.checksum;
            directory.directories.push(child);
        }
        Ok(directory)
    }

    fn entry<R: Read + Seek>(cursor: &mut WzCursor<R>) -> Result<Option<RawEntry>> {
        let (kind, name) = match cursor.read_u8()? {
            entry_kind::SKIP => {
                cursor.skip(4 + 2)?;
                cursor.read_offset()?;
                return Ok(None);
            }
            entry_kind::REFERENCE => {
                let relative = cursor.read_i32()?;
                let position = (cursor.offset_key().data_start as u64)
                    .checked_add_signed(relative as i64)
                    .ok_or_else(|| Error::Format(format!("entry name reference {relative}")))?;
                let here = cursor.position()?;
                cursor.seek_absolute(position)?;
                let kind = cursor.read_u8()?;
                let name = cursor.read_string()?;
                cursor.seek(here)?;
                (kind, name)
            }
            kind @ (entry_kind::DIRECTORY | entry_kind::IMAGE) => (kind, cursor.read_string()?),
            other => return Err(Error::Format(format!("unknown directory entry kind {other}"))),
        };
        if kind != entry_kind::DIRECTORY && kind != entry_kind::IMAGE {
            return Err(Error::Format(format!("referenced entry {name} has kind {kind}")));
        }

        let size = cursor.read_compressed_len("entry size")?;
        let checksum = cursor.read_compressed_int()?;
        let offset = cursor.read_offset()?;

        let end = cursor.len()? + cursor.start_offset();
        if offset.saturating_add(size as u64) > end {
            return Err(Error::Format(format!(
                "entry {name} at {offset} with {size} bytes lies outside the archive"
            )));
        }
        Ok(Some(RawEntry {
            kind,
            name,
            size,
            checksum,
            offset,
        }))
    }

    /// Find a directory by its `/` separated path below this one
    pub fn directory(&self, path: &str) -> Option<&Directory> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |dir, segment| dir.directories.iter().find(|d| d.name == segment))
    }

    /// Find an image by its `/` separated path below this directory
    pub fn image(&self, path: &str) -> Option<&ImageEntry> {
        let (parent, name) = match path.trim_matches('/').rsplit_once('/') {
            Some((parent, name)) => (self.directory(parent)?, name),
            None => (self, path.trim_matches('/')),
        };
        parent.images.iter().find(|image| image.name == name)
    }

    /// Every image below this directory with its path, directories first
    pub fn all_images(&self) -> Vec<(String, &ImageEntry)> {
        let mut out = Vec::new();
        self.collect_images("", &mut out);
        out
    }

    fn collect_images<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a ImageEntry)>) {
        for directory in &self.directories {
            directory.collect_images(&format!("{prefix}{}/", directory.name), out);
        }
        for image in &self.images {
            out.push((format!("{prefix}{}", image.name), image));
        }
    }

    /// Number of directories below this one
    pub fn directory_count(&self) -> usize {
        self.directories
            .iter()
            .map(|d| 1 + d.directory_count())
            .sum()
    }
}

//! Types for writing WZ archives
//!

use std::{
    io::{Seek, Write},
    sync::Arc,
};

use binrw::BinWrite;
use bon::Builder;
use tracing::{debug, instrument, warn};
use wz_crypto::{KeyMaterial, Keystream};

use crate::{
    cipher::OffsetKey,
    directory::entry_kind,
    encode::{compressed_int_len, encoded_string_len, WzEncoder},
    error::{Error, Result},
    header::{Version, WzHeader, DEFAULT_COPYRIGHT},
    serialize::checksum,
    tree::Image,
};

/// Version written when none is given
pub const DEFAULT_VERSION: u16 = 83;

/// Options for how the WZ file should be written
#[derive(Debug, Clone, Builder)]
pub struct WzWriterOptions {
    /// IV and master key used for directory names
    #[builder(default)]
    pub key: KeyMaterial,

    /// Client version the offsets are obfuscated for
    #[builder(default = DEFAULT_VERSION)]
    pub version: u16,

    /// Text stored in the header
    #[builder(into, default = DEFAULT_COPYRIGHT.to_string())]
    pub copyright: String,
}

impl Default for WzWriterOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Default)]
struct PendingImage {
    name: String,
    body: Vec<u8>,
    offset: u64,
}

#[derive(Debug, Default)]
struct PendingDirectory {
    name: String,
    directories: Vec<PendingDirectory>,
    images: Vec<PendingImage>,
    block_size: usize,
    offset: u64,
}

impl PendingDirectory {
    fn directory_mut(&mut self, name: &str) -> &mut PendingDirectory {
        let index = match self.directories.iter().position(|d| d.name == name) {
            Some(index) => index,
            None => {
                self.directories.push(PendingDirectory {
                    name: name.to_string(),
                    ..Default::default()
                });
                self.directories.len() - 1
            }
        };
        &mut self.directories[index]
    }

    fn entry_len(name: &str, size: usize, checksum: i32) -> usize {
        1 + encoded_string_len(name) + compressed_int_len(size as i32) + compressed_int_len(checksum) + 4
    }

    /// Compute block sizes bottom up
    fn measure(&mut self) -> usize {
        let mut size = compressed_int_len((self.directories.len() + self.images.len()) as i32);
        for directory in &mut self.directories {
            let block = directory.measure();
            size += Self::entry_len(&directory.name, block, 0);
        }
        for image in &self.images {
            size += Self::entry_len(&image.name, image.body.len(), checksum(&image.body));
        }
        self.block_size = size;
        size
    }

    fn place_directories(&mut self, position: &mut u64) {
        self.offset = *position;
        *position += self.block_size as u64;
        for directory in &mut self.directories {
            directory.place_directories(position);
        }
    }

    fn place_images(&mut self, position: &mut u64) {
        for image in &mut self.images {
            image.offset = *position;
            *position += image.body.len() as u64;
        }
        for directory in &mut self.directories {
            directory.place_images(position);
        }
    }

    fn write_blocks<W: Write + Seek>(&self, encoder: &mut WzEncoder<W>) -> Result<()> {
        let position = encoder.position()?;
        if position != self.offset {
            return Err(Error::Validation(format!(
                "directory {} landed at {position} instead of {}",
                self.name, self.offset
            )));
        }

        encoder.write_compressed_len(self.directories.len() + self.images.len())?;
        for directory in &self.directories {
            encoder.write_u8(entry_kind::DIRECTORY)?;
            encoder.write_string(&directory.name)?;
            encoder.write_compressed_len(directory.block_size)?;
            encoder.write_compressed_int(0)?;
            encoder.write_offset(directory.offset)?;
        }
        for image in &self.images {
            encoder.write_u8(entry_kind::IMAGE)?;
            encoder.write_string(&image.name)?;
            encoder.write_compressed_len(image.body.len())?;
            encoder.write_compressed_int(checksum(&image.body))?;
            encoder.write_offset(image.offset)?;
        }

        for directory in &self.directories {
            directory.write_blocks(encoder)?;
        }
        Ok(())
    }

    fn write_images<W: Write + Seek>(&self, encoder: &mut WzEncoder<W>) -> Result<()> {
        for image in &self.images {
            encoder.write_bytes(&image.body)?;
        }
        for directory in &self.directories {
            directory.write_images(encoder)?;
        }
        Ok(())
    }
}

/// WZ archive generator
///
/// ```
/// # fn doit() -> wz_archive::error::Result<()>
/// # {
/// use std::sync::Arc;
/// use wz_archive::{value::Value, Image, WzWriter};
/// use wz_crypto::Keystream;
///
/// let keystream = Arc::new(Keystream::default());
/// let mut image = Image::new("Cursor.img", keystream);
/// let root = image.root();
/// image.add_child(root, "delay", Value::Int(100))?;
///
/// let mut wz = WzWriter::new(std::io::Cursor::new(Vec::new()), Default::default());
/// wz.add_image("Cursor.img", &image)?;
/// let bytes = wz.finish()?.into_inner();
/// assert_eq!(&bytes[..4], b"PKG1");
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
pub struct WzWriter<W: Write + Seek> {
    inner: W,
    options: WzWriterOptions,
    root: PendingDirectory,
}

impl<W: Write + Seek> WzWriter<W> {
    pub fn new(inner: W, options: WzWriterOptions) -> WzWriter<W> {
        WzWriter {
            inner,
            options,
            root: PendingDirectory::default(),
        }
    }

    /// Make sure a directory exists, creating its parents as needed
    pub fn add_directory(&mut self, path: &str) {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(&mut self.root, |dir, segment| dir.directory_mut(segment));
    }

    /// Serialize `image` and store it at `path`
    #[instrument(skip(self, image), err)]
    pub fn add_image(&mut self, path: &str, image: &Image) -> Result<()> {
        if image.keystream().material() != &self.options.key {
            warn!(path, "image was built with a different key than the archive");
        }
        let body = image.to_bytes()?;
        self.add_image_bytes(path, body)
    }

    /// Store an already serialized image body at `path`
    pub fn add_image_bytes(&mut self, path: &str, body: Vec<u8>) -> Result<()> {
        let path = path.trim_matches('/');
        let (parent, name) = match path.rsplit_once('/') {
            Some((parent, name)) => (parent, name),
            None => ("", path),
        };
        if name.is_empty() {
            return Err(Error::Validation("an image needs a name".into()));
        }

        let directory = parent
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(&mut self.root, |dir, segment| dir.directory_mut(segment));
        if directory.images.iter().any(|image| image.name == name) {
            return Err(Error::Validation(format!("image {path} was added twice")));
        }
        debug!(path, size = body.len(), "added image");
        directory.images.push(PendingImage {
            name: name.to_string(),
            body,
            offset: 0,
        });
        Ok(())
    }

    /// Lay out and write the header, the directory blocks and every image
    ///
    /// This will return the writer, but one should normally not append any data to the end of the file.
    #[instrument(skip(self), err)]
    pub fn finish(mut self) -> Result<W> {
        let mut header = WzHeader::new(0, &self.options.copyright);
        let version = Version::new(self.options.version);

        self.root.measure();
        let mut position = header.data_start as u64 + 2;
        self.root.place_directories(&mut position);
        self.root.place_images(&mut position);
        if position > u32::MAX as u64 {
            return Err(Error::Validation(format!(
                "archive of {position} bytes is too large"
            )));
        }
        header.size = position - header.data_start as u64;

        header.write(&mut self.inner)?;
        let keystream = Arc::new(Keystream::new(self.options.key));
        let mut encoder = WzEncoder::new(&mut self.inner, keystream)
            .with_offset_key(OffsetKey::new(header.data_start, version.hash));
        encoder.write_u16(version.encrypted())?;
        self.root.write_blocks(&mut encoder)?;
        self.root.write_images(&mut encoder)?;

        Ok(self.inner)
    }
}

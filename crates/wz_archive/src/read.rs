//! Types for reading WZ archives
//!

use std::{
    fmt,
    io::{Read, Seek},
    sync::Arc,
};

use binrw::BinRead;
use bon::Builder;
use tracing::{debug, info, instrument, warn};
use wz_crypto::{KeyMaterial, Keystream};

use crate::{
    cipher::OffsetKey,
    cursor::{SliceCursor, WzCursor},
    directory::{Directory, ImageEntry},
    error::{Error, Result},
    header::{Version, WzHeader},
    parse::ParseOptions,
    serialize::checksum,
    tree::Image,
};

/// Highest version tried when the version is not given
pub const MAX_DETECTED_VERSION: u16 = 1024;

/// Number of image bodies held in memory at once by [`WzArchive::parse_all`]
pub const BATCH_SIZE: usize = 64;

/// Settings for opening an archive
#[derive(Debug, Clone, Copy, Builder)]
pub struct ArchiveOptions {
    /// IV and master key the archive was written with
    #[builder(default)]
    pub key: KeyMaterial,

    /// Client version, detected from the header when missing
    pub version: Option<u16>,

    /// Highest version tried during detection
    #[builder(default = MAX_DETECTED_VERSION)]
    pub max_version: u16,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// An image whose body has been read but not parsed yet
#[derive(Clone)]
pub struct LazyImage {
    name: String,
    cursor_data: Arc<[u8]>,
    offset: u64,
    checksum: i32,
    keystream: Arc<Keystream>,
}

impl fmt::Debug for LazyImage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LazyImage")
            .field("name", &self.name)
            .field("offset", &self.offset)
            .field("size", &self.cursor_data.len())
            .finish()
    }
}

impl LazyImage {
    fn new(name: String, cursor: SliceCursor, checksum: i32) -> Self {
        Self {
            name,
            offset: cursor.start_offset(),
            cursor_data: cursor.data().clone(),
            keystream: cursor.keystream().clone(),
            checksum,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw image body
    pub fn data(&self) -> &Arc<[u8]> {
        &self.cursor_data
    }

    /// Absolute position of the body in the archive
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether the body matches the checksum stored in the directory
    pub fn checksum_matches(&self) -> bool {
        checksum(&self.cursor_data) == self.checksum
    }

    /// Parse the body into a property tree
    pub fn materialize(&self, options: &ParseOptions) -> Result<Image> {
        Image::parse(
            &self.name,
            self.cursor_data.clone(),
            self.keystream.clone(),
            options,
        )
    }
}

/// Outcome of parsing every image in an archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub total: usize,
    pub parsed: usize,
    /// Image path and error message of every image that failed
    pub failures: Vec<(String, String)>,
    /// Full paths of links that do not resolve
    pub broken_links: Vec<String>,
    /// Image paths whose body does not match the stored checksum
    pub checksum_mismatches: Vec<String>,
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} parsed, {} link warnings",
            self.parsed,
            self.total,
            self.broken_links.len()
        )
    }
}

impl BatchReport {
    fn record(&mut self, path: &str, result: Result<Image>) {
        match result {
            Ok(image) => {
                self.parsed += 1;
                for link in image.broken_links() {
                    warn!(image = path, %link, "broken link");
                    self.broken_links.push(format!("{path}/{link}"));
                }
            }
            Err(e) => {
                warn!(image = path, error = %e, "unable to parse image");
                self.failures.push((path.to_string(), e.to_string()));
            }
        }
    }
}

/// WZ archive reader
///
/// ```no_run
/// use std::fs::File;
///
/// fn list_wz_contents(file: File) -> wz_archive::error::Result<()> {
///     let mut wz = wz_archive::WzArchive::new(file, Default::default())?;
///
///     for (path, entry) in wz.root().all_images() {
///         println!("{path}: {} bytes", entry.size);
///     }
///
///     let image = wz.image("Cursor.img", &Default::default())?;
///     println!("{} nodes", image.len());
///     Ok(())
/// }
/// ```
pub struct WzArchive<R> {
    cursor: WzCursor<R>,
    header: WzHeader,
    version: Version,
    root: Directory,
}

impl<R> fmt::Debug for WzArchive<R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("WzArchive")
            .field("header", &self.header)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl<R> WzArchive<R> {
    pub fn header(&self) -> &WzHeader {
        &self.header
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn root(&self) -> &Directory {
        &self.root
    }

    pub fn keystream(&self) -> &Arc<Keystream> {
        self.cursor.keystream()
    }

    /// Unwrap and return the inner reader object
    ///
    /// The position of the reader is undefined.
    pub fn into_inner(self) -> R {
        self.cursor.into_inner()
    }
}

impl<R: Read + Seek> WzArchive<R> {
    /// Read the header and the directory tree of an archive.
    ///
    /// Without a version in `options` every version whose encrypted form
    /// matches the header is tried until one yields a consistent directory.
    #[instrument(skip(reader), err)]
    pub fn new(mut reader: R, options: ArchiveOptions) -> Result<WzArchive<R>> {
        let header = WzHeader::read(&mut reader)?;
        debug!(?header, "read header");

        let keystream = Arc::new(Keystream::new(options.key));
        let mut cursor = WzCursor::new(reader, keystream);
        cursor.seek(header.data_start as u64)?;
        let encrypted = cursor.read_u16()?;

        let candidates: Vec<Version> = match options.version {
            Some(number) => vec![Version::new(number)],
            None => Version::candidates(encrypted, options.max_version).collect(),
        };
        if candidates.is_empty() {
            return Err(Error::Validation(format!(
                "no version up to {} matches the encrypted version {encrypted}",
                options.max_version
            )));
        }

        if let Some(number) = options.version {
            if Version::new(number).encrypted() != encrypted {
                warn!(version = number, encrypted, "version does not match the header");
            }
        }

        let mut last_error = None;
        for version in candidates {
            cursor.set_offset_key(OffsetKey::new(header.data_start, version.hash));
            cursor.seek(header.data_start as u64 + 2)?;
            match Directory::parse(&mut cursor, String::new()) {
                Ok(root) => {
                    info!(version = version.number, "opened archive");
                    return Ok(WzArchive {
                        cursor,
                        header,
                        version,
                        root,
                    });
                }
                Err(e) => {
                    debug!(version = version.number, error = %e, "version rejected");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::Validation(format!("version does not match the encrypted version {encrypted}"))
        }))
    }

    /// Read the body of an image without parsing it
    pub fn open_image(&mut self, entry: &ImageEntry) -> Result<LazyImage> {
        let cursor = self.cursor.sub_cursor(entry.offset, entry.size)?;
        Ok(LazyImage::new(entry.name.clone(), cursor, entry.checksum))
    }

    /// Look up an image by path and parse it
    pub fn image(&mut self, path: &str, options: &ParseOptions) -> Result<Image> {
        let entry = self
            .root
            .image(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        self.open_image(&entry)?.materialize(options)
    }

    /// Parse every image in the archive.
    ///
    /// The first image is parsed on its own. A key mismatch there aborts the
    /// whole run since every other image would fail the same way. Later
    /// failures, key mismatches included, are collected in the report.
    #[instrument(skip(self), err)]
    pub fn parse_all(&mut self, options: &ParseOptions) -> Result<BatchReport> {
        let entries = self
            .root
            .all_images()
            .into_iter()
            .map(|(path, entry)| (path, entry.clone()))
            .collect::<Vec<_>>();

        let mut report = BatchReport {
            total: entries.len(),
            ..Default::default()
        };

        let mut remaining = entries.as_slice();
        if let Some(((path, entry), rest)) = remaining.split_first() {
            let lazy = self.open_image(entry)?;
            if !lazy.checksum_matches() {
                warn!(image = %path, "checksum mismatch");
                report.checksum_mismatches.push(path.clone());
            }
            let result = lazy.materialize(options);
            if matches!(&result, Err(e) if e.is_key_mismatch()) {
                return result.map(|_| report);
            }
            report.record(path, result);
            remaining = rest;
        }

        for batch in remaining.chunks(BATCH_SIZE) {
            let lazies = batch
                .iter()
                .map(|(path, entry)| Ok((path, self.open_image(entry)?)))
                .collect::<Result<Vec<_>>>()?;

            for (path, lazy) in &lazies {
                if !lazy.checksum_matches() {
                    warn!(image = %path, "checksum mismatch");
                    report.checksum_mismatches.push(path.to_string());
                }
            }

            let results = materialize_batch(&lazies, options);
            for ((path, _), result) in lazies.iter().zip(results) {
                report.record(path, result);
            }
        }

        info!(%report, "parsed archive");
        Ok(report)
    }
}

#[cfg(feature = "parallel")]
fn materialize_batch(lazies: &[(&String, LazyImage)], options: &ParseOptions) -> Vec<Result<Image>> {
    use rayon::prelude::*;

    if options.parallel {
        return lazies
            .par_iter()
            .map(|(_, lazy)| lazy.materialize(options))
            .collect();
    }
    lazies.iter().map(|(_, lazy)| lazy.materialize(options)).collect()
}

#[cfg(not(feature = "parallel"))]
fn materialize_batch(lazies: &[(&String, LazyImage)], options: &ParseOptions) -> Vec<Result<Image>> {
    lazies.iter().map(|(_, lazy)| lazy.materialize(options)).collect()
}

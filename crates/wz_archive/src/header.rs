//! Archive header and version handling.

use binrw::{BinRead, BinWrite, NullString};

/// Copyright text the client writes into every archive
pub const DEFAULT_COPYRIGHT: &str = "Package file v1.0 Copyright 2002 Wizet, ZMS";

/// Size of the header without the copyright text and its terminator
pub const FIXED_HEADER_LEN: u32 = 16;

/// WZ file header
///
/// Starts with "PKG1", all values are little endian. The encrypted version
/// follows at `data_start` and is read separately.
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq)]
#[brw(magic = b"PKG1", little)]
pub struct WzHeader {
    /// Number of bytes after `data_start`
    pub size: u64,

    /// Absolute position where the archive data starts
    pub data_start: u32,

    /// Free form copyright text
    pub copyright: NullString,
}

impl WzHeader {
    /// A header for `size` bytes of data with the copyright placed right
    /// before the data
    pub fn new(size: u64, copyright: &str) -> Self {
        Self {
            size,
            data_start: FIXED_HEADER_LEN + copyright.len() as u32 + 1,
            copyright: copyright.into(),
        }
    }

    pub fn copyright(&self) -> String {
        self.copyright.to_string()
    }
}

impl Default for WzHeader {
    fn default() -> Self {
        Self::new(0, DEFAULT_COPYRIGHT)
    }
}

/// Hash of a version number, mixed into every obfuscated offset
pub fn version_hash(version: u16) -> u32 {
    version
        .to_string()
        .bytes()
        .fold(0u32, |hash, digit| hash.wrapping_mul(32).wrapping_add(digit as u32 + 1))
}

/// The value stored in the archive for a version hash
pub fn encrypted_version(hash: u32) -> u16 {
    let [a, b, c, d] = hash.to_be_bytes();
    (0xFF ^ a ^ b ^ c ^ d) as u16
}

/// A client version together with the derived values the archive uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub number: u16,
    pub hash: u32,
}

impl Version {
    pub fn new(number: u16) -> Self {
        Self {
            number,
            hash: version_hash(number),
        }
    }

    pub fn encrypted(&self) -> u16 {
        encrypted_version(self.hash)
    }

    /// Versions up to `max` whose encrypted form matches `encrypted`
    pub fn candidates(encrypted: u16, max: u16) -> impl Iterator<Item = Version> {
        (0..=max)
            .map(Version::new)
            .filter(move |v| v.encrypted() == encrypted)
    }
}

//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(std::io::Error),

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(binrw::Error),

    /// Transparent wrapper for [`wz_crypto::error::Error`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    Crypto(#[from] wz_crypto::error::Error),

    /// Transparent wrapper for [`wz_canvas::error::Error`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    Canvas(#[from] wz_canvas::error::Error),

    /// a value was rejected before anything was read or written
    #[error("{0}")]
    Validation(String),

    /// the data does not follow the archive format
    #[error("invalid archive data: {0}")]
    Format(String),

    /// a read went past the end of the stream
    #[error("unexpected end of stream")]
    Truncation,

    /// the data only makes sense under a different IV or key
    #[error("wrong key for this archive: {0}")]
    #[diagnostic(help("try a different `--region` or pass `--iv` and `--key` explicitly"))]
    KeyMismatch(String),

    /// a link could not be followed to its target
    #[error("unable to resolve link {path}")]
    LinkBroken { path: String },

    /// unable to find requested entry
    #[error("unable to find {0}")]
    NotFound(String),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        match value.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::Truncation,
            _ => Error::IOError(value),
        }
    }
}

impl From<binrw::Error> for Error {
    fn from(value: binrw::Error) -> Self {
        match value {
            binrw::Error::Io(e) => e.into(),
            other => Error::BinRWError(other),
        }
    }
}

impl Error {
    /// Whether every other image read with the same key will fail the same way
    pub fn is_key_mismatch(&self) -> bool {
        matches!(self, Error::KeyMismatch(_))
    }
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;

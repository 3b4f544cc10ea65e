//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// the pixel format id is not one the client knows about
    #[error("unknown pixel format {0}")]
    UnknownFormat(i32),

    /// the payload could not be turned into pixels
    #[error("corrupt canvas payload: {0}")]
    Format(String),

    /// decompressed data is shorter than the geometry requires
    #[error("canvas data truncated, expected {expected} bytes but found {found}")]
    Truncated { expected: usize, found: usize },

    /// a bitmap cannot be stored in the requested way
    #[error("{0}")]
    Validation(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;

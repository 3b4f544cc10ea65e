//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`hex::FromHexError`]
    #[error(transparent)]
    HexError(#[from] hex::FromHexError),

    /// key material had the wrong shape
    #[error("invalid key material: {0}")]
    #[diagnostic(help("key material is written as space separated byte pairs, e.g. `4D 23 C7 2B`"))]
    Validation(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;

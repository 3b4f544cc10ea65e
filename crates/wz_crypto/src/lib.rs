//! Key handling for **WZ** archives.
//!
//! Almost every variable length field of a WZ archive (strings, canvas chunks,
//! scripts, some sound headers) is obfuscated by XOR against a keystream. The
//! keystream is derived from two inputs:
//!
//! | Input       | Size     | Description                                               |
//! |-------------|----------|-----------------------------------------------------------|
//! | IV          | 4 bytes  | Differs per client distribution, all zero for plain files |
//! | Master key  | 32 bytes | AES-256 key, identical across the known distributions     |
//!
//! The IV is repeated to fill a 16 byte block which is encrypted with the
//! master key. The result is the first 16 keystream bytes and, encrypted again,
//! yields the next 16 and so on. An all-zero IV marks an unencrypted archive and
//! produces a keystream of zeros.
//!
//! ```
//! use wz_crypto::{Keystream, WellKnownKey};
//!
//! let stream = Keystream::new(WellKnownKey::Gms.into());
//! let mut secret = *b"hello";
//! stream.xor(&mut secret);
//! stream.xor(&mut secret);
//! assert_eq!(&secret, b"hello");
//! ```

pub mod error;
pub mod key;
pub mod keystream;

pub use key::{KeyMaterial, WellKnownKey};
pub use keystream::Keystream;

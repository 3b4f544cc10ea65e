//! Key material accepted by the keystream generator.

use std::{fmt, str::FromStr};

use crate::error::{Error, Result};

/// Length of the initialization vector in bytes
pub const IV_LEN: usize = 4;

/// Length of the master key in bytes
pub const MASTER_KEY_LEN: usize = 32;

/// The master key shipped with every known public client.
///
/// Only every fourth byte is populated, the rest of the AES-256 key is zero.
#[rustfmt::skip]
pub const DEFAULT_MASTER_KEY: [u8; MASTER_KEY_LEN] = [
    0x13, 0x00, 0x00, 0x00,
    0x08, 0x00, 0x00, 0x00,
    0x06, 0x00, 0x00, 0x00,
    0xB4, 0x00, 0x00, 0x00,
    0x1B, 0x00, 0x00, 0x00,
    0x0F, 0x00, 0x00, 0x00,
    0x33, 0x00, 0x00, 0x00,
    0x52, 0x00, 0x00, 0x00,
];

/// Initialization vectors of the known public client distributions
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum WellKnownKey {
    /// Global client
    #[default]
    Gms,

    /// European and south east asian clients
    Ems,

    /// Unencrypted archives, the keystream is all zeros
    Plain,
}

impl WellKnownKey {
    /// The initialization vector used by this distribution
    pub const fn iv(self) -> [u8; IV_LEN] {
        match self {
            WellKnownKey::Gms => [0x4D, 0x23, 0xC7, 0x2B],
            WellKnownKey::Ems => [0xB9, 0x7D, 0x63, 0xE9],
            WellKnownKey::Plain => [0x00; IV_LEN],
        }
    }
}

impl FromStr for WellKnownKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gms" => Ok(WellKnownKey::Gms),
            "ems" | "msea" => Ok(WellKnownKey::Ems),
            "plain" | "bms" | "kms" => Ok(WellKnownKey::Plain),
            other => Err(Error::Validation(format!("unknown key name {other}"))),
        }
    }
}

/// An IV and master key pair
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyMaterial {
    iv: [u8; IV_LEN],
    master_key: [u8; MASTER_KEY_LEN],
}

impl KeyMaterial {
    pub const fn new(iv: [u8; IV_LEN], master_key: [u8; MASTER_KEY_LEN]) -> Self {
        Self { iv, master_key }
    }

    /// Parse an IV and master key written as space separated hex byte pairs.
    ///
    /// ```
    /// let material = wz_crypto::KeyMaterial::from_hex("4D 23 C7 2B", &"00 ".repeat(32))?;
    /// assert_eq!(material.iv(), [0x4D, 0x23, 0xC7, 0x2B]);
    /// # Ok::<(), wz_crypto::error::Error>(())
    /// ```
    pub fn from_hex(iv: &str, master_key: &str) -> Result<Self> {
        Ok(Self {
            iv: parse_hex_bytes(iv)?,
            master_key: parse_hex_bytes(master_key)?,
        })
    }

    /// Key material with a well known IV and the default master key
    pub const fn well_known(key: WellKnownKey) -> Self {
        Self::new(key.iv(), DEFAULT_MASTER_KEY)
    }

    pub const fn iv(&self) -> [u8; IV_LEN] {
        self.iv
    }

    pub const fn master_key(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.master_key
    }

    /// An all-zero IV produces a keystream that leaves data untouched
    pub fn is_neutral(&self) -> bool {
        self.iv == [0u8; IV_LEN]
    }
}

impl Default for KeyMaterial {
    fn default() -> Self {
        Self::well_known(WellKnownKey::default())
    }
}

impl From<WellKnownKey> for KeyMaterial {
    fn from(value: WellKnownKey) -> Self {
        Self::well_known(value)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("iv", &hex::encode_upper(self.iv))
            .finish_non_exhaustive()
    }
}

fn parse_hex_bytes<const N: usize>(text: &str) -> Result<[u8; N]> {
    let mut bytes = Vec::with_capacity(N);
    for pair in text.split_whitespace() {
        if pair.len() != 2 {
            return Err(Error::Validation(format!(
                "expected a byte pair, found `{pair}`"
            )));
        }
        bytes.extend(hex::decode(pair)?);
    }

    let found = bytes.len();
    bytes
        .try_into()
        .map_err(|_| Error::Validation(format!("expected {N} bytes, found {found}")))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::error::{Error, Result};
    use crate::key::{KeyMaterial, WellKnownKey, DEFAULT_MASTER_KEY};

    #[test]
    fn parse_iv_and_key() -> Result<()> {
        let key = DEFAULT_MASTER_KEY
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ");

        let material = KeyMaterial::from_hex("b9 7d 63 E9", &key)?;
        assert_eq!(material, KeyMaterial::well_known(WellKnownKey::Ems));

        Ok(())
    }

    #[test]
    fn reject_short_iv() {
        let result = KeyMaterial::from_hex("4D 23 C7", &"00 ".repeat(32));
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn reject_long_key() {
        let result = KeyMaterial::from_hex("4D 23 C7 2B", &"00 ".repeat(33));
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn reject_unpaired_digits() {
        let result = KeyMaterial::from_hex("4D23 C7 2B", &"00 ".repeat(32));
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn reject_non_hex() {
        let result = KeyMaterial::from_hex("4D 23 C7 ZZ", &"00 ".repeat(32));
        assert!(matches!(result, Err(Error::HexError(_))));
    }

    #[test]
    fn well_known_names() -> Result<()> {
        assert_eq!("GMS".parse::<WellKnownKey>()?, WellKnownKey::Gms);
        assert_eq!("msea".parse::<WellKnownKey>()?, WellKnownKey::Ems);
        assert!(KeyMaterial::well_known("bms".parse()?).is_neutral());
        assert!("tms".parse::<WellKnownKey>().is_err());
        Ok(())
    }
}

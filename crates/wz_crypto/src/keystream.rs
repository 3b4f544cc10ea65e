//! Append-only keystream derived from [`KeyMaterial`].
//!
//! The first 16 byte block is the AES-256 encryption of the IV repeated four
//! times. Every following block is the encryption of the block before it. The
//! stream is grown in [`BATCH_SIZE`] steps whenever a caller asks for an index
//! past the generated length and is never shrunk or rewritten afterwards.

use std::{
    fmt,
    sync::{PoisonError, RwLock},
};

use aes::{
    cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit},
    Aes256,
};
use tracing::{instrument, trace};

use crate::key::{KeyMaterial, IV_LEN};

/// Number of bytes generated at once when the stream has to grow
pub const BATCH_SIZE: usize = 4096;

const BLOCK_LEN: usize = 16;

/// Shared, lazily grown keystream
///
/// Reads of already generated bytes only take a shared lock, growth is
/// serialized behind the write lock.
pub struct Keystream {
    material: KeyMaterial,
    cipher: Option<Aes256>,
    bytes: RwLock<Vec<u8>>,
}

impl Keystream {
    pub fn new(material: KeyMaterial) -> Self {
        Self {
            cipher: Self::cipher_for(&material),
            material,
            bytes: RwLock::new(Vec::new()),
        }
    }

    /// A keystream which leaves every byte it is combined with untouched
    pub fn neutral() -> Self {
        Self::new(KeyMaterial::new([0u8; IV_LEN], [0u8; 32]))
    }

    fn cipher_for(material: &KeyMaterial) -> Option<Aes256> {
        (!material.is_neutral())
            .then(|| Aes256::new(GenericArray::from_slice(material.master_key())))
    }

    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    pub fn is_neutral(&self) -> bool {
        self.cipher.is_none()
    }

    /// Replace the key material, discarding everything generated so far.
    ///
    /// Nothing happens when the material is unchanged.
    pub fn rekey(&mut self, material: KeyMaterial) {
        if material == self.material {
            return;
        }
        self.cipher = Self::cipher_for(&material);
        self.material = material;
        self.bytes
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of bytes generated so far
    pub fn generated(&self) -> usize {
        self.bytes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Make sure at least `len` bytes have been generated
    pub fn ensure(&self, len: usize) {
        if self.bytes.read().unwrap_or_else(PoisonError::into_inner).len() >= len {
            return;
        }

        let mut bytes = self.bytes.write().unwrap_or_else(PoisonError::into_inner);
        // Somebody else may have grown the stream while we waited for the lock
        if bytes.len() >= len {
            return;
        }
        self.grow(&mut bytes, len);
    }

    #[instrument(skip_all, fields(from = bytes.len(), to = len))]
    fn grow(&self, bytes: &mut Vec<u8>, len: usize) {
        let start = bytes.len();
        let target = len.div_ceil(BATCH_SIZE) * BATCH_SIZE;
        bytes.resize(target, 0);

        let Some(cipher) = &self.cipher else {
            return;
        };

        for offset in (start..target).step_by(BLOCK_LEN) {
            let mut block = if offset == 0 {
                let iv = self.material.iv();
                GenericArray::from(std::array::from_fn::<u8, BLOCK_LEN, _>(|i| iv[i % IV_LEN]))
            } else {
                GenericArray::clone_from_slice(&bytes[offset - BLOCK_LEN..offset])
            };
            cipher.encrypt_block(&mut block);
            bytes[offset..offset + BLOCK_LEN].copy_from_slice(&block);
        }
        trace!("keystream grown");
    }

    /// Run `f` with the first `len` keystream bytes
    pub fn with_bytes<T>(&self, len: usize, f: impl FnOnce(&[u8]) -> T) -> T {
        self.ensure(len);
        let bytes = self.bytes.read().unwrap_or_else(PoisonError::into_inner);
        f(&bytes[..len])
    }

    /// Keystream byte at `index`
    pub fn byte(&self, index: usize) -> u8 {
        self.with_bytes(index + 1, |key| key[index])
    }

    /// Copy of the first `len` keystream bytes
    pub fn prefix(&self, len: usize) -> Vec<u8> {
        self.with_bytes(len, <[u8]>::to_vec)
    }

    /// XOR `data` in place with the keystream starting at index 0.
    ///
    /// Applying it twice restores the original bytes.
    pub fn xor(&self, data: &mut [u8]) {
        if self.is_neutral() {
            return;
        }
        self.with_bytes(data.len(), |key| {
            data.iter_mut().zip(key).for_each(|(d, k)| *d ^= k);
        });
    }
}

impl Default for Keystream {
    fn default() -> Self {
        Self::new(KeyMaterial::default())
    }
}

impl fmt::Debug for Keystream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keystream")
            .field("material", &self.material)
            .field("generated", &self.generated())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use crate::key::{KeyMaterial, WellKnownKey, DEFAULT_MASTER_KEY};
    use crate::keystream::{Keystream, BATCH_SIZE};

    #[traced_test]
    #[test]
    fn zero_iv_is_neutral() {
        let stream = Keystream::new(KeyMaterial::new([0; 4], DEFAULT_MASTER_KEY));
        assert!(stream.is_neutral());
        assert_eq!(stream.prefix(16), vec![0u8; 16]);

        let mut data = *b"unchanged";
        stream.xor(&mut data);
        assert_eq!(&data, b"unchanged");
    }

    #[rustfmt::skip]
    const GMS_BLOCKS: [[u8; 16]; 3] = [
        [0x96, 0xAE, 0x3F, 0xA4, 0x48, 0xFA, 0xDD, 0x90, 0x46, 0x76, 0x05, 0x61, 0x97, 0xCE, 0x78, 0x68],
        [0x2B, 0xA0, 0x44, 0x8F, 0xC1, 0x56, 0x7E, 0x32, 0xFC, 0xE1, 0xF5, 0xB3, 0x14, 0x14, 0xC5, 0x22],
        // first block of the second batch
        [0xD3, 0xF9, 0x5C, 0x76, 0xCD, 0xE7, 0x7B, 0x82, 0x44, 0xEE, 0x0E, 0x45, 0x88, 0xCA, 0xEB, 0x5B],
    ];

    #[rustfmt::skip]
    const EMS_FIRST_BLOCK: [u8; 16] = [
        0xAB, 0x65, 0x49, 0x05, 0x67, 0xCD, 0x57, 0x0A, 0x98, 0x7B, 0x87, 0x0A, 0xEC, 0x65, 0x07, 0x8B,
    ];

    #[traced_test]
    #[test]
    fn well_known_keystreams() {
        let stream = Keystream::new(KeyMaterial::new(WellKnownKey::Gms.iv(), DEFAULT_MASTER_KEY));
        assert_eq!(stream.prefix(16), GMS_BLOCKS[0]);
        assert_eq!(stream.with_bytes(32, |k| k[16..].to_vec()), GMS_BLOCKS[1]);
        assert_eq!(
            stream.with_bytes(BATCH_SIZE + 16, |k| k[BATCH_SIZE..].to_vec()),
            GMS_BLOCKS[2]
        );

        let stream = Keystream::new(WellKnownKey::Ems.into());
        assert_eq!(stream.prefix(16), EMS_FIRST_BLOCK);
    }

    #[traced_test]
    #[test]
    fn grows_in_batches_and_keeps_prefix() {
        let stream = Keystream::default();
        let head = stream.prefix(64);
        assert_eq!(stream.generated(), BATCH_SIZE);

        stream.ensure(BATCH_SIZE + 1);
        assert_eq!(stream.generated(), BATCH_SIZE * 2);
        assert_eq!(stream.prefix(64), head);
    }

    #[traced_test]
    #[test]
    fn rekey_regenerates() {
        let mut stream = Keystream::new(WellKnownKey::Gms.into());
        let gms = stream.prefix(16);

        stream.rekey(WellKnownKey::Ems.into());
        assert_eq!(stream.generated(), 0);
        assert_ne!(stream.prefix(16), gms);

        stream.rekey(WellKnownKey::Gms.into());
        assert_eq!(stream.prefix(16), gms);
    }

    #[test]
    fn xor_is_an_involution() {
        let stream = Keystream::new(WellKnownKey::Ems.into());
        let original = (0..=255u8).collect::<Vec<_>>();

        let mut data = original.clone();
        stream.xor(&mut data);
        assert_ne!(data, original);
        stream.xor(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn concurrent_growth_agrees() {
        let shared = Arc::new(Keystream::default());
        let expected = Keystream::default().prefix(BATCH_SIZE * 4);

        let handles = (0..8)
            .map(|i| {
                let stream = Arc::clone(&shared);
                std::thread::spawn(move || stream.prefix(BATCH_SIZE * (i % 4 + 1)))
            })
            .collect::<Vec<_>>();

        for handle in handles {
            let prefix = handle.join().expect("thread panicked");
            assert_eq!(prefix[..], expected[..prefix.len()]);
        }
    }
}

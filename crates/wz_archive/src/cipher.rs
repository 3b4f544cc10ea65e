//! String and offset obfuscation.
//!
//! Every function here is a pure transformation. The string ciphers are
//! involutions, applying them twice with the same key restores the input.

/// Initial mask for single byte strings, incremented per character
pub const ASCII_MASK: u8 = 0xAA;

/// Initial mask for UTF-16 strings, incremented per code unit
pub const UNICODE_MASK: u16 = 0xAAAA;

/// Constant subtracted while deriving an offset key
pub const OFFSET_CONSTANT: u32 = 0x581C_3F6D;

/// Archive wide values mixed into every stored offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OffsetKey {
    /// Absolute position where the archive data starts
    pub data_start: u32,
    /// Hash of the archive version, see [`crate::header::version_hash`]
    pub hash: u32,
}

impl OffsetKey {
    pub const fn new(data_start: u32, hash: u32) -> Self {
        Self { data_start, hash }
    }

    /// The key an offset stored at absolute `position` is XOR-ed with
    pub fn mask(&self, position: u32) -> u32 {
        let mut t = position.wrapping_sub(self.data_start) ^ 0xFFFF_FFFF;
        t = t.wrapping_mul(self.hash);
        t = t.wrapping_sub(OFFSET_CONSTANT);
        t.rotate_left(t & 0x1F)
    }

    /// Recover the absolute offset from the `raw` value stored at `position`
    pub fn decode(&self, position: u32, raw: u32) -> u32 {
        (self.mask(position) ^ raw).wrapping_add(self.data_start.wrapping_mul(2))
    }

    /// The value to store at `position` so that it decodes to `target`
    pub fn encode(&self, position: u32, target: u32) -> u32 {
        self.mask(position) ^ target.wrapping_sub(self.data_start.wrapping_mul(2))
    }
}

/// XOR single byte characters with the keystream and the rolling mask
pub fn apply_ascii(data: &mut [u8], key: &[u8]) {
    let mut mask = ASCII_MASK;
    for (byte, k) in data.iter_mut().zip(key) {
        *byte ^= k ^ mask;
        mask = mask.wrapping_add(1);
    }
}

/// XOR UTF-16 code units with keystream pairs and the rolling mask.
///
/// `key` must hold at least two bytes per code unit.
pub fn apply_unicode(data: &mut [u16], key: &[u8]) {
    let mut mask = UNICODE_MASK;
    for (unit, k) in data.iter_mut().zip(key.chunks_exact(2)) {
        *unit ^= u16::from_le_bytes([k[0], k[1]]) ^ mask;
        mask = mask.wrapping_add(1);
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use wz_crypto::{Keystream, WellKnownKey};

    use crate::cipher::{apply_ascii, apply_unicode, OffsetKey};

    #[test]
    fn ascii_is_an_involution() {
        let keystream = Keystream::new(WellKnownKey::Gms.into());
        let key = keystream.prefix(64);
        let original = b"Property".to_vec();

        let mut data = original.clone();
        apply_ascii(&mut data, &key);
        assert_ne!(data, original);
        apply_ascii(&mut data, &key);
        assert_eq!(data, original);
    }

    #[test]
    fn neutral_key_only_applies_the_mask() {
        let mut data = vec![0u8; 3];
        apply_ascii(&mut data, &[0u8; 3]);
        assert_eq!(data, vec![0xAA, 0xAB, 0xAC]);

        let mut units = vec![0u16; 2];
        apply_unicode(&mut units, &[0u8; 4]);
        assert_eq!(units, vec![0xAAAA, 0xAAAB]);
    }

    #[test]
    fn unicode_is_an_involution() {
        let keystream = Keystream::new(WellKnownKey::Ems.into());
        let key = keystream.prefix(64);
        let original = "모험가".encode_utf16().collect::<Vec<_>>();

        let mut data = original.clone();
        apply_unicode(&mut data, &key);
        apply_unicode(&mut data, &key);
        assert_eq!(data, original);
    }

    #[test]
    fn offsets_roundtrip() {
        let key = OffsetKey::new(60, 0x0001_D3B5);
        for position in [62u32, 100, 4096, 0x7FFF_FFF0] {
            for target in [0u32, 60, 1234, 0xFFFF_FFFF] {
                assert_eq!(key.decode(position, key.encode(position, target)), target);
            }
        }
    }

    #[test]
    fn every_position_decodes_what_was_encoded() {
        for key in [OffsetKey::new(60, 0x0001_D3B5), OffsetKey::new(0x3C, 0x0000_F5A3), OffsetKey::default()] {
            for position in 0..4096u32 {
                let target = position.wrapping_mul(0x9E37_79B9) ^ 0x5A5A;
                assert_eq!(key.decode(position, key.encode(position, target)), target, "{position}");
            }
        }
    }

    #[test]
    fn distinct_targets_encode_differently() {
        let key = OffsetKey::new(60, 0x0001_D3B5);
        let mut raw = (0..1024u32).map(|target| key.encode(100, target)).collect::<Vec<_>>();
        raw.sort_unstable();
        raw.dedup();
        assert_eq!(raw.len(), 1024);
    }

    #[test]
    fn offset_mask_depends_on_position() {
        let key = OffsetKey::new(60, 0x0001_D3B5);
        assert_ne!(key.mask(62), key.mask(66));
    }
}

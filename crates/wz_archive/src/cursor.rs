//! Primitive readers for the archive wire format

use std::{
    io::{Cursor, Read, Seek, SeekFrom},
    sync::Arc,
};

use byteorder::{LittleEndian, ReadBytesExt};
use widestring::U16String;
use wz_crypto::Keystream;

use crate::{
    cipher::{apply_ascii, apply_unicode, OffsetKey},
    error::{Error, Result},
};

/// String block indicator for an inline string
pub const STRING_INLINE: u8 = 0x00;
/// String block indicator for a string stored earlier in the image
pub const STRING_REFERENCE: u8 = 0x01;
/// Inline indicator used for extended type names
pub const TYPE_INLINE: u8 = 0x73;
/// Reference indicator used for extended type names
pub const TYPE_REFERENCE: u8 = 0x1B;

/// A cursor over an in-memory copy of part of an archive
pub type SliceCursor = WzCursor<Cursor<Arc<[u8]>>>;

/// Reads little endian primitives, compressed integers and encrypted strings
/// from an archive stream.
///
/// Positions are local to the underlying reader. `start_offset` is the
/// absolute archive position of local position 0, which matters for
/// obfuscated offsets inside a sub-cursor.
#[derive(Debug)]
pub struct WzCursor<R> {
    inner: R,
    keystream: Arc<Keystream>,
    offset_key: OffsetKey,
    start_offset: u64,
    len: Option<u64>,
}

impl<R> WzCursor<R> {
    pub fn new(inner: R, keystream: Arc<Keystream>) -> Self {
        Self {
            inner,
            keystream,
            offset_key: OffsetKey::default(),
            start_offset: 0,
            len: None,
        }
    }

    pub fn with_offset_key(mut self, offset_key: OffsetKey) -> Self {
        self.offset_key = offset_key;
        self
    }

    pub fn keystream(&self) -> &Arc<Keystream> {
        &self.keystream
    }

    pub fn offset_key(&self) -> OffsetKey {
        self.offset_key
    }

    pub fn set_offset_key(&mut self, offset_key: OffsetKey) {
        self.offset_key = offset_key;
    }

    /// Absolute archive position of local position 0
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> WzCursor<R> {
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    /// Total length of the underlying stream
    pub fn len(&mut self) -> Result<u64> {
        if let Some(len) = self.len {
            return Ok(len);
        }
        let here = self.inner.stream_position()?;
        let len = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(here))?;
        self.len = Some(len);
        Ok(len)
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn remaining(&mut self) -> Result<u64> {
        let position = self.position()?;
        Ok(self.len()?.saturating_sub(position))
    }

    /// Move to a local position, which may not lie past the end of the stream
    pub fn seek(&mut self, position: u64) -> Result<()> {
        let len = self.len()?;
        if position > len {
            return Err(Error::Format(format!(
                "position {position} is outside the {len} byte stream"
            )));
        }
        self.inner.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    /// Move to an absolute archive position
    pub fn seek_absolute(&mut self, position: u64) -> Result<()> {
        let local = position.checked_sub(self.start_offset).ok_or_else(|| {
            Error::Format(format!(
                "offset {position} lies before the start of this block at {}",
                self.start_offset
            ))
        })?;
        self.seek(local)
    }

    pub fn skip(&mut self, count: u64) -> Result<()> {
        let position = self.position()?;
        let target = position.checked_add(count).ok_or(Error::Truncation)?;
        if target > self.len()? {
            return Err(Error::Truncation);
        }
        self.inner.seek(SeekFrom::Start(target))?;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.inner.read_u8()?)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.inner.read_i8()?)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.inner.read_u16::<LittleEndian>()?)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.inner.read_i16::<LittleEndian>()?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.inner.read_u32::<LittleEndian>()?)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.inner.read_i32::<LittleEndian>()?)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.inner.read_i64::<LittleEndian>()?)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(self.inner.read_f32::<LittleEndian>()?)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(self.inner.read_f64::<LittleEndian>()?)
    }

    /// Read `count` bytes, failing before allocating when the stream is shorter
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        if count as u64 > self.remaining()? {
            return Err(Error::Truncation);
        }
        let mut buf = vec![0u8; count];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// A signed byte, or the `i32` that follows when the byte is `-128`
    pub fn read_compressed_int(&mut self) -> Result<i32> {
        match self.read_i8()? {
            i8::MIN => self.read_i32(),
            small => Ok(small as i32),
        }
    }

    /// A signed byte, or the `i64` that follows when the byte is `-128`
    pub fn read_compressed_long(&mut self) -> Result<i64> {
        match self.read_i8()? {
            i8::MIN => self.read_i64(),
            small => Ok(small as i64),
        }
    }

    /// A compressed int that must not be negative
    pub fn read_compressed_len(&mut self, what: &str) -> Result<usize> {
        let value = self.read_compressed_int()?;
        usize::try_from(value)
            .map_err(|_| Error::Format(format!("negative {what} {value}")))
    }

    /// Read an encrypted string.
    ///
    /// Single byte strings map every byte to the code point of the same
    /// value. UTF-16 strings are decoded lossily: an unpaired surrogate
    /// becomes U+FFFD, so such a string does not survive being written back.
    pub fn read_string(&mut self) -> Result<String> {
        match self.read_i8()? {
            0 => Ok(String::new()),
            small if small > 0 => {
                let len = match small {
                    i8::MAX => self.read_i32()?,
                    _ => small as i32,
                };
                if len <= 0 {
                    return Ok(String::new());
                }
                self.read_unicode(len as usize)
            }
            small => {
                let len = match small {
                    i8::MIN => self.read_i32()?,
                    _ => -(small as i32),
                };
                if len <= 0 {
                    return Ok(String::new());
                }
                self.read_ascii(len as usize)
            }
        }
    }

    fn read_unicode(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_bytes(len.checked_mul(2).ok_or(Error::Truncation)?)?;
        let mut units = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        self.keystream
            .with_bytes(len * 2, |key| apply_unicode(&mut units, key));
        Ok(U16String::from_vec(units).to_string_lossy())
    }

    fn read_ascii(&mut self, len: usize) -> Result<String> {
        let mut bytes = self.read_bytes(len)?;
        self.keystream.with_bytes(len, |key| apply_ascii(&mut bytes, key));
        Ok(bytes.into_iter().map(char::from).collect())
    }

    /// Read the encrypted string stored at local `position`, then return to
    /// where the cursor was
    pub fn read_string_at(&mut self, position: u64) -> Result<String> {
        let here = self.position()?;
        self.seek(position)?;
        let result = self.read_string();
        self.inner.seek(SeekFrom::Start(here))?;
        result
    }

    /// Read a string block. Back references are relative to `base`, the
    /// local position where the image body starts.
    pub fn read_string_block(&mut self, base: u64) -> Result<String> {
        match self.read_u8()? {
            STRING_INLINE | TYPE_INLINE => self.read_string(),
            STRING_REFERENCE | TYPE_REFERENCE => {
                let delta = self.read_i32()?;
                let position = base.checked_add_signed(delta as i64).ok_or_else(|| {
                    Error::Format(format!("string reference {delta} points before the image"))
                })?;
                self.read_string_at(position)
            }
            other => Err(Error::Format(format!(
                "unknown string block indicator {other:#04x}"
            ))),
        }
    }

    /// Read an obfuscated offset and return the absolute position it names
    pub fn read_offset(&mut self) -> Result<u64> {
        let position = (self.position()? + self.start_offset) as u32;
        let raw = self.read_u32()?;
        Ok(self.offset_key.decode(position, raw) as u64)
    }

    /// Copy `[start, start + len)` into memory and return a cursor over it
    /// that shares this cursor's keys
    pub fn sub_cursor(&mut self, start: u64, len: usize) -> Result<SliceCursor> {
        let here = self.position()?;
        self.seek(start)?;
        let data = self.read_bytes(len);
        self.inner.seek(SeekFrom::Start(here))?;

        let mut cursor = WzCursor::new(Cursor::new(Arc::<[u8]>::from(data?)), self.keystream.clone())
            .with_offset_key(self.offset_key);
        cursor.start_offset = self.start_offset + start;
        Ok(cursor)
    }
}

impl SliceCursor {
    /// A cursor over `data` whose local position 0 is `start_offset`
    pub fn from_slice(data: Arc<[u8]>, keystream: Arc<Keystream>, start_offset: u64) -> Self {
        let mut cursor = WzCursor::new(Cursor::new(data), keystream);
        cursor.start_offset = start_offset;
        cursor
    }

    /// The bytes this cursor reads from
    pub fn data(&self) -> &Arc<[u8]> {
        self.inner.get_ref()
    }
}

#[cfg(test)]
mod test {
    use std::{io::Cursor, sync::Arc};

    use pretty_assertions::assert_eq;
    use wz_crypto::{Keystream, WellKnownKey};

    use crate::{
        cipher::OffsetKey,
        cursor::WzCursor,
        encode::WzEncoder,
        error::{Error, Result},
    };

    fn cursor(bytes: &[u8]) -> WzCursor<Cursor<Vec<u8>>> {
        WzCursor::new(Cursor::new(bytes.to_vec()), Arc::new(Keystream::neutral()))
    }

    #[test]
    fn compressed_int_fixtures() -> Result<()> {
        assert_eq!(cursor(&[0x7F]).read_compressed_int()?, 127);
        assert_eq!(cursor(&[0xFF]).read_compressed_int()?, -1);
        assert_eq!(cursor(&[0x80, 0x00, 0x01, 0x00, 0x00]).read_compressed_int()?, 256);
        assert_eq!(
            cursor(&[0x80, 0x80, 0xFF, 0xFF, 0xFF]).read_compressed_int()?,
            -128
        );
        Ok(())
    }

    #[test]
    fn compressed_long_uses_eight_bytes() -> Result<()> {
        let bytes = [0x80, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
        assert_eq!(cursor(&bytes).read_compressed_long()?, 1 << 32);
        Ok(())
    }

    #[test]
    fn truncated_compressed_int() {
        let result = cursor(&[0x80, 0x01]).read_compressed_int();
        assert!(matches!(result, Err(Error::Truncation)));
    }

    #[test]
    fn empty_string_is_a_single_zero() -> Result<()> {
        let mut c = cursor(&[0x00]);
        assert_eq!(c.read_string()?, "");
        assert_eq!(c.position()?, 1);
        Ok(())
    }

    #[test]
    fn neutral_ascii_string() -> Result<()> {
        // "ab" XOR 0xAA, 0xAB
        let mut c = cursor(&[0xFE, b'a' ^ 0xAA, b'b' ^ 0xAB]);
        assert_eq!(c.read_string()?, "ab");
        Ok(())
    }

    #[test]
    fn unpaired_surrogate_is_replaced() -> Result<()> {
        // 0xD800 then 'a', XOR 0xAAAA, 0xAAAB
        let lone = (0xD800u16 ^ 0xAAAA).to_le_bytes();
        let a = (0x0061u16 ^ 0xAAAB).to_le_bytes();
        let mut c = cursor(&[0x02, lone[0], lone[1], a[0], a[1]]);
        assert_eq!(c.read_string()?, "\u{FFFD}a");
        assert_eq!(c.position()?, 5);
        Ok(())
    }

    #[test]
    fn oversized_length_is_truncation() {
        let result = cursor(&[0x80, 0xFF, 0xFF, 0xFF, 0x0F]).read_string();
        assert!(matches!(result, Err(Error::Truncation)));
    }

    #[test]
    fn unknown_string_block_indicator() {
        let result = cursor(&[0x42]).read_string_block(0);
        assert!(matches!(result, Err(Error::Format(_))));
    }

    #[test]
    fn string_block_back_reference_restores_position() -> Result<()> {
        let keystream = Arc::new(Keystream::new(WellKnownKey::Gms.into()));
        let mut encoder = WzEncoder::new(Cursor::new(Vec::new()), keystream.clone());
        encoder.write_string_block("shared", 0x00, 0x01)?;
        encoder.write_string_block("shared", 0x00, 0x01)?;
        encoder.write_u8(0x42)?;
        let bytes = encoder.into_inner().into_inner();

        let mut c = WzCursor::new(Cursor::new(bytes), keystream);
        assert_eq!(c.read_string_block(0)?, "shared");
        assert_eq!(c.read_u8()?, 0x01);
        let indicator = c.position()? - 1;
        c.seek(indicator)?;
        assert_eq!(c.read_string_block(0)?, "shared");
        assert_eq!(c.read_u8()?, 0x42);
        Ok(())
    }

    #[test]
    fn sub_cursor_keeps_absolute_offsets() -> Result<()> {
        let keystream = Arc::new(Keystream::neutral());
        let key = OffsetKey::new(60, 1876);
        let mut bytes = vec![0u8; 16];
        bytes.extend_from_slice(&key.encode(16 + 100, 4242).to_le_bytes());

        let mut outer = WzCursor::new(Cursor::new(bytes), keystream).with_offset_key(key);
        let inner = outer.sub_cursor(16, 4)?;
        assert_eq!(inner.start_offset(), 16);

        // shift the whole block to an absolute position of 100 + 16
        let mut moved = crate::cursor::SliceCursor::from_slice(
            inner.data().clone(),
            inner.keystream().clone(),
            116,
        )
        .with_offset_key(key);
        assert_eq!(moved.read_offset()?, 4242);
        Ok(())
    }
}

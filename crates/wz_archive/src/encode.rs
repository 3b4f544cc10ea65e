//! Primitive writers for the archive wire format

use std::{
    collections::HashMap,
    io::{Seek, SeekFrom, Write},
    sync::Arc,
};

use byteorder::{LittleEndian, WriteBytesExt};
use wz_crypto::Keystream;

use crate::{
    cipher::{apply_ascii, apply_unicode, OffsetKey},
    error::{Error, Result},
};

/// Strings up to this many characters are always written inline
pub const MIN_SHARED_STRING: usize = 4;

/// The counterpart of [`crate::cursor::WzCursor`].
///
/// Keeps a cache of strings already written so repeated names and values
/// become back references. Cached positions are positions in the
/// underlying writer, so one encoder should write exactly one image body
/// starting at position 0.
#[derive(Debug)]
pub struct WzEncoder<W> {
    inner: W,
    keystream: Arc<Keystream>,
    offset_key: OffsetKey,
    strings: HashMap<String, u32>,
}

impl<W> WzEncoder<W> {
    pub fn new(inner: W, keystream: Arc<Keystream>) -> Self {
        Self {
            inner,
            keystream,
            offset_key: OffsetKey::default(),
            strings: HashMap::new(),
        }
    }

    pub fn with_offset_key(mut self, offset_key: OffsetKey) -> Self {
        self.offset_key = offset_key;
        self
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Seek> WzEncoder<W> {
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        Ok(self.inner.write_u8(value)?)
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        Ok(self.inner.write_i8(value)?)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        Ok(self.inner.write_u16::<LittleEndian>(value)?)
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        Ok(self.inner.write_i16::<LittleEndian>(value)?)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        Ok(self.inner.write_u32::<LittleEndian>(value)?)
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        Ok(self.inner.write_i32::<LittleEndian>(value)?)
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        Ok(self.inner.write_i64::<LittleEndian>(value)?)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        Ok(self.inner.write_f32::<LittleEndian>(value)?)
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        Ok(self.inner.write_f64::<LittleEndian>(value)?)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        Ok(self.inner.write_all(bytes)?)
    }

    pub fn write_compressed_int(&mut self, value: i32) -> Result<()> {
        if value > i8::MAX as i32 || value <= i8::MIN as i32 {
            self.write_i8(i8::MIN)?;
            self.write_i32(value)
        } else {
            self.write_i8(value as i8)
        }
    }

    pub fn write_compressed_long(&mut self, value: i64) -> Result<()> {
        if value > i8::MAX as i64 || value <= i8::MIN as i64 {
            self.write_i8(i8::MIN)?;
            self.write_i64(value)
        } else {
            self.write_i8(value as i8)
        }
    }

    /// Write a length as a compressed int
    pub fn write_compressed_len(&mut self, len: usize) -> Result<()> {
        let value = i32::try_from(len)
            .map_err(|_| Error::Validation(format!("length {len} does not fit in 32 bits")))?;
        self.write_compressed_int(value)
    }

    /// Write an encrypted string, using UTF-16 when any character is outside ASCII
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        if value.is_empty() {
            return self.write_u8(0);
        }

        if value.chars().any(|c| !c.is_ascii()) {
            let mut units = value.encode_utf16().collect::<Vec<_>>();
            let len = units.len();
            if len >= i8::MAX as usize {
                self.write_i8(i8::MAX)?;
                self.write_i32(len_i32(len)?)?;
            } else {
                self.write_i8(len as i8)?;
            }
            self.keystream
                .with_bytes(len * 2, |key| apply_unicode(&mut units, key));
            for unit in units {
                self.write_u16(unit)?;
            }
        } else {
            let mut bytes = value.as_bytes().to_vec();
            let len = bytes.len();
            if len > i8::MAX as usize {
                self.write_i8(i8::MIN)?;
                self.write_i32(len_i32(len)?)?;
            } else {
                self.write_i8(-(len as i32) as i8)?;
            }
            self.keystream.with_bytes(len, |key| apply_ascii(&mut bytes, key));
            self.write_bytes(&bytes)?;
        }
        Ok(())
    }

    /// Write a string block, referencing an earlier copy of a longer string
    /// when one exists
    pub fn write_string_block(&mut self, value: &str, inline: u8, reference: u8) -> Result<()> {
        if value.chars().count() > MIN_SHARED_STRING {
            if let Some(&position) = self.strings.get(value) {
                self.write_u8(reference)?;
                return self.write_u32(position);
            }
        }

        self.write_u8(inline)?;
        let position = self.position()?;
        self.write_string(value)?;
        if let Ok(position) = u32::try_from(position) {
            self.strings.entry(value.to_string()).or_insert(position);
        }
        Ok(())
    }

    /// Write an obfuscated offset at the current absolute position
    pub fn write_offset(&mut self, target: u64) -> Result<()> {
        let position = self.position()? as u32;
        let target = u32::try_from(target)
            .map_err(|_| Error::Validation(format!("offset {target} does not fit in 32 bits")))?;
        let raw = self.offset_key.encode(position, target);
        self.write_u32(raw)
    }

    /// Reserve a `u32` length, returning the position to patch
    pub fn begin_length(&mut self) -> Result<u64> {
        let position = self.position()?;
        self.write_u32(0)?;
        Ok(position)
    }

    /// Patch a length reserved with [`WzEncoder::begin_length`] with the
    /// number of bytes written since
    pub fn end_length(&mut self, reserved: u64) -> Result<()> {
        let end = self.position()?;
        let len = end - reserved - 4;
        let len = u32::try_from(len)
            .map_err(|_| Error::Validation(format!("block of {len} bytes is too large")))?;
        self.seek(reserved)?;
        self.write_u32(len)?;
        self.seek(end)
    }
}

fn len_i32(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| Error::Validation(format!("string of {len} characters is too long")))
}

/// Number of bytes [`WzEncoder::write_string`] emits for `value`
pub fn encoded_string_len(value: &str) -> usize {
    if value.is_empty() {
        return 1;
    }
    if value.chars().any(|c| !c.is_ascii()) {
        let len = value.encode_utf16().count();
        let prefix = if len >= i8::MAX as usize { 5 } else { 1 };
        prefix + len * 2
    } else {
        let len = value.len();
        let prefix = if len > i8::MAX as usize { 5 } else { 1 };
        prefix + len
    }
}

/// Number of bytes a compressed int occupies
pub fn compressed_int_len(value: i32) -> usize {
    if value > i8::MAX as i32 || value <= i8::MIN as i32 {
        5
    } else {
        1
    }
}

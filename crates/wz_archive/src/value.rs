//! Property values and the payload carrying kinds.

use std::{fmt, io::Cursor};

use binrw::{BinRead, BinWrite};
use derive_more::Display;
use wz_canvas::PixelFormat;
use wz_crypto::Keystream;

use crate::error::{Error, Result};

/// Extended type names as stored in the archive
pub mod type_name {
    pub const PROPERTY: &str = "Property";
    pub const CANVAS: &str = "Canvas";
    pub const VECTOR: &str = "Shape2D#Vector2D";
    pub const CONVEX: &str = "Shape2D#Convex2D";
    pub const SOUND: &str = "Sound_DX8";
    pub const UOL: &str = "UOL";
    pub const RAW_DATA: &str = "RawData";
    pub const VIDEO: &str = "Canvas#Video";
}

/// A byte range inside the image body a payload was parsed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Where the bytes of a canvas, sound or raw payload live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Held in memory
    Loaded(Vec<u8>),
    /// Still inside the image body, read on first access
    Deferred(Span),
    /// Dropped after use, any further access fails
    Released,
}

impl Payload {
    /// Stored length, if known
    pub fn len(&self) -> Option<usize> {
        match self {
            Payload::Loaded(data) => Some(data.len()),
            Payload::Deferred(span) => Some(span.len),
            Payload::Released => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Loaded(Vec::new())
    }
}

/// A 2D point
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
#[display("({x}, {y})")]
pub struct Vector {
    pub x: i32,
    pub y: i32,
}

/// Bitmap geometry and its compressed pixel data
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    /// Pixel format id as stored, see [`PixelFormat`]
    pub format: i32,
    /// Stored verbatim, has no effect on decoding
    pub scale: u8,
    pub payload: Payload,
}

impl Canvas {
    pub fn pixel_format(&self) -> Result<PixelFormat> {
        Ok(PixelFormat::try_from(self.format)?)
    }
}

/// `WAVEFORMATEX` as found in sound headers
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct WaveFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    /// Number of extra bytes after the fixed 18 byte structure
    pub extra_size: u16,
}

/// Size of `WAVEFORMATEX` without extra bytes
pub const WAVE_FORMAT_LEN: usize = 18;

impl WaveFormat {
    /// Parse a wave format block whose extra size matches its length
    pub fn parse(block: &[u8]) -> Option<Self> {
        if block.len() < WAVE_FORMAT_LEN {
            return None;
        }
        let format = WaveFormat::read(&mut Cursor::new(block)).ok()?;
        (format.extra_size as usize + WAVE_FORMAT_LEN == block.len()).then_some(format)
    }

    /// Parse a block that may be XOR-ed with the keystream.
    ///
    /// Returns the format and whether the block was encrypted.
    pub fn detect(block: &[u8], keystream: &Keystream) -> (Option<Self>, bool) {
        if let Some(format) = Self::parse(block) {
            return (Some(format), false);
        }
        let mut decrypted = block.to_vec();
        keystream.xor(&mut decrypted);
        match Self::parse(&decrypted) {
            Some(format) => (Some(format), true),
            None => (None, false),
        }
    }
}

/// The GUID preamble in front of every sound header
#[rustfmt::skip]
pub const SOUND_PREAMBLE: [u8; 51] = [
    0x02,
    0x83, 0xEB, 0x36, 0xE4, 0x4F, 0x52, 0xCE, 0x11, 0x9F, 0x53, 0x00, 0x20, 0xAF, 0x0B, 0xA7, 0x70,
    0x8B, 0xEB, 0x36, 0xE4, 0x4F, 0x52, 0xCE, 0x11, 0x9F, 0x53, 0x00, 0x20, 0xAF, 0x0B, 0xA7, 0x70,
    0x00,
    0x01,
    0x81, 0x9F, 0x58, 0x05, 0x56, 0xC3, 0xCE, 0x11, 0xBF, 0x01, 0x00, 0xAA, 0x00, 0x55, 0x59, 0x5A,
];

/// Audio data with its DirectSound media header
#[derive(Debug, Clone, PartialEq)]
pub struct Sound {
    pub duration_ms: i32,
    /// Preamble, wave format length byte and wave format block exactly as read
    pub header: Vec<u8>,
    pub wave_format: Option<WaveFormat>,
    /// Whether the wave format block in `header` is XOR-ed with the keystream
    pub header_encrypted: bool,
    pub payload: Payload,
}

impl Sound {
    /// A sound with a plain header built from `format`.
    ///
    /// `format` must not announce extra bytes, the header only carries the
    /// fixed structure.
    pub fn new(format: WaveFormat, duration_ms: i32, data: Vec<u8>) -> Result<Self> {
        if format.extra_size != 0 {
            return Err(Error::Validation(format!(
                "wave format announces {} extra bytes that are not given",
                format.extra_size
            )));
        }
        let mut block = Cursor::new(Vec::with_capacity(WAVE_FORMAT_LEN));
        format.write(&mut block)?;
        let block = block.into_inner();

        let mut header = SOUND_PREAMBLE.to_vec();
        header.push(WAVE_FORMAT_LEN as u8);
        header.extend_from_slice(&block);
        Ok(Self {
            duration_ms,
            header,
            wave_format: Some(format),
            header_encrypted: false,
            payload: Payload::Loaded(data),
        })
    }
}

/// Opaque binary payload of `RawData` and `Canvas#Video` nodes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawData {
    /// Stored verbatim, subtype 1 may carry child properties
    pub subtype: u8,
    pub payload: Payload,
}

/// The value held by a node in the property tree
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// Named container of child nodes
    Property,
    Canvas(Canvas),
    Vector(Vector),
    /// Ordered list of extended children named by their index
    Convex,
    Sound(Sound),
    /// Relative path to another node
    Uol(String),
    RawData(RawData),
    Video(RawData),
    /// Encrypted script source, only found at the root of an image
    Script(Vec<u8>),
}

impl Value {
    /// Whether this kind is stored in the extended framing
    pub fn is_extended(&self) -> bool {
        matches!(
            self,
            Value::Property
                | Value::Canvas(_)
                | Value::Vector(_)
                | Value::Convex
                | Value::Sound(_)
                | Value::Uol(_)
                | Value::RawData(_)
                | Value::Video(_)
        )
    }

    /// Whether nodes of this kind may have children
    pub fn accepts_children(&self) -> bool {
        matches!(
            self,
            Value::Property | Value::Canvas(_) | Value::Convex | Value::RawData(_) | Value::Video(_)
        )
    }

    /// Short name of the kind, the stored type name for extended kinds
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Short(_) => "Short",
            Value::Int(_) => "Int",
            Value::Long(_) => "Long",
            Value::Float(_) => "Float",
            Value::Double(_) => "Double",
            Value::String(_) => "String",
            Value::Property => type_name::PROPERTY,
            Value::Canvas(_) => type_name::CANVAS,
            Value::Vector(_) => type_name::VECTOR,
            Value::Convex => type_name::CONVEX,
            Value::Sound(_) => type_name::SOUND,
            Value::Uol(_) => type_name::UOL,
            Value::RawData(_) => type_name::RAW_DATA,
            Value::Video(_) => type_name::VIDEO,
            Value::Script(_) => "Script",
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Value::Canvas(canvas) => Some(&canvas.payload),
            Value::Sound(sound) => Some(&sound.payload),
            Value::RawData(raw) | Value::Video(raw) => Some(&raw.payload),
            _ => None,
        }
    }

    pub fn payload_mut(&mut self) -> Option<&mut Payload> {
        match self {
            Value::Canvas(canvas) => Some(&mut canvas.payload),
            Value::Sound(sound) => Some(&mut sound.payload),
            Value::RawData(raw) | Value::Video(raw) => Some(&mut raw.payload),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Short(v) => Some(v as i64),
            Value::Int(v) => Some(v as i64),
            Value::Long(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Uol(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn size(payload: &Payload) -> String {
            payload
                .len()
                .map_or_else(|| "released".to_string(), |len| format!("{len} bytes"))
        }

        match self {
            Value::Null => f.write_str("null"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::Property | Value::Convex => Ok(()),
            Value::Canvas(c) => match PixelFormat::try_from(c.format) {
                Ok(format) => write!(f, "{}x{} {format}", c.width, c.height),
                Err(_) => write!(f, "{}x{} format {}", c.width, c.height, c.format),
            },
            Value::Vector(v) => write!(f, "{v}"),
            Value::Sound(s) => write!(f, "{} ms, {}", s.duration_ms, size(&s.payload)),
            Value::Uol(path) => write!(f, "-> {path}"),
            Value::RawData(raw) | Value::Video(raw) => f.write_str(&size(&raw.payload)),
            Value::Script(data) => write!(f, "{} bytes", data.len()),
        }
    }
}

impl TryFrom<&Value> for PixelFormat {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Canvas(canvas) => canvas.pixel_format(),
            other => Err(Error::Validation(format!("{} is not a canvas", other.kind()))),
        }
    }
}

//! Turning an image body into a property tree.

use std::sync::Arc;

use bon::Builder;
use tracing::{instrument, trace};
use wz_crypto::Keystream;

use crate::{
    cursor::{SliceCursor, TYPE_INLINE},
    error::{Error, Result},
    tree::{Image, NodeId},
    value::{type_name, Canvas, Payload, RawData, Sound, Span, Value, Vector, WaveFormat, SOUND_PREAMBLE},
};

/// Image body marker for a property tree
pub const IMAGE_PROPERTY: u8 = TYPE_INLINE;
/// Image body marker for a script
pub const IMAGE_SCRIPT: u8 = 0x01;

/// Property list tags
pub mod tag {
    pub const NULL: u8 = 0;
    pub const SHORT: u8 = 2;
    pub const INT: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const DOUBLE: u8 = 5;
    pub const STRING: u8 = 8;
    pub const EXTENDED: u8 = 9;
    pub const SHORT_ALT: u8 = 11;
    pub const INT_ALT: u8 = 19;
    pub const LONG: u8 = 20;

    /// Float sub-tag for a stored `f32`
    pub const FLOAT_PRESENT: u8 = 0x80;
    /// Float sub-tag for zero
    pub const FLOAT_ZERO: u8 = 0;
}

/// Settings for materializing images
#[derive(Debug, Clone, Copy, Builder)]
pub struct ParseOptions {
    /// Read canvas, sound and raw payloads into memory while parsing
    #[builder(default = false)]
    pub eager_payloads: bool,

    /// Parse the images of an archive on the rayon pool
    #[builder(default = true)]
    pub parallel: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Extended values nested deeper than this are treated as corrupt
pub const MAX_NESTING: usize = 64;

struct TreeParser<'a> {
    cursor: &'a mut SliceCursor,
    image: &'a mut Image,
    eager: bool,
    depth: usize,
}

impl Image {
    /// Parse a complete image body
    #[instrument(skip(data, keystream), fields(size = data.len()), err)]
    pub fn parse(
        name: &str,
        data: Arc<[u8]>,
        keystream: Arc<Keystream>,
        options: &ParseOptions,
    ) -> Result<Image> {
        let mut cursor = SliceCursor::from_slice(data.clone(), keystream.clone(), 0);
        Self::parse_cursor(name, &mut cursor, options).map(|mut image| {
            image.source = Some(data);
            image
        })
    }

    /// Parse the image body a cursor starts with
    pub(crate) fn parse_cursor(name: &str, cursor: &mut SliceCursor, options: &ParseOptions) -> Result<Image> {
        let keystream = cursor.keystream().clone();
        match cursor.read_u8()? {
            IMAGE_PROPERTY => {
                let header = cursor.read_string()?;
                if header != type_name::PROPERTY {
                    return Err(Error::KeyMismatch(format!(
                        "image {name} does not start with a property list"
                    )));
                }
                let reserved = cursor.read_u16()?;
                if reserved != 0 {
                    return Err(Error::Format(format!(
                        "image {name} has {reserved:#06x} where 0 is expected"
                    )));
                }

                let mut image = Image::new(name, keystream);
                let root = image.root();
                TreeParser {
                    cursor,
                    image: &mut image,
                    eager: options.eager_payloads,
                    depth: 0,
                }
                .property_list(root)?;
                Ok(image)
            }
            IMAGE_SCRIPT => {
                let len = cursor.read_compressed_len("script length")?;
                let data = cursor.read_bytes(len)?;
                let mut image = Image::new(name, keystream);
                let root = image.root();
                *image.value_mut(root) = Value::Script(data);
                Ok(image)
            }
            other => Err(Error::Format(format!(
                "image {name} starts with unknown marker {other:#04x}"
            ))),
        }
    }
}

impl TreeParser<'_> {
    fn string_block(&mut self) -> Result<String> {
        self.cursor.read_string_block(0)
    }

    fn property_list(&mut self, parent: NodeId) -> Result<()> {
        let count = self.cursor.read_compressed_len("property count")?;
        trace!(count, parent = %parent, "property list");

        for _ in 0..count {
            let name = self.string_block()?;
            let value = match self.cursor.read_u8()? {
                tag::NULL => Value::Null,
                tag::SHORT | tag::SHORT_ALT => Value::Short(self.cursor.read_i16()?),
                tag::INT | tag::INT_ALT => Value::Int(self.cursor.read_compressed_int()?),
                tag::LONG => Value::Long(self.cursor.read_compressed_long()?),
                tag::FLOAT => match self.cursor.read_u8()? {
                    tag::FLOAT_PRESENT => Value::Float(self.cursor.read_f32()?),
                    tag::FLOAT_ZERO => Value::Float(0.0),
                    other => {
                        return Err(Error::Format(format!(
                            "unknown float marker {other:#04x} for {name}"
                        )))
                    }
                },
                tag::DOUBLE => Value::Double(self.cursor.read_f64()?),
                tag::STRING => Value::String(self.string_block()?),
                tag::EXTENDED => {
                    let len = self.cursor.read_u32()? as u64;
                    let end = self.cursor.position()? + len;
                    self.extended(parent, name)?;
                    self.cursor.seek(end)?;
                    continue;
                }
                other => {
                    return Err(Error::Format(format!(
                        "unknown property tag {other} for {name}"
                    )))
                }
            };
            self.image.push(parent, name, value);
        }
        Ok(())
    }

    fn payload(&mut self, len: usize) -> Result<Payload> {
        if self.eager {
            return Ok(Payload::Loaded(self.cursor.read_bytes(len)?));
        }
        let offset = self.cursor.position()? as usize;
        self.cursor.skip(len as u64)?;
        Ok(Payload::Deferred(Span { offset, len }))
    }

    /// A nested list behind a one byte flag, as used by canvases
    fn optional_list(&mut self, parent: NodeId) -> Result<()> {
        if self.cursor.read_u8()? == 1 {
            self.cursor.skip(2)?;
            self.property_list(parent)?;
        }
        Ok(())
    }

    fn extended(&mut self, parent: NodeId, name: String) -> Result<NodeId> {
        if self.depth >= MAX_NESTING {
            return Err(Error::Format(format!(
                "{name} is nested deeper than {MAX_NESTING} extended values"
            )));
        }
        self.depth += 1;
        let id = self.extended_value(parent, name);
        self.depth -= 1;
        id
    }

    fn extended_value(&mut self, parent: NodeId, name: String) -> Result<NodeId> {
        let kind = self.string_block()?;

        let id = match kind.as_str() {
            type_name::PROPERTY => {
                self.cursor.skip(2)?;
                let id = self.image.push(parent, name, Value::Property);
                self.property_list(id)?;
                id
            }
            type_name::CANVAS => {
                self.cursor.skip(1)?;
                let id = self.image.push(parent, name, Value::Canvas(Canvas::default()));
                self.optional_list(id)?;
                let canvas = self.canvas()?;
                *self.image.value_mut(id) = Value::Canvas(canvas);
                id
            }
            type_name::VECTOR => {
                let x = self.cursor.read_compressed_int()?;
                let y = self.cursor.read_compressed_int()?;
                self.image.push(parent, name, Value::Vector(Vector { x, y }))
            }
            type_name::CONVEX => {
                let id = self.image.push(parent, name, Value::Convex);
                let count = self.cursor.read_compressed_len("convex count")?;
                for index in 0..count {
                    self.extended(id, index.to_string())?;
                }
                id
            }
            type_name::SOUND => {
                let sound = self.sound()?;
                self.image.push(parent, name, Value::Sound(sound))
            }
            type_name::UOL => {
                self.cursor.skip(1)?;
                let path = self.string_block()?;
                self.image.push(parent, name, Value::Uol(path))
            }
            type_name::RAW_DATA => {
                let subtype = self.cursor.read_u8()?;
                let id = self.image.push(parent, name, Value::RawData(RawData::default()));
                if subtype == 1 {
                    self.optional_list(id)?;
                }
                let payload = self.raw_payload()?;
                *self.image.value_mut(id) = Value::RawData(RawData { subtype, payload });
                id
            }
            type_name::VIDEO => {
                let subtype = self.cursor.read_u8()?;
                let id = self.image.push(parent, name, Value::Video(RawData::default()));
                self.optional_list(id)?;
                let payload = self.raw_payload()?;
                *self.image.value_mut(id) = Value::Video(RawData { subtype, payload });
                id
            }
            other => {
                return Err(Error::Format(format!(
                    "unknown extended type {other:?} for {name}"
                )))
            }
        };
        Ok(id)
    }

    fn canvas(&mut self) -> Result<Canvas> {
        let width = self.cursor.read_compressed_int()?;
        let height = self.cursor.read_compressed_int()?;
        let (Ok(width), Ok(height)) = (u32::try_from(width), u32::try_from(height)) else {
            return Err(Error::Format(format!("canvas size {width}x{height}")));
        };
        let format = self.cursor.read_compressed_int()?;
        let scale = self.cursor.read_u8()?;
        self.cursor.skip(4)?;

        let stored = self.cursor.read_i32()?;
        let len = stored.saturating_sub(1);
        if len <= 0 {
            return Err(Error::KeyMismatch(format!(
                "canvas payload length {stored} is not positive"
            )));
        }
        self.cursor.skip(1)?;
        Ok(Canvas {
            width,
            height,
            format,
            scale,
            payload: self.payload(len as usize)?,
        })
    }

    fn sound(&mut self) -> Result<Sound> {
        self.cursor.skip(1)?;
        let len = self.cursor.read_compressed_len("sound length")?;
        let duration_ms = self.cursor.read_compressed_int()?;

        let start = self.cursor.position()?;
        self.cursor.skip(SOUND_PREAMBLE.len() as u64)?;
        let wave_len = self.cursor.read_u8()? as usize;
        self.cursor.seek(start)?;
        let header = self.cursor.read_bytes(SOUND_PREAMBLE.len() + 1 + wave_len)?;

        let (wave_format, header_encrypted) =
            WaveFormat::detect(&header[SOUND_PREAMBLE.len() + 1..], self.cursor.keystream());
        Ok(Sound {
            duration_ms,
            header,
            wave_format,
            header_encrypted,
            payload: self.payload(len)?,
        })
    }

    fn raw_payload(&mut self) -> Result<Payload> {
        let len = self.cursor.read_i32()?;
        let len = usize::try_from(len).map_err(|_| Error::Format(format!("payload length {len}")))?;
        self.payload(len)
    }
}

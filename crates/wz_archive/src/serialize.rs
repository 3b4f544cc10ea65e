//! Turning a property tree back into an image body.

use std::io::{Cursor, Seek, Write};

use tracing::instrument;

use crate::{
    cursor::{STRING_INLINE, STRING_REFERENCE, TYPE_INLINE, TYPE_REFERENCE},
    encode::WzEncoder,
    error::{Error, Result},
    parse::{tag, IMAGE_SCRIPT},
    tree::{Image, NodeId},
    value::{type_name, Value},
};

struct TreeWriter<'a, W> {
    encoder: WzEncoder<W>,
    image: &'a Image,
}

impl Image {
    /// Serialize the tree into an image body
    #[instrument(skip(self), fields(name = self.name()), err)]
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let encoder = WzEncoder::new(Cursor::new(Vec::new()), self.keystream.clone());
        let mut writer = TreeWriter {
            encoder,
            image: self,
        };
        writer.body()?;
        Ok(writer.encoder.into_inner().into_inner())
    }
}

/// Wrapping sum of all bytes, stored next to every image entry
pub fn checksum(body: &[u8]) -> i32 {
    body.iter().fold(0i32, |sum, &b| sum.wrapping_add(b as i32))
}

impl<W: Write + Seek> TreeWriter<'_, W> {
    fn body(&mut self) -> Result<()> {
        let image = self.image;
        let root = image.root();
        match image.value(root) {
            Value::Script(data) => {
                self.encoder.write_u8(IMAGE_SCRIPT)?;
                self.encoder.write_compressed_len(data.len())?;
                self.encoder.write_bytes(data)
            }
            Value::Property => {
                self.type_name(type_name::PROPERTY)?;
                self.encoder.write_u16(0)?;
                self.property_list(root)
            }
            other => Err(Error::Validation(format!(
                "an image root must be a property or a script, not {}",
                other.kind()
            ))),
        }
    }

    fn type_name(&mut self, name: &str) -> Result<()> {
        self.encoder.write_string_block(name, TYPE_INLINE, TYPE_REFERENCE)
    }

    fn string_block(&mut self, value: &str) -> Result<()> {
        self.encoder.write_string_block(value, STRING_INLINE, STRING_REFERENCE)
    }

    fn property_list(&mut self, parent: NodeId) -> Result<()> {
        let image = self.image;
        let children = image.children(parent);
        self.encoder.write_compressed_len(children.len())?;
        for &child in children {
            self.string_block(image.node(child).name())?;
            self.property(child)?;
        }
        Ok(())
    }

    /// Flag byte and, when there are children, the nested list
    fn optional_list(&mut self, id: NodeId) -> Result<()> {
        if self.image.children(id).is_empty() {
            return self.encoder.write_u8(0);
        }
        self.encoder.write_u8(1)?;
        self.encoder.write_u16(0)?;
        self.property_list(id)
    }

    fn property(&mut self, id: NodeId) -> Result<()> {
        let image = self.image;
        let encoder = &mut self.encoder;
        match image.value(id) {
            Value::Null => encoder.write_u8(tag::NULL),
            Value::Short(v) => {
                encoder.write_u8(tag::SHORT)?;
                encoder.write_i16(*v)
            }
            Value::Int(v) => {
                encoder.write_u8(tag::INT)?;
                encoder.write_compressed_int(*v)
            }
            Value::Long(v) => {
                encoder.write_u8(tag::LONG)?;
                encoder.write_compressed_long(*v)
            }
            Value::Float(v) => {
                encoder.write_u8(tag::FLOAT)?;
                if *v == 0.0 {
                    encoder.write_u8(tag::FLOAT_ZERO)
                } else {
                    encoder.write_u8(tag::FLOAT_PRESENT)?;
                    encoder.write_f32(*v)
                }
            }
            Value::Double(v) => {
                encoder.write_u8(tag::DOUBLE)?;
                encoder.write_f64(*v)
            }
            Value::String(v) => {
                encoder.write_u8(tag::STRING)?;
                self.string_block(v)
            }
            Value::Script(_) => Err(Error::Validation(format!(
                "script at {} is not an image root",
                image.path(id)
            ))),
            _ => {
                encoder.write_u8(tag::EXTENDED)?;
                let reserved = encoder.begin_length()?;
                self.extended(id)?;
                self.encoder.end_length(reserved)
            }
        }
    }

    fn extended(&mut self, id: NodeId) -> Result<()> {
        let image = self.image;
        let value = image.value(id);
        match value {
            Value::Property => {
                self.type_name(type_name::PROPERTY)?;
                self.encoder.write_u16(0)?;
                self.property_list(id)
            }
            Value::Canvas(canvas) => {
                self.type_name(type_name::CANVAS)?;
                self.encoder.write_u8(0)?;
                self.optional_list(id)?;
                let width = i32::try_from(canvas.width)
                    .map_err(|_| Error::Validation(format!("canvas width {}", canvas.width)))?;
                let height = i32::try_from(canvas.height)
                    .map_err(|_| Error::Validation(format!("canvas height {}", canvas.height)))?;
                self.encoder.write_compressed_int(width)?;
                self.encoder.write_compressed_int(height)?;
                self.encoder.write_compressed_int(canvas.format)?;
                self.encoder.write_u8(canvas.scale)?;
                self.encoder.write_i32(0)?;

                let payload = image.payload(id)?;
                let stored = i32::try_from(payload.len() + 1)
                    .map_err(|_| Error::Validation(format!("canvas payload of {} bytes", payload.len())))?;
                self.encoder.write_i32(stored)?;
                self.encoder.write_u8(0)?;
                self.encoder.write_bytes(&payload)
            }
            Value::Vector(v) => {
                self.type_name(type_name::VECTOR)?;
                self.encoder.write_compressed_int(v.x)?;
                self.encoder.write_compressed_int(v.y)
            }
            Value::Convex => {
                self.type_name(type_name::CONVEX)?;
                let children = image.children(id);
                self.encoder.write_compressed_len(children.len())?;
                for &child in children {
                    if !image.value(child).is_extended() {
                        return Err(Error::Validation(format!(
                            "convex child {} is not an extended value",
                            image.path(child)
                        )));
                    }
                    self.extended(child)?;
                }
                Ok(())
            }
            Value::Sound(sound) => {
                self.type_name(type_name::SOUND)?;
                self.encoder.write_u8(0)?;
                let payload = image.payload(id)?;
                self.encoder.write_compressed_len(payload.len())?;
                self.encoder.write_compressed_int(sound.duration_ms)?;
                self.encoder.write_bytes(&sound.header)?;
                self.encoder.write_bytes(&payload)
            }
            Value::Uol(path) => {
                self.type_name(type_name::UOL)?;
                self.encoder.write_u8(0)?;
                self.string_block(path)
            }
            Value::RawData(raw) | Value::Video(raw) => {
                let is_video = matches!(value, Value::Video(_));
                self.type_name(if is_video { type_name::VIDEO } else { type_name::RAW_DATA })?;
                self.encoder.write_u8(raw.subtype)?;
                if is_video || raw.subtype == 1 {
                    self.optional_list(id)?;
                } else if !image.children(id).is_empty() {
                    return Err(Error::Validation(format!(
                        "raw data {} with subtype {} cannot have children",
                        image.path(id),
                        raw.subtype
                    )));
                }
                let payload = image.payload(id)?;
                let len = i32::try_from(payload.len())
                    .map_err(|_| Error::Validation(format!("payload of {} bytes", payload.len())))?;
                self.encoder.write_i32(len)?;
                self.encoder.write_bytes(&payload)
            }
            other => Err(Error::Validation(format!(
                "{} at {} is not an extended value",
                other.kind(),
                image.path(id)
            ))),
        }
    }
}

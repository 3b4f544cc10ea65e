//! Access to canvas, sound and raw payloads of an image.

use std::{borrow::Cow, sync::Arc};

use tracing::{debug, instrument};
use wz_canvas::{
    compression::{is_zlib, unchunk},
    Bitmap, CanvasCodec, PixelFormat,
};
use wz_crypto::Keystream;

use crate::{
    error::{Error, Result},
    tree::{Image, NodeId},
    value::{Payload, Value, SOUND_PREAMBLE},
};

impl Image {
    /// The stored bytes of a canvas, sound or raw node, read from the image
    /// body when they were deferred
    pub fn payload(&self, id: NodeId) -> Result<Cow<'_, [u8]>> {
        let value = self.value(id);
        let payload = value
            .payload()
            .ok_or_else(|| Error::Validation(format!("{} node {} has no payload", value.kind(), self.path(id))))?;

        match payload {
            Payload::Loaded(data) => Ok(Cow::Borrowed(data)),
            Payload::Deferred(span) => {
                let source = self.source.as_ref().ok_or_else(|| {
                    Error::Validation(format!("payload of {} has no image body to read from", self.path(id)))
                })?;
                source
                    .get(span.offset..span.end())
                    .map(Cow::Borrowed)
                    .ok_or(Error::Truncation)
            }
            Payload::Released => Err(Error::Validation(format!(
                "payload of {} was released",
                self.path(id)
            ))),
        }
    }

    /// Read every deferred payload into memory
    pub fn load_payloads(&mut self) -> Result<()> {
        for id in self.descendants(self.root()) {
            let deferred = matches!(self.value(id).payload(), Some(Payload::Deferred(_)));
            if deferred {
                let data = self.payload(id)?.into_owned();
                if let Some(payload) = self.value_mut(id).payload_mut() {
                    *payload = Payload::Loaded(data);
                }
            }
        }
        Ok(())
    }

    /// Move the image to another keystream.
    ///
    /// Payloads are loaded first. Chunked canvas payloads are stored as
    /// their plain zlib stream afterwards, and script sources and
    /// encrypted sound headers are re-encrypted.
    #[instrument(skip_all, fields(image = self.name()), err)]
    pub fn with_keystream(mut self, keystream: Arc<Keystream>) -> Result<Image> {
        self.load_payloads()?;
        let old = self.keystream.clone();

        for id in self.descendants(self.root()) {
            match self.value_mut(id) {
                Value::Script(data) => {
                    old.xor(data);
                    keystream.xor(data);
                }
                Value::Canvas(canvas) => {
                    if let Payload::Loaded(data) = &mut canvas.payload {
                        if !data.is_empty() && !is_zlib(data) {
                            *data = unchunk(data, &old)?;
                        }
                    }
                }
                Value::Sound(sound) if sound.header_encrypted => {
                    if let Some(block) = sound.header.get_mut(SOUND_PREAMBLE.len() + 1..) {
                        old.xor(block);
                        keystream.xor(block);
                    }
                }
                _ => {}
            }
        }
        debug!("re-keyed image");

        self.keystream = keystream;
        self.source = None;
        Ok(self)
    }

    /// Drop the stored bytes of `id`. A cached bitmap survives.
    pub fn release_payload(&mut self, id: NodeId) {
        if let Some(payload) = self.value_mut(id).payload_mut() {
            *payload = Payload::Released;
        }
    }

    /// Drop all cached bitmaps
    pub fn clear_bitmaps(&self) {
        if let Ok(mut bitmaps) = self.bitmaps.lock() {
            bitmaps.clear();
        }
    }

    /// Decode the bitmap of a canvas node.
    ///
    /// With `cache` set the bitmap is kept and returned by later calls.
    #[instrument(skip(self, codec), err)]
    pub fn canvas_bitmap(&self, id: NodeId, codec: &CanvasCodec, cache: bool) -> Result<Arc<Bitmap>> {
        if let Some(bitmap) = self.bitmaps.lock().ok().and_then(|b| b.get(&id).cloned()) {
            return Ok(bitmap);
        }

        let Value::Canvas(canvas) = self.value(id) else {
            return Err(Error::Validation(format!("{} is not a canvas", self.path(id))));
        };
        let format = canvas.pixel_format()?;
        let payload = self.payload(id)?;
        let bitmap = Arc::new(codec.decode(
            &payload,
            &self.keystream,
            canvas.width,
            canvas.height,
            format,
        )?);

        if cache {
            if let Ok(mut bitmaps) = self.bitmaps.lock() {
                bitmaps.insert(id, bitmap.clone());
            }
        }
        Ok(bitmap)
    }

    /// Replace the pixels of a canvas node.
    ///
    /// Re-encodes `bitmap`, selecting a format when none is given, and
    /// updates the stored geometry, format and payload. Returns the format
    /// that was used.
    #[instrument(skip(self, bitmap, codec), err)]
    pub fn set_canvas_bitmap(
        &mut self,
        id: NodeId,
        bitmap: Bitmap,
        format: Option<PixelFormat>,
        codec: &CanvasCodec,
    ) -> Result<PixelFormat> {
        if !matches!(self.value(id), Value::Canvas(_)) {
            return Err(Error::Validation(format!("{} is not a canvas", self.path(id))));
        }

        let encoded = codec.encode(&bitmap, format)?;
        debug!(format = %encoded.format, size = encoded.payload.len(), "encoded canvas");

        if let Value::Canvas(canvas) = self.value_mut(id) {
            canvas.width = encoded.width;
            canvas.height = encoded.height;
            canvas.format = encoded.format.id();
            canvas.payload = Payload::Loaded(encoded.payload);
        }
        if let Ok(mut bitmaps) = self.bitmaps.lock() {
            bitmaps.insert(id, Arc::new(bitmap));
        }
        Ok(encoded.format)
    }
}

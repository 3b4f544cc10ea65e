//! Canvas payload compression and decompression handling.
//!
//! A payload is either a plain zlib stream or, in older archives, a sequence of
//! `u32` length prefixed chunks that are each XOR-ed with the keystream
//! (restarting at keystream index 0 for every chunk). The concatenation of the
//! decrypted chunks is again a zlib stream.

use std::{
    borrow::Cow,
    io::{self, Cursor, Read, Write},
};

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::{read::DeflateDecoder, write::ZlibEncoder, Compression};
use tracing::{debug, instrument};
use wz_crypto::Keystream;

use crate::error::{Error, Result};

/// The zlib headers the client emits
pub const ZLIB_HEADERS: [[u8; 2]; 4] = [[0x78, 0x9C], [0x78, 0xDA], [0x78, 0x01], [0x78, 0x5E]];

/// Output buffer reserved per compressed byte before inflating, the buffer
/// grows past it as needed
const INITIAL_RATIO: usize = 8;

/// Whether the payload starts with one of the known zlib headers
pub fn is_zlib(payload: &[u8]) -> bool {
    payload.len() >= 2 && ZLIB_HEADERS.iter().any(|h| h[..] == payload[..2])
}

/// Undo the chunked XOR layer
#[instrument(skip_all, fields(size = payload.len()), err)]
pub fn unchunk(payload: &[u8], keystream: &Keystream) -> Result<Vec<u8>> {
    let mut reader = Cursor::new(payload);
    let mut out = Vec::with_capacity(payload.len());

    while (reader.position() as usize) < payload.len() {
        let len = reader.read_i32::<LittleEndian>()?;
        let remaining = payload.len() - reader.position() as usize;
        if len < 0 || len as usize > remaining {
            return Err(Error::Format(format!(
                "chunk length {len} exceeds the {remaining} remaining bytes"
            )));
        }

        let start = out.len();
        out.resize(start + len as usize, 0);
        reader.read_exact(&mut out[start..])?;
        keystream.xor(&mut out[start..]);
    }

    Ok(out)
}

/// Inflate a raw deflate stream, reading at most `limit` bytes of output
fn inflate(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let capacity = limit.min(data.len().saturating_mul(INITIAL_RATIO));
    let mut out = Vec::with_capacity(capacity);
    DeflateDecoder::new(data)
        .take(limit as u64)
        .read_to_end(&mut out)
        .map_err(|e| Error::Format(format!("inflate failed: {e}")))?;
    Ok(out)
}

/// Turn a stored payload into raw pixel data of at most `limit` bytes
#[instrument(skip(payload, keystream), fields(size = payload.len()), err)]
pub fn decompress(payload: &[u8], keystream: &Keystream, limit: usize) -> Result<Vec<u8>> {
    let stream: Cow<'_, [u8]> = if is_zlib(payload) {
        Cow::Borrowed(payload)
    } else {
        debug!("payload is chunked");
        Cow::Owned(unchunk(payload, keystream)?)
    };

    if stream.len() < 2 {
        return Err(Error::Format("payload too short for a zlib header".into()));
    }

    // The zlib header is skipped rather than validated, chunked payloads do
    // not always carry one of the known pairs
    inflate(&stream[2..], limit)
}

/// Compress raw pixel data into a zlib stream
pub fn compress(raw: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::new(level));
    encoder.write_all(raw)?;
    encoder.finish()
}

/// Wrap an already compressed payload in the chunked XOR layer
pub fn chunk(payload: &[u8], keystream: &Keystream, chunk_size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + payload.len() / chunk_size.max(1) * 4 + 4);
    for piece in payload.chunks(chunk_size.max(1)) {
        out.extend_from_slice(&(piece.len() as u32).to_le_bytes());
        let start = out.len();
        out.extend_from_slice(piece);
        keystream.xor(&mut out[start..]);
    }
    out
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;
    use wz_crypto::{Keystream, WellKnownKey};

    use crate::compression::{chunk, compress, decompress, is_zlib};
    use crate::error::{Error, Result};

    #[traced_test]
    #[test]
    fn plain_zlib() -> Result<()> {
        let raw = (0..200u8).collect::<Vec<_>>();
        let payload = compress(&raw, 6)?;
        assert!(is_zlib(&payload));

        let decoded = decompress(&payload, &Keystream::neutral(), raw.len())?;
        assert_eq!(decoded, raw);
        Ok(())
    }

    #[traced_test]
    #[test]
    fn limit_truncates_output() -> Result<()> {
        let raw = vec![7u8; 64];
        let payload = compress(&raw, 9)?;
        assert_eq!(decompress(&payload, &Keystream::neutral(), 10)?, vec![7u8; 10]);
        Ok(())
    }

    #[traced_test]
    #[test]
    fn chunked_and_encrypted() -> Result<()> {
        let keystream = Keystream::new(WellKnownKey::Gms.into());
        let raw = b"the quick brown fox jumps over the lazy dog".repeat(8);
        let payload = chunk(&compress(&raw, 6)?, &keystream, 16);
        assert!(!is_zlib(&payload));

        assert_eq!(decompress(&payload, &keystream, raw.len())?, raw);
        Ok(())
    }

    #[traced_test]
    #[test]
    fn oversized_chunk_is_rejected() {
        let payload = [0xFF, 0x00, 0x00, 0x00, 0x01, 0x02];
        let result = decompress(&payload, &Keystream::neutral(), 16);
        assert!(matches!(result, Err(Error::Format(_))));
    }

    #[traced_test]
    #[test]
    fn garbage_after_header_fails_to_inflate() {
        let payload = [0x78, 0x9C, 0xFF, 0xFF, 0xFF, 0xFF];
        let result = decompress(&payload, &Keystream::neutral(), 16);
        assert!(matches!(result, Err(Error::Format(_))));
    }
}

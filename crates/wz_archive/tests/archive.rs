use std::io::Cursor;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tracing::info;
use tracing_test::traced_test;
use wz_archive::{
    cursor::{STRING_INLINE, STRING_REFERENCE, TYPE_INLINE, TYPE_REFERENCE},
    encode::WzEncoder,
    error::{Error, Result},
    value::{Canvas, Payload, Value, Vector},
    ArchiveOptions, Image, ParseOptions, WzArchive, WzWriter, WzWriterOptions,
};
use wz_canvas::{Bitmap, CanvasCodec, PixelFormat};
use wz_crypto::{KeyMaterial, Keystream, WellKnownKey};

fn mob_image(keystream: &Arc<Keystream>, id: u32) -> Result<Image> {
    let mut image = Image::new(format!("{id:07}.img"), keystream.clone());
    let root = image.root();
    let info = image.add_child(root, "info", Value::Property)?;
    image.add_child(info, "level", Value::Int(id as i32 % 200))?;
    image.add_child(info, "speed", Value::Short(-20))?;
    image.add_child(info, "name", Value::String(format!("mob {id}")))?;

    let stand = image.add_child(root, "stand", Value::Property)?;
    let frame = image.add_child(stand, "0", Value::Canvas(Canvas::default()))?;
    image.add_child(frame, "origin", Value::Vector(Vector { x: 16, y: 30 }))?;
    image.add_child(frame, "delay", Value::Int(180))?;
    image.set_canvas_bitmap(
        frame,
        Bitmap::filled(8, 8, [0x20, 0x40, 0x60, 0xFF]),
        Some(PixelFormat::Bgra8888),
        &CanvasCodec::default(),
    )?;

    let move_ = image.add_child(root, "move", Value::Property)?;
    image.add_child(move_, "0", Value::Uol("../stand/0".into()))?;
    Ok(image)
}

fn build_archive(options: WzWriterOptions, key: KeyMaterial) -> Result<Vec<u8>> {
    let keystream = Arc::new(Keystream::new(key));
    let mut wz = WzWriter::new(Cursor::new(Vec::new()), options);
    wz.add_image("0100100.img", &mob_image(&keystream, 100100)?)?;
    wz.add_image("Boss/8800000.img", &mob_image(&keystream, 8800000)?)?;
    wz.add_image("Boss/Zakum/8800001.img", &mob_image(&keystream, 8800001)?)?;
    wz.add_image("Script.img", &Image::script("Script.img", keystream, b"return 0"))?;
    wz.add_directory("Empty");
    Ok(wz.finish()?.into_inner())
}

#[traced_test]
#[test]
fn write_then_read_archive() -> Result<()> {
    let key = WellKnownKey::Gms.into();
    let bytes = build_archive(WzWriterOptions::builder().version(95).key(key).build(), key)?;
    info!(size = bytes.len(), "archive written");

    let mut wz = WzArchive::new(Cursor::new(bytes), ArchiveOptions::builder().key(key).build())?;
    assert_eq!(wz.version().number, 95);
    assert_eq!(wz.header().data_start, 60);
    assert_eq!(wz.root().directory_count(), 3);

    let paths = wz
        .root()
        .all_images()
        .into_iter()
        .map(|(path, _)| path)
        .collect::<Vec<_>>();
    assert_eq!(
        paths,
        [
            "Boss/Zakum/8800001.img",
            "Boss/8800000.img",
            "0100100.img",
            "Script.img"
        ]
    );

    let image = wz.image("Boss/8800000.img", &ParseOptions::default())?;
    let level = image.get("info/level").ok_or(Error::NotFound("level".into()))?;
    assert_eq!(image.value(level), &Value::Int(8800000 % 200));
    let name = image.get("info/name").ok_or(Error::NotFound("name".into()))?;
    assert_eq!(image.value(name), &Value::String("mob 8800000".into()));

    let link = image.get("move/0").ok_or(Error::NotFound("move/0".into()))?;
    let frame = image.get("stand/0").ok_or(Error::NotFound("stand/0".into()))?;
    assert_eq!(image.resolve(link), frame);

    let bitmap = image.canvas_bitmap(frame, &CanvasCodec::default(), false)?;
    assert_eq!(*bitmap, Bitmap::filled(8, 8, [0x20, 0x40, 0x60, 0xFF]));

    let script = wz.image("Script.img", &ParseOptions::default())?;
    assert_eq!(script.script_source(), Some(b"return 0".to_vec()));
    Ok(())
}

#[traced_test]
#[test]
fn version_is_detected() -> Result<()> {
    let key = WellKnownKey::Ems.into();
    let bytes = build_archive(WzWriterOptions::builder().version(176).key(key).build(), key)?;
    let wz = WzArchive::new(Cursor::new(bytes), ArchiveOptions::builder().key(key).build())?;
    assert_eq!(wz.version().encrypted(), wz_archive::header::Version::new(176).encrypted());
    assert_eq!(wz.root().all_images().len(), 4);
    Ok(())
}

#[traced_test]
#[test]
fn parse_all_reports_every_image() -> Result<()> {
    let key = KeyMaterial::well_known(WellKnownKey::Plain);
    let bytes = build_archive(WzWriterOptions::builder().key(key).build(), key)?;
    let mut wz = WzArchive::new(
        Cursor::new(bytes),
        ArchiveOptions::builder().key(key).version(83).build(),
    )?;

    for parallel in [false, true] {
        let report = wz.parse_all(&ParseOptions::builder().parallel(parallel).build())?;
        assert_eq!(report.total, 4);
        assert_eq!(report.parsed, 4);
        assert!(report.failures.is_empty());
        assert!(report.checksum_mismatches.is_empty());
        assert_eq!(report.to_string(), "4 of 4 parsed, 0 link warnings");
    }
    Ok(())
}

#[traced_test]
#[test]
fn broken_links_are_reported() -> Result<()> {
    let keystream = Arc::new(Keystream::default());
    let mut image = Image::new("Effect.img", keystream);
    let root = image.root();
    image.add_child(root, "self", Value::Uol("self".into()))?;

    let mut wz = WzWriter::new(Cursor::new(Vec::new()), WzWriterOptions::default());
    wz.add_image("Effect.img", &image)?;
    let bytes = wz.finish()?.into_inner();

    let mut wz = WzArchive::new(Cursor::new(bytes), ArchiveOptions::default())?;
    let report = wz.parse_all(&ParseOptions::default())?;
    assert_eq!(report.broken_links, vec!["Effect.img/self".to_string()]);
    assert_eq!(report.to_string(), "1 of 1 parsed, 1 link warnings");
    Ok(())
}

#[traced_test]
#[test]
fn wrong_key_aborts_the_batch() -> Result<()> {
    let key = WellKnownKey::Gms.into();
    let bytes = build_archive(WzWriterOptions::builder().version(83).key(key).build(), key)?;

    // the directory only uses offsets and names, so a wrong key still opens
    let wrong = ArchiveOptions::builder()
        .key(WellKnownKey::Ems.into())
        .version(83)
        .build();
    let mut wz = WzArchive::new(Cursor::new(bytes), wrong)?;
    let result = wz.parse_all(&ParseOptions::default());
    assert!(matches!(result, Err(Error::KeyMismatch(_))));
    Ok(())
}

#[traced_test]
#[test]
fn lazy_payloads_match_eager_ones() -> Result<()> {
    let key = WellKnownKey::Gms.into();
    let bytes = build_archive(WzWriterOptions::builder().key(key).build(), key)?;
    let mut wz = WzArchive::new(Cursor::new(bytes), ArchiveOptions::builder().key(key).build())?;

    let entry = wz
        .root()
        .image("0100100.img")
        .cloned()
        .ok_or(Error::NotFound("0100100.img".into()))?;
    let lazy = wz.open_image(&entry)?;
    assert!(lazy.checksum_matches());
    assert_eq!(lazy.offset(), entry.offset);

    let deferred = lazy.materialize(&ParseOptions::default())?;
    let eager = lazy.materialize(&ParseOptions::builder().eager_payloads(true).build())?;
    let frame = deferred.get("stand/0").ok_or(Error::NotFound("stand/0".into()))?;

    assert!(matches!(deferred.value(frame).payload(), Some(Payload::Deferred(_))));
    assert!(matches!(eager.value(frame).payload(), Some(Payload::Loaded(_))));
    assert_eq!(deferred.payload(frame)?, eager.payload(frame)?);

    // detached subtrees keep reading from the shared body
    let mut deferred = deferred;
    let stand = deferred.get("stand").ok_or(Error::NotFound("stand".into()))?;
    let detached = deferred.detach(stand)?;
    drop(deferred);
    let frame = detached.get("0").ok_or(Error::NotFound("0".into()))?;
    assert_eq!(detached.payload(frame)?, eager.payload(eager.get("stand/0").ok_or(Error::NotFound("stand/0".into()))?)?);
    Ok(())
}

#[traced_test]
#[test]
fn repacking_is_stable() -> Result<()> {
    let key = WellKnownKey::Gms.into();
    let options = WzWriterOptions::builder().key(key).version(62).build();
    let original = build_archive(options.clone(), key)?;

    let mut wz = WzArchive::new(
        Cursor::new(original.clone()),
        ArchiveOptions::builder().key(key).version(62).build(),
    )?;
    let mut writer = WzWriter::new(Cursor::new(Vec::new()), options);
    for (path, entry) in wz.root().all_images().into_iter().map(|(p, e)| (p, e.clone())).collect::<Vec<_>>() {
        let image = wz.open_image(&entry)?.materialize(&ParseOptions::default())?;
        writer.add_image(&path, &image)?;
    }
    writer.add_directory("Empty");
    let repacked = writer.finish()?.into_inner();

    assert_eq!(repacked.len(), original.len());
    Ok(())
}

#[test]
fn missing_image() -> Result<()> {
    let key = WellKnownKey::Gms.into();
    let bytes = build_archive(WzWriterOptions::default(), key)?;
    let mut wz = WzArchive::new(Cursor::new(bytes), ArchiveOptions::default())?;
    let result = wz.image("Nope.img", &ParseOptions::default());
    assert!(matches!(result, Err(Error::NotFound(_))));
    Ok(())
}

#[test]
fn bad_magic_is_rejected() {
    let result = WzArchive::new(Cursor::new(b"PKG2 not an archive".to_vec()), ArchiveOptions::default());
    assert!(matches!(result, Err(Error::BinRWError(_))));
}

/// An image body whose only canvas stores a payload length of zero
fn zero_length_canvas(keystream: Arc<Keystream>) -> Result<Vec<u8>> {
    let mut e = WzEncoder::new(Cursor::new(Vec::new()), keystream);
    e.write_string_block("Property", TYPE_INLINE, TYPE_REFERENCE)?;
    e.write_u16(0)?;
    e.write_compressed_int(1)?;
    e.write_string_block("frame", STRING_INLINE, STRING_REFERENCE)?;
    e.write_u8(9)?;
    let reserved = e.begin_length()?;
    e.write_string_block("Canvas", TYPE_INLINE, TYPE_REFERENCE)?;
    e.write_bytes(&[0, 0])?;
    for v in [1, 1, 2] {
        e.write_compressed_int(v)?;
    }
    e.write_bytes(&[0, 0, 0, 0, 0])?;
    e.write_i32(1)?;
    e.write_u8(0)?;
    e.end_length(reserved)?;
    Ok(e.into_inner().into_inner())
}

#[traced_test]
#[test]
fn canvas_key_mismatch_in_first_image_aborts() -> Result<()> {
    let keystream = Arc::new(Keystream::default());
    let mut wz = WzWriter::new(Cursor::new(Vec::new()), WzWriterOptions::default());
    wz.add_image_bytes("0000000.img", zero_length_canvas(keystream.clone())?)?;
    wz.add_image("0100100.img", &mob_image(&keystream, 100100)?)?;
    let bytes = wz.finish()?.into_inner();

    let mut wz = WzArchive::new(Cursor::new(bytes), ArchiveOptions::default())?;
    let result = wz.parse_all(&ParseOptions::default());
    assert!(matches!(result, Err(Error::KeyMismatch(_))));
    Ok(())
}

#[traced_test]
#[test]
fn later_key_mismatch_is_a_failure() -> Result<()> {
    let keystream = Arc::new(Keystream::default());
    let mut wz = WzWriter::new(Cursor::new(Vec::new()), WzWriterOptions::default());
    wz.add_image("0100100.img", &mob_image(&keystream, 100100)?)?;
    wz.add_image_bytes("0000000.img", zero_length_canvas(keystream.clone())?)?;
    wz.add_image("0100101.img", &mob_image(&keystream, 100101)?)?;
    let bytes = wz.finish()?.into_inner();

    let mut wz = WzArchive::new(Cursor::new(bytes), ArchiveOptions::default())?;
    let report = wz.parse_all(&ParseOptions::default())?;
    assert_eq!(report.parsed, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "0000000.img");
    assert_eq!(report.to_string(), "2 of 3 parsed, 0 link warnings");
    Ok(())
}

use anyhow::{Context, Result};
use img_parts::Bytes;
use img_parts::ImageEXIF;
use img_parts::jpeg::Jpeg;
use kamadak_exif::experimental::Writer;
use kamadak_exif::{Exif, Field, In, Reader, Tag, Value};
use std::io::Cursor;
use std::path::Path;

use super::GpsCoordinate;
use super::codec::{self, Dms};
use super::reader::read_gps;

const REPLACED_TAGS: [Tag; 4] = [
    Tag::GPSLatitudeRef,
    Tag::GPSLatitude,
    Tag::GPSLongitudeRef,
    Tag::GPSLongitude,
];

/// How to treat GPS tags that are already in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Leave the file alone if it already has latitude and longitude.
    KeepExisting,
    /// Always replace the four GPS tags.
    Overwrite,
}

/// What [`write_gps`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// `KeepExisting` and the file already had GPS. The file was not touched.
    AlreadyPresent,
}

/// Write a coordinate into the GPS IFD of a JPEG, preserving every other tag
/// and segment.
///
/// Strategy:
/// 1. Read the entire JPEG with img-parts (preserves all segments)
/// 2. Parse the existing EXIF block and copy every field except the four
///    GPS position tags, across IFD0, the Exif/GPS/Interop IFDs and IFD1
/// 3. Re-attach the IFD1 thumbnail, if there is one
/// 4. If the old block can't be parsed, start from an empty one and log it
/// 5. Re-encode the TIFF block and write it back via img-parts, keeping the
///    APP1 segment at its old position
pub fn write_gps(path: &Path, coord: &GpsCoordinate, mode: WriteMode) -> Result<WriteOutcome> {
    if mode == WriteMode::KeepExisting {
        if let Some(existing) = read_gps(path)? {
            log::debug!("GPS already present in {} ({existing})", path.display());
            return Ok(WriteOutcome::AlreadyPresent);
        }
    }

    let fields = gps_fields(coord);
    write_fields_to_jpeg(path, &fields).context("Failed to write GPS metadata to file")?;
    log::debug!("GPS {coord} written to {}", path.display());

    Ok(WriteOutcome::Written)
}

fn write_fields_to_jpeg(path: &Path, new_fields: &[Field]) -> Result<()> {
    let file_bytes = std::fs::read(path).context("Failed to read image file")?;

    let mut jpeg = Jpeg::from_bytes(Bytes::from(file_bytes))
        .map_err(|e| anyhow::anyhow!("Failed to parse JPEG: {e}"))?;

    let orig_exif_pos = find_exif_segment_pos(&jpeg);
    let existing = load_existing_exif(path, &jpeg);

    let mut kept = Vec::new();
    let mut thumbnail = None;
    let mut little_endian = false;
    if let Some(exif) = &existing {
        kept = exif
            .fields()
            .filter(|f| !REPLACED_TAGS.contains(&f.tag))
            .map(|f| Field {
                tag: f.tag,
                ifd_num: f.ifd_num,
                value: f.value.clone(),
            })
            .collect();
        thumbnail = thumbnail_jpeg(exif);
        little_endian = exif.little_endian();
        log::debug!("Keeping {} existing EXIF field(s)", kept.len());
    }

    let mut writer = Writer::new();
    for field in kept.iter().chain(new_fields) {
        writer.push_field(field);
    }
    if let Some(data) = thumbnail {
        writer.set_jpeg(data, In::THUMBNAIL);
    }

    let mut tiff = Cursor::new(Vec::new());
    writer
        .write(&mut tiff, little_endian)
        .map_err(|e| anyhow::anyhow!("Failed to encode EXIF: {e}"))?;
    jpeg.set_exif(Some(Bytes::from(tiff.into_inner())));

    // set_exif() inserts at position 3, which may be after XMP APP1.
    // Move the EXIF segment back to where it was (or right after APP0).
    if let Some(new_pos) = find_exif_segment_pos(&jpeg) {
        let target_pos = orig_exif_pos.unwrap_or(1);
        if target_pos < new_pos {
            let segments = jpeg.segments_mut();
            let seg = segments.remove(new_pos);
            segments.insert(target_pos, seg);
        }
    }

    let output = jpeg.encoder().bytes();
    std::fs::write(path, &output).context("Failed to write JPEG file")?;

    Ok(())
}

/// Find the EXIF APP1 segment (marker 0xE1, contents starting with "Exif\0\0").
fn find_exif_segment_pos(jpeg: &Jpeg) -> Option<usize> {
    const EXIF_PREFIX: &[u8] = b"Exif\0\0";
    jpeg.segments()
        .iter()
        .position(|s| s.marker() == 0xE1 && s.contents().starts_with(EXIF_PREFIX))
}

/// Parse the EXIF block already in the JPEG.
/// Returns None if there is none, or if it can't be parsed.
fn load_existing_exif(path: &Path, jpeg: &Jpeg) -> Option<Exif> {
    let raw = jpeg.exif().filter(|e| !e.is_empty())?;
    match Reader::new().read_raw(raw.to_vec()) {
        Ok(exif) => Some(exif),
        Err(e) => {
            log::warn!(
                "EXIF in {} could not be parsed ({e}); replacing it with a fresh GPS-only block",
                path.display()
            );
            None
        }
    }
}

/// The embedded IFD1 thumbnail, sliced out of the TIFF block.
fn thumbnail_jpeg(exif: &Exif) -> Option<&[u8]> {
    let offset = exif
        .get_field(Tag::JPEGInterchangeFormat, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let len = exif
        .get_field(Tag::JPEGInterchangeFormatLength, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let data = exif.buf().get(offset..offset.checked_add(len)?);
    if data.is_none() {
        log::debug!("Thumbnail at {offset}+{len} is out of bounds; dropping it");
    }
    data
}

/// The four GPS tags for a coordinate. Always all four, never a partial set.
fn gps_fields(coord: &GpsCoordinate) -> [Field; 4] {
    let lat = coord.latitude();
    let lon = coord.longitude();

    [
        gps_field(Tag::GPSLatitudeRef, ascii(codec::latitude_ref(lat))),
        gps_field(Tag::GPSLatitude, rationals(&codec::to_dms(lat.abs()))),
        gps_field(Tag::GPSLongitudeRef, ascii(codec::longitude_ref(lon))),
        gps_field(Tag::GPSLongitude, rationals(&codec::to_dms(lon.abs()))),
    ]
}

fn gps_field(tag: Tag, value: Value) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value,
    }
}

fn ascii(reference: char) -> Value {
    Value::Ascii(vec![vec![reference as u8]])
}

fn rationals(dms: &Dms) -> Value {
    Value::Rational(
        [dms.degrees, dms.minutes, dms.seconds]
            .into_iter()
            .map(|r| kamadak_exif::Rational {
                num: r.num,
                denom: r.den,
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use kamadak_exif::Rational;
    use std::fs;
    use tempfile::TempDir;

    fn sample_jpeg(dir: &TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        image::RgbImage::from_pixel(16, 16, image::Rgb([30, 90, 160]))
            .save(&path)
            .unwrap();
        path
    }

    /// A JPEG carrying a real EXIF block built from `fields` (and an IFD1 thumbnail).
    fn tagged_jpeg(
        dir: &TempDir,
        name: &str,
        fields: &[Field],
        thumbnail: Option<&[u8]>,
    ) -> std::path::PathBuf {
        let path = sample_jpeg(dir, name);
        let mut writer = Writer::new();
        for field in fields {
            writer.push_field(field);
        }
        if let Some(data) = thumbnail {
            writer.set_jpeg(data, In::THUMBNAIL);
        }
        let mut tiff = Cursor::new(Vec::new());
        writer.write(&mut tiff, false).unwrap();

        let mut jpeg = Jpeg::from_bytes(Bytes::from(fs::read(&path).unwrap())).unwrap();
        jpeg.set_exif(Some(Bytes::from(tiff.into_inner())));
        fs::write(&path, jpeg.encoder().bytes()).unwrap();
        path
    }

    fn read_exif(path: &Path) -> Exif {
        let jpeg = Jpeg::from_bytes(Bytes::from(fs::read(path).unwrap())).unwrap();
        Reader::new().read_raw(jpeg.exif().unwrap().to_vec()).unwrap()
    }

    fn thumbnail_bytes() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image::RgbImage::from_pixel(4, 4, image::Rgb([250, 250, 0]))
            .write_to(&mut buf, image::ImageFormat::Jpeg)
            .unwrap();
        buf.into_inner()
    }

    fn field(tag: Tag, ifd_num: In, value: Value) -> Field {
        Field { tag, ifd_num, value }
    }

    fn text(s: &str) -> Value {
        Value::Ascii(vec![s.as_bytes().to_vec()])
    }

    fn whole(n: u32) -> Value {
        Value::Rational(vec![Rational { num: n, denom: 1 }])
    }

    /// Camera tags, a timestamp, a GPS IFD at 10°N 20°E with altitude, and
    /// an IFD1 with its own resolution.
    fn camera_fields() -> Vec<Field> {
        vec![
            field(Tag::Make, In::PRIMARY, text("Acme")),
            field(Tag::Model, In::PRIMARY, text("Pocket 9")),
            field(Tag::DateTimeOriginal, In::PRIMARY, text("2024:05:01 12:00:00")),
            field(Tag::GPSLatitudeRef, In::PRIMARY, text("N")),
            field(
                Tag::GPSLatitude,
                In::PRIMARY,
                Value::Rational(vec![
                    Rational { num: 10, denom: 1 },
                    Rational { num: 0, denom: 1 },
                    Rational { num: 0, denom: 1 },
                ]),
            ),
            field(Tag::GPSLongitudeRef, In::PRIMARY, text("E")),
            field(
                Tag::GPSLongitude,
                In::PRIMARY,
                Value::Rational(vec![
                    Rational { num: 20, denom: 1 },
                    Rational { num: 0, denom: 1 },
                    Rational { num: 0, denom: 1 },
                ]),
            ),
            field(Tag::GPSAltitude, In::PRIMARY, whole(35)),
            field(Tag::XResolution, In::THUMBNAIL, whole(72)),
        ]
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-6, "{a} != {b}");
    }

    fn assert_text(exif: &Exif, tag: Tag, expected: &str) {
        let f = exif.get_field(tag, In::PRIMARY).unwrap_or_else(|| panic!("{tag} missing"));
        assert!(
            matches!(&f.value, Value::Ascii(v) if v[0] == expected.as_bytes()),
            "{tag} is {:?}",
            f.value
        );
    }

    #[test]
    fn gps_fields_are_all_four() {
        let coord = GpsCoordinate::new(-33.8688, 151.2093).unwrap();
        let tags: Vec<Tag> = gps_fields(&coord).iter().map(|f| f.tag).collect();
        assert_eq!(tags, REPLACED_TAGS);
    }

    #[test]
    fn seconds_use_the_shared_denominator() {
        let coord = GpsCoordinate::new(48.8566, -2.3522).unwrap();
        let [lat_ref, lat, lon_ref, _] = gps_fields(&coord);
        assert!(matches!(lat_ref.value, Value::Ascii(ref v) if v[0] == b"N"));
        assert!(matches!(lon_ref.value, Value::Ascii(ref v) if v[0] == b"W"));
        let Value::Rational(dms) = lat.value else {
            panic!("latitude is not RATIONAL");
        };
        assert_eq!((dms[0].num, dms[0].denom), (48, 1));
        assert_eq!((dms[1].num, dms[1].denom), (51, 1));
        assert_eq!((dms[2].num, dms[2].denom), (23_760_000, codec::SECONDS_DENOMINATOR));
    }

    #[test]
    fn write_then_read_north_east() {
        let dir = TempDir::new().unwrap();
        let path = sample_jpeg(&dir, "paris.jpg");
        let coord = GpsCoordinate::new(48.8566, 2.3522).unwrap();

        let outcome = write_gps(&path, &coord, WriteMode::KeepExisting).unwrap();
        assert_eq!(outcome, WriteOutcome::Written);

        let back = read_gps(&path).unwrap().expect("GPS should be present");
        assert_close(back.latitude(), 48.8566);
        assert_close(back.longitude(), 2.3522);

        // Still a decodable JPEG.
        assert!(image::open(&path).is_ok());
    }

    #[test]
    fn write_then_read_south_west() {
        let dir = TempDir::new().unwrap();
        let path = sample_jpeg(&dir, "santiago.jpg");
        let coord = GpsCoordinate::new(-33.4489, -70.6693).unwrap();

        write_gps(&path, &coord, WriteMode::Overwrite).unwrap();

        let back = read_gps(&path).unwrap().unwrap();
        assert_close(back.latitude(), -33.4489);
        assert_close(back.longitude(), -70.6693);
    }

    #[test]
    fn keep_existing_leaves_file_byte_identical() {
        let dir = TempDir::new().unwrap();
        let path = sample_jpeg(&dir, "tagged.jpg");
        let first = GpsCoordinate::new(35.6762, 139.6503).unwrap();
        write_gps(&path, &first, WriteMode::KeepExisting).unwrap();
        let before = fs::read(&path).unwrap();

        let second = GpsCoordinate::new(-1.0, -1.0).unwrap();
        let outcome = write_gps(&path, &second, WriteMode::KeepExisting).unwrap();

        assert_eq!(outcome, WriteOutcome::AlreadyPresent);
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn keep_existing_respects_gps_from_another_tool() {
        let dir = TempDir::new().unwrap();
        let thumb = thumbnail_bytes();
        let path = tagged_jpeg(&dir, "camera.jpg", &camera_fields(), Some(&thumb));
        let before = fs::read(&path).unwrap();

        let coord = GpsCoordinate::new(-1.0, -1.0).unwrap();
        let outcome = write_gps(&path, &coord, WriteMode::KeepExisting).unwrap();

        assert_eq!(outcome, WriteOutcome::AlreadyPresent);
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn overwrite_replaces_position_and_keeps_everything_else() {
        let dir = TempDir::new().unwrap();
        let thumb = thumbnail_bytes();
        let path = tagged_jpeg(&dir, "camera.jpg", &camera_fields(), Some(&thumb));
        let old = read_gps(&path).unwrap().unwrap();
        assert_close(old.latitude(), 10.0);

        let outcome = write_gps(
            &path,
            &GpsCoordinate::new(-20.5, 100.25).unwrap(),
            WriteMode::Overwrite,
        )
        .unwrap();
        assert_eq!(outcome, WriteOutcome::Written);

        let back = read_gps(&path).unwrap().unwrap();
        assert_close(back.latitude(), -20.5);
        assert_close(back.longitude(), 100.25);

        let exif = read_exif(&path);
        assert_text(&exif, Tag::Make, "Acme");
        assert_text(&exif, Tag::Model, "Pocket 9");
        assert_text(&exif, Tag::DateTimeOriginal, "2024:05:01 12:00:00");
        assert_text(&exif, Tag::GPSLatitudeRef, "S");

        let altitude = exif.get_field(Tag::GPSAltitude, In::PRIMARY).unwrap();
        assert!(matches!(&altitude.value, Value::Rational(v) if v[0].num == 35 && v[0].denom == 1));

        // IFD1 and its thumbnail survive.
        assert!(exif.get_field(Tag::XResolution, In::THUMBNAIL).is_some());
        assert_eq!(thumbnail_jpeg(&exif), Some(thumb.as_slice()));

        assert!(image::open(&path).is_ok());
    }

    #[test]
    fn gps_ifd_without_position_gets_one() {
        let dir = TempDir::new().unwrap();
        let fields = vec![
            field(Tag::Make, In::PRIMARY, text("Acme")),
            field(Tag::GPSAltitude, In::PRIMARY, whole(120)),
        ];
        let path = tagged_jpeg(&dir, "altitude.jpg", &fields, None);
        assert_eq!(read_gps(&path).unwrap(), None);

        let coord = GpsCoordinate::new(51.5074, -0.1278).unwrap();
        let outcome = write_gps(&path, &coord, WriteMode::KeepExisting).unwrap();
        assert_eq!(outcome, WriteOutcome::Written);

        let back = read_gps(&path).unwrap().unwrap();
        assert_close(back.latitude(), 51.5074);
        assert_close(back.longitude(), -0.1278);

        let exif = read_exif(&path);
        assert_text(&exif, Tag::Make, "Acme");
        assert!(exif.get_field(Tag::GPSAltitude, In::PRIMARY).is_some());
    }

    #[test]
    fn overwrite_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = sample_jpeg(&dir, "moved.jpg");
        write_gps(&path, &GpsCoordinate::new(10.0, 10.0).unwrap(), WriteMode::Overwrite).unwrap();

        write_gps(
            &path,
            &GpsCoordinate::new(-20.5, 100.25).unwrap(),
            WriteMode::Overwrite,
        )
        .unwrap();

        let back = read_gps(&path).unwrap().unwrap();
        assert_close(back.latitude(), -20.5);
        assert_close(back.longitude(), 100.25);

        // One GPSLatitude, not two.
        let exif = read_exif(&path);
        let count = exif.fields().filter(|f| f.tag == Tag::GPSLatitude).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn unreadable_exif_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = sample_jpeg(&dir, "broken.jpg");
        let mut jpeg = Jpeg::from_bytes(Bytes::from(fs::read(&path).unwrap())).unwrap();
        jpeg.set_exif(Some(Bytes::from_static(b"MM\0*garbage")));
        fs::write(&path, jpeg.encoder().bytes()).unwrap();

        let coord = GpsCoordinate::new(1.5, 2.5).unwrap();
        write_gps(&path, &coord, WriteMode::Overwrite).unwrap();

        let back = read_gps(&path).unwrap().unwrap();
        assert_close(back.latitude(), 1.5);
    }

    #[test]
    fn not_a_jpeg_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.jpg");
        fs::write(&path, b"definitely not a jpeg").unwrap();

        let coord = GpsCoordinate::new(1.0, 1.0).unwrap();
        assert!(write_gps(&path, &coord, WriteMode::Overwrite).is_err());
    }
}

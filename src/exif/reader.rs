use anyhow::{Context, Result};
use nom_exif::*;
use std::path::Path;

use super::GpsCoordinate;
use super::codec::{self, Dms, Rational};

/// Read the GPS position stored in an image, if any.
///
/// An absent or unparseable EXIF block counts as "no GPS". `Err` is only
/// returned when the file itself cannot be opened.
pub fn read_gps(path: &Path) -> Result<Option<GpsCoordinate>> {
    let mut parser = MediaParser::new();
    let ms = MediaSource::file_path(path).context("Failed to open image file")?;

    let iter: ExifIter = match parser.parse(ms) {
        Ok(iter) => iter,
        Err(e) => {
            log::debug!("No readable EXIF in {}: {e}", path.display());
            return Ok(None);
        }
    };

    let gps = match iter.parse_gps_info() {
        Ok(Some(gps)) => gps,
        Ok(None) => return Ok(None),
        Err(e) => {
            log::warn!("Corrupt GPS block in {}: {e}", path.display());
            return Ok(None);
        }
    };

    // nom-exif fills absent tags with 0/0 rationals.
    if gps.latitude == LatLng::default() || gps.longitude == LatLng::default() {
        log::debug!("GPS block in {} has no latitude/longitude", path.display());
        return Ok(None);
    }

    let (Some(lat), Some(lon)) = (
        latlng_to_decimal(&gps.latitude, gps.latitude_ref),
        latlng_to_decimal(&gps.longitude, gps.longitude_ref),
    ) else {
        log::warn!("GPS rationals in {} have a zero denominator", path.display());
        return Ok(None);
    };

    match GpsCoordinate::new(lat, lon) {
        Ok(coord) => Ok(Some(coord)),
        Err(e) => {
            log::warn!("Ignoring GPS in {}: {e}", path.display());
            Ok(None)
        }
    }
}

/// Convert a nom-exif LatLng (deg, min, sec rationals) plus its ref to signed decimal degrees.
fn latlng_to_decimal(latlng: &LatLng, reference: char) -> Option<f64> {
    let dms = Dms {
        degrees: Rational::new(latlng.0.0, latlng.0.1),
        minutes: Rational::new(latlng.1.0, latlng.1.1),
        seconds: Rational::new(latlng.2.0, latlng.2.1),
    };
    codec::from_dms(&dms).map(|magnitude| codec::apply_ref(magnitude, reference))
}

//! GPS EXIF reading and writing for JPEG files.
//!
//! - [`read_gps`]: Decode GPSLatitude/GPSLongitude (+ refs) into a [`GpsCoordinate`]
//! - [`write_gps`]: Merge the four GPS tags into the existing EXIF block
//!
//! Both sides share the DMS conversion in [`codec`], so the batch tagger and
//! the manual editor encode coordinates identically.

pub mod codec;
mod reader;
mod writer;

pub use reader::read_gps;
pub use writer::{write_gps, WriteMode, WriteOutcome};

use serde::{Deserialize, Serialize};

use crate::error::CoordinateError;

/// A validated latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinate {
    latitude: f64,
    longitude: f64,
}

impl GpsCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(CoordinateError::NotFinite);
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl std::fmt::Display for GpsCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// True for `.jpg` / `.jpeg` in any case.
pub fn is_jpeg(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn coordinate_range_checks() {
        assert!(GpsCoordinate::new(48.8566, 2.3522).is_ok());
        assert!(GpsCoordinate::new(-90.0, 180.0).is_ok());
        assert_eq!(
            GpsCoordinate::new(91.0, 0.0),
            Err(CoordinateError::Latitude(91.0))
        );
        assert_eq!(
            GpsCoordinate::new(0.0, -180.5),
            Err(CoordinateError::Longitude(-180.5))
        );
        assert_eq!(
            GpsCoordinate::new(f64::NAN, 0.0),
            Err(CoordinateError::NotFinite)
        );
    }

    #[test]
    fn jpeg_extension_case_insensitive() {
        assert!(is_jpeg(Path::new("Paris01.jpg")));
        assert!(is_jpeg(Path::new("PARIS01.JPG")));
        assert!(is_jpeg(Path::new("a.jpeg")));
        assert!(!is_jpeg(Path::new("a.png")));
        assert!(!is_jpeg(Path::new("log.csv")));
        assert!(!is_jpeg(Path::new("noext")));
    }
}

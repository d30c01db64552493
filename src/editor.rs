//! Step through a folder one JPEG at a time and set its GPS by hand.
//!
//! Shared by the GUI's "GPS Editor" tab and `geotitle-cli edit`. All work
//! is synchronous; a front end calls it from its own UI thread.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::error::EditorError;
use crate::exif::{self, GpsCoordinate, WriteMode};
use crate::pipeline::collect_jpegs;

/// Longest edge of the preview thumbnail.
pub const THUMBNAIL_EDGE: u32 = 400;

/// The image under the cursor, ready to show.
pub struct CurrentImage {
    pub path: PathBuf,
    pub file_name: String,
    pub thumbnail: image::RgbaImage,
    /// GPS already in the file, if any.
    pub coordinate: Option<GpsCoordinate>,
    /// 1-based.
    pub position: usize,
    pub total: usize,
}

/// Where the cursor went after a save or skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Next(usize),
    /// Already on the last image; the cursor stays there.
    EndOfList,
}

pub struct EditorSession {
    folder: PathBuf,
    files: Vec<PathBuf>,
    index: usize,
}

impl EditorSession {
    /// List the JPEGs in `folder` by name and start at the first one.
    pub fn load_folder(folder: &Path) -> Result<Self> {
        let files = collect_jpegs(folder)?;
        log::info!("Loaded {} image(s) from {}", files.len(), folder.display());
        Ok(Self {
            folder: folder.to_path_buf(),
            files,
            index: 0,
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.files.get(self.index).map(PathBuf::as_path)
    }

    /// Decode the current image and read its GPS. `None` for an empty folder.
    ///
    /// An `Err` leaves the cursor where it is; the caller can still
    /// [`skip`](Self::skip) past the file.
    pub fn load_current(&self) -> Result<Option<CurrentImage>> {
        let Some(path) = self.current_path() else {
            return Ok(None);
        };

        let img = image::open(path)
            .with_context(|| format!("Failed to decode {}", path.display()))?;
        let thumbnail = img.thumbnail(THUMBNAIL_EDGE, THUMBNAIL_EDGE).to_rgba8();
        let coordinate = exif::read_gps(path)?;

        Ok(Some(CurrentImage {
            path: path.to_path_buf(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            thumbnail,
            coordinate,
            position: self.index + 1,
            total: self.files.len(),
        }))
    }

    /// Validate `lat`/`lon`, overwrite the current image's GPS, and move on.
    ///
    /// On a validation error nothing is written and the cursor stays put.
    pub fn save_current_and_advance(&mut self, lat: &str, lon: &str) -> Result<Advance, EditorError> {
        let path = self.current_path().ok_or(EditorError::Empty)?.to_path_buf();
        let coord = parse_coordinate(lat, lon)?;

        exif::write_gps(&path, &coord, WriteMode::Overwrite).map_err(EditorError::Write)?;
        log::info!("Saved GPS {coord} to {}", path.display());

        Ok(self.advance())
    }

    /// Move on without writing anything.
    pub fn skip(&mut self) -> Advance {
        self.advance()
    }

    fn advance(&mut self) -> Advance {
        if self.index + 1 < self.files.len() {
            self.index += 1;
            Advance::Next(self.index)
        } else {
            Advance::EndOfList
        }
    }
}

/// Parse two text fields into a range-checked coordinate.
pub fn parse_coordinate(lat: &str, lon: &str) -> Result<GpsCoordinate, EditorError> {
    let lat = parse_number("latitude", lat)?;
    let lon = parse_number("longitude", lon)?;
    Ok(GpsCoordinate::new(lat, lon)?)
}

fn parse_number(field: &str, text: &str) -> Result<f64, EditorError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(EditorError::Validation(format!("{field} is empty")));
    }
    text.parse::<f64>()
        .map_err(|_| EditorError::Validation(format!("{field} \"{text}\" is not a number")))
}

/// OpenStreetMap link centred on `coord` with a marker.
pub fn map_url(coord: &GpsCoordinate) -> String {
    let (lat, lon) = (coord.latitude(), coord.longitude());
    format!("https://www.openstreetmap.org/?mlat={lat:.6}&mlon={lon:.6}#map=15/{lat:.6}/{lon:.6}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn jpeg(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::from_pixel(w, h, image::Rgb([10, 80, 160]))
            .save_with_format(&path, image::ImageFormat::Jpeg)
            .unwrap();
        path
    }

    fn session_with(names: &[&str]) -> (TempDir, EditorSession) {
        let dir = TempDir::new().unwrap();
        for name in names {
            jpeg(dir.path(), name, 16, 16);
        }
        let session = EditorSession::load_folder(dir.path()).unwrap();
        (dir, session)
    }

    #[test]
    fn loads_sorted_jpegs_only() {
        let dir = TempDir::new().unwrap();
        jpeg(dir.path(), "b.jpg", 8, 8);
        jpeg(dir.path(), "a.jpeg", 8, 8);
        fs::write(dir.path().join("readme.txt"), b"x").unwrap();

        let session = EditorSession::load_folder(dir.path()).unwrap();
        let names: Vec<_> = session
            .files()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpeg", "b.jpg"]);
        assert_eq!(session.index(), 0);
    }

    #[test]
    fn empty_folder() {
        let (_dir, mut session) = session_with(&[]);
        assert!(session.is_empty());
        assert!(session.load_current().unwrap().is_none());
        assert!(matches!(
            session.save_current_and_advance("1", "2"),
            Err(EditorError::Empty)
        ));
    }

    #[test]
    fn current_image_has_small_thumbnail() {
        let dir = TempDir::new().unwrap();
        jpeg(dir.path(), "wide.jpg", 1200, 600);
        let session = EditorSession::load_folder(dir.path()).unwrap();

        let current = session.load_current().unwrap().unwrap();
        assert_eq!(current.file_name, "wide.jpg");
        assert_eq!(current.thumbnail.width(), THUMBNAIL_EDGE);
        assert!(current.thumbnail.height() <= THUMBNAIL_EDGE);
        assert_eq!((current.position, current.total), (1, 1));
        assert!(current.coordinate.is_none());
    }

    #[test]
    fn save_writes_and_advances() {
        let (dir, mut session) = session_with(&["a.jpg", "b.jpg"]);

        let next = session.save_current_and_advance(" 35.6812 ", "139.7671").unwrap();
        assert_eq!(next, Advance::Next(1));

        let coord = exif::read_gps(&dir.path().join("a.jpg")).unwrap().unwrap();
        assert!((coord.latitude() - 35.6812).abs() < 1e-6);
        assert!((coord.longitude() - 139.7671).abs() < 1e-6);
    }

    #[test]
    fn save_overwrites_existing_gps() {
        let (dir, mut session) = session_with(&["a.jpg"]);
        let path = dir.path().join("a.jpg");
        exif::write_gps(&path, &GpsCoordinate::new(1.0, 1.0).unwrap(), WriteMode::Overwrite)
            .unwrap();

        session.save_current_and_advance("-33.8688", "151.2093").unwrap();

        let coord = exif::read_gps(&path).unwrap().unwrap();
        assert!((coord.latitude() + 33.8688).abs() < 1e-6);
    }

    #[test]
    fn non_numeric_longitude_changes_nothing() {
        let (dir, mut session) = session_with(&["a.jpg", "b.jpg"]);
        let path = dir.path().join("a.jpg");
        let before = fs::read(&path).unwrap();

        let err = session.save_current_and_advance("48.85", "east").unwrap_err();
        assert!(matches!(err, EditorError::Validation(_)));
        assert_eq!(session.index(), 0);
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn out_of_range_is_rejected() {
        let (_dir, mut session) = session_with(&["a.jpg"]);
        assert!(matches!(
            session.save_current_and_advance("91", "0"),
            Err(EditorError::Validation(_))
        ));
        assert!(matches!(
            session.save_current_and_advance("", "0"),
            Err(EditorError::Validation(_))
        ));
    }

    #[test]
    fn end_of_list_stays_on_last() {
        let (_dir, mut session) = session_with(&["a.jpg", "b.jpg"]);
        assert_eq!(session.skip(), Advance::Next(1));
        assert_eq!(session.skip(), Advance::EndOfList);
        assert_eq!(session.index(), 1);

        assert_eq!(session.save_current_and_advance("0", "0").unwrap(), Advance::EndOfList);
        assert_eq!(session.index(), 1);
    }

    #[test]
    fn undecodable_image_can_be_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.jpg"), b"not really a jpeg").unwrap();
        jpeg(dir.path(), "b.jpg", 16, 16);
        let mut session = EditorSession::load_folder(dir.path()).unwrap();

        assert!(session.load_current().is_err());
        assert_eq!(session.skip(), Advance::Next(1));

        let current = session.load_current().unwrap().unwrap();
        assert_eq!(current.file_name, "b.jpg");
        assert_eq!((current.position, current.total), (2, 2));
    }

    #[test]
    fn map_url_points_at_coordinate() {
        let coord = GpsCoordinate::new(48.8566, 2.3522).unwrap();
        assert_eq!(
            map_url(&coord),
            "https://www.openstreetmap.org/?mlat=48.856600&mlon=2.352200#map=15/48.856600/2.352200"
        );
    }
}

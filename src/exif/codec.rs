//! Decimal degrees ⇄ EXIF degrees/minutes/seconds rationals.
//!
//! EXIF stores each GPS axis as three unsigned rationals. Degrees and minutes
//! are whole numbers over 1; seconds keep their fraction over
//! [`SECONDS_DENOMINATOR`]. The sign lives in a separate reference tag
//! (`N`/`S`, `E`/`W`), so everything here works on magnitudes.

use serde::{Deserialize, Serialize};

/// Denominator used for the seconds rational on every write.
///
/// One millionth of an arc-second (about 31 µm on the ground). Seconds are
/// rounded to this step, so a round trip through [`to_dms`] and [`from_dms`]
/// is off by at most `0.5 / SECONDS_DENOMINATOR` arc-seconds. Files written
/// by tools using a coarser step (1/100 s is common) decode exactly; re-saving
/// them only ever gains precision.
pub const SECONDS_DENOMINATOR: u32 = 1_000_000;

/// Largest round-trip error in decimal degrees.
pub const ROUND_TRIP_TOLERANCE: f64 = 0.5 / SECONDS_DENOMINATOR as f64 / 3600.0;

/// An unsigned EXIF RATIONAL (two `u32`s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    pub num: u32,
    pub den: u32,
}

impl Rational {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// `None` for a zero denominator.
    pub fn to_f64(self) -> Option<f64> {
        if self.den == 0 {
            None
        } else {
            Some(self.num as f64 / self.den as f64)
        }
    }
}

/// Degrees, minutes and seconds as stored in GPSLatitude / GPSLongitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dms {
    pub degrees: Rational,
    pub minutes: Rational,
    pub seconds: Rational,
}

/// Encode a non-negative decimal degree value.
///
/// Seconds are rounded, and a rounded value of 60 s or 60 min carries into
/// the next unit. Negative or non-finite input is clamped to zero; callers
/// pass `abs()` and keep the sign in the reference tag.
pub fn to_dms(decimal_degree: f64) -> Dms {
    let value = if decimal_degree.is_finite() {
        decimal_degree.abs()
    } else {
        0.0
    };

    let mut degrees = value.trunc() as u32;
    let minutes_f = (value - degrees as f64) * 60.0;
    let mut minutes = minutes_f.trunc() as u32;
    let seconds_f = (minutes_f - minutes as f64) * 60.0;
    let mut seconds_num = (seconds_f * SECONDS_DENOMINATOR as f64).round() as u64;

    if seconds_num >= 60 * SECONDS_DENOMINATOR as u64 {
        seconds_num -= 60 * SECONDS_DENOMINATOR as u64;
        minutes += 1;
    }
    if minutes >= 60 {
        minutes -= 60;
        degrees += 1;
    }

    Dms {
        degrees: Rational::new(degrees, 1),
        minutes: Rational::new(minutes, 1),
        seconds: Rational::new(seconds_num as u32, SECONDS_DENOMINATOR),
    }
}

/// Decode DMS rationals back to decimal degrees.
///
/// Accepts any denominators (other writers pick their own), returning `None`
/// if one of them is zero.
pub fn from_dms(dms: &Dms) -> Option<f64> {
    let d = dms.degrees.to_f64()?;
    let m = dms.minutes.to_f64()?;
    let s = dms.seconds.to_f64()?;
    Some(d + m / 60.0 + s / 3600.0)
}

/// Reference character for a signed latitude.
pub fn latitude_ref(latitude: f64) -> char {
    if latitude >= 0.0 { 'N' } else { 'S' }
}

/// Reference character for a signed longitude.
pub fn longitude_ref(longitude: f64) -> char {
    if longitude >= 0.0 { 'E' } else { 'W' }
}

/// Apply a reference character to a decoded magnitude.
pub fn apply_ref(magnitude: f64, reference: char) -> f64 {
    match reference.to_ascii_uppercase() {
        'S' | 'W' => -magnitude,
        _ => magnitude,
    }
}

//! Geospatial overlay for sorted sets
//!
//! Coordinates are quantized to 26 bits per axis and bit-interleaved into a
//! 52-bit score; the score is stored via the ordinary sorted-set machinery,
//! so geo keys *are* sorted sets. Decoding returns the center of the
//! quantization cell, which round-trips the original coordinates to within
//! a few millionths of a degree.

/// Latitude bounds of the indexable area (Web Mercator limits).
pub const LAT_MIN: f64 = -85.05112878;
pub const LAT_MAX: f64 = 85.05112878;
pub const LON_MIN: f64 = -180.0;
pub const LON_MAX: f64 = 180.0;

/// Bits per axis in the interleaved score.
const STEP: u32 = 26;

/// Mean Earth radius used for distance computation, in meters.
const EARTH_RADIUS_M: f64 = 6_372_797.560_856;

pub fn valid_longitude(lon: f64) -> bool {
    lon > LON_MIN && lon < LON_MAX
}

pub fn valid_latitude(lat: f64) -> bool {
    (LAT_MIN..=LAT_MAX).contains(&lat)
}

/// Encode a coordinate pair into the 52-bit interleaved score.
///
/// Callers validate the ranges first; out-of-range input saturates.
pub fn encode(lon: f64, lat: f64) -> u64 {
    let lon_unit = (lon - LON_MIN) / (LON_MAX - LON_MIN);
    let lat_unit = (lat - LAT_MIN) / (LAT_MAX - LAT_MIN);
    let lon_bits = quantize(lon_unit);
    let lat_bits = quantize(lat_unit);
    spread(lon_bits) | (spread(lat_bits) << 1)
}

/// Decode a 52-bit score back to the cell-center `(lon, lat)`.
pub fn decode(score: u64) -> (f64, f64) {
    let lon_bits = squash(score);
    let lat_bits = squash(score >> 1);
    let scale = (1u64 << STEP) as f64;
    let lon = LON_MIN + (lon_bits as f64 + 0.5) / scale * (LON_MAX - LON_MIN);
    let lat = LAT_MIN + (lat_bits as f64 + 0.5) / scale * (LAT_MAX - LAT_MIN);
    (lon, lat)
}

fn quantize(unit: f64) -> u32 {
    let scale = (1u64 << STEP) as f64;
    let v = (unit * scale) as i64;
    v.clamp(0, (1 << STEP) - 1) as u32
}

/// Spread the low 26 bits of `v` into the even bit positions.
fn spread(v: u32) -> u64 {
    let mut x = v as u64;
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    x = (x | (x << 1)) & 0x5555_5555_5555_5555;
    x
}

/// Collect the even bit positions of `v` back into a 26-bit value.
fn squash(v: u64) -> u32 {
    let mut x = v & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x >> 16)) & 0x0000_0000_FFFF_FFFF;
    x as u32
}

/// Great-circle distance between two coordinates, in meters (Haversine on a
/// sphere of `EARTH_RADIUS_M`).
pub fn haversine_m(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let lat1r = lat1.to_radians();
    let lat2r = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1r.cos() * lat2r.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Meters per one unit of the given distance unit.
pub fn unit_to_meters(unit: &str) -> Option<f64> {
    match unit.to_ascii_lowercase().as_str() {
        "m" => Some(1.0),
        "km" => Some(1000.0),
        "mi" => Some(1609.34),
        "ft" => Some(0.3048),
        _ => None,
    }
}

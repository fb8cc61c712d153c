//! Geo-point encodings: Morton-interleaved points, geohash strings and
//! great-circle distances.

use serde::{Deserialize, Serialize};

use super::numeric;

const GEO_BITS: u32 = 32;
const MIN_LON: f64 = -180.0;
const MIN_LAT: f64 = -90.0;
const GEO_MAX_CELL: f64 = ((1u64 << GEO_BITS) - 1) as f64;
const LON_SCALE: f64 = GEO_MAX_CELL / 360.0;
const LAT_SCALE: f64 = GEO_MAX_CELL / 180.0;

/// Mean Earth radius in kilometers.
pub const EARTH_MEAN_RADIUS_KM: f64 = 6371.0088;

/// Longest geohash the grid aggregation produces.
pub const MAX_GEOHASH_PRECISION: usize = 12;

const GEOHASH_ALPHABET: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

const MAGIC: [u64; 6] = [
    0x5555_5555_5555_5555,
    0x3333_3333_3333_3333,
    0x0F0F_0F0F_0F0F_0F0F,
    0x00FF_00FF_00FF_00FF,
    0x0000_FFFF_0000_FFFF,
    0x0000_0000_FFFF_FFFF,
];

/// A longitude/latitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self.lon, self.lat, other.lon, other.lat)
    }
}

fn spread(value: u64) -> u64 {
    let mut v = value & MAGIC[5];
    v = (v | (v << 16)) & MAGIC[4];
    v = (v | (v << 8)) & MAGIC[3];
    v = (v | (v << 4)) & MAGIC[2];
    v = (v | (v << 2)) & MAGIC[1];
    (v | (v << 1)) & MAGIC[0]
}

/// Interleave the low 32 bits of `even` and `odd`, `even` taking bit 0.
pub fn interleave(even: u64, odd: u64) -> u64 {
    spread(even) | (spread(odd) << 1)
}

/// Collect the even bits of `value` into the low 32 bits.
pub fn deinterleave(value: u64) -> u64 {
    let mut b = value & MAGIC[0];
    b = (b ^ (b >> 1)) & MAGIC[1];
    b = (b ^ (b >> 2)) & MAGIC[2];
    b = (b ^ (b >> 4)) & MAGIC[3];
    b = (b ^ (b >> 8)) & MAGIC[4];
    (b ^ (b >> 16)) & MAGIC[5]
}

fn scale_lon(lon: f64) -> u64 {
    ((lon - MIN_LON) * LON_SCALE) as u64
}

fn scale_lat(lat: f64) -> u64 {
    ((lat - MIN_LAT) * LAT_SCALE) as u64
}

/// Morton hash of a point: longitude in the even bits, latitude in the odd.
pub fn morton_hash(lon: f64, lat: f64) -> u64 {
    interleave(scale_lon(lon), scale_lat(lat))
}

pub fn morton_unhash_lon(hash: u64) -> f64 {
    deinterleave(hash) as f64 / LON_SCALE + MIN_LON
}

pub fn morton_unhash_lat(hash: u64) -> f64 {
    deinterleave(hash >> 1) as f64 / LAT_SCALE + MIN_LAT
}

/// Full-precision term for a geo point.
pub fn encode_point(point: GeoPoint) -> Vec<u8> {
    numeric::encode_full_i64(morton_hash(point.lon, point.lat) as i64)
}

/// Decode a geo-point term. Shifted or malformed terms yield `None`.
pub fn decode_point(term: &[u8]) -> Option<GeoPoint> {
    let hash = numeric::full_precision_i64(term)? as u64;
    Some(GeoPoint::new(morton_unhash_lon(hash), morton_unhash_lat(hash)))
}

/// Encode a point as a geohash of `precision` characters (clamped to 1..=12).
pub fn encode_geohash(lat: f64, lon: f64, precision: usize) -> String {
    let precision = precision.clamp(1, MAX_GEOHASH_PRECISION);
    let (mut lat_lo, mut lat_hi) = (-90.0_f64, 90.0_f64);
    let (mut lon_lo, mut lon_hi) = (-180.0_f64, 180.0_f64);

    let mut hash = String::with_capacity(precision);
    let mut even = true;
    let mut bits = 0;
    let mut ch = 0usize;

    while hash.len() < precision {
        if even {
            let mid = (lon_lo + lon_hi) / 2.0;
            if lon >= mid {
                ch = (ch << 1) | 1;
                lon_lo = mid;
            } else {
                ch <<= 1;
                lon_hi = mid;
            }
        } else {
            let mid = (lat_lo + lat_hi) / 2.0;
            if lat >= mid {
                ch = (ch << 1) | 1;
                lat_lo = mid;
            } else {
                ch <<= 1;
                lat_hi = mid;
            }
        }
        even = !even;
        bits += 1;
        if bits == 5 {
            hash.push(GEOHASH_ALPHABET[ch] as char);
            bits = 0;
            ch = 0;
        }
    }
    hash
}

/// Centre `(lat, lon)` of a geohash cell, or `None` for characters outside
/// the geohash alphabet.
pub fn decode_geohash(hash: &str) -> Option<(f64, f64)> {
    let (mut lat_lo, mut lat_hi) = (-90.0_f64, 90.0_f64);
    let (mut lon_lo, mut lon_hi) = (-180.0_f64, 180.0_f64);
    let mut even = true;

    for byte in hash.bytes() {
        let idx = GEOHASH_ALPHABET.iter().position(|&c| c == byte)?;
        for shift in (0..5).rev() {
            let bit = (idx >> shift) & 1 == 1;
            if even {
                let mid = (lon_lo + lon_hi) / 2.0;
                if bit {
                    lon_lo = mid;
                } else {
                    lon_hi = mid;
                }
            } else {
                let mid = (lat_lo + lat_hi) / 2.0;
                if bit {
                    lat_lo = mid;
                } else {
                    lat_hi = mid;
                }
            }
            even = !even;
        }
    }
    Some(((lat_lo + lat_hi) / 2.0, (lon_lo + lon_hi) / 2.0))
}

/// Great-circle distance between two points in kilometers.
pub fn haversine_km(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_MEAN_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Unit for distance bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceUnit {
    Meters,
    #[default]
    Kilometers,
    Centimeters,
    Millimeters,
    Miles,
    Yards,
    Feet,
    Inches,
    NauticalMiles,
}

impl DistanceUnit {
    /// Parse a unit name or abbreviation. Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let unit = match s.trim().to_ascii_lowercase().as_str() {
            "m" | "meter" | "meters" => Self::Meters,
            "km" | "kilometer" | "kilometers" => Self::Kilometers,
            "cm" | "centimeter" | "centimeters" => Self::Centimeters,
            "mm" | "millimeter" | "millimeters" => Self::Millimeters,
            "mi" | "mile" | "miles" => Self::Miles,
            "yd" | "yard" | "yards" => Self::Yards,
            "ft" | "foot" | "feet" => Self::Feet,
            "in" | "inch" | "inches" => Self::Inches,
            "nm" | "nauticalmile" | "nauticalmiles" | "nautical_miles" => Self::NauticalMiles,
            _ => return None,
        };
        Some(unit)
    }

    /// Parse, falling back to kilometers for unknown names.
    pub fn parse_or_default(s: &str) -> Self {
        Self::parse(s).unwrap_or_default()
    }

    /// Length of one unit in meters.
    pub fn meters(self) -> f64 {
        match self {
            Self::Meters => 1.0,
            Self::Kilometers => 1000.0,
            Self::Centimeters => 0.01,
            Self::Millimeters => 0.001,
            Self::Miles => 1609.344,
            Self::Yards => 0.9144,
            Self::Feet => 0.3048,
            Self::Inches => 0.0254,
            Self::NauticalMiles => 1852.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Meters => "m",
            Self::Kilometers => "km",
            Self::Centimeters => "cm",
            Self::Millimeters => "mm",
            Self::Miles => "mi",
            Self::Yards => "yd",
            Self::Feet => "ft",
            Self::Inches => "in",
            Self::NauticalMiles => "nm",
        }
    }

    pub fn from_km(self, km: f64) -> f64 {
        km * 1000.0 / self.meters()
    }
}

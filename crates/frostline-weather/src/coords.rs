//! Coordinate geometry on a flat approximation of the Earth.
//!
//! One degree of latitude ("parallel") and one degree of longitude
//! ("meridian") are treated as fixed linear lengths. This avoids any
//! trigonometry; accuracy degrades away from the mid-latitudes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::ValidationError;

pub const AVG_MILES_PER_PARALLEL: f64 = 69.0;
pub const AVG_MILES_PER_MERIDIAN: f64 = 69.18;
pub const AVG_KM_PER_PARALLEL: f64 = 111.0;
pub const AVG_KM_PER_MERIDIAN: f64 = 111.32;

/// Unit for distances and search radii
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    #[default]
    Miles,
    Km,
}

impl DistanceUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Miles => "miles",
            Self::Km => "km",
        }
    }

    fn per_parallel(self) -> f64 {
        match self {
            Self::Miles => AVG_MILES_PER_PARALLEL,
            Self::Km => AVG_KM_PER_PARALLEL,
        }
    }

    fn per_meridian(self) -> f64 {
        match self {
            Self::Miles => AVG_MILES_PER_MERIDIAN,
            Self::Km => AVG_KM_PER_MERIDIAN,
        }
    }
}

impl FromStr for DistanceUnit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "miles" => Ok(Self::Miles),
            "km" => Ok(Self::Km),
            other => Err(ValidationError::Unit(other.to_string())),
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of parallels (degrees of latitude) spanning `distance`.
pub fn to_parallels(distance: f64, unit: DistanceUnit) -> f64 {
    distance / unit.per_parallel()
}

/// Distance spanned by `parallels` degrees of latitude.
pub fn from_parallels(parallels: f64, unit: DistanceUnit) -> f64 {
    parallels * unit.per_parallel()
}

/// Number of meridians (degrees of longitude) spanning `distance`.
pub fn to_meridians(distance: f64, unit: DistanceUnit) -> f64 {
    distance / unit.per_meridian()
}

/// Distance spanned by `meridians` degrees of longitude.
pub fn from_meridians(meridians: f64, unit: DistanceUnit) -> f64 {
    meridians * unit.per_meridian()
}

/// Latitude and longitude in decimal degrees.
///
/// Values must be finite; no range clamping is performed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationCoordinates {
    latitude: f64,
    longitude: f64,
}

impl LocationCoordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !latitude.is_finite() {
            return Err(ValidationError::Coordinate(latitude.to_string()));
        }
        if !longitude.is_finite() {
            return Err(ValidationError::Coordinate(longitude.to_string()));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Build coordinates from their textual form, e.g. `("40.8153762", "-73.0451085")`.
    pub fn parse(latitude: &str, longitude: &str) -> Result<Self, ValidationError> {
        let parse = |s: &str| {
            s.trim()
                .parse::<f64>()
                .map_err(|_| ValidationError::Coordinate(s.to_string()))
        };
        Self::new(parse(latitude)?, parse(longitude)?)
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn distance_from(&self, other: &LocationCoordinates, unit: DistanceUnit) -> f64 {
        distance_between(self, other, unit)
    }

    /// Bounding box around this location, see [`BoundingBox::around`].
    pub fn bounding_box(&self, radius: f64, unit: DistanceUnit) -> BoundingBox {
        BoundingBox::around(self, radius, unit)
    }
}

impl fmt::Display for LocationCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_component(f, self.latitude, latitude_compass_direction(self.latitude))?;
        f.write_str(", ")?;
        write_component(f, self.longitude, longitude_compass_direction(self.longitude))
    }
}

fn write_component(f: &mut fmt::Formatter<'_>, value: f64, direction: Option<&str>) -> fmt::Result {
    match direction {
        Some(d) => write!(f, "{:.3}° {}", value.abs(), d),
        None => write!(f, "{:.3}°", value.abs()),
    }
}

/// Approximate distance between two points: the Euclidean combination of
/// the east-west and north-south linear distances.
pub fn distance_between(a: &LocationCoordinates, b: &LocationCoordinates, unit: DistanceUnit) -> f64 {
    let east_west = from_meridians(b.longitude - a.longitude, unit);
    let north_south = from_parallels(b.latitude - a.latitude, unit);
    east_west.hypot(north_south)
}

/// Sort stations-like items by distance from `origin`, nearest first.
/// Equal distances keep their input order.
pub fn sort_by_distance<T>(
    items: &mut [T],
    origin: &LocationCoordinates,
    unit: DistanceUnit,
    location: impl Fn(&T) -> &LocationCoordinates,
) {
    items.sort_by(|a, b| {
        let da = distance_between(origin, location(a), unit);
        let db = distance_between(origin, location(b), unit);
        da.total_cmp(&db)
    });
}

/// Rectangular region whose edges lie `radius` away from a center point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn around(center: &LocationCoordinates, radius: f64, unit: DistanceUnit) -> Self {
        let latitude_length = to_parallels(radius, unit);
        let longitude_length = to_meridians(radius, unit);
        Self {
            north: center.latitude + latitude_length,
            west: center.longitude - longitude_length,
            south: center.latitude - latitude_length,
            east: center.longitude + longitude_length,
        }
    }

    /// `"north,west,south,east"` with 3 decimals, as used by the NCEI search service.
    pub fn ncei_extent(&self) -> String {
        format!(
            "{:.3},{:.3},{:.3},{:.3}",
            self.north, self.west, self.south, self.east
        )
    }

    /// `"south,west,north,east"` with 3 decimals (the LatLngBounds URL value ordering).
    pub fn lat_lng_bounds(&self) -> String {
        format!(
            "{:.3},{:.3},{:.3},{:.3}",
            self.south, self.west, self.north, self.east
        )
    }
}

/// "North"/"South" for a latitude, judged on the degree value truncated toward zero.
pub fn latitude_compass_direction(latitude: f64) -> Option<&'static str> {
    let value = latitude.trunc();
    if value > 0.0 && value < 90.0 {
        Some("North")
    } else if value < 0.0 && value > -90.0 {
        Some("South")
    } else {
        None
    }
}

/// "East"/"West" for a longitude, judged on the degree value truncated toward zero.
pub fn longitude_compass_direction(longitude: f64) -> Option<&'static str> {
    let value = longitude.trunc();
    if value > 0.0 && value < 180.0 {
        Some("East")
    } else if value < 0.0 && value > -180.0 {
        Some("West")
    } else {
        None
    }
}

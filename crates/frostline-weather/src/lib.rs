//! Weather-station data for Frostline
//!
//! Postal code geocoding (GeoNames), climate station search and frost-date
//! normals (NCEI CDO), the coordinate math both depend on, and the local ZIP
//! code cache.

pub mod types;
pub mod cache;
pub mod coords;
pub mod geocode;
pub mod grid;
mod http;
pub mod stations;

pub use types::*;
pub use cache::ZipCache;
pub use coords::{distance_between, sort_by_distance, BoundingBox, DistanceUnit, LocationCoordinates};
pub use geocode::GeoNamesClient;
pub use grid::{FrostDateGrid, FrostDateKey, FrostDates, FrostKind, ShortDate};
pub use stations::{ExtentOrder, NcdcClient};

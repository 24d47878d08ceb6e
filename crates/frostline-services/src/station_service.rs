//! Station search and frost-date retrieval against NCEI CDO.

use std::sync::Arc;
use std::time::Duration;

use frostline_weather::{
    DistanceUnit, FrostDates, FrostKind, LocationCoordinates, NcdcClient, StationInfo, WeatherError,
};
use tokio::runtime::Handle;

use crate::request::{AsyncRequestController, RequestHandle};

/// Parameters of a nearby-station search
#[derive(Debug, Clone, Copy)]
pub struct StationQuery {
    pub location: LocationCoordinates,
    pub radius: f64,
    pub unit: DistanceUnit,
}

#[derive(Debug, Clone)]
pub struct FrostDateQuery {
    pub station_id: String,
    pub kind: FrostKind,
}

/// Frost dates of one station, tagged with the query that produced them
#[derive(Debug, Clone)]
pub struct FrostDateReport {
    pub station_id: String,
    pub kind: FrostKind,
    pub dates: FrostDates,
}

pub type StationController = AsyncRequestController<StationQuery, Vec<StationInfo>, WeatherError>;
pub type FrostDateController = AsyncRequestController<FrostDateQuery, FrostDateReport, WeatherError>;

/// Two independent request pipelines sharing one NCEI client.
///
/// Station lists come back in service order; sort them with
/// [`sort_by_distance`].
pub struct StationService {
    stations: StationController,
    frost_dates: FrostDateController,
}

impl StationService {
    pub fn new(runtime: Handle, client: NcdcClient) -> Self {
        let client = Arc::new(client);

        let stations_client = Arc::clone(&client);
        let stations = AsyncRequestController::new("stations", runtime.clone(), move |query: StationQuery| {
            let client = Arc::clone(&stations_client);
            async move { client.nearby_stations(&query.location, query.radius, query.unit).await }
        });

        let frost_dates = AsyncRequestController::new("frost-dates", runtime, move |query: FrostDateQuery| {
            let client = Arc::clone(&client);
            async move {
                let dates = client.frost_dates(&query.station_id, query.kind).await?;
                Ok(FrostDateReport {
                    station_id: query.station_id,
                    kind: query.kind,
                    dates,
                })
            }
        });

        Self { stations, frost_dates }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stations = self.stations.with_timeout(timeout);
        self.frost_dates = self.frost_dates.with_timeout(timeout);
        self
    }

    /// Search for stations within `radius` of `location`.
    pub fn find_nearby(&self, location: LocationCoordinates, radius: f64, unit: DistanceUnit) -> RequestHandle {
        tracing::info!("Searching stations within {} {} of {}", radius, unit.as_str(), location);
        self.stations.send(StationQuery { location, radius, unit })
    }

    /// Fetch the first or last frost-date normals of one station.
    pub fn fetch_frost_dates(&self, station_id: &str, kind: FrostKind) -> RequestHandle {
        tracing::info!("Fetching {} frost dates for {}", kind, station_id);
        self.frost_dates.send(FrostDateQuery {
            station_id: station_id.to_string(),
            kind,
        })
    }

    pub fn stations(&self) -> &StationController {
        &self.stations
    }

    pub fn frost_dates(&self) -> &FrostDateController {
        &self.frost_dates
    }
}

/// Order stations nearest-first relative to `origin`.
pub fn sort_by_distance(stations: &mut [StationInfo], origin: &LocationCoordinates, unit: DistanceUnit) {
    frostline_weather::sort_by_distance(stations, origin, unit, |s| &s.location);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(id: &str, lat: f64, lng: f64) -> StationInfo {
        StationInfo {
            station_id: id.to_string(),
            name: id.to_string(),
            location: LocationCoordinates::new(lat, lng).unwrap(),
        }
    }

    #[test]
    fn sorts_nearest_first() {
        let origin = LocationCoordinates::new(40.0, -73.0).unwrap();
        let mut stations = vec![
            station("far", 41.0, -73.0),
            station("near", 40.1, -73.0),
            station("mid", 40.0, -73.5),
        ];

        sort_by_distance(&mut stations, &origin, DistanceUnit::Miles);

        let ids: Vec<_> = stations.iter().map(|s| s.station_id.as_str()).collect();
        assert_eq!(ids, ["near", "mid", "far"]);
    }
}

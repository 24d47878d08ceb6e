//! NCEI Climate Data Online (CDO v2) client: station search and
//! frost-date normals. Every request carries the `token` header.

use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use crate::coords::{BoundingBox, DistanceUnit, LocationCoordinates};
use crate::grid::{FrostDateKey, FrostDates, FrostKind, ShortDate};
use crate::http;
use crate::types::{StationInfo, WeatherError};

pub const NCDC_BASE_URL: &str = "https://www.ncei.noaa.gov/cdo-web/api/v2";
/// Normals Annual/Seasonal dataset
pub const NORMALS_DATASET: &str = "NORMAL_ANN";
/// Normals are published against a single nominal date
pub const NORMALS_DATE: &str = "2010-01-01";
/// Only stations reporting this frost-probability data type are searched
pub const STATION_DATATYPE: &str = "ANN-TMIN-PRBFST-T32FP50";
const FROST_DATES_LIMIT: &str = "100";
const STATIONS_LIMIT: &str = "1000";

/// Field order of the `extent` parameter sent with a station search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtentOrder {
    /// `north,west,south,east`
    #[default]
    NorthWestSouthEast,
    /// `south,west,north,east` (Google Maps LatLngBounds URL value)
    SouthWestNorthEast,
}

impl ExtentOrder {
    pub fn format(self, bounds: &BoundingBox) -> String {
        match self {
            Self::NorthWestSouthEast => bounds.ncei_extent(),
            Self::SouthWestNorthEast => bounds.lat_lng_bounds(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResultsResponse<T> {
    results: Option<Vec<T>>,
}

#[derive(Debug, Deserialize)]
struct StationRow {
    id: String,
    name: String,
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct DataRow {
    datatype: String,
    value: f64,
}

#[derive(Debug, Clone)]
pub struct NcdcClient {
    client: Client,
    token: String,
    base_url: String,
    extent_order: ExtentOrder,
}

impl NcdcClient {
    pub fn new(token: &str) -> Result<Self, WeatherError> {
        Self::with_base_url(token, NCDC_BASE_URL)
    }

    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self, WeatherError> {
        Ok(Self {
            client: http::build_client()?,
            token: token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            extent_order: ExtentOrder::default(),
        })
    }

    pub fn with_extent_order(mut self, order: ExtentOrder) -> Self {
        self.extent_order = order;
        self
    }

    pub fn stations_url(
        &self,
        location: &LocationCoordinates,
        radius: f64,
        unit: DistanceUnit,
    ) -> Result<Url, WeatherError> {
        let extent = self
            .extent_order
            .format(&BoundingBox::around(location, radius, unit));
        Ok(Url::parse_with_params(
            &format!("{}/stations", self.base_url),
            &[
                ("extent", extent.as_str()),
                ("datasetid", NORMALS_DATASET),
                ("datatypeid", STATION_DATATYPE),
                ("limit", STATIONS_LIMIT),
            ],
        )?)
    }

    pub fn frost_dates_url(&self, station_id: &str, kind: FrostKind) -> Result<Url, WeatherError> {
        let mut url = Url::parse_with_params(
            &format!("{}/data", self.base_url),
            &[
                ("datasetid", NORMALS_DATASET),
                ("startdate", NORMALS_DATE),
                ("enddate", NORMALS_DATE),
                ("stationid", station_id),
                ("limit", FROST_DATES_LIMIT),
            ],
        )?;
        {
            let mut query = url.query_pairs_mut();
            for key in FrostDateKey::all(kind) {
                query.append_pair("datatypeid", &key.datatype_id());
            }
        }
        Ok(url)
    }

    async fn get_results<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, WeatherError> {
        tracing::debug!("GET {}", url.path());
        let response = self
            .client
            .get(url)
            .header("token", &self.token)
            .send()
            .await?;
        let (status, body) = http::read_json(response).await?;

        if !status.is_success() {
            let message = body
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| http::summarize(&body.to_string()));
            return Err(WeatherError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ResultsResponse<T> = http::decode(body)?;
        match parsed.results {
            Some(rows) if !rows.is_empty() => Ok(rows),
            _ => Err(WeatherError::NoResults),
        }
    }

    /// Stations with annual normals inside the box `radius` around `location`,
    /// in the order the service returned them.
    #[instrument(skip(self), level = "info")]
    pub async fn nearby_stations(
        &self,
        location: &LocationCoordinates,
        radius: f64,
        unit: DistanceUnit,
    ) -> Result<Vec<StationInfo>, WeatherError> {
        let url = self.stations_url(location, radius, unit)?;
        let rows: Vec<StationRow> = self.get_results(url).await?;

        let mut stations = Vec::with_capacity(rows.len());
        for row in rows {
            match LocationCoordinates::new(row.latitude, row.longitude) {
                Ok(location) => stations.push(StationInfo {
                    station_id: row.id,
                    name: row.name,
                    location,
                }),
                Err(e) => tracing::warn!("Skipping station {}: {}", row.id, e),
            }
        }

        tracing::info!("Found {} stations", stations.len());
        Ok(stations)
    }

    /// Frost dates of `kind` for one station. Cells the station does not
    /// report are absent from the map.
    #[instrument(skip(self), level = "info")]
    pub async fn frost_dates(&self, station_id: &str, kind: FrostKind) -> Result<FrostDates, WeatherError> {
        let url = self.frost_dates_url(station_id, kind)?;
        let rows: Vec<DataRow> = match self.get_results(url).await {
            Ok(rows) => rows,
            Err(WeatherError::NoResults) => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut dates = FrostDates::new();
        for row in rows {
            let Some(key) = FrostDateKey::from_datatype_id(&row.datatype) else {
                continue;
            };
            if key.kind != kind {
                continue;
            }
            // Normals use negative sentinels for missing or suppressed values
            let date = (row.value.fract() == 0.0 && row.value >= 1.0)
                .then(|| ShortDate::from_day_of_year(row.value as u32))
                .flatten();
            match date {
                Some(date) => {
                    dates.insert(key, date);
                }
                None => tracing::debug!("Ignoring {} value {}", row.datatype, row.value),
            }
        }

        tracing::info!("Received {} frost dates for {}", dates.len(), station_id);
        Ok(dates)
    }
}

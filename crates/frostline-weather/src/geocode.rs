//! Postal code geocoding through the GeoNames `postalCodeSearchJSON` service.
//! Requires a registered GeoNames username.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;
use url::Url;

use crate::coords::LocationCoordinates;
use crate::http;
use crate::types::{PostalCode, WeatherError, ZipCacheEntry};

pub const GEONAMES_BASE_URL: &str = "https://secure.geonames.org";

#[derive(Debug, Deserialize)]
struct PostalCodeSearchResponse {
    #[serde(rename = "postalCodes", default)]
    postal_codes: Vec<PostalCodeRow>,
}

#[derive(Debug, Deserialize)]
struct PostalCodeRow {
    lat: Coordinate,
    lng: Coordinate,
    #[serde(rename = "placeName")]
    place_name: String,
    #[serde(rename = "ISO3166-2", default)]
    subdivision: String,
}

/// GeoNames reports coordinates as numbers or as strings depending on the endpoint
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Coordinate {
    Number(f64),
    Text(String),
}

impl Coordinate {
    fn into_text(self) -> String {
        match self {
            Coordinate::Number(n) => n.to_string(),
            Coordinate::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: ServiceStatus,
}

#[derive(Debug, Deserialize)]
struct ServiceStatus {
    value: i64,
    message: String,
}

fn service_error(body: &Value) -> Option<WeatherError> {
    let parsed = StatusBody::deserialize(body).ok()?;
    Some(WeatherError::Service {
        code: parsed.status.value,
        message: parsed.status.message,
    })
}

#[derive(Debug, Clone)]
pub struct GeoNamesClient {
    client: Client,
    username: String,
    base_url: String,
}

impl GeoNamesClient {
    pub fn new(username: &str) -> Result<Self, WeatherError> {
        Self::with_base_url(username, GEONAMES_BASE_URL)
    }

    pub fn with_base_url(username: &str, base_url: &str) -> Result<Self, WeatherError> {
        Ok(Self {
            client: http::build_client()?,
            username: username.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Query URL for one postal code, restricted to the US and a single row.
    pub fn lookup_url(&self, postal_code: &PostalCode) -> Result<Url, WeatherError> {
        Ok(Url::parse_with_params(
            &format!("{}/postalCodeSearchJSON", self.base_url),
            &[
                ("postalcode", postal_code.as_str()),
                ("country", "US"),
                ("maxRows", "1"),
                ("username", self.username.as_str()),
            ],
        )?)
    }

    /// Resolve a postal code to its coordinates and "Place, ST" label.
    #[instrument(skip(self, postal_code), fields(postal_code = %postal_code), level = "info")]
    pub async fn lookup(&self, postal_code: &PostalCode) -> Result<ZipCacheEntry, WeatherError> {
        let url = self.lookup_url(postal_code)?;
        let response = self.client.get(url).send().await?;
        let (status, body) = http::read_json(response).await?;

        if let Some(err) = service_error(&body) {
            tracing::debug!("GeoNames returned status {} with error body", status);
            return Err(err);
        }

        if !status.is_success() {
            return Err(WeatherError::Http {
                status: status.as_u16(),
                message: http::summarize(&body.to_string()),
            });
        }

        let parsed: PostalCodeSearchResponse = http::decode(body)?;
        let row = parsed
            .postal_codes
            .into_iter()
            .next()
            .ok_or_else(|| WeatherError::NotFound(postal_code.clone()))?;

        let latitude = row.lat.into_text();
        let longitude = row.lng.into_text();
        let location = LocationCoordinates::parse(&latitude, &longitude)
            .map_err(|e| WeatherError::Parse(e.to_string()))?;

        let city_label = if row.subdivision.is_empty() {
            row.place_name
        } else {
            format!("{}, {}", row.place_name, row.subdivision)
        };

        tracing::info!("Resolved {} to {} ({})", postal_code, city_label, location);

        Ok(ZipCacheEntry {
            postal_code: postal_code.clone(),
            location,
            city_label,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn zip(code: &str) -> PostalCode {
        PostalCode::parse(code).unwrap()
    }

    #[test]
    fn test_lookup_url() {
        let client = GeoNamesClient::with_base_url("demo", "https://example.org/").unwrap();
        let url = client.lookup_url(&zip("11742")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.org/postalCodeSearchJSON?postalcode=11742&country=US&maxRows=1&username=demo"
        );
    }

    #[tokio::test]
    async fn test_lookup_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/postalCodeSearchJSON"))
            .and(query_param("postalcode", "11742"))
            .and(query_param("country", "US"))
            .and(query_param("maxRows", "1"))
            .and(query_param("username", "demo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "postalCodes": [{
                    "lat": "40.8153762",
                    "lng": -73.0451085,
                    "placeName": "Holtsville",
                    "ISO3166-2": "NY",
                    "countryCode": "US"
                }]
            })))
            .mount(&mock_server)
            .await;

        let client = GeoNamesClient::with_base_url("demo", &mock_server.uri()).unwrap();
        let entry = client.lookup(&zip("11742")).await.unwrap();

        assert_eq!(entry.postal_code.as_str(), "11742");
        assert_eq!(entry.city_label, "Holtsville, NY");
        assert_eq!(entry.location.latitude(), 40.8153762);
        assert_eq!(entry.location.longitude(), -73.0451085);
    }

    #[tokio::test]
    async fn test_lookup_no_matches_is_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/postalCodeSearchJSON"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "postalCodes": [] })),
            )
            .mount(&mock_server)
            .await;

        let client = GeoNamesClient::with_base_url("demo", &mock_server.uri()).unwrap();
        let result = client.lookup(&zip("00000")).await;

        assert!(matches!(result, Err(WeatherError::NotFound(code)) if code.as_str() == "00000"));
    }

    #[tokio::test]
    async fn test_service_error_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/postalCodeSearchJSON"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "status": { "value": 10, "message": "user account not enabled to use the free webservice" }
            })))
            .mount(&mock_server)
            .await;

        let client = GeoNamesClient::with_base_url("demo", &mock_server.uri()).unwrap();
        let err = client.lookup(&zip("11742")).await.unwrap_err();

        match err {
            WeatherError::Service { code, message } => {
                assert_eq!(code, 10);
                assert!(message.contains("not enabled"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_service_error_with_ok_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/postalCodeSearchJSON"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": { "value": 19, "message": "the hourly limit has been exceeded" }
            })))
            .mount(&mock_server)
            .await;

        let client = GeoNamesClient::with_base_url("demo", &mock_server.uri()).unwrap();
        let err = client.lookup(&zip("11742")).await.unwrap_err();
        assert!(matches!(err, WeatherError::Service { code: 19, .. }));
    }

    #[tokio::test]
    async fn test_non_json_body_is_parse_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/postalCodeSearchJSON"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&mock_server)
            .await;

        let client = GeoNamesClient::with_base_url("demo", &mock_server.uri()).unwrap();
        let err = client.lookup(&zip("11742")).await.unwrap_err();
        assert!(matches!(err, WeatherError::Parse(_)));
    }

    #[tokio::test]
    async fn test_error_status_without_json_is_http_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/postalCodeSearchJSON"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .mount(&mock_server)
            .await;

        let client = GeoNamesClient::with_base_url("demo", &mock_server.uri()).unwrap();
        let err = client.lookup(&zip("11742")).await.unwrap_err();
        assert!(matches!(err, WeatherError::Http { status: 503, .. }));
    }
}

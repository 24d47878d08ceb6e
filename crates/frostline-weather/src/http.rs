//! Shared response handling for the remote lookup clients.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::types::WeatherError;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("Frostline/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client() -> Result<Client, WeatherError> {
    Ok(Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()?)
}

/// Read the body and parse it as JSON, keeping the status for the caller.
pub(crate) async fn read_json(response: Response) -> Result<(StatusCode, Value), WeatherError> {
    let status = response.status();
    let text = response.text().await?;

    match serde_json::from_str::<Value>(&text) {
        Ok(body) => Ok((status, body)),
        Err(e) if status.is_success() => Err(WeatherError::Parse(e.to_string())),
        Err(_) => Err(WeatherError::Http {
            status: status.as_u16(),
            message: summarize(&text),
        }),
    }
}

pub(crate) fn decode<T: DeserializeOwned>(body: Value) -> Result<T, WeatherError> {
    serde_json::from_value(body).map_err(|e| WeatherError::Parse(e.to_string()))
}

/// First line of a body, bounded, for error messages.
pub(crate) fn summarize(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    line.chars().take(200).collect()
}

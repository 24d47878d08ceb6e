//! Postal code resolution: cache first, GeoNames otherwise.
//!
//! The service never writes the cache itself. A successful lookup arrives as
//! a `ResultReady` event and the coordinating thread decides whether to
//! insert and persist it.

use std::sync::Arc;
use std::time::Duration;

use frostline_weather::{GeoNamesClient, PostalCode, ValidationError, WeatherError, ZipCache, ZipCacheEntry};
use tokio::runtime::Handle;

use crate::request::{AsyncRequestController, RequestHandle};

pub type GeocodeController = AsyncRequestController<PostalCode, ZipCacheEntry, WeatherError>;

/// How a postal code was resolved
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Served from the local cache without any request
    Cached(ZipCacheEntry),
    /// A GeoNames lookup was started; watch the controller for its outcome
    Pending(RequestHandle),
}

pub struct GeocodeService {
    controller: GeocodeController,
}

impl GeocodeService {
    pub fn new(runtime: Handle, client: GeoNamesClient) -> Self {
        let client = Arc::new(client);
        let controller = AsyncRequestController::new("geocode", runtime, move |postal_code: PostalCode| {
            let client = Arc::clone(&client);
            async move { client.lookup(&postal_code).await }
        });
        Self { controller }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.controller = self.controller.with_timeout(timeout);
        self
    }

    /// Resolve `input` against the cache, starting a lookup on a miss.
    ///
    /// Malformed postal codes are rejected before any request is made.
    pub fn resolve(&self, cache: &ZipCache, input: &str) -> Result<Resolution, ValidationError> {
        let postal_code = PostalCode::parse(input)?;

        if let Some(entry) = cache.get(&postal_code) {
            tracing::debug!("Postal code {} served from cache", postal_code);
            return Ok(Resolution::Cached(entry.clone()));
        }

        tracing::info!("Looking up postal code {}", postal_code);
        Ok(Resolution::Pending(self.controller.send(postal_code)))
    }

    pub fn cancel(&self, handle: RequestHandle) -> bool {
        self.controller.cancel(handle)
    }

    pub fn controller(&self) -> &GeocodeController {
        &self.controller
    }
}

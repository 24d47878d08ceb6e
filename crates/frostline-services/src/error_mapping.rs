//! Conversion of service errors into [`AppError`] for display.

use frostline_core::{AppError, CacheError as AppCacheError, LookupError, NetworkError, ReqwestErrorExt};
use frostline_weather::{CacheError, ValidationError, WeatherError};

use crate::request::{RequestError, RequestOutcome};

impl From<RequestError<WeatherError>> for AppError {
    fn from(e: RequestError<WeatherError>) -> Self {
        match e {
            RequestError::Worker(e) => weather_error(e),
            RequestError::Timeout(_) => AppError::Network(NetworkError::Timeout),
            RequestError::Panicked(msg) => AppError::Other(anyhow::anyhow!("request worker panicked: {}", msg)),
        }
    }
}

pub fn weather_error(e: WeatherError) -> AppError {
    match e {
        WeatherError::Network(e) => AppError::Network(e.into_network_error()),
        WeatherError::Http { status, message } => AppError::Network(NetworkError::ServerError { status, message }),
        WeatherError::Service { code, message } => {
            AppError::Lookup(LookupError::ServiceError(format!("{} (code {})", message, code)))
        }
        WeatherError::NotFound(code) => AppError::Lookup(LookupError::PostalCodeNotFound(code.to_string())),
        WeatherError::NoResults => AppError::Lookup(LookupError::NoResults),
        WeatherError::Parse(msg) => AppError::Network(NetworkError::InvalidResponse(msg)),
        WeatherError::Url(e) => AppError::InvalidInput(e.to_string()),
    }
}

pub fn validation_error(e: ValidationError) -> AppError {
    AppError::InvalidInput(e.to_string())
}

pub fn cache_error(e: CacheError) -> AppError {
    match e {
        CacheError::Io(e) => AppError::Io(e),
        CacheError::Format(msg) => AppError::Cache(AppCacheError::Malformed(msg)),
    }
}

/// Unwrap a finished request, mapping failure and cancellation to [`AppError`].
///
/// `None` comes from waiting on a handle whose events were already consumed.
pub fn into_app_result<R>(outcome: Option<RequestOutcome<R, WeatherError>>) -> Result<R, AppError> {
    match outcome {
        Some(RequestOutcome::Ready(result)) => Ok(result),
        Some(RequestOutcome::Failed(e)) => Err(e.into()),
        Some(RequestOutcome::Cancelled) => Err(AppError::Lookup(LookupError::Cancelled)),
        None => Err(AppError::Other(anyhow::anyhow!("request finished without an outcome"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frostline_weather::PostalCode;
    use std::time::Duration;

    #[test]
    fn not_found_maps_to_lookup_error() {
        let code = PostalCode::parse("00000").unwrap();
        let err: AppError = RequestError::Worker(WeatherError::NotFound(code)).into();
        assert!(matches!(err, AppError::Lookup(LookupError::PostalCodeNotFound(ref c)) if c == "00000"));
    }

    #[test]
    fn timeout_maps_to_network_timeout() {
        let err: AppError = RequestError::<WeatherError>::Timeout(Duration::from_secs(30)).into();
        assert!(matches!(err, AppError::Network(NetworkError::Timeout)));
    }

    #[test]
    fn service_error_keeps_message() {
        let err = weather_error(WeatherError::Service {
            code: 10,
            message: "user does not exist".into(),
        });
        assert!(err.to_string().contains("user does not exist"));
        assert!(matches!(err, AppError::Lookup(LookupError::ServiceError(_))));
    }

    #[test]
    fn cache_format_maps_to_malformed() {
        let err = cache_error(CacheError::Format("line 3: bad".into()));
        assert!(matches!(err, AppError::Cache(AppCacheError::Malformed(_))));
    }

    #[test]
    fn cancelled_outcome_is_lookup_cancelled() {
        let result = into_app_result::<u32>(Some(RequestOutcome::Cancelled));
        assert!(matches!(result, Err(AppError::Lookup(LookupError::Cancelled))));
        assert_eq!(into_app_result::<u32>(Some(RequestOutcome::Ready(7))).unwrap(), 7);
    }

    #[test]
    fn missing_outcome_is_an_error() {
        let result = into_app_result::<u32>(None);
        assert!(matches!(result, Err(AppError::Other(_))));
    }
}

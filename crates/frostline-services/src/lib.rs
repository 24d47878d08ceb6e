//! Request orchestration for Frostline
//!
//! Every remote lookup runs on the shared tokio runtime through an
//! [`AsyncRequestController`]; outcomes are delivered as events to the
//! thread that owns the application state.

pub mod error_mapping;
pub mod geocode_service;
pub mod request;
pub mod runtime;
pub mod station_service;

pub use geocode_service::{GeocodeController, GeocodeService, Resolution};
pub use request::{AsyncRequestController, RequestError, RequestEvent, RequestHandle, RequestOutcome, WorkerFuture};
pub use runtime::get_or_init_runtime;
pub use station_service::{
    sort_by_distance, FrostDateController, FrostDateQuery, FrostDateReport, StationController, StationQuery,
    StationService,
};

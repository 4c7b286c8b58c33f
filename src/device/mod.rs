//! Remote device client — the climate unit's state API.
//!
//! [`DeviceClient`] is the seam between the orchestrator's actions and
//! the network. Every call is a single request/response; retries are
//! the orchestrator's job, not the client's.

pub mod rest;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use rest::{DeviceConfig, RestDevice};

/// Device client errors. All are treated as transient by the
/// orchestrator's retry policy.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("device returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Current state of the unit as reported by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub power: bool,
    pub target_temperature: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// Partial state update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_temperature: Option<i32>,
}

/// Request/response access to one climate unit.
///
/// `Send + Sync` because actions run on the orchestrator task and the
/// status action issues two reads concurrently.
pub trait DeviceClient: Send + Sync {
    fn read_state(&self) -> BoxFuture<'_, Result<DeviceState, DeviceError>>;

    fn mutate_state(&self, patch: StatePatch) -> BoxFuture<'_, Result<(), DeviceError>>;

    /// Room temperature in degrees Celsius.
    fn read_room_temperature(&self) -> BoxFuture<'_, Result<f64, DeviceError>>;

    fn set_power(&self, on: bool) -> BoxFuture<'_, Result<(), DeviceError>>;
}

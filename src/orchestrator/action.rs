//! Actions — one remote effect per dispatched command.

use std::fmt;

use uuid::Uuid;

use crate::device::{DeviceClient, DeviceError, DeviceState, StatePatch};

/// The remote operation an [`Action`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    SetTemperature(u8),
    /// Read the power state, then set it to the opposite.
    TogglePower,
    PowerOn,
    PowerOff,
    /// Read unit state and room temperature concurrently.
    ReadStatus,
}

impl ActionKind {
    /// Short operation name for logs and failure announcements.
    pub fn label(self) -> &'static str {
        match self {
            Self::SetTemperature(_) => "set temperature",
            Self::TogglePower => "toggle power",
            Self::PowerOn => "power on",
            Self::PowerOff => "power off",
            Self::ReadStatus => "read status",
        }
    }
}

/// A single remote effect with a stable identifier.
///
/// The identifier is shared by every retry of the same action so the
/// attempts can be correlated in logs.
#[derive(Debug, Clone, Copy)]
pub struct Action {
    pub id: Uuid,
    pub kind: ActionKind,
}

/// What a successful action produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    TemperatureSet(u8),
    Power(bool),
    Status { state: DeviceState, room: f64 },
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
        }
    }

    /// Perform one attempt against the device.
    pub async fn execute(&self, device: &dyn DeviceClient) -> Result<ActionOutput, DeviceError> {
        tracing::debug!(action = %self, "executing");
        match self.kind {
            ActionKind::SetTemperature(value) => {
                device
                    .mutate_state(StatePatch {
                        target_temperature: Some(i32::from(value)),
                        ..Default::default()
                    })
                    .await?;
                Ok(ActionOutput::TemperatureSet(value))
            }
            ActionKind::TogglePower => {
                let state = device.read_state().await?;
                let on = !state.power;
                device.set_power(on).await?;
                Ok(ActionOutput::Power(on))
            }
            ActionKind::PowerOn => {
                device.set_power(true).await?;
                Ok(ActionOutput::Power(true))
            }
            ActionKind::PowerOff => {
                device.set_power(false).await?;
                Ok(ActionOutput::Power(false))
            }
            ActionKind::ReadStatus => {
                // Both reads must succeed; either failure fails the action.
                let (state, room) =
                    tokio::try_join!(device.read_state(), device.read_room_temperature())?;
                Ok(ActionOutput::Status { state, room })
            }
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.kind.label(), self.id)
    }
}

impl ActionOutput {
    /// Text announced to the user on success.
    pub fn announcement(&self) -> String {
        match self {
            Self::TemperatureSet(value) => format!("Temperature set to {value} degrees"),
            Self::Power(true) => "Air conditioner on".to_string(),
            Self::Power(false) => "Air conditioner off".to_string(),
            Self::Status { state, room } => format!(
                "Air conditioner is {}, set to {} degrees. Room temperature is {room:.1} degrees",
                if state.power { "on" } else { "off" },
                state.target_temperature,
            ),
        }
    }
}

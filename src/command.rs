//! Semantic commands — the decoder's output alphabet and the
//! orchestrator's input.

use std::fmt;

/// A decoded user intent.
///
/// `SetTemperature` carries the raw two-digit value as typed. Range
/// checking against the configured bounds happens in the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Flip the unit's power state.
    ToggleOrNot,
    /// Set the target temperature (two decimal digits, 0–99).
    SetTemperature(u8),
    /// Announce the current target and room temperature.
    VoiceStatus,
    PowerOn,
    PowerOff,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToggleOrNot => f.write_str("toggle"),
            Self::SetTemperature(n) => write!(f, "set-temperature({n})"),
            Self::VoiceStatus => f.write_str("voice-status"),
            Self::PowerOn => f.write_str("power-on"),
            Self::PowerOff => f.write_str("power-off"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_stable_for_logs() {
        assert_eq!(Command::ToggleOrNot.to_string(), "toggle");
        assert_eq!(Command::SetTemperature(7).to_string(), "set-temperature(7)");
        assert_eq!(Command::PowerOff.to_string(), "power-off");
    }
}

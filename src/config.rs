//! Startup configuration — parsed CLI/env arguments → validated runtime settings.

use std::sync::Arc;
use std::time::Duration;

use crate::cli::{DeviceArgs, KeyArgs, PolicyArgs, SpeechArgs};
use crate::device::{DeviceConfig, DeviceError, RestDevice};
use crate::feedback::{SpeechConfig, SpeechSink};
use crate::hotkey::HotkeyError;
use crate::hotkey::keybinding::HotkeyTable;
use crate::orchestrator::retry::RetryPolicy;
use crate::orchestrator::{Orchestrator, TempBounds};

/// Highest temperature expressible with two keypad digits.
const MAX_ENTERABLE_TEMP: u8 = 99;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("retry attempts must be at least 1")]
    NoAttempts,
    #[error("retry base delay {base:?} exceeds max delay {max:?}")]
    DelayOrder { base: Duration, max: Duration },
    #[error("minimum temperature {min} exceeds maximum {max}")]
    BoundsOrder { min: u8, max: u8 },
    #[error("temperature bound {0} is outside 0..=99")]
    BoundOutOfRange(u8),
    #[error("api url {0:?} must start with http:// or https://")]
    ApiUrl(String),
    #[error(transparent)]
    Binding(#[from] HotkeyError),
    #[error("device client: {0}")]
    Device(#[from] DeviceError),
}

pub fn retry_policy(args: &PolicyArgs) -> Result<RetryPolicy, ConfigError> {
    if args.retry_attempts == 0 {
        return Err(ConfigError::NoAttempts);
    }
    let base = Duration::from_millis(args.retry_base_ms);
    let max = Duration::from_millis(args.retry_max_ms);
    if base > max {
        return Err(ConfigError::DelayOrder { base, max });
    }
    Ok(RetryPolicy {
        max_attempts: args.retry_attempts,
        base_delay: base,
        max_delay: max,
        jitter: Duration::from_millis(args.retry_jitter_ms),
    })
}

pub fn temp_bounds(args: &PolicyArgs) -> Result<TempBounds, ConfigError> {
    for bound in [args.min_temp, args.max_temp] {
        if bound > MAX_ENTERABLE_TEMP {
            return Err(ConfigError::BoundOutOfRange(bound));
        }
    }
    if args.min_temp > args.max_temp {
        return Err(ConfigError::BoundsOrder {
            min: args.min_temp,
            max: args.max_temp,
        });
    }
    Ok(TempBounds {
        min: args.min_temp,
        max: args.max_temp,
    })
}

pub fn device_config(args: &DeviceArgs) -> Result<DeviceConfig, ConfigError> {
    let url = args.api_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::ApiUrl(args.api_url.clone()));
    }
    Ok(DeviceConfig {
        api_url: url.to_string(),
        token: args.api_token.clone().filter(|t| !t.is_empty()),
        timeout: Duration::from_secs(args.http_timeout_secs),
    })
}

pub fn speech_config(args: &SpeechArgs) -> SpeechConfig {
    SpeechConfig {
        program: args.tts_program.clone(),
        args: args
            .tts_args
            .iter()
            .filter(|a| !a.is_empty())
            .cloned()
            .collect(),
        timeout: Duration::from_secs(args.tts_timeout_secs),
    }
}

pub fn hotkey_table(args: &KeyArgs) -> Result<HotkeyTable, ConfigError> {
    Ok(HotkeyTable::from_specs(
        &args.toggle_key,
        &args.status_key,
        &args.power_on_key,
        &args.power_off_key,
    )?)
}

/// Build an orchestrator wired to the REST device and speech feedback.
pub fn orchestrator(
    device: &DeviceArgs,
    policy: &PolicyArgs,
    speech: &SpeechArgs,
) -> Result<Orchestrator, ConfigError> {
    let retry = retry_policy(policy)?;
    let bounds = temp_bounds(policy)?;
    let client = RestDevice::new(&device_config(device)?)?;
    let sink = SpeechSink::new(speech_config(speech));

    tracing::debug!(?retry, ?bounds, api = %device.api_url, "configuration loaded");

    Ok(Orchestrator::new(
        Arc::new(client),
        Arc::new(sink),
        retry,
        bounds,
    ))
}

//! Tunable parameters for the turret.
//!
//! Defaults reproduce the reference firmware: `;`-terminated commands, a
//! 30 ms control tick, a 1000–2000 µs servo sweep and `40,<reading>`
//! telemetry every 200 ms. A JSON file with any subset of sections can
//! override them.

use crate::sensor::{Calibration, DetectionRule};
use crate::turret::MAX_ENVELOPE_SEGMENTS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SentryConfig {
    pub protocol: ProtocolConfig,
    pub turret: TurretConfig,
    pub alarm: AlarmConfig,
    pub sensor: SensorConfig,
    pub telemetry: TelemetryConfig,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Byte that ends an inbound command line.
    pub terminator: char,
    /// Appended to every outbound line.
    pub line_ending: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            terminator: ';',
            line_ending: "\r\n".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurretConfig {
    /// Lower sweep bound (servo pulse, µs).
    pub min_position: u16,
    /// Upper sweep bound (servo pulse, µs).
    pub max_position: u16,
    /// Position at power-on.
    pub home_position: u16,
    /// Sweep advance per scanning tick.
    pub sweep_step: u16,
    /// Escalated sweep advance as a multiple of `sweep_step`.
    pub escalated_step_multiplier: u16,
    /// Escalation counter resets once it exceeds this value.
    pub escalation_ceiling: u32,
}

impl Default for TurretConfig {
    fn default() -> Self {
        Self {
            min_position: 1000,
            max_position: 2000,
            home_position: 1000,
            sweep_step: 1,
            escalated_step_multiplier: 20,
            escalation_ceiling: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    pub test_frequency_hz: u16,
    pub test_duration_ms: u32,
    pub detect_frequency_hz: u16,
    /// Audible part of each detecting tick; the rest of the tick is silent.
    pub detect_on_ms: u16,
    pub escalated_frequency_hz: u16,
    pub escalated_on_ms: u16,
    /// One escalated chirp starts every period within a tick.
    pub escalated_pulse_period_ms: u16,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            test_frequency_hz: 1000,
            test_duration_ms: 200,
            detect_frequency_hz: 1000,
            detect_on_ms: 15,
            escalated_frequency_hz: 2000,
            escalated_on_ms: 5,
            escalated_pulse_period_ms: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// `None` reports raw ADC counts.
    pub calibration: Option<Calibration>,
    pub detection: DetectionRule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub channel: i32,
    /// `None` emits once per control tick.
    pub interval_ms: Option<u32>,
    /// Optional trailing delimiter, e.g. `;` for stricter hosts.
    pub delimiter: Option<char>,
    /// Value reported while the sensor is out of range.
    pub out_of_range_value: i32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: 40,
            interval_ms: Some(200),
            delimiter: None,
            out_of_range_value: -1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub tick_period_ms: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self { tick_period_ms: 30 }
    }
}

impl SentryConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SentryConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let turret = &self.turret;
        if turret.min_position >= turret.max_position {
            return Err(ConfigError::Invalid("min_position must be below max_position"));
        }
        if turret.home_position < turret.min_position || turret.home_position > turret.max_position {
            return Err(ConfigError::Invalid("home_position outside sweep bounds"));
        }
        if turret.sweep_step == 0 || turret.escalated_step_multiplier == 0 {
            return Err(ConfigError::Invalid("sweep steps must be non-zero"));
        }

        if !self.protocol.terminator.is_ascii() || self.protocol.terminator == ',' {
            return Err(ConfigError::Invalid("terminator must be an ASCII byte other than ','"));
        }

        let tick = self.timing.tick_period_ms;
        if tick == 0 {
            return Err(ConfigError::Invalid("tick_period_ms must be non-zero"));
        }

        let alarm = &self.alarm;
        if alarm.test_duration_ms == 0 {
            return Err(ConfigError::Invalid("test_duration_ms must be non-zero"));
        }
        if alarm.detect_on_ms == 0 || u32::from(alarm.detect_on_ms) > tick {
            return Err(ConfigError::Invalid("detect_on_ms must fit within one tick"));
        }
        if alarm.escalated_pulse_period_ms == 0
            || alarm.escalated_on_ms == 0
            || alarm.escalated_on_ms > alarm.escalated_pulse_period_ms
        {
            return Err(ConfigError::Invalid("escalated chirp must fit within its pulse period"));
        }
        let pulses = tick.div_ceil(u32::from(alarm.escalated_pulse_period_ms)) as usize;
        if pulses * 2 > MAX_ENVELOPE_SEGMENTS {
            return Err(ConfigError::Invalid("escalated pattern has too many chirps per tick"));
        }

        match (&self.sensor.calibration, &self.sensor.detection) {
            (None, DetectionRule::Below(_)) => {
                return Err(ConfigError::Invalid("raw readings need an Above detection rule"));
            }
            (Some(_), DetectionRule::Above(_)) => {
                return Err(ConfigError::Invalid("calibrated distances need a Below detection rule"));
            }
            (Some(calibration), _) => {
                if calibration.adc_max == 0 || calibration.reference_voltage <= 0.0 {
                    return Err(ConfigError::Invalid("calibration needs a positive full scale"));
                }
            }
            (None, DetectionRule::Above(_)) => {}
        }

        if let Some(0) = self.telemetry.interval_ms {
            return Err(ConfigError::Invalid("telemetry interval_ms must be non-zero"));
        }

        Ok(())
    }
}

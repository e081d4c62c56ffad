//! Proximity sensor sampling and calibration.
//!
//! The sampler turns one ADC conversion into a [`SensorReading`]. Without a
//! calibration the raw ADC count is reported as-is (higher means closer for
//! the reflective IR sensors the turret ships with). With a calibration the
//! count is converted to a voltage and then to a distance with the reciprocal
//! curve `distance = k / (voltage - offset)`.
//!
//! Detection thresholds are expressed in the same unit the sampler reports,
//! see [`DetectionRule`].

use crate::config::SensorConfig;
use crate::hardware::{AnalogInput, PinRole};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorReading {
    Value(i32),
    OutOfRange,
}

impl SensorReading {
    pub fn value(&self) -> Option<i32> {
        match self {
            SensorReading::Value(v) => Some(*v),
            SensorReading::OutOfRange => None,
        }
    }

    pub fn is_out_of_range(&self) -> bool {
        matches!(self, SensorReading::OutOfRange)
    }
}

/// Voltage-to-distance conversion for analog rangefinders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Full-scale ADC count.
    pub adc_max: u16,
    /// Voltage at full scale.
    pub reference_voltage: f32,
    /// Numerator of the reciprocal curve, in distance units times volts.
    pub k: f32,
    /// Voltage offset subtracted before the reciprocal.
    pub offset: f32,
    /// Readings at or below this voltage are reported as out of range.
    pub min_valid_voltage: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            adc_max: 1023,
            reference_voltage: 5.0,
            k: 27.86,
            offset: 0.42,
            min_valid_voltage: 0.42,
        }
    }
}

impl Calibration {
    pub fn voltage(&self, raw: u16) -> f32 {
        f32::from(raw.min(self.adc_max)) * self.reference_voltage / f32::from(self.adc_max)
    }

    pub fn convert(&self, raw: u16) -> SensorReading {
        let voltage = self.voltage(raw);

        // The offset guard keeps a misconfigured min_valid_voltage from dividing by <= 0.
        if voltage <= self.min_valid_voltage || voltage <= self.offset {
            return SensorReading::OutOfRange;
        }

        let distance = self.k / (voltage - self.offset);
        if !distance.is_finite() || distance > i32::MAX as f32 {
            return SensorReading::OutOfRange;
        }

        SensorReading::Value(distance.round() as i32)
    }
}

/// When a reading counts as an intruder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionRule {
    /// Detected when the reading is strictly greater (raw intensity).
    Above(i32),
    /// Detected when the reading is strictly smaller (calibrated distance).
    Below(i32),
}

impl DetectionRule {
    pub fn is_detection(&self, reading: SensorReading) -> bool {
        match (self, reading) {
            (_, SensorReading::OutOfRange) => false,
            (DetectionRule::Above(threshold), SensorReading::Value(v)) => v > *threshold,
            (DetectionRule::Below(threshold), SensorReading::Value(v)) => v < *threshold,
        }
    }
}

impl Default for DetectionRule {
    fn default() -> Self {
        DetectionRule::Above(300)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SamplerStats {
    pub samples: u32,
    pub out_of_range: u32,
    pub read_errors: u32,
}

#[derive(Debug)]
pub struct SensorSampler<A> {
    adc: A,
    pin: PinRole,
    calibration: Option<Calibration>,
    stats: SamplerStats,
}

impl<A: AnalogInput> SensorSampler<A> {
    pub fn new(adc: A, config: &SensorConfig) -> Self {
        Self {
            adc,
            pin: PinRole::Sensor,
            calibration: config.calibration,
            stats: SamplerStats::default(),
        }
    }

    /// Take one reading. ADC faults degrade to `OutOfRange`.
    pub fn sample(&mut self) -> SensorReading {
        self.stats.samples = self.stats.samples.wrapping_add(1);

        let reading = match nb::block!(self.adc.read_analog(self.pin)) {
            Ok(raw) => {
                let reading = self.convert(raw);
                trace!(raw, ?reading, "sensor sample");
                reading
            }
            Err(e) => {
                self.stats.read_errors = self.stats.read_errors.saturating_add(1);
                warn!(error = ?e, "sensor read failed, treating as out of range");
                SensorReading::OutOfRange
            }
        };

        if reading.is_out_of_range() {
            self.stats.out_of_range = self.stats.out_of_range.saturating_add(1);
        }
        reading
    }

    pub fn convert(&self, raw: u16) -> SensorReading {
        match &self.calibration {
            Some(calibration) => calibration.convert(raw),
            None => SensorReading::Value(i32::from(raw)),
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    pub fn get_stats(&self) -> &SamplerStats {
        &self.stats
    }
}

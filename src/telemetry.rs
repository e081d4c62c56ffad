//! Periodic `<channel>,<reading>` reports to the host.

use crate::config::TelemetryConfig;
use crate::protocol::{ProtocolError, ProtocolHandler};
use crate::sensor::SensorReading;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelemetryStats {
    pub reports_sent: u32,
    pub out_of_range_reports: u32,
    pub last_report_ms: Option<u64>,
}

#[derive(Debug)]
pub struct TelemetryReporter {
    config: TelemetryConfig,
    last_emit: Option<u64>,
    stats: TelemetryStats,
}

impl TelemetryReporter {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            last_emit: None,
            stats: TelemetryStats::default(),
        }
    }

    /// Whether a report is due at `now`. `ticked` is true when a control tick
    /// ran during this poll; it drives per-tick reporting.
    pub fn is_due(&self, now: u64, ticked: bool) -> bool {
        if !self.config.enabled {
            return false;
        }
        match (self.config.interval_ms, self.last_emit) {
            (None, _) => ticked,
            (Some(_), None) => true,
            (Some(interval), Some(last)) => now.saturating_sub(last) >= u64::from(interval),
        }
    }

    pub fn value_for(&self, reading: SensorReading) -> i32 {
        reading.value().unwrap_or(self.config.out_of_range_value)
    }

    /// Formats one report and marks it as sent at `now`.
    pub fn render<'a>(
        &mut self,
        protocol: &'a mut ProtocolHandler,
        reading: SensorReading,
        now: u64,
    ) -> Result<&'a str, ProtocolError> {
        let value = self.value_for(reading);
        let line = protocol.format_channel_value(self.config.channel, value, self.config.delimiter)?;

        self.last_emit = Some(now);
        self.stats.reports_sent = self.stats.reports_sent.wrapping_add(1);
        self.stats.last_report_ms = Some(now);
        if reading.is_out_of_range() {
            self.stats.out_of_range_reports = self.stats.out_of_range_reports.wrapping_add(1);
        }
        Ok(line)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn get_stats(&self) -> &TelemetryStats {
        &self.stats
    }
}

//! Turret behaviour state machine.
//!
//! Every control tick the machine looks at one [`SensorReading`], picks a
//! [`Mode`] and returns the outputs for that tick as [`ActuatorCommands`]:
//!
//! | signal       | escalation counter | mode       |
//! |--------------|--------------------|------------|
//! | detected     | any                | Detecting  |
//! | not detected | > 0                | Escalated  |
//! | not detected | 0                  | Scanning   |
//!
//! The counter grows while an intruder is seen and keeps the alert going
//! for a cool-down tail after the signal clears. Escalated ticks keep
//! counting and reset it to zero once it passes the ceiling, which drops the
//! next tick back into Scanning.
//!
//! The tone pattern of a tick is returned as a [`ToneEnvelope`] of timed
//! segments instead of being played with blocking delays.

use crate::config::{AlarmConfig, TurretConfig};
use crate::sensor::{DetectionRule, SensorReading};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

pub const MAX_ENVELOPE_SEGMENTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Scanning,
    Detecting,
    Escalated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepDirection {
    Forward,
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurretState {
    pub servo_position: u16,
    pub sweep_direction: SweepDirection,
    pub mode: Mode,
    pub escalation_counter: u32,
}

impl TurretState {
    pub fn new(home_position: u16) -> Self {
        Self {
            servo_position: home_position,
            sweep_direction: SweepDirection::Forward,
            mode: Mode::Scanning,
            escalation_counter: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmAction {
    Sound { frequency_hz: u16, duration_ms: u32 },
    Silence,
}

/// One alarm action, `offset_ms` after the start of the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneSegment {
    pub offset_ms: u32,
    pub action: AlarmAction,
}

pub type ToneEnvelope = Vec<ToneSegment, MAX_ENVELOPE_SEGMENTS>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmPlan {
    Silent,
    Pattern(ToneEnvelope),
}

/// Outputs for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorCommands {
    pub mode: Mode,
    pub light: bool,
    pub servo_position: u16,
    pub alarm: AlarmPlan,
}

/// Mode for the coming tick.
pub fn next_mode(detected: bool, escalation_counter: u32) -> Mode {
    if detected {
        Mode::Detecting
    } else if escalation_counter > 0 {
        Mode::Escalated
    } else {
        Mode::Scanning
    }
}

#[derive(Debug)]
pub struct TurretMachine {
    state: TurretState,
    turret: TurretConfig,
    alarm: AlarmConfig,
    detection: DetectionRule,
    tick_period_ms: u32,
    ticks: u64,
}

impl TurretMachine {
    pub fn new(turret: TurretConfig, alarm: AlarmConfig, detection: DetectionRule, tick_period_ms: u32) -> Self {
        Self {
            state: TurretState::new(turret.home_position),
            turret,
            alarm,
            detection,
            tick_period_ms,
            ticks: 0,
        }
    }

    pub fn state(&self) -> &TurretState {
        &self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Replaces the machine state, keeping the position within bounds.
    pub fn restore(&mut self, state: TurretState) {
        self.state = state;
        self.settle(i32::from(state.servo_position));
    }

    pub fn tick(&mut self, reading: SensorReading) -> ActuatorCommands {
        let detected = self.detection.is_detection(reading);
        let mode = next_mode(detected, self.state.escalation_counter);

        if mode != self.state.mode {
            debug!(from = ?self.state.mode, to = ?mode, counter = self.state.escalation_counter, "turret mode change");
        }
        self.state.mode = mode;
        self.ticks = self.ticks.wrapping_add(1);

        let alarm = match mode {
            Mode::Scanning => {
                self.advance(self.turret.sweep_step);
                AlarmPlan::Silent
            }
            Mode::Detecting => {
                self.settle(i32::from(self.state.servo_position));
                // Bounded so a long detection cannot grow the counter without limit.
                self.state.escalation_counter = self
                    .state
                    .escalation_counter
                    .saturating_add(1)
                    .min(self.turret.escalation_ceiling.saturating_add(1));
                AlarmPlan::Pattern(self.detect_envelope())
            }
            Mode::Escalated => {
                let step = self.turret.sweep_step.saturating_mul(self.turret.escalated_step_multiplier);
                self.advance(step);
                self.state.escalation_counter = self.state.escalation_counter.saturating_add(1);
                if self.state.escalation_counter > self.turret.escalation_ceiling {
                    self.state.escalation_counter = 0;
                }
                AlarmPlan::Pattern(self.escalated_envelope())
            }
        };

        trace!(
            ?reading,
            ?mode,
            position = self.state.servo_position,
            counter = self.state.escalation_counter,
            "turret tick"
        );

        ActuatorCommands {
            mode,
            light: mode != Mode::Scanning,
            servo_position: self.state.servo_position,
            alarm,
        }
    }

    fn advance(&mut self, step: u16) {
        let delta = match self.state.sweep_direction {
            SweepDirection::Forward => i32::from(step),
            SweepDirection::Reverse => -i32::from(step),
        };
        self.settle(i32::from(self.state.servo_position) + delta);
    }

    /// Clamps into bounds and reverses at (or past) either bound.
    fn settle(&mut self, candidate: i32) {
        let min = i32::from(self.turret.min_position);
        let max = i32::from(self.turret.max_position);

        if candidate >= max {
            self.state.servo_position = self.turret.max_position;
            self.state.sweep_direction = SweepDirection::Reverse;
        } else if candidate <= min {
            self.state.servo_position = self.turret.min_position;
            self.state.sweep_direction = SweepDirection::Forward;
        } else {
            self.state.servo_position = candidate as u16;
        }
    }

    fn detect_envelope(&self) -> ToneEnvelope {
        let mut envelope = ToneEnvelope::new();
        let on_ms = u32::from(self.alarm.detect_on_ms);
        let _ = envelope.push(ToneSegment {
            offset_ms: 0,
            action: AlarmAction::Sound {
                frequency_hz: self.alarm.detect_frequency_hz,
                duration_ms: on_ms,
            },
        });
        if on_ms < self.tick_period_ms {
            let _ = envelope.push(ToneSegment {
                offset_ms: on_ms,
                action: AlarmAction::Silence,
            });
        }
        envelope
    }

    fn escalated_envelope(&self) -> ToneEnvelope {
        let mut envelope = ToneEnvelope::new();
        let period = u32::from(self.alarm.escalated_pulse_period_ms).max(1);
        let on_ms = u32::from(self.alarm.escalated_on_ms);

        let mut offset = 0;
        while offset < self.tick_period_ms {
            let sound = ToneSegment {
                offset_ms: offset,
                action: AlarmAction::Sound {
                    frequency_hz: self.alarm.escalated_frequency_hz,
                    duration_ms: on_ms,
                },
            };
            let silence = ToneSegment {
                offset_ms: offset + on_ms,
                action: AlarmAction::Silence,
            };
            // Config validation guarantees the pattern fits.
            if envelope.push(sound).is_err() || envelope.push(silence).is_err() {
                break;
            }
            offset += period;
        }
        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> TurretMachine {
        TurretMachine::new(
            TurretConfig::default(),
            AlarmConfig::default(),
            DetectionRule::Above(300),
            30,
        )
    }

    const CLEAR: SensorReading = SensorReading::Value(100);
    const INTRUDER: SensorReading = SensorReading::Value(500);

    #[test]
    fn test_transition_table() {
        assert_eq!(next_mode(true, 0), Mode::Detecting);
        assert_eq!(next_mode(true, 7), Mode::Detecting);
        assert_eq!(next_mode(false, 3), Mode::Escalated);
        assert_eq!(next_mode(false, 0), Mode::Scanning);
    }

    #[test]
    fn test_scanning_advances_one_step() {
        let mut turret = machine();
        let commands = turret.tick(CLEAR);
        assert_eq!(commands.mode, Mode::Scanning);
        assert!(!commands.light);
        assert_eq!(commands.alarm, AlarmPlan::Silent);
        assert_eq!(commands.servo_position, 1001);
        assert_eq!(turret.state().escalation_counter, 0);
    }

    #[test]
    fn test_detecting_holds_position_and_counts() {
        let mut turret = machine();
        turret.tick(CLEAR);
        let commands = turret.tick(INTRUDER);
        assert_eq!(commands.mode, Mode::Detecting);
        assert!(commands.light);
        assert_eq!(commands.servo_position, 1001);
        assert_eq!(turret.state().escalation_counter, 1);

        match commands.alarm {
            AlarmPlan::Pattern(envelope) => {
                assert_eq!(envelope.len(), 2);
                assert_eq!(envelope[1].action, AlarmAction::Silence);
                assert_eq!(envelope[1].offset_ms, 15);
            }
            AlarmPlan::Silent => panic!("detecting tick must sound"),
        }
    }

    #[test]
    fn test_escalated_sweeps_twenty_steps() {
        let mut turret = machine();
        turret.tick(INTRUDER);
        let start = turret.state().servo_position;
        let commands = turret.tick(CLEAR);
        assert_eq!(commands.mode, Mode::Escalated);
        assert_eq!(commands.servo_position, start + 20);
        assert_eq!(turret.state().escalation_counter, 2);

        match commands.alarm {
            AlarmPlan::Pattern(envelope) => assert_eq!(envelope.len(), 6),
            AlarmPlan::Silent => panic!("escalated tick must sound"),
        }
    }

    #[test]
    fn test_out_of_range_is_not_detection() {
        let mut turret = machine();
        let commands = turret.tick(SensorReading::OutOfRange);
        assert_eq!(commands.mode, Mode::Scanning);
    }

    #[test]
    fn test_reversal_at_upper_bound() {
        let mut turret = machine();
        turret.restore(TurretState {
            servo_position: 1999,
            sweep_direction: SweepDirection::Forward,
            mode: Mode::Scanning,
            escalation_counter: 0,
        });

        turret.tick(CLEAR);
        assert_eq!(turret.state().servo_position, 2000);
        assert_eq!(turret.state().sweep_direction, SweepDirection::Reverse);

        turret.tick(CLEAR);
        assert_eq!(turret.state().servo_position, 1999);
    }

    #[test]
    fn test_escalated_overshoot_is_clamped() {
        let mut turret = machine();
        turret.restore(TurretState {
            servo_position: 1990,
            sweep_direction: SweepDirection::Forward,
            mode: Mode::Detecting,
            escalation_counter: 1,
        });

        let commands = turret.tick(CLEAR);
        assert_eq!(commands.servo_position, 2000);
        assert_eq!(turret.state().sweep_direction, SweepDirection::Reverse);
    }
}

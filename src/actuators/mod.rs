pub mod alarm;
pub mod light;
pub mod servo;

pub use alarm::{AlarmBuzzer, AlarmCommand, AlarmState};
pub use light::{LightCommand, LightState, WarningLight};
pub use servo::{ServoChannel, ServoCommand, ServoState};

use crate::config::TurretConfig;
use crate::hardware::{OutputPins, PinRole};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ActuatorError {
    #[error("servo position {requested} outside {min}..={max}")]
    OutOfBounds { requested: i32, min: u16, max: u16 },
}

/// Capabilities shared by the command path and the control path.
pub trait ActuatorFacade {
    fn set_light(&mut self, on: bool);

    fn sound_alarm(&mut self, frequency_hz: u16, duration_ms: u32);

    fn silence_alarm(&mut self);

    /// Moves the servo, clamping into bounds. Returns the commanded position.
    fn set_servo(&mut self, position: i32) -> u16;
}

/// A single output device model.
pub trait Actuator {
    type State: Clone + Serialize;
    type Command: Clone;

    fn execute_command(&mut self, command: Self::Command) -> Result<(), ActuatorError>;
    fn get_state(&self) -> Self::State;
    fn reset(&mut self);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorSnapshot {
    pub light: LightState,
    pub alarm: AlarmState,
    pub servo: ServoState,
}

/// The turret's three outputs, bound to a set of pins.
///
/// Light and servo writes only reach the pins when the value changes.
#[derive(Debug)]
pub struct ActuatorBank<P> {
    pins: P,
    light: WarningLight,
    alarm: AlarmBuzzer,
    servo: ServoChannel,
}

impl<P: OutputPins> ActuatorBank<P> {
    pub fn new(pins: P, turret: &TurretConfig) -> Self {
        Self {
            pins,
            light: WarningLight::new(),
            alarm: AlarmBuzzer::new(),
            servo: ServoChannel::new(turret.min_position, turret.max_position, turret.home_position),
        }
    }

    /// Drives every output to its modelled state, changed or not.
    pub fn initialize(&mut self) {
        let light = self.light.get_state();
        let servo = self.servo.get_state();
        self.pins.set_digital_output(PinRole::Light, light.on);
        self.pins.stop_tone(PinRole::Buzzer);
        self.pins.set_servo_position(servo.position);
    }

    /// Light off and buzzer stopped. The servo keeps its position.
    pub fn all_off(&mut self) {
        self.light.reset();
        self.alarm.reset();
        self.pins.set_digital_output(PinRole::Light, false);
        self.pins.stop_tone(PinRole::Buzzer);
    }

    /// Strict servo move for positions that must already be within bounds.
    pub fn move_servo_exact(&mut self, position: u16) -> Result<(), ActuatorError> {
        let previous = self.servo.position();
        self.servo.execute_command(ServoCommand::MoveExact(i32::from(position)))?;
        if position != previous {
            self.pins.set_servo_position(position);
        }
        Ok(())
    }

    pub fn snapshot(&self) -> ActuatorSnapshot {
        ActuatorSnapshot {
            light: self.light.get_state(),
            alarm: self.alarm.get_state(),
            servo: self.servo.get_state(),
        }
    }

    pub fn light(&self) -> &WarningLight {
        &self.light
    }

    pub fn alarm(&self) -> &AlarmBuzzer {
        &self.alarm
    }

    pub fn servo(&self) -> &ServoChannel {
        &self.servo
    }

    pub fn pins(&self) -> &P {
        &self.pins
    }

    pub fn pins_mut(&mut self) -> &mut P {
        &mut self.pins
    }
}

impl<P: OutputPins> ActuatorFacade for ActuatorBank<P> {
    fn set_light(&mut self, on: bool) {
        let was_on = self.light.is_on();
        // Setting a boolean cannot fail.
        let _ = self.light.execute_command(LightCommand::Set(on));
        if was_on != on {
            self.pins.set_digital_output(PinRole::Light, on);
            debug!(on, "warning light");
        }
    }

    fn sound_alarm(&mut self, frequency_hz: u16, duration_ms: u32) {
        let _ = self.alarm.execute_command(AlarmCommand::Sound {
            frequency_hz,
            duration_ms,
        });
        self.pins.play_tone(PinRole::Buzzer, frequency_hz, duration_ms);
    }

    fn silence_alarm(&mut self) {
        let _ = self.alarm.execute_command(AlarmCommand::Silence);
        self.pins.stop_tone(PinRole::Buzzer);
    }

    fn set_servo(&mut self, position: i32) -> u16 {
        let previous = self.servo.position();
        let target = self.servo.clamp(position);
        let _ = self.servo.execute_command(ServoCommand::MoveTo(position));
        if target != previous {
            self.pins.set_servo_position(target);
        }
        target
    }
}

//! Collaborator interfaces the control core is written against.
//!
//! Nothing in this crate touches registers directly. A board support layer
//! implements these traits; [`sim`] provides in-memory versions for tests and
//! the simulator binary.

pub mod sim;

use core::fmt::Debug;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Logical role of a pin, independent of the board's pin numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinRole {
    Light,
    Buzzer,
    Servo,
    Sensor,
}

/// Byte-oriented serial transport.
pub trait SerialLink {
    type Error: Debug;

    /// Next available byte, or `WouldBlock` when the receive buffer is empty.
    fn read_byte(&mut self) -> nb::Result<u8, Self::Error>;

    fn write_str(&mut self, text: &str) -> Result<(), Self::Error>;
}

/// Analog-to-digital converter.
pub trait AnalogInput {
    type Error: Debug;

    fn read_analog(&mut self, pin: PinRole) -> nb::Result<u16, Self::Error>;
}

/// Digital, tone and servo outputs.
pub trait OutputPins {
    fn set_digital_output(&mut self, pin: PinRole, high: bool);

    /// Start a tone that the hardware stops on its own after `duration_ms`.
    fn play_tone(&mut self, pin: PinRole, frequency_hz: u16, duration_ms: u32);

    fn stop_tone(&mut self, pin: PinRole);

    /// Servo pulse width in microseconds.
    fn set_servo_position(&mut self, pulse_us: u16);
}

/// Monotonic millisecond clock.
pub trait Clock {
    fn elapsed_ms(&self) -> u64;
}

/// Wall-clock backed [`Clock`] for hosted builds.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

//! In-memory collaborators for host tests and simulation.

use super::{AnalogInput, Clock, OutputPins, PinRole, SerialLink};
use heapless::Deque;
use std::cell::Cell;
use std::rc::Rc;
use thiserror::Error;

const SIM_RX_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("simulated link fault")]
    LinkFault,
    #[error("receive buffer full")]
    RxOverflow,
}

/// Loopback serial port: tests inject received bytes and inspect transmitted text.
#[derive(Debug, Default)]
pub struct SimSerial {
    rx: Deque<u8, SIM_RX_CAPACITY>,
    tx: String,
    fail_reads: bool,
    fail_writes: bool,
}

impl SimSerial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&mut self, bytes: &[u8]) -> Result<(), SimError> {
        for &byte in bytes {
            self.rx.push_back(byte).map_err(|_| SimError::RxOverflow)?;
        }
        Ok(())
    }

    pub fn pending_rx(&self) -> usize {
        self.rx.len()
    }

    pub fn output(&self) -> &str {
        &self.tx
    }

    pub fn take_output(&mut self) -> String {
        core::mem::take(&mut self.tx)
    }

    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl SerialLink for SimSerial {
    type Error = SimError;

    fn read_byte(&mut self) -> nb::Result<u8, Self::Error> {
        if self.fail_reads {
            return Err(nb::Error::Other(SimError::LinkFault));
        }
        self.rx.pop_front().ok_or(nb::Error::WouldBlock)
    }

    fn write_str(&mut self, text: &str) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(SimError::LinkFault);
        }
        self.tx.push_str(text);
        Ok(())
    }
}

/// Manually advanced clock. Clones share the same time base.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now_ms: Rc<Cell<u64>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.set(now_ms);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.set(self.now_ms.get() + delta_ms);
    }
}

impl Clock for SimClock {
    fn elapsed_ms(&self) -> u64 {
        self.now_ms.get()
    }
}

/// ADC returning whatever value the test last stored. Clones share the value.
#[derive(Debug, Clone, Default)]
pub struct SimAnalog {
    value: Rc<Cell<u16>>,
    failing: Rc<Cell<bool>>,
}

impl SimAnalog {
    pub fn new(initial: u16) -> Self {
        let adc = Self::default();
        adc.set(initial);
        adc
    }

    pub fn set(&self, raw: u16) {
        self.value.set(raw);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }
}

impl AnalogInput for SimAnalog {
    type Error = SimError;

    fn read_analog(&mut self, _pin: PinRole) -> nb::Result<u16, Self::Error> {
        if self.failing.get() {
            return Err(nb::Error::Other(SimError::LinkFault));
        }
        Ok(self.value.get())
    }
}

/// One recorded call on [`SimPins`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinCall {
    Digital { pin: PinRole, high: bool },
    Tone { pin: PinRole, frequency_hz: u16, duration_ms: u32 },
    StopTone { pin: PinRole },
    Servo { pulse_us: u16 },
}

/// Output pins that record every call.
#[derive(Debug, Default)]
pub struct SimPins {
    calls: Vec<PinCall>,
}

impl SimPins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[PinCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn tones(&self) -> impl Iterator<Item = &PinCall> {
        self.calls.iter().filter(|c| matches!(c, PinCall::Tone { .. }))
    }
}

impl OutputPins for SimPins {
    fn set_digital_output(&mut self, pin: PinRole, high: bool) {
        self.calls.push(PinCall::Digital { pin, high });
    }

    fn play_tone(&mut self, pin: PinRole, frequency_hz: u16, duration_ms: u32) {
        self.calls.push(PinCall::Tone {
            pin,
            frequency_hz,
            duration_ms,
        });
    }

    fn stop_tone(&mut self, pin: PinRole) {
        self.calls.push(PinCall::StopTone { pin });
    }

    fn set_servo_position(&mut self, pulse_us: u16) {
        self.calls.push(PinCall::Servo { pulse_us });
    }
}

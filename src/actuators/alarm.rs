use super::{Actuator, ActuatorError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AlarmState {
    /// Frequency of the last tone started, until it is silenced.
    pub frequency_hz: Option<u16>,
    pub last_duration_ms: u32,
    pub tones_started: u32,
}

#[derive(Debug, Clone, Copy)]
pub enum AlarmCommand {
    Sound { frequency_hz: u16, duration_ms: u32 },
    Silence,
}

/// Piezo buzzer. Tones are timed by the hardware; this model only records
/// what was last requested.
#[derive(Debug, Default)]
pub struct AlarmBuzzer {
    state: AlarmState,
}

impl AlarmBuzzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_sounding(&self) -> bool {
        self.state.frequency_hz.is_some()
    }
}

impl Actuator for AlarmBuzzer {
    type State = AlarmState;
    type Command = AlarmCommand;

    fn execute_command(&mut self, command: Self::Command) -> Result<(), ActuatorError> {
        match command {
            AlarmCommand::Sound {
                frequency_hz,
                duration_ms,
            } => {
                self.state.frequency_hz = Some(frequency_hz);
                self.state.last_duration_ms = duration_ms;
                self.state.tones_started = self.state.tones_started.wrapping_add(1);
            }
            AlarmCommand::Silence => {
                self.state.frequency_hz = None;
            }
        }
        Ok(())
    }

    fn get_state(&self) -> Self::State {
        self.state
    }

    fn reset(&mut self) {
        self.state.frequency_hz = None;
    }
}

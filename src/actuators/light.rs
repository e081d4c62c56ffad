use super::{Actuator, ActuatorError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LightState {
    pub on: bool,
    pub toggles: u32,
}

#[derive(Debug, Clone, Copy)]
pub enum LightCommand {
    Set(bool),
}

#[derive(Debug, Default)]
pub struct WarningLight {
    state: LightState,
}

impl WarningLight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.state.on
    }
}

impl Actuator for WarningLight {
    type State = LightState;
    type Command = LightCommand;

    fn execute_command(&mut self, command: Self::Command) -> Result<(), ActuatorError> {
        match command {
            LightCommand::Set(on) => {
                if self.state.on != on {
                    self.state.on = on;
                    self.state.toggles = self.state.toggles.wrapping_add(1);
                }
                Ok(())
            }
        }
    }

    fn get_state(&self) -> Self::State {
        self.state
    }

    fn reset(&mut self) {
        self.state.on = false;
    }
}

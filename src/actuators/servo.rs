use super::{Actuator, ActuatorError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServoState {
    /// Pulse width in microseconds.
    pub position: u16,
    pub min_position: u16,
    pub max_position: u16,
    pub moves: u32,
    /// Requests that had to be clamped into bounds.
    pub clamped_requests: u32,
}

#[derive(Debug, Clone, Copy)]
pub enum ServoCommand {
    /// Move, clamping out-of-range requests.
    MoveTo(i32),
    /// Move only if the request is already within bounds.
    MoveExact(i32),
}

#[derive(Debug)]
pub struct ServoChannel {
    state: ServoState,
    home_position: u16,
}

impl ServoChannel {
    pub fn new(min_position: u16, max_position: u16, home_position: u16) -> Self {
        debug_assert!(min_position < max_position, "servo bounds inverted");

        let home_position = home_position.clamp(min_position, max_position);
        Self {
            state: ServoState {
                position: home_position,
                min_position,
                max_position,
                moves: 0,
                clamped_requests: 0,
            },
            home_position,
        }
    }

    pub fn clamp(&self, requested: i32) -> u16 {
        requested.clamp(
            i32::from(self.state.min_position),
            i32::from(self.state.max_position),
        ) as u16
    }

    pub fn position(&self) -> u16 {
        self.state.position
    }

    pub fn in_bounds(&self, requested: i32) -> bool {
        requested >= i32::from(self.state.min_position) && requested <= i32::from(self.state.max_position)
    }

    fn move_to(&mut self, target: u16) {
        if target != self.state.position {
            self.state.position = target;
            self.state.moves = self.state.moves.wrapping_add(1);
        }
    }
}

impl Actuator for ServoChannel {
    type State = ServoState;
    type Command = ServoCommand;

    fn execute_command(&mut self, command: Self::Command) -> Result<(), ActuatorError> {
        match command {
            ServoCommand::MoveTo(requested) => {
                if !self.in_bounds(requested) {
                    self.state.clamped_requests = self.state.clamped_requests.saturating_add(1);
                }
                let target = self.clamp(requested);
                self.move_to(target);
                Ok(())
            }
            ServoCommand::MoveExact(requested) => {
                if !self.in_bounds(requested) {
                    return Err(ActuatorError::OutOfBounds {
                        requested,
                        min: self.state.min_position,
                        max: self.state.max_position,
                    });
                }
                self.move_to(requested as u16);
                Ok(())
            }
        }
    }

    fn get_state(&self) -> Self::State {
        self.state
    }

    fn reset(&mut self) {
        self.state.position = self.home_position;
    }
}

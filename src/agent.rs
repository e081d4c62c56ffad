use crate::actuators::{ActuatorBank, ActuatorError, ActuatorFacade, ActuatorSnapshot};
use crate::config::{ConfigError, SentryConfig};
use crate::hardware::{AnalogInput, Clock, OutputPins, SerialLink};
use crate::protocol::{
    AckSymbol, Command, FramerStats, LineFramer, ProtocolError, ProtocolHandler, ProtocolStats, RawLine,
};
use crate::scheduler::{ActuationScheduler, CadenceStats, SchedulerError, SchedulerStats, TickCadence};
use crate::sensor::{SamplerStats, SensorReading, SensorSampler};
use crate::telemetry::{TelemetryReporter, TelemetryStats};
use crate::turret::{AlarmAction, AlarmPlan, Mode, TurretMachine, TurretState};
use core::fmt::Debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

// Bounds one serial drain so a flooded link cannot starve the control tick.
const MAX_BYTES_PER_POLL: usize = 256;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("serial link error: {0}")]
    Serial(String),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("scheduling error: {0}")]
    Scheduling(#[from] SchedulerError),
    #[error("actuator error: {0}")]
    Actuator(#[from] ActuatorError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub running: bool,
    pub tick_count: u64,
    pub command_count: u32,
    pub telemetry_count: u32,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub last_reading: Option<SensorReading>,
    pub mode: Mode,
}

/// Everything observable about the agent, for logging and status reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub state: AgentState,
    pub turret: TurretState,
    pub actuators: ActuatorSnapshot,
    pub framer: FramerStats,
    pub protocol: ProtocolStats,
    pub cadence: CadenceStats,
    pub actuations: SchedulerStats,
    pub telemetry: TelemetryStats,
    pub sensor: SamplerStats,
}

/// What one call to [`SentryAgent::poll`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub lines_handled: usize,
    pub ticked: bool,
    pub telemetry_sent: bool,
}

/// The cooperative control loop.
///
/// Each [`poll`](Self::poll) drains available serial input, fires due tone
/// segments, runs at most one control tick when the cadence allows and sends
/// telemetry when it is due. Nothing in a poll blocks on a delay.
pub struct SentryAgent<S, A, P, C> {
    config: SentryConfig,
    serial: S,
    sampler: SensorSampler<A>,
    actuators: ActuatorBank<P>,
    clock: C,

    framer: LineFramer,
    protocol: ProtocolHandler,
    machine: TurretMachine,
    cadence: TickCadence,
    actuations: ActuationScheduler,
    telemetry: TelemetryReporter,

    state: AgentState,
    // End of a piezo test tone. Until then no tick or tone segment touches the buzzer.
    manual_tone_until: Option<u64>,
}

impl<S, A, P, C> SentryAgent<S, A, P, C>
where
    S: SerialLink,
    A: AnalogInput,
    P: OutputPins,
    C: Clock,
{
    pub fn new(config: SentryConfig, serial: S, adc: A, pins: P, clock: C) -> Result<Self, AgentError> {
        config.validate()?;

        let protocol = ProtocolHandler::new(&config.protocol.line_ending)?;
        // Validation guarantees an ASCII terminator.
        let framer = LineFramer::new(config.protocol.terminator as u8);
        let machine = TurretMachine::new(
            config.turret.clone(),
            config.alarm.clone(),
            config.sensor.detection,
            config.timing.tick_period_ms,
        );

        Ok(Self {
            sampler: SensorSampler::new(adc, &config.sensor),
            actuators: ActuatorBank::new(pins, &config.turret),
            cadence: TickCadence::new(config.timing.tick_period_ms),
            telemetry: TelemetryReporter::new(config.telemetry.clone()),
            actuations: ActuationScheduler::new(),
            framer,
            protocol,
            machine,
            serial,
            clock,
            state: AgentState {
                running: false,
                tick_count: 0,
                command_count: 0,
                telemetry_count: 0,
                error_count: 0,
                last_error: None,
                last_reading: None,
                mode: Mode::Scanning,
            },
            manual_tone_until: None,
            config,
        })
    }

    pub fn start(&mut self) {
        self.actuators.initialize();
        self.cadence.reset();
        self.state.running = true;
        info!(
            tick_period_ms = self.config.timing.tick_period_ms,
            calibrated = self.sampler.is_calibrated(),
            "sentry agent started"
        );
    }

    /// Light off, tone stopped and pending tone segments dropped.
    pub fn stop(&mut self) {
        self.actuations.cancel_all();
        self.actuators.all_off();
        self.manual_tone_until = None;
        self.state.running = false;
        info!(ticks = self.state.tick_count, commands = self.state.command_count, "sentry agent stopped");
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn poll(&mut self) -> Result<PollOutcome, AgentError> {
        let mut outcome = PollOutcome::default();
        if !self.state.running {
            return Ok(outcome);
        }

        // A failed serial write is reported only after the control tick has
        // had its turn.
        let serviced = self.service_serial();
        if let Ok(lines) = serviced {
            outcome.lines_handled = lines;
        }

        let now = self.clock.elapsed_ms();
        self.run_due_actuations(now);

        let overruns = self.cadence.get_stats().overruns;
        if self.cadence.poll(now) {
            let stats = self.cadence.get_stats();
            if stats.overruns > overruns {
                warn!(now, skipped_total = stats.skipped_periods, "control tick overrun");
            }
            self.run_tick(now)?;
            outcome.ticked = true;
        }

        let reported = self.report_telemetry(now, outcome.ticked);
        serviced?;
        outcome.telemetry_sent = reported?;
        Ok(outcome)
    }

    /// Feeds every available serial byte through the framer and handles the
    /// completed lines. Returns the number of lines handled.
    pub fn service_serial(&mut self) -> Result<usize, AgentError> {
        let mut handled = 0;
        for _ in 0..MAX_BYTES_PER_POLL {
            match self.serial.read_byte() {
                Ok(byte) => {
                    if let Some(line) = self.framer.feed(byte) {
                        self.handle_line(&line)?;
                        handled += 1;
                    }
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => {
                    warn!(error = ?e, "serial read failed");
                    record_error(&mut self.state, format!("serial read: {e:?}"));
                    break;
                }
            }
        }
        Ok(handled)
    }

    /// Decodes and executes one line, then writes its acknowledgement.
    pub fn handle_line(&mut self, line: &RawLine) -> Result<AckSymbol, AgentError> {
        let (command, ack) = self.protocol.decode_line(line);
        self.execute_command(command);
        self.state.command_count = self.state.command_count.saturating_add(1);

        let response = self.protocol.format_ack(ack)?;
        if let Err(e) = self.serial.write_str(response) {
            return Err(serial_error(&mut self.state, e));
        }
        Ok(ack)
    }

    fn execute_command(&mut self, command: Command) {
        match command {
            Command::PiezoTest => {
                let alarm = &self.config.alarm;
                self.actuators.sound_alarm(alarm.test_frequency_hz, alarm.test_duration_ms);
                self.manual_tone_until = Some(self.clock.elapsed_ms() + u64::from(alarm.test_duration_ms));
            }
            Command::SetServo(position) => {
                let target = self.actuators.set_servo(position);
                if i32::from(target) != position {
                    debug!(requested = position, target, "servo request clamped");
                }
            }
            Command::SetLight(on) => self.actuators.set_light(on),
            Command::Unrecognized(_) => {}
        }
    }

    fn run_tick(&mut self, now: u64) -> Result<(), AgentError> {
        let reading = self.sampler.sample();
        let commands = self.machine.tick(reading);

        self.state.tick_count += 1;
        self.state.last_reading = Some(reading);
        self.state.mode = commands.mode;

        self.actuators.set_light(commands.light);
        if let Err(e) = self.actuators.move_servo_exact(commands.servo_position) {
            warn!(error = %e, "control tick produced an out of bounds position");
            record_error(&mut self.state, e.to_string());
        }

        match commands.alarm {
            AlarmPlan::Silent => {
                if !self.manual_tone_active(now) {
                    self.manual_tone_until = None;
                    if self.actuators.alarm().is_sounding() {
                        self.actuators.silence_alarm();
                    }
                }
            }
            AlarmPlan::Pattern(envelope) => {
                self.actuations.cancel_all();
                for segment in &envelope {
                    self.actuations
                        .schedule(segment.action, now + u64::from(segment.offset_ms), now)?;
                }
                self.run_due_actuations(now);
            }
        }

        trace!(tick = self.state.tick_count, mode = ?commands.mode, "tick complete");
        Ok(())
    }

    fn manual_tone_active(&self, now: u64) -> bool {
        self.manual_tone_until.is_some_and(|until| now < until)
    }

    /// Fires due tone segments. A running piezo test tone has priority: alert
    /// segments falling inside its window are consumed without touching the
    /// buzzer.
    fn run_due_actuations(&mut self, now: u64) {
        let due = self.actuations.take_due(now);
        if self.manual_tone_active(now) {
            if !due.is_empty() {
                trace!(dropped = due.len(), "alert tone segments yield to piezo test");
            }
            return;
        }
        self.manual_tone_until = None;

        for due in due {
            match due.action {
                AlarmAction::Sound {
                    frequency_hz,
                    duration_ms,
                } => self.actuators.sound_alarm(frequency_hz, duration_ms),
                AlarmAction::Silence => self.actuators.silence_alarm(),
            }
        }
    }

    fn report_telemetry(&mut self, now: u64, ticked: bool) -> Result<bool, AgentError> {
        let Some(reading) = self.state.last_reading else {
            return Ok(false);
        };
        if !self.telemetry.is_due(now, ticked) {
            return Ok(false);
        }

        let line = self.telemetry.render(&mut self.protocol, reading, now)?;
        if let Err(e) = self.serial.write_str(line) {
            return Err(serial_error(&mut self.state, e));
        }
        self.state.telemetry_count = self.state.telemetry_count.wrapping_add(1);
        Ok(true)
    }

    pub fn get_state(&self) -> &AgentState {
        &self.state
    }

    pub fn turret_state(&self) -> &TurretState {
        self.machine.state()
    }

    pub fn config(&self) -> &SentryConfig {
        &self.config
    }

    pub fn actuators(&self) -> &ActuatorBank<P> {
        &self.actuators
    }

    pub fn actuators_mut(&mut self) -> &mut ActuatorBank<P> {
        &mut self.actuators
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }

    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    pub fn pending_actuations(&self) -> usize {
        self.actuations.pending().len()
    }

    pub fn set_telemetry_enabled(&mut self, enabled: bool) {
        self.telemetry.set_enabled(enabled);
    }

    pub fn get_framer_stats(&self) -> &FramerStats {
        self.framer.get_stats()
    }

    pub fn get_protocol_stats(&self) -> &ProtocolStats {
        self.protocol.get_stats()
    }

    pub fn get_cadence_stats(&self) -> &CadenceStats {
        self.cadence.get_stats()
    }

    pub fn get_scheduler_stats(&self) -> &SchedulerStats {
        self.actuations.get_stats()
    }

    pub fn get_telemetry_stats(&self) -> &TelemetryStats {
        self.telemetry.get_stats()
    }

    pub fn get_sensor_stats(&self) -> &SamplerStats {
        self.sampler.get_stats()
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            state: self.state.clone(),
            turret: *self.machine.state(),
            actuators: self.actuators.snapshot(),
            framer: *self.framer.get_stats(),
            protocol: *self.protocol.get_stats(),
            cadence: self.cadence.get_stats().clone(),
            actuations: self.actuations.get_stats().clone(),
            telemetry: self.telemetry.get_stats().clone(),
            sensor: *self.sampler.get_stats(),
        }
    }
}

impl<S, A, P, C> Debug for SentryAgent<S, A, P, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SentryAgent")
            .field("state", &self.state)
            .field("turret", self.machine.state())
            .finish_non_exhaustive()
    }
}

fn record_error(state: &mut AgentState, message: String) {
    state.error_count = state.error_count.saturating_add(1);
    state.last_error = Some(message);
}

fn serial_error<E: Debug>(state: &mut AgentState, error: E) -> AgentError {
    let message = format!("{error:?}");
    warn!(error = %message, "serial write failed");
    record_error(state, format!("serial write: {message}"));
    AgentError::Serial(message)
}

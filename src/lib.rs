//! # Sentry Turret Control Core
//!
//! Command protocol decoding, sensor-driven mode arbitration and the turret
//! behaviour state machine for a small autonomous sentry turret: a pan
//! servo, an alarm buzzer, a warning light and one proximity sensor, driven
//! over a `;`-terminated serial line protocol.
//!
//! ## Features
//!
//! - **Line protocol**: bounded framing, `atoi`-style decoding, `A`/`E` acknowledgements
//! - **State machine**: idle sweep, active alert and escalated alert with a cool-down counter
//! - **Non-blocking timing**: a fixed control cadence measured against a clock, and tone
//!   envelopes played as scheduled actuation events
//! - **Telemetry**: periodic `40,<reading>` reports on the command link
//! - **Hardware-agnostic**: everything talks to the [`hardware`] traits, with in-memory
//!   versions in [`hardware::sim`]
//!
//! ## Quick Start
//!
//! ```rust
//! use turretcore::hardware::sim::{SimAnalog, SimClock, SimPins, SimSerial};
//! use turretcore::{SentryAgent, SentryConfig};
//!
//! let clock = SimClock::new();
//! let mut agent = SentryAgent::new(
//!     SentryConfig::default(),
//!     SimSerial::new(),
//!     SimAnalog::new(100),
//!     SimPins::new(),
//!     clock.clone(),
//! )?;
//! agent.start();
//!
//! agent.serial_mut().inject(b"30,1;")?;
//! agent.poll()?;
//! assert!(agent.serial().output().starts_with("A\r\n"));
//!
//! clock.advance(30);
//! agent.poll()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - [`agent`] - Cooperative control loop and public API
//! - [`protocol`] - Line framing, command decoding and outbound formatting
//! - [`turret`] - Behaviour state machine
//! - [`sensor`] - Sampling and calibration
//! - [`scheduler`] - Tick cadence and scheduled actuation events
//! - [`actuators`] - Light, buzzer and servo models over the output pins
//! - [`telemetry`] - Periodic sensor reports
//! - [`monitor`] - Host-side parsing of the device's output stream
//! - [`config`] - Tunable parameters

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod actuators;
pub mod agent;
pub mod config;
pub mod hardware;
pub mod monitor;
pub mod protocol;
pub mod scheduler;
pub mod sensor;
pub mod telemetry;
pub mod turret;

// Re-export main public types for convenience
pub use agent::{AgentError, SentryAgent};
pub use config::SentryConfig;
pub use protocol::{AckSymbol, Command, LineFramer, RawLine};
pub use sensor::SensorReading;
pub use turret::{Mode, TurretMachine};

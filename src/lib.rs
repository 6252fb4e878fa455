//! # Launch Vehicle Bus Simulator
//!
//! A real-time launch vehicle control simulation library: mission phase
//! scheduling, engine ignition/shutdown sequencing, flight dynamics with a
//! guidance autopilot, a lossy telemetry ring exposed as a virtual device,
//! and a line-oriented ground-admin protocol.
//!
//! ## Features
//!
//! - **Mission phases**: table-driven countdown through orbit insertion
//! - **Engine sequencing**: 4-engine ignition/shutdown with health monitoring
//! - **Flight dynamics**: thrust, gravity, drag, and a 3-axis velocity PID
//! - **Command channel**: numeric commands with synchronous replies and a
//!   periodic wake signal
//! - **Telemetry ring**: newest-8192-bytes device with blocking reads
//! - **Admin protocol**: JSON-line go/nogo/abort/throttle control over TCP
//!
//! ## Quick Start
//!
//! ```rust
//! use lvbus::runtime::RuntimeContext;
//! use lvbus::command::CommandRequest;
//!
//! let ctx = RuntimeContext::new(-10.0); // T-10 seconds
//! ctx.command.apply(CommandRequest::go());
//! assert!(ctx.command.mission_go());
//! ```
//!
//! ## Architecture
//!
//! - [`phase`] - mission clock and phase table
//! - [`engine`] - engine sequencing and fault monitoring
//! - [`flight`] - vehicle dynamics, guidance, and autopilot
//! - [`command`] - mission command channel and wake signals
//! - [`ring`] - lossy telemetry ring and virtual device
//! - [`bus`] - inter-subsystem broadcast bus
//! - [`admin`] - ground-admin TCP protocol
//! - [`scheduler`] - periodic task driving
//! - [`runtime`] - subsystem wiring and the task registry

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod admin;
pub mod bus;
pub mod command;
pub mod config;
pub mod engine;
pub mod flight;
pub mod phase;
pub mod ring;
pub mod runtime;
pub mod scheduler;

// Re-export main public types for convenience
pub use bus::{MessageBus, StatusMessage, SubsystemId};
pub use command::{CommandClient, CommandRequest, CommandService, MissionCommandState};
pub use engine::{EngineSequencer, EngineState};
pub use flight::FlightSequencer;
pub use phase::{MissionPhase, PhaseScheduler, SystemState};
pub use ring::{TelemetryDevice, TelemetryRing};
pub use runtime::RuntimeContext;

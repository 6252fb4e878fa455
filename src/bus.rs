//! Internal broadcast bus connecting the vehicle subsystems.
//!
//! Subsystems register once and receive status/telemetry messages over
//! mpsc channels. Broadcast helpers encode the routing rules:
//! status goes to everyone except the source, telemetry only to the
//! consumers that use it, and emergency messages go to all registered
//! subsystems with a canned critical payload.

use crate::phase::{MissionPhase, SystemState};
use crate::scheduler::TaskPriority;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use tracing::{debug, error};

pub const NUM_SUBSYSTEMS: usize = 8;
pub const EMERGENCY_ERROR_CODE: u32 = 9999;

/// Subsystems that consume telemetry broadcasts.
const TELEMETRY_TARGETS: [SubsystemId; 3] = [
    SubsystemId::FlightControl,
    SubsystemId::GroundSupport,
    SubsystemId::Telemetry,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubsystemId {
    FlightControl,
    EngineControl,
    Telemetry,
    Environmental,
    GroundSupport,
    Navigation,
    Power,
    Thermal,
}

impl SubsystemId {
    pub const ALL: [SubsystemId; NUM_SUBSYSTEMS] = [
        SubsystemId::FlightControl,
        SubsystemId::EngineControl,
        SubsystemId::Telemetry,
        SubsystemId::Environmental,
        SubsystemId::GroundSupport,
        SubsystemId::Navigation,
        SubsystemId::Power,
        SubsystemId::Thermal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SubsystemId::FlightControl => "flight_control",
            SubsystemId::EngineControl => "engine_control",
            SubsystemId::Telemetry => "telemetry",
            SubsystemId::Environmental => "environmental",
            SubsystemId::GroundSupport => "ground_support",
            SubsystemId::Navigation => "navigation",
            SubsystemId::Power => "power",
            SubsystemId::Thermal => "thermal",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessage {
    pub source: SubsystemId,
    pub state: SystemState,
    pub phase: MissionPhase,
    pub priority: TaskPriority,
    pub error_code: u32,
    pub message: String,
    pub timestamp_ms: u64,
}

pub const QUALITY_NOMINAL: u8 = 100;
pub const QUALITY_DEGRADED: u8 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub id: u32,
    pub name: String,
    pub value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub units: String,
    pub timestamp_ms: u64,
    pub valid: bool,
    /// Producer health, 0-100. Degraded when the source has faulted.
    pub quality: u8,
}

impl TelemetryPoint {
    pub fn in_range(&self) -> bool {
        self.value >= self.min_value && self.value <= self.max_value
    }
}

#[derive(Debug, Clone)]
pub enum BusMessage {
    Status(StatusMessage),
    Telemetry(TelemetryPoint),
}

/// Broadcast bus with one bounded endpoint per registered subsystem.
///
/// Delivery is best-effort: a dropped receiver counts as a failure but
/// never blocks or aborts the broadcast.
pub struct MessageBus {
    endpoints: Mutex<Vec<(SubsystemId, Sender<BusMessage>)>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            endpoints: Mutex::new(Vec::with_capacity(NUM_SUBSYSTEMS)),
        }
    }

    /// Register a subsystem and return its receiving endpoint.
    ///
    /// Re-registering an id replaces the previous endpoint.
    pub fn register(&self, id: SubsystemId) -> Receiver<BusMessage> {
        let (tx, rx) = mpsc::channel();
        let mut endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        endpoints.retain(|(existing, _)| *existing != id);
        endpoints.push((id, tx));
        debug!(subsystem = id.name(), "registered bus endpoint");
        rx
    }

    /// Send a status message to every registered subsystem except the source.
    /// Returns the number of failed deliveries.
    pub fn broadcast_status(&self, status: &StatusMessage) -> usize {
        let endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        let mut failures = 0;
        for (id, tx) in endpoints.iter() {
            if *id == status.source {
                continue;
            }
            if tx.send(BusMessage::Status(status.clone())).is_err() {
                failures += 1;
            }
        }
        failures
    }

    /// Send a telemetry point to the fixed set of telemetry consumers.
    /// Returns the number of failed deliveries.
    pub fn broadcast_telemetry(&self, point: &TelemetryPoint) -> usize {
        let endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        let mut failures = 0;
        for (id, tx) in endpoints.iter() {
            if !TELEMETRY_TARGETS.contains(id) {
                continue;
            }
            if tx.send(BusMessage::Telemetry(point.clone())).is_err() {
                failures += 1;
            }
        }
        failures
    }

    /// Broadcast a canned emergency status to all registered subsystems.
    pub fn broadcast_emergency(&self, message: &str, timestamp_ms: u64) -> usize {
        error!(message, "EMERGENCY BROADCAST");
        let status = StatusMessage {
            source: SubsystemId::FlightControl,
            state: SystemState::Emergency,
            phase: MissionPhase::Abort,
            priority: TaskPriority::Emergency,
            error_code: EMERGENCY_ERROR_CODE,
            message: message.to_string(),
            timestamp_ms,
        };
        // Emergency is the one broadcast that also reaches the source.
        let endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        let mut failures = 0;
        for (_, tx) in endpoints.iter() {
            if tx.send(BusMessage::Status(status.clone())).is_err() {
                failures += 1;
            }
        }
        failures
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

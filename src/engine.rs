//! Engine sequencing and health monitoring.
//!
//! Four engines share one sequence timer. The ignition sequence walks all
//! engines through purge, turbopump spin-up, and ignition before promoting
//! them to running at the minimum throttle floor; the shutdown sequence
//! ramps thrust down over a fixed window and takes everything offline.
//! Faults are sticky: an engine that trips a limit goes to FAULT, zeroes its
//! thrust, and reports the onset exactly once.

use crate::bus::{StatusMessage, SubsystemId, TelemetryPoint, QUALITY_DEGRADED, QUALITY_NOMINAL};
use crate::config::{
    ENGINE_MAX_CHAMBER_PRESSURE_PA, ENGINE_SHUTDOWN_TIME_S, ENGINE_STARTUP_TIME_S, NUM_ENGINES,
    VEHICLE_MIN_THROTTLE,
};
use crate::phase::{MissionPhase, SystemState};
use crate::scheduler::TaskPriority;
use heapless::Vec as BoundedVec;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

const ATMOSPHERIC_PRESSURE_PA: f64 = 101_325.0;
const MIN_CHAMBER_PRESSURE_PA: f64 = 1_000_000.0;
const MAX_NOZZLE_TEMP_K: f64 = 3000.0;
const MIN_TURBOPUMP_RPM: f64 = 8000.0;
const TURBOPUMP_FULL_RPM: f64 = 12_000.0;
const THRUST_RAMP_RATE_PCT_S: f64 = 20.0;
const IGNITION_DELAY_S: f64 = 1.0;
const PRESTART_WINDOW_S: f64 = 1.0;
const BASE_FUEL_FLOW_KGS: f64 = 200.0; // per engine at 100% thrust
const BASE_OXIDIZER_FLOW_KGS: f64 = 400.0;
const ENGINE_FAULT_CODE_BASE: u32 = 3000;
const DEFAULT_RANDOM_FAULT_PROBABILITY: f64 = 0.0001;

// Telemetry point ids: one decade per engine, chamber pressure then thrust.
const ENGINE_TELEMETRY_ID_BASE: u32 = 2000;
const ENGINE_TELEMETRY_ID_STRIDE: u32 = 10;

// Sequence timers accumulate caller-supplied dt values, so stage boundaries
// tolerate float rounding: 40 ticks of 0.1 s must count as 4.0 s.
const TIMER_EPS: f64 = 1e-9;

fn reached(timer: f64, threshold: f64) -> bool {
    timer >= threshold - TIMER_EPS
}

// Nominal operating point sits below the rated limit so sensor noise does
// not trip the overpressure check in steady state.
const CHAMBER_PRESSURE_NOMINAL_FRACTION: f64 = 0.95;
const CHAMBER_PRESSURE_NOISE_FRACTION: f64 = 0.02;
const TURBOPUMP_NOISE_FRACTION: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Offline,
    Prestart,
    Ignition,
    Running,
    Shutdown,
    Fault,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engine {
    pub id: u8,
    pub state: EngineState,
    pub thrust_pct: f64,
    pub chamber_pressure_pa: f64,
    pub fuel_flow_kgs: f64,
    pub oxidizer_flow_kgs: f64,
    pub nozzle_temp_k: f64,
    pub turbopump_rpm: f64,
    pub ignition_enabled: bool,
    ignition_time: f64,
    shutdown_time: f64,
    fault_message: Option<String>,
}

impl Engine {
    fn new(id: u8) -> Self {
        Self {
            id,
            state: EngineState::Offline,
            thrust_pct: 0.0,
            chamber_pressure_pa: ATMOSPHERIC_PRESSURE_PA,
            fuel_flow_kgs: 0.0,
            oxidizer_flow_kgs: 0.0,
            nozzle_temp_k: 300.0,
            turbopump_rpm: 0.0,
            ignition_enabled: false,
            ignition_time: 0.0,
            shutdown_time: 0.0,
            fault_message: None,
        }
    }

    pub fn fault_message(&self) -> Option<&str> {
        self.fault_message.as_deref()
    }
}

/// Fault onset event, produced once per engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineFault {
    pub engine_id: u8,
    pub error_code: u32,
    pub message: String,
}

impl EngineFault {
    /// Critical status message for the bus.
    pub fn to_status(&self, phase: MissionPhase, timestamp_ms: u64) -> StatusMessage {
        StatusMessage {
            source: SubsystemId::EngineControl,
            state: SystemState::Fault,
            phase,
            priority: TaskPriority::Critical,
            error_code: self.error_code,
            message: self.message.clone(),
            timestamp_ms,
        }
    }
}

pub type FaultEvents = BoundedVec<EngineFault, NUM_ENGINES>;

/// Per-tick telemetry snapshot: two points per engine.
pub type EngineTelemetry = BoundedVec<TelemetryPoint, { 2 * NUM_ENGINES }>;

#[derive(Debug)]
pub struct EngineSequencer {
    engines: [Engine; NUM_ENGINES],
    current_phase: MissionPhase,
    ignition_sequence_active: bool,
    shutdown_sequence_active: bool,
    // One timer serves whichever sequence is active; the sequences are
    // mutually exclusive.
    sequence_timer: f64,
    random_fault_probability: f64,
    // Ground-test hook: pins an engine's chamber pressure reading.
    chamber_pressure_override: [Option<f64>; NUM_ENGINES],
    rng_state: u64,
}

impl EngineSequencer {
    pub fn new() -> Self {
        Self {
            engines: [Engine::new(1), Engine::new(2), Engine::new(3), Engine::new(4)],
            current_phase: MissionPhase::Prelaunch,
            ignition_sequence_active: false,
            shutdown_sequence_active: false,
            sequence_timer: 0.0,
            random_fault_probability: DEFAULT_RANDOM_FAULT_PROBABILITY,
            chamber_pressure_override: [None; NUM_ENGINES],
            rng_state: 0x1234_5678_9ABC_DEF0, // Fixed seed for deterministic behavior
        }
    }

    pub fn engines(&self) -> &[Engine; NUM_ENGINES] {
        &self.engines
    }

    pub fn set_random_fault_probability(&mut self, probability: f64) {
        self.random_fault_probability = probability;
    }

    /// Pin (or release) an engine's chamber pressure reading, bypassing the
    /// sensor simulation. Ground-test use.
    pub fn override_chamber_pressure(&mut self, idx: usize, pressure_pa: Option<f64>) {
        if idx < NUM_ENGINES {
            self.chamber_pressure_override[idx] = pressure_pa;
        }
    }

    /// Total thrust across engines, as a percentage of one engine's rating
    /// summed over all of them.
    pub fn total_thrust_pct(&self) -> f64 {
        self.engines.iter().map(|e| e.thrust_pct).sum()
    }

    pub fn all_running(&self) -> bool {
        self.engines.iter().all(|e| e.state == EngineState::Running)
    }

    /// Chamber pressure and thrust percentage for every engine. A faulted
    /// engine still reports its readings, flagged invalid with degraded
    /// quality.
    pub fn telemetry_points(&self, timestamp_ms: u64) -> EngineTelemetry {
        let mut points = EngineTelemetry::new();
        for (idx, engine) in self.engines.iter().enumerate() {
            let healthy = engine.state != EngineState::Fault;
            let quality = if healthy { QUALITY_NOMINAL } else { QUALITY_DEGRADED };
            let base = ENGINE_TELEMETRY_ID_BASE + idx as u32 * ENGINE_TELEMETRY_ID_STRIDE;
            let _ = points.push(TelemetryPoint {
                id: base,
                name: format!("engine{}_chamber_pressure", engine.id),
                value: engine.chamber_pressure_pa,
                min_value: 0.0,
                max_value: ENGINE_MAX_CHAMBER_PRESSURE_PA,
                units: "Pa".to_string(),
                timestamp_ms,
                valid: healthy,
                quality,
            });
            let _ = points.push(TelemetryPoint {
                id: base + 1,
                name: format!("engine{}_thrust", engine.id),
                value: engine.thrust_pct,
                min_value: 0.0,
                max_value: 100.0,
                units: "%".to_string(),
                timestamp_ms,
                valid: healthy,
                quality,
            });
        }
        points
    }

    pub fn ignition_sequence_active(&self) -> bool {
        self.ignition_sequence_active
    }

    /// React to a mission phase change. Entering IGNITION arms the ignition
    /// sequence; ABORT or MISSION_COMPLETE arms shutdown.
    pub fn handle_phase(&mut self, phase: MissionPhase) {
        if phase == self.current_phase {
            return;
        }
        self.current_phase = phase;
        match phase {
            MissionPhase::Ignition => self.start_ignition_sequence(),
            MissionPhase::Abort | MissionPhase::MissionComplete => self.start_shutdown_sequence(),
            _ => {}
        }
    }

    fn start_ignition_sequence(&mut self) {
        if self.ignition_sequence_active || self.shutdown_sequence_active {
            return;
        }
        info!("engine ignition sequence started");
        self.ignition_sequence_active = true;
        self.sequence_timer = 0.0;
    }

    fn start_shutdown_sequence(&mut self) {
        if self.shutdown_sequence_active {
            return;
        }
        info!("engine shutdown sequence started");
        self.shutdown_sequence_active = true;
        self.ignition_sequence_active = false;
        self.sequence_timer = 0.0;
    }

    /// Advance all engines one tick. Returns fault onsets detected this tick.
    pub fn update(&mut self, dt: f64) -> FaultEvents {
        if self.ignition_sequence_active {
            self.process_ignition_sequence(dt);
        }
        if self.shutdown_sequence_active {
            self.process_shutdown_sequence(dt);
        }

        let mut faults = FaultEvents::new();
        for idx in 0..NUM_ENGINES {
            self.update_engine_state(idx, dt);
            self.update_engine_sensors(idx);
            if let Some(fault) = self.monitor_engine_health(idx) {
                let _ = faults.push(fault);
            }
        }
        faults
    }

    fn process_ignition_sequence(&mut self, dt: f64) {
        self.sequence_timer += dt;
        let t = self.sequence_timer;

        if !reached(t, PRESTART_WINDOW_S) {
            // Purge and pressurize.
            for engine in &mut self.engines {
                engine.state = EngineState::Prestart;
            }
        } else if !reached(t, ENGINE_STARTUP_TIME_S) {
            // Turbopump spin-up toward rated speed.
            let rpm = (t - PRESTART_WINDOW_S) / (ENGINE_STARTUP_TIME_S - PRESTART_WINDOW_S)
                * TURBOPUMP_FULL_RPM;
            for engine in &mut self.engines {
                engine.turbopump_rpm = rpm;
            }
        } else if !reached(t, ENGINE_STARTUP_TIME_S + IGNITION_DELAY_S) {
            for engine in &mut self.engines {
                if engine.state == EngineState::Prestart {
                    engine.state = EngineState::Ignition;
                    engine.ignition_enabled = true;
                }
            }
        } else {
            // Sequence end: anything still igniting is promoted to the
            // throttle floor.
            for engine in &mut self.engines {
                if engine.state == EngineState::Ignition {
                    engine.state = EngineState::Running;
                    engine.thrust_pct = VEHICLE_MIN_THROTTLE;
                }
            }
            self.ignition_sequence_active = false;
            self.sequence_timer = 0.0;
            info!("ignition sequence complete, all engines running");
        }
    }

    fn process_shutdown_sequence(&mut self, dt: f64) {
        self.sequence_timer += dt;
        let t = self.sequence_timer;

        if !reached(t, ENGINE_SHUTDOWN_TIME_S) {
            let thrust_factor = 1.0 - (t / ENGINE_SHUTDOWN_TIME_S);
            for engine in &mut self.engines {
                if engine.state == EngineState::Running {
                    engine.thrust_pct = VEHICLE_MIN_THROTTLE * thrust_factor;
                }
            }
        } else {
            for engine in &mut self.engines {
                if engine.state != EngineState::Fault {
                    engine.state = EngineState::Offline;
                }
                engine.thrust_pct = 0.0;
                engine.ignition_enabled = false;
            }
            self.shutdown_sequence_active = false;
            self.sequence_timer = 0.0;
            info!("engine shutdown sequence complete");
        }
    }

    fn update_engine_state(&mut self, idx: usize, dt: f64) {
        let ramp_allowed =
            self.current_phase.is_powered_flight() && !self.shutdown_sequence_active;
        let engine = &mut self.engines[idx];
        match engine.state {
            EngineState::Offline => {
                engine.thrust_pct = 0.0;
                engine.ignition_enabled = false;
            }
            EngineState::Prestart => {
                engine.thrust_pct = 0.0;
            }
            EngineState::Ignition => {
                engine.ignition_time += dt;
                if reached(engine.ignition_time, IGNITION_DELAY_S) {
                    engine.state = EngineState::Running;
                    engine.thrust_pct = VEHICLE_MIN_THROTTLE;
                    info!(engine = engine.id, "engine ignited");
                }
            }
            EngineState::Running => {
                if ramp_allowed && engine.thrust_pct < 100.0 {
                    engine.thrust_pct =
                        (engine.thrust_pct + THRUST_RAMP_RATE_PCT_S * dt).clamp(0.0, 100.0);
                }
            }
            EngineState::Shutdown => {
                engine.shutdown_time += dt;
                if reached(engine.shutdown_time, ENGINE_SHUTDOWN_TIME_S) {
                    engine.state = EngineState::Offline;
                    info!(engine = engine.id, "engine shutdown complete");
                }
            }
            EngineState::Fault => {
                engine.thrust_pct = 0.0;
                engine.ignition_enabled = false;
            }
        }
    }

    fn update_engine_sensors(&mut self, idx: usize) {
        let cp_noise = self.next_noise();
        let pump_noise = self.next_noise();
        let nozzle_noise = self.next_noise();
        let cp_override = self.chamber_pressure_override[idx];
        let engine = &mut self.engines[idx];

        if let Some(pressure) = cp_override {
            engine.chamber_pressure_pa = pressure;
        } else {
            let cp_base = if engine.state == EngineState::Running {
                ATMOSPHERIC_PRESSURE_PA
                    + (ENGINE_MAX_CHAMBER_PRESSURE_PA - ATMOSPHERIC_PRESSURE_PA)
                        * CHAMBER_PRESSURE_NOMINAL_FRACTION
                        * (engine.thrust_pct / 100.0)
            } else {
                ATMOSPHERIC_PRESSURE_PA
            };
            engine.chamber_pressure_pa =
                cp_base + cp_base * CHAMBER_PRESSURE_NOISE_FRACTION * cp_noise;
        }

        match engine.state {
            EngineState::Running => {
                let base = MIN_TURBOPUMP_RPM
                    + (TURBOPUMP_FULL_RPM - MIN_TURBOPUMP_RPM) * (engine.thrust_pct / 100.0);
                engine.turbopump_rpm = base + base * TURBOPUMP_NOISE_FRACTION * pump_noise;
                engine.nozzle_temp_k = 2500.0 + 50.0 * nozzle_noise;
            }
            EngineState::Prestart | EngineState::Ignition => {
                // Spin-up ramp is owned by the ignition sequence.
                engine.nozzle_temp_k = 300.0 + 5.0 * nozzle_noise;
            }
            _ => {
                engine.turbopump_rpm = 0.0;
                engine.nozzle_temp_k = 300.0 + 5.0 * nozzle_noise;
            }
        }

        if engine.state == EngineState::Running {
            let thrust_factor = engine.thrust_pct / 100.0;
            engine.fuel_flow_kgs = BASE_FUEL_FLOW_KGS * thrust_factor;
            engine.oxidizer_flow_kgs = BASE_OXIDIZER_FLOW_KGS * thrust_factor;
        } else {
            engine.fuel_flow_kgs = 0.0;
            engine.oxidizer_flow_kgs = 0.0;
        }
    }

    fn monitor_engine_health(&mut self, idx: usize) -> Option<EngineFault> {
        // Limits are meaningless mid-ramp-down.
        if self.shutdown_sequence_active {
            return None;
        }

        let engine = &self.engines[idx];
        if engine.state == EngineState::Running {
            if engine.chamber_pressure_pa > ENGINE_MAX_CHAMBER_PRESSURE_PA {
                return self.fault_engine(idx, "Chamber pressure exceeded maximum");
            }
            if engine.chamber_pressure_pa < MIN_CHAMBER_PRESSURE_PA {
                return self.fault_engine(idx, "Chamber pressure too low");
            }
            if engine.turbopump_rpm < MIN_TURBOPUMP_RPM {
                return self.fault_engine(idx, "Turbopump underspeed");
            }
        }
        if engine.nozzle_temp_k > MAX_NOZZLE_TEMP_K {
            return self.fault_engine(idx, "Nozzle overtemperature");
        }
        if self.next_unit() < self.random_fault_probability {
            return self.fault_engine(idx, "Random fault injection");
        }
        None
    }

    /// Put one engine into the terminal FAULT state. Returns the onset
    /// event, or `None` if the engine had already faulted.
    pub fn fault_engine(&mut self, idx: usize, message: &str) -> Option<EngineFault> {
        let engine = &mut self.engines[idx];
        if engine.fault_message.is_some() {
            return None;
        }
        engine.state = EngineState::Fault;
        engine.thrust_pct = 0.0;
        engine.ignition_enabled = false;
        let full_message = format!("Engine {} fault: {}", engine.id, message);
        engine.fault_message = Some(full_message.clone());
        error!(engine = engine.id, message, "engine FAULT");
        Some(EngineFault {
            engine_id: engine.id,
            error_code: ENGINE_FAULT_CODE_BASE + idx as u32,
            message: full_message,
        })
    }

    fn next_unit(&mut self) -> f64 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(1664525)
            .wrapping_add(1013904223);
        (self.rng_state >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform noise in [-1, 1].
    fn next_noise(&mut self) -> f64 {
        self.next_unit() * 2.0 - 1.0
    }
}

impl Default for EngineSequencer {
    fn default() -> Self {
        Self::new()
    }
}

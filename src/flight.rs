//! Flight dynamics, guidance, and autopilot.
//!
//! One vehicle state is integrated every tick: the mission phase picks the
//! thrust regime, guidance sets a target velocity vector, a three-axis PID
//! folds the velocity error into acceleration, drag opposes motion inside
//! the atmosphere, and then acceleration integrates into velocity and
//! position. Constraint checks at the end of the tick are advisory only.

use crate::config::{
    GRAVITY_MS2, TARGET_ORBIT_ALTITUDE_M, VEHICLE_DRY_MASS_KG, VEHICLE_FUEL_FLOW_KGS,
    VEHICLE_FUEL_MASS_KG, VEHICLE_MAX_THRUST_N,
};
use crate::phase::MissionPhase;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

const MAX_TICK_DT_S: f64 = 1.0;
const ASCENT_THROTTLE_PCT: f64 = 75.0;
const IGNITION_THROTTLE_PCT: f64 = 50.0;

// Guidance shaping.
const LIFTOFF_TARGET_CLIMB_MS: f64 = 50.0;
const GRAVITY_TURN_START_ALT_M: f64 = 1000.0;
const GRAVITY_TURN_SCALE_M: f64 = 10_000.0;
const MAX_PITCH_RAD: f64 = std::f64::consts::FRAC_PI_3; // 60 degrees
const ORBITAL_VELOCITY_MS: f64 = 7800.0;

// Controller limits and atmosphere.
const PID_OUTPUT_LIMIT_MS2: f64 = 10.0;
const SEA_LEVEL_AIR_DENSITY: f64 = 1.225;
const ATMOSPHERE_SCALE_HEIGHT_M: f64 = 8000.0;
const ATMOSPHERE_CEILING_M: f64 = 100_000.0;
const DRAG_COEFFICIENT: f64 = 0.3;
const REFERENCE_AREA_M2: f64 = 50.0;
const SPEED_OF_SOUND_MS: f64 = 343.0;

// Advisory constraint thresholds.
const BELOW_GROUND_LIMIT_M: f64 = -10.0;
const LOW_FUEL_WARNING_PCT: f64 = 5.0;
const MAX_DYNAMIC_PRESSURE_PA: f64 = 50_000.0;
const MAX_TOTAL_ACCEL_MS2: f64 = 50.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleState {
    pub position: [f64; 3], // downrange, crossrange, altitude
    pub velocity: [f64; 3],
    pub acceleration: [f64; 3],
    pub quaternion: [f64; 4],
    pub altitude_m: f64,
    pub mass_kg: f64,
    pub fuel_remaining_pct: f64,
    pub thrust_n: f64,
    pub dynamic_pressure_pa: f64,
    pub mach: f64,
    pub mission_time_s: f64,
}

impl VehicleState {
    fn on_pad() -> Self {
        Self {
            position: [0.0; 3],
            velocity: [0.0; 3],
            acceleration: [0.0; 3],
            quaternion: [1.0, 0.0, 0.0, 0.0], // pointing up
            altitude_m: 0.0,
            mass_kg: VEHICLE_DRY_MASS_KG + VEHICLE_FUEL_MASS_KG,
            fuel_remaining_pct: 100.0,
            thrust_n: 0.0,
            dynamic_pressure_pa: 0.0,
            mach: 0.0,
            mission_time_s: 0.0,
        }
    }

    pub fn speed(&self) -> f64 {
        (self.velocity[0] * self.velocity[0]
            + self.velocity[1] * self.velocity[1]
            + self.velocity[2] * self.velocity[2])
            .sqrt()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.1,
            ki: 0.01,
            kd: 0.05,
        }
    }
}

#[derive(Debug)]
pub struct FlightSequencer {
    vehicle: VehicleState,
    current_phase: MissionPhase,
    autopilot_enabled: bool,
    guidance_active: bool,
    target_altitude_m: f64,
    target_velocity: [f64; 3],
    gains: PidGains,
    last_error: [f64; 3],
    integral_error: [f64; 3],
}

impl FlightSequencer {
    pub fn new() -> Self {
        Self {
            vehicle: VehicleState::on_pad(),
            current_phase: MissionPhase::Prelaunch,
            autopilot_enabled: true,
            guidance_active: false,
            target_altitude_m: TARGET_ORBIT_ALTITUDE_M,
            target_velocity: [0.0; 3],
            gains: PidGains::default(),
            last_error: [0.0; 3],
            integral_error: [0.0; 3],
        }
    }

    pub fn with_gains(gains: PidGains) -> Self {
        Self {
            gains,
            ..Self::new()
        }
    }

    pub fn vehicle(&self) -> &VehicleState {
        &self.vehicle
    }

    pub fn autopilot_enabled(&self) -> bool {
        self.autopilot_enabled
    }

    pub fn guidance_active(&self) -> bool {
        self.guidance_active
    }

    pub fn target_altitude_m(&self) -> f64 {
        self.target_altitude_m
    }

    /// React to a mission phase change.
    pub fn handle_phase(&mut self, phase: MissionPhase) {
        if phase == self.current_phase {
            return;
        }
        let old = self.current_phase;
        self.current_phase = phase;
        info!(from = old.name(), to = phase.name(), "flight phase change");

        match phase {
            MissionPhase::Liftoff => {
                info!("liftoff, vehicle departing launch pad");
                self.guidance_active = true;
            }
            MissionPhase::StageSeparation => {
                // Upper stage carries 30% of the stack mass.
                self.vehicle.mass_kg *= 0.3;
                info!(mass_kg = self.vehicle.mass_kg, "stage separation");
            }
            MissionPhase::Abort => {
                error!("mission abort, autopilot and guidance disabled");
                self.autopilot_enabled = false;
                self.guidance_active = false;
            }
            _ => {}
        }
    }

    /// Advance the vehicle one tick. Out-of-range `dt` is discarded.
    pub fn update(&mut self, dt: f64) {
        if dt <= 0.0 || dt > MAX_TICK_DT_S {
            return;
        }
        self.vehicle.mission_time_s += dt;

        self.apply_phase_dynamics(dt);
        if self.current_phase.is_powered_flight() {
            self.calculate_guidance();
            if self.autopilot_enabled {
                self.update_autopilot(dt);
            }
            self.apply_atmospheric_drag();
            self.integrate(dt);
        }
        self.update_flow_quantities();
        self.check_constraints();
    }

    /// Thrust regime and base acceleration for the current phase.
    fn apply_phase_dynamics(&mut self, dt: f64) {
        let vs = &mut self.vehicle;
        if self.current_phase.is_powered_flight() {
            let throttle_pct = if self.current_phase == MissionPhase::Ascent {
                ASCENT_THROTTLE_PCT
            } else {
                100.0
            };
            vs.thrust_n = VEHICLE_MAX_THRUST_N * (throttle_pct / 100.0);

            let thrust_accel = vs.thrust_n / vs.mass_kg;
            vs.acceleration = [0.0, 0.0, thrust_accel - GRAVITY_MS2];

            vs.mass_kg -= VEHICLE_FUEL_FLOW_KGS * dt;
            vs.fuel_remaining_pct =
                (((vs.mass_kg - VEHICLE_DRY_MASS_KG) / VEHICLE_FUEL_MASS_KG) * 100.0)
                    .clamp(0.0, 100.0);
        } else if self.current_phase == MissionPhase::Ignition {
            // Engines lit, hold-downs engaged.
            vs.thrust_n = VEHICLE_MAX_THRUST_N * (IGNITION_THROTTLE_PCT / 100.0);
            vs.acceleration = [0.0; 3];
            vs.velocity = [0.0; 3];
            vs.position[2] = 0.0;
            vs.altitude_m = 0.0;
        } else {
            // Ground support holds the vehicle.
            vs.thrust_n = 0.0;
            vs.acceleration = [0.0; 3];
            vs.velocity = [0.0; 3];
            vs.position[2] = 0.0;
            vs.altitude_m = 0.0;
        }
    }

    fn calculate_guidance(&mut self) {
        let vs = &self.vehicle;
        match self.current_phase {
            MissionPhase::Liftoff => {
                self.target_velocity = [0.0, 0.0, LIFTOFF_TARGET_CLIMB_MS];
            }
            MissionPhase::Ascent => {
                if vs.altitude_m > GRAVITY_TURN_START_ALT_M {
                    let pitch = ((vs.altitude_m - GRAVITY_TURN_START_ALT_M)
                        / GRAVITY_TURN_SCALE_M)
                        .atan()
                        .clamp(0.0, MAX_PITCH_RAD);
                    let target_speed = 200.0 + vs.altitude_m * 0.01;
                    self.target_velocity[0] = target_speed * pitch.sin();
                    self.target_velocity[2] = target_speed * pitch.cos();
                }
            }
            MissionPhase::OrbitInsertion => {
                self.target_velocity = [ORBITAL_VELOCITY_MS, 0.0, 0.0];
            }
            // Stage separation keeps the previous targets.
            _ => {}
        }
        self.guidance_active = true;
    }

    /// Velocity PID per axis, output clamped and folded into acceleration.
    fn update_autopilot(&mut self, dt: f64) {
        if !self.guidance_active {
            return;
        }
        for axis in 0..3 {
            let error = self.target_velocity[axis] - self.vehicle.velocity[axis];

            let p_term = self.gains.kp * error;
            self.integral_error[axis] += error * dt;
            let i_term = self.gains.ki * self.integral_error[axis];
            let d_term = self.gains.kd * (error - self.last_error[axis]) / dt;

            let output = (p_term + i_term + d_term)
                .clamp(-PID_OUTPUT_LIMIT_MS2, PID_OUTPUT_LIMIT_MS2);
            self.vehicle.acceleration[axis] += output;
            self.last_error[axis] = error;
        }
    }

    fn apply_atmospheric_drag(&mut self) {
        let vs = &mut self.vehicle;
        if vs.altitude_m >= ATMOSPHERE_CEILING_M {
            return;
        }
        let speed = vs.speed();
        if speed <= 0.0 {
            return;
        }
        let air_density = SEA_LEVEL_AIR_DENSITY * (-vs.altitude_m / ATMOSPHERE_SCALE_HEIGHT_M).exp();
        let drag_force =
            0.5 * air_density * speed * speed * DRAG_COEFFICIENT * REFERENCE_AREA_M2;
        for axis in 0..3 {
            vs.acceleration[axis] -= (drag_force / vs.mass_kg) * (vs.velocity[axis] / speed);
        }
    }

    fn integrate(&mut self, dt: f64) {
        let vs = &mut self.vehicle;
        for axis in 0..3 {
            vs.velocity[axis] += vs.acceleration[axis] * dt;
        }
        for axis in 0..3 {
            vs.position[axis] += vs.velocity[axis] * dt;
        }
        vs.altitude_m = vs.position[2];
    }

    fn update_flow_quantities(&mut self) {
        let vs = &mut self.vehicle;
        let air_density = SEA_LEVEL_AIR_DENSITY * (-vs.altitude_m / ATMOSPHERE_SCALE_HEIGHT_M).exp();
        let speed = vs.speed();
        vs.dynamic_pressure_pa = 0.5 * air_density * speed * speed;
        vs.mach = speed / SPEED_OF_SOUND_MS;
    }

    /// Advisory only: log violations, never alter state.
    fn check_constraints(&self) {
        let vs = &self.vehicle;
        if vs.altitude_m < BELOW_GROUND_LIMIT_M && self.current_phase.is_powered_flight() {
            error!(altitude_m = vs.altitude_m, "vehicle below ground level during flight");
        }
        if vs.fuel_remaining_pct < LOW_FUEL_WARNING_PCT
            && self.current_phase != MissionPhase::OrbitInsertion
            && self.current_phase.is_powered_flight()
        {
            warn!(fuel_pct = vs.fuel_remaining_pct, "low fuel");
        }
        if vs.dynamic_pressure_pa > MAX_DYNAMIC_PRESSURE_PA {
            warn!(q_pa = vs.dynamic_pressure_pa, "high dynamic pressure");
        }
        let total_accel = (vs.acceleration[0] * vs.acceleration[0]
            + vs.acceleration[1] * vs.acceleration[1]
            + vs.acceleration[2] * vs.acceleration[2])
            .sqrt();
        if total_accel > MAX_TOTAL_ACCEL_MS2 {
            warn!(accel_ms2 = total_accel, "high total acceleration");
        }
    }
}

impl Default for FlightSequencer {
    fn default() -> Self {
        Self::new()
    }
}

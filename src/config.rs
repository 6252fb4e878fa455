//! System-wide configuration constants for the launch vehicle simulation.
//!
//! Values are grouped by concern; subsystem-local tuning constants live at
//! the top of their own modules.

use static_assertions::const_assert;

// Timing (milliseconds)
pub const MAIN_LOOP_PERIOD_MS: u64 = 10; // 100 Hz main loop
pub const TELEMETRY_PERIOD_MS: u64 = 100; // 10 Hz telemetry
pub const WAKE_PULSE_PERIOD_MS: u64 = 100; // periodic wake signal on the command channel

// Vehicle parameters
pub const VEHICLE_DRY_MASS_KG: f64 = 500_000.0; // 500 tons
pub const VEHICLE_FUEL_MASS_KG: f64 = 1_500_000.0; // 1500 tons
pub const VEHICLE_MAX_THRUST_N: f64 = 7_500_000.0; // 7.5 MN
pub const VEHICLE_MAX_THROTTLE: f64 = 100.0;
pub const VEHICLE_MIN_THROTTLE: f64 = 60.0;

// Engine parameters
pub const NUM_ENGINES: usize = 4;
pub const ENGINE_STARTUP_TIME_S: f64 = 3.0;
pub const ENGINE_SHUTDOWN_TIME_S: f64 = 2.0;
pub const ENGINE_MAX_CHAMBER_PRESSURE_PA: f64 = 20_000_000.0; // 20 MPa

// Flight dynamics
pub const GRAVITY_MS2: f64 = 9.81;
pub const VEHICLE_FUEL_FLOW_KGS: f64 = 1000.0; // total burn rate at full thrust
pub const TARGET_ORBIT_ALTITUDE_M: f64 = 400_000.0;

// Telemetry ring sink
pub const TELEMETRY_RING_CAPACITY: usize = 8192;
pub const TELEMETRY_LINE_MAX: usize = 256;

// Administrative interface
pub const ADMIN_PORT: u16 = 5055;
pub const ADMIN_BIND_ADDR: &str = "127.0.0.1";

// Ring indexing relies on a power-of-two capacity.
const_assert!(TELEMETRY_RING_CAPACITY.is_power_of_two());
const_assert!(TELEMETRY_LINE_MAX < TELEMETRY_RING_CAPACITY);

//! Mission phase scheduling.
//!
//! The mission clock starts deep in the countdown and advances with the main
//! loop. Each tick selects the first phase table entry whose half-open
//! window `[start, start + duration)` contains the clock; a gap leaves the
//! phase unchanged. Phase changes produce a high-priority status message for
//! the bus. Abort is not a table entry: it is entered only on external
//! request and latches until restart.

use crate::bus::{StatusMessage, SubsystemId};
use crate::scheduler::TaskPriority;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const MISSION_START_TIME_S: f64 = -7200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissionPhase {
    Prelaunch,
    Ignition,
    Liftoff,
    Ascent,
    StageSeparation,
    OrbitInsertion,
    MissionComplete,
    Abort,
    Unknown,
}

impl MissionPhase {
    pub fn name(self) -> &'static str {
        match self {
            MissionPhase::Prelaunch => "PRELAUNCH",
            MissionPhase::Ignition => "IGNITION",
            MissionPhase::Liftoff => "LIFTOFF",
            MissionPhase::Ascent => "ASCENT",
            MissionPhase::StageSeparation => "STAGE_SEPARATION",
            MissionPhase::OrbitInsertion => "ORBIT_INSERTION",
            MissionPhase::MissionComplete => "MISSION_COMPLETE",
            MissionPhase::Abort => "ABORT",
            MissionPhase::Unknown => "UNKNOWN",
        }
    }

    /// Phases with engines producing flight thrust.
    pub fn is_powered_flight(self) -> bool {
        matches!(
            self,
            MissionPhase::Liftoff
                | MissionPhase::Ascent
                | MissionPhase::StageSeparation
                | MissionPhase::OrbitInsertion
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemState {
    Offline,
    Initializing,
    Standby,
    Active,
    Fault,
    Emergency,
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
pub struct PhaseEntry {
    pub phase: MissionPhase,
    pub start_time: f64,
    pub duration: f64,
    pub description: &'static str,
    pub criticality: TaskPriority,
}

impl PhaseEntry {
    pub fn contains(&self, mission_time: f64) -> bool {
        mission_time >= self.start_time && mission_time < self.start_time + self.duration
    }
}

pub const DEFAULT_MISSION_PHASES: [PhaseEntry; 7] = [
    PhaseEntry {
        phase: MissionPhase::Prelaunch,
        start_time: -7200.0,
        duration: 7200.0,
        description: "Pre-launch preparations",
        criticality: TaskPriority::Normal,
    },
    PhaseEntry {
        phase: MissionPhase::Ignition,
        start_time: -6.0,
        duration: 6.0,
        description: "Engine ignition sequence",
        criticality: TaskPriority::Critical,
    },
    PhaseEntry {
        phase: MissionPhase::Liftoff,
        start_time: 0.0,
        duration: 10.0,
        description: "Liftoff and initial ascent",
        criticality: TaskPriority::Critical,
    },
    PhaseEntry {
        phase: MissionPhase::Ascent,
        start_time: 10.0,
        duration: 110.0,
        description: "Atmospheric ascent",
        criticality: TaskPriority::High,
    },
    PhaseEntry {
        phase: MissionPhase::StageSeparation,
        start_time: 120.0,
        duration: 5.0,
        description: "Stage separation",
        criticality: TaskPriority::High,
    },
    PhaseEntry {
        phase: MissionPhase::OrbitInsertion,
        start_time: 125.0,
        duration: 355.0,
        description: "Orbit insertion burn",
        criticality: TaskPriority::High,
    },
    PhaseEntry {
        phase: MissionPhase::MissionComplete,
        start_time: 480.0,
        duration: 0.0,
        description: "Mission complete",
        criticality: TaskPriority::Normal,
    },
];

/// First table entry containing `mission_time`, if any.
pub fn phase_entry_for(mission_time: f64) -> Option<&'static PhaseEntry> {
    DEFAULT_MISSION_PHASES.iter().find(|e| e.contains(mission_time))
}

/// Tracks mission time and the current phase, emitting one status message
/// per phase change.
#[derive(Debug)]
pub struct PhaseScheduler {
    mission_time: f64,
    elapsed_ms: u64,
    current_phase: MissionPhase,
    system_state: SystemState,
    last_broadcast: MissionPhase,
}

impl PhaseScheduler {
    pub fn new(start_time: f64) -> Self {
        Self {
            mission_time: start_time,
            elapsed_ms: 0,
            // Unknown until the first tick so the initial phase broadcasts.
            current_phase: MissionPhase::Unknown,
            system_state: SystemState::Active,
            last_broadcast: MissionPhase::Unknown,
        }
    }

    pub fn mission_time(&self) -> f64 {
        self.mission_time
    }

    pub fn current_phase(&self) -> MissionPhase {
        self.current_phase
    }

    pub fn system_state(&self) -> SystemState {
        self.system_state
    }

    /// Advance the mission clock and return a status message if the phase
    /// changed this tick.
    pub fn tick(&mut self, dt: f64) -> Option<StatusMessage> {
        self.mission_time += dt;
        self.elapsed_ms += (dt * 1000.0) as u64;

        // Abort latches; the table never takes over again.
        if self.current_phase == MissionPhase::Abort {
            return None;
        }

        let entry = phase_entry_for(self.mission_time)?;
        if entry.phase == self.current_phase {
            return None;
        }

        self.current_phase = entry.phase;
        if self.current_phase == self.last_broadcast {
            return None;
        }
        self.last_broadcast = self.current_phase;
        info!(
            phase = entry.phase.name(),
            mission_time = self.mission_time,
            "mission phase change"
        );
        Some(StatusMessage {
            source: SubsystemId::FlightControl,
            state: self.system_state,
            phase: self.current_phase,
            priority: TaskPriority::High,
            error_code: 0,
            message: entry.description.to_string(),
            timestamp_ms: self.elapsed_ms,
        })
    }

    /// Enter the abort phase. This is the only path into ABORT; there is no
    /// path out.
    pub fn request_abort(&mut self) {
        if self.current_phase == MissionPhase::Abort {
            return;
        }
        self.current_phase = MissionPhase::Abort;
        self.last_broadcast = MissionPhase::Abort;
        self.system_state = SystemState::Emergency;
        info!(mission_time = self.mission_time, "abort requested, mission phase ABORT");
    }
}

impl Default for PhaseScheduler {
    fn default() -> Self {
        Self::new(MISSION_START_TIME_S)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_broadcasts_prelaunch() {
        let mut scheduler = PhaseScheduler::default();
        let status = scheduler.tick(0.01).expect("initial phase broadcast");
        assert_eq!(status.phase, MissionPhase::Prelaunch);
        assert_eq!(status.priority, TaskPriority::High);
        // Same phase next tick: no new broadcast.
        assert!(scheduler.tick(0.01).is_none());
    }

    #[test]
    fn test_phase_boundaries_are_half_open() {
        // Window start belongs to the window.
        assert_eq!(
            phase_entry_for(-6.0).map(|e| e.phase),
            Some(MissionPhase::Ignition)
        );
        // Window end belongs to the next window.
        assert_eq!(
            phase_entry_for(0.0).map(|e| e.phase),
            Some(MissionPhase::Liftoff)
        );
        assert_eq!(
            phase_entry_for(10.0).map(|e| e.phase),
            Some(MissionPhase::Ascent)
        );
        assert_eq!(
            phase_entry_for(125.0).map(|e| e.phase),
            Some(MissionPhase::OrbitInsertion)
        );
    }

    #[test]
    fn test_ignition_selected_at_t_minus_six() {
        let mut scheduler = PhaseScheduler::new(-10.0);
        let mut last = None;
        // 16 ticks of 0.25 s land exactly on -6.0.
        for _ in 0..16 {
            if let Some(status) = scheduler.tick(0.25) {
                last = Some(status.phase);
            }
        }
        assert_eq!(scheduler.mission_time(), -6.0);
        assert_eq!(scheduler.current_phase(), MissionPhase::Ignition);
        assert_eq!(last, Some(MissionPhase::Ignition));
    }

    #[test]
    fn test_zero_duration_final_entry_never_matches() {
        assert!(phase_entry_for(480.0).is_none());
        assert!(phase_entry_for(1000.0).is_none());

        // Past the table the phase holds its last value.
        let mut scheduler = PhaseScheduler::new(479.5);
        scheduler.tick(0.25); // 479.75 -> OrbitInsertion
        assert_eq!(scheduler.current_phase(), MissionPhase::OrbitInsertion);
        scheduler.tick(0.25); // 480.0 -> gap
        scheduler.tick(100.0);
        assert_eq!(scheduler.current_phase(), MissionPhase::OrbitInsertion);
    }

    #[test]
    fn test_one_broadcast_per_change() {
        let mut scheduler = PhaseScheduler::new(-0.5);
        let mut broadcasts = 0;
        // -0.5 .. 12.0 crosses Ignition -> Liftoff -> Ascent.
        for _ in 0..50 {
            if scheduler.tick(0.25).is_some() {
                broadcasts += 1;
            }
        }
        assert_eq!(broadcasts, 3);
        assert_eq!(scheduler.current_phase(), MissionPhase::Ascent);
    }

    #[test]
    fn test_abort_latches() {
        let mut scheduler = PhaseScheduler::new(5.0);
        scheduler.tick(0.25);
        assert_eq!(scheduler.current_phase(), MissionPhase::Liftoff);

        scheduler.request_abort();
        assert_eq!(scheduler.current_phase(), MissionPhase::Abort);
        assert_eq!(scheduler.system_state(), SystemState::Emergency);

        // Table time still inside ASCENT, but abort holds.
        for _ in 0..100 {
            assert!(scheduler.tick(0.25).is_none());
        }
        assert_eq!(scheduler.current_phase(), MissionPhase::Abort);
    }

    #[test]
    fn test_powered_flight_phases() {
        assert!(MissionPhase::Liftoff.is_powered_flight());
        assert!(MissionPhase::OrbitInsertion.is_powered_flight());
        assert!(!MissionPhase::Ignition.is_powered_flight());
        assert!(!MissionPhase::Prelaunch.is_powered_flight());
        assert!(!MissionPhase::Abort.is_powered_flight());
    }
}

//! Periodic task scheduling for the vehicle subsystems.
//!
//! Each subsystem runs on its own thread at a fixed rate from the default
//! task table. The loop does one unit of work per period and sleeps the
//! remainder; an overrun is reported and the next period starts immediately
//! with no catch-up. Priorities are advisory tags carried in the config and
//! surfaced in logs; the host scheduler is not manipulated.

use crate::bus::SubsystemId;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskPriority {
    Low = 10,
    Normal = 20,
    High = 30,
    Critical = 40,
    Emergency = 50,
}

impl TaskPriority {
    pub fn level(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TaskConfig {
    pub subsystem: SubsystemId,
    pub name: &'static str,
    pub priority: TaskPriority,
    pub update_rate_hz: u32,
}

impl TaskConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.update_rate_hz))
    }
}

pub const DEFAULT_TASK_CONFIGS: [TaskConfig; 8] = [
    TaskConfig {
        subsystem: SubsystemId::FlightControl,
        name: "flight-control",
        priority: TaskPriority::Critical,
        update_rate_hz: 100,
    },
    TaskConfig {
        subsystem: SubsystemId::EngineControl,
        name: "engine-control",
        priority: TaskPriority::Critical,
        update_rate_hz: 50,
    },
    TaskConfig {
        subsystem: SubsystemId::Telemetry,
        name: "telemetry",
        priority: TaskPriority::High,
        update_rate_hz: 10,
    },
    TaskConfig {
        subsystem: SubsystemId::Environmental,
        name: "environmental",
        priority: TaskPriority::Normal,
        update_rate_hz: 5,
    },
    TaskConfig {
        subsystem: SubsystemId::GroundSupport,
        name: "ground-support",
        priority: TaskPriority::Normal,
        update_rate_hz: 1,
    },
    TaskConfig {
        subsystem: SubsystemId::Navigation,
        name: "navigation",
        priority: TaskPriority::High,
        update_rate_hz: 20,
    },
    TaskConfig {
        subsystem: SubsystemId::Power,
        name: "power",
        priority: TaskPriority::High,
        update_rate_hz: 10,
    },
    TaskConfig {
        subsystem: SubsystemId::Thermal,
        name: "thermal",
        priority: TaskPriority::Normal,
        update_rate_hz: 2,
    },
];

pub fn task_config_for(subsystem: SubsystemId) -> Option<TaskConfig> {
    DEFAULT_TASK_CONFIGS
        .iter()
        .copied()
        .find(|c| c.subsystem == subsystem)
}

/// One unit of periodic work. `dt` is the measured time since the previous
/// period started, in seconds.
pub trait PeriodicTask {
    fn run_period(&mut self, dt: f64);
}

/// Drive a task at its configured rate until the shutdown flag is raised.
///
/// The flag is checked once per period, so shutdown latency is bounded by
/// one period.
pub fn run_periodic<T: PeriodicTask>(mut task: T, config: TaskConfig, shutdown: Arc<AtomicBool>) {
    let period = config.period();
    info!(
        task = config.name,
        priority = config.priority.level(),
        rate_hz = config.update_rate_hz,
        "periodic task started"
    );

    let mut last_start = Instant::now();
    while !shutdown.load(Ordering::Relaxed) {
        let start = Instant::now();
        let dt = start.duration_since(last_start).as_secs_f64();
        last_start = start;

        task.run_period(dt);

        let elapsed = start.elapsed();
        if elapsed > period {
            warn!(
                task = config.name,
                overrun_us = (elapsed - period).as_micros() as u64,
                "task period overrun"
            );
            // No catch-up; the next period starts from now.
        } else {
            thread::sleep(period - elapsed);
        }
    }

    info!(task = config.name, "periodic task stopped");
}

/// Spawn `run_periodic` on a thread named after the task.
pub fn spawn_periodic<T>(
    task: T,
    config: TaskConfig,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>>
where
    T: PeriodicTask + Send + 'static,
{
    thread::Builder::new()
        .name(config.name.into())
        .spawn(move || run_periodic(task, config, shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct CountingTask {
        periods: Arc<AtomicU32>,
        last_dt: Arc<std::sync::Mutex<f64>>,
    }

    impl PeriodicTask for CountingTask {
        fn run_period(&mut self, dt: f64) {
            self.periods.fetch_add(1, Ordering::Relaxed);
            *self.last_dt.lock().unwrap() = dt;
        }
    }

    fn test_config(rate_hz: u32) -> TaskConfig {
        TaskConfig {
            subsystem: SubsystemId::Navigation,
            name: "test-task",
            priority: TaskPriority::Normal,
            update_rate_hz: rate_hz,
        }
    }

    #[test]
    fn test_priority_levels() {
        assert_eq!(TaskPriority::Low.level(), 10);
        assert_eq!(TaskPriority::Emergency.level(), 50);
        assert!(TaskPriority::Critical > TaskPriority::High);
    }

    #[test]
    fn test_default_table_covers_all_subsystems() {
        for id in SubsystemId::ALL {
            assert!(task_config_for(id).is_some(), "missing config for {id:?}");
        }
        let flight = task_config_for(SubsystemId::FlightControl).unwrap();
        assert_eq!(flight.update_rate_hz, 100);
        assert_eq!(flight.priority, TaskPriority::Critical);
    }

    #[test]
    fn test_period_from_rate() {
        assert_eq!(test_config(100).period(), Duration::from_millis(10));
        assert_eq!(test_config(10).period(), Duration::from_millis(100));
    }

    #[test]
    fn test_task_runs_until_shutdown() {
        let periods = Arc::new(AtomicU32::new(0));
        let last_dt = Arc::new(std::sync::Mutex::new(0.0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let task = CountingTask {
            periods: Arc::clone(&periods),
            last_dt: Arc::clone(&last_dt),
        };
        let handle = spawn_periodic(task, test_config(100), Arc::clone(&shutdown)).unwrap();

        thread::sleep(Duration::from_millis(100));
        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();

        let count = periods.load(Ordering::Relaxed);
        assert!(count >= 2, "expected multiple periods, got {count}");
        // dt tracks the actual period, not the ideal one.
        assert!(*last_dt.lock().unwrap() >= 0.0);
    }

    #[test]
    fn test_shutdown_before_start_runs_nothing() {
        let periods = Arc::new(AtomicU32::new(0));
        let shutdown = Arc::new(AtomicBool::new(true));

        let task = CountingTask {
            periods: Arc::clone(&periods),
            last_dt: Arc::new(std::sync::Mutex::new(0.0)),
        };
        run_periodic(task, test_config(100), shutdown);
        assert_eq!(periods.load(Ordering::Relaxed), 0);
    }
}

//! Mission command channel.
//!
//! A single receiver loop owns all mutation of the mission command state.
//! Clients send commands over a bounded-protocol channel (numeric codes with
//! a single integer payload) and synchronously receive a reply reflecting
//! the state after the command was applied. A periodic wake signal shares
//! the channel but carries no state change and is never replied to.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

// Wire command codes.
pub const CMD_STATUS: i32 = 1;
pub const CMD_GO: i32 = 2;
pub const CMD_NOGO: i32 = 3;
pub const CMD_ABORT: i32 = 4;
pub const CMD_SET_THROTTLE: i32 = 5;
/// Periodic wake signal; not a command.
pub const WAKE_PULSE_CODE: i32 = 100;

pub const THROTTLE_MIN: i32 = 0;
pub const THROTTLE_MAX: i32 = 100;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("command channel closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    Status,
    Go,
    NoGo,
    Abort,
    SetThrottle,
}

impl CommandKind {
    pub fn code(self) -> i32 {
        match self {
            CommandKind::Status => CMD_STATUS,
            CommandKind::Go => CMD_GO,
            CommandKind::NoGo => CMD_NOGO,
            CommandKind::Abort => CMD_ABORT,
            CommandKind::SetThrottle => CMD_SET_THROTTLE,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            CMD_STATUS => Some(CommandKind::Status),
            CMD_GO => Some(CommandKind::Go),
            CMD_NOGO => Some(CommandKind::NoGo),
            CMD_ABORT => Some(CommandKind::Abort),
            CMD_SET_THROTTLE => Some(CommandKind::SetThrottle),
            _ => None,
        }
    }
}

/// Raw command as it arrives on the channel. The code is kept as-is so
/// unknown codes reach the handler and are rejected there.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CommandRequest {
    pub code: i32,
    pub value: i32,
}

impl CommandRequest {
    pub fn status() -> Self {
        Self { code: CMD_STATUS, value: 0 }
    }

    pub fn go() -> Self {
        Self { code: CMD_GO, value: 0 }
    }

    pub fn nogo() -> Self {
        Self { code: CMD_NOGO, value: 0 }
    }

    pub fn abort() -> Self {
        Self { code: CMD_ABORT, value: 0 }
    }

    pub fn set_throttle(percent: i32) -> Self {
        Self { code: CMD_SET_THROTTLE, value: percent }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    pub ok: bool,
    pub mission_go: bool,
    pub throttle: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandSnapshot {
    pub mission_go: bool,
    pub throttle: i32,
    pub abort_requested: bool,
}

/// Shared mission command state. Mutation happens only through
/// [`MissionCommandState::apply`], called by the command service loop.
#[derive(Debug, Default)]
pub struct MissionCommandState {
    inner: Mutex<CommandSnapshot>,
}

impl MissionCommandState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CommandSnapshot {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn mission_go(&self) -> bool {
        self.snapshot().mission_go
    }

    pub fn throttle(&self) -> i32 {
        self.snapshot().throttle
    }

    pub fn abort_requested(&self) -> bool {
        self.snapshot().abort_requested
    }

    /// Apply one command and return the post-apply reply.
    pub fn apply(&self, req: CommandRequest) -> CommandReply {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut ok = true;
        match req.code {
            CMD_STATUS => {}
            CMD_GO => {
                state.mission_go = true;
                state.abort_requested = false;
            }
            CMD_NOGO => {
                state.mission_go = false;
            }
            CMD_ABORT => {
                state.abort_requested = true;
                state.mission_go = false;
            }
            CMD_SET_THROTTLE => {
                state.throttle = req.value.clamp(THROTTLE_MIN, THROTTLE_MAX);
            }
            unknown => {
                warn!(code = unknown, "rejected unknown command code");
                ok = false;
            }
        }
        CommandReply {
            ok,
            mission_go: state.mission_go,
            throttle: state.throttle,
        }
    }
}

#[derive(Debug)]
enum ChannelMsg {
    Command {
        req: CommandRequest,
        reply_tx: Sender<CommandReply>,
    },
    Wake,
    Shutdown,
}

/// Cloneable sending endpoint of the command channel.
#[derive(Clone)]
pub struct CommandClient {
    tx: Sender<ChannelMsg>,
}

impl CommandClient {
    /// Send a command and wait for the reply.
    pub fn send(&self, req: CommandRequest) -> Result<CommandReply, ChannelError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(ChannelMsg::Command { req, reply_tx })
            .map_err(|_| ChannelError::Closed)?;
        reply_rx.recv().map_err(|_| ChannelError::Closed)
    }

    /// Deliver one wake signal. No reply.
    pub fn wake(&self) -> Result<(), ChannelError> {
        self.tx.send(ChannelMsg::Wake).map_err(|_| ChannelError::Closed)
    }

    /// Ask the service loop to exit after draining in-flight messages.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ChannelMsg::Shutdown);
    }
}

/// Receiver loop that owns command-state mutation.
pub struct CommandService {
    rx: Receiver<ChannelMsg>,
    state: Arc<MissionCommandState>,
    wake_count: Arc<AtomicU64>,
}

impl CommandService {
    pub fn new(state: Arc<MissionCommandState>) -> (Self, CommandClient) {
        let (tx, rx) = mpsc::channel();
        let service = Self {
            rx,
            state,
            wake_count: Arc::new(AtomicU64::new(0)),
        };
        (service, CommandClient { tx })
    }

    /// Wake signals observed so far. Handle stays valid after `run` starts.
    pub fn wake_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.wake_count)
    }

    /// Process messages until shutdown is requested or all clients are gone.
    pub fn run(self) {
        info!("command service started");
        loop {
            match self.rx.recv() {
                Ok(ChannelMsg::Command { req, reply_tx }) => {
                    let reply = self.state.apply(req);
                    if reply_tx.send(reply).is_err() {
                        warn!(code = req.code, "command reply dropped by client");
                    }
                }
                Ok(ChannelMsg::Wake) => {
                    // Wake only marks the period; state untouched.
                    self.wake_count.fetch_add(1, Ordering::Relaxed);
                }
                Ok(ChannelMsg::Shutdown) | Err(_) => break,
            }
        }
        info!("command service stopped");
    }

    /// Spawn the service loop on its own thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("command-service".into())
            .spawn(move || self.run())
    }
}

/// Periodic wake-signal source. Exits when the channel closes.
pub fn spawn_wake_timer(
    client: CommandClient,
    period: Duration,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new().name("wake-timer".into()).spawn(move || {
        debug!(period_ms = period.as_millis() as u64, "wake timer started");
        loop {
            thread::sleep(period);
            if client.wake().is_err() {
                break;
            }
        }
        debug!("wake timer stopped");
    })
}

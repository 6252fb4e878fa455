//! Ground-admin text protocol.
//!
//! A line-oriented TCP server on the loopback interface. Each request is one
//! line of JSON-ish text; matching is done on quoted command tokens rather
//! than a full JSON parse, so field order and extra whitespace never matter.
//! Every response is a single JSON line with a fixed key order.
//!
//! The admin state is its own go/throttle pair, independent of the command
//! channel state used by the simulation loop.

use crate::command::{THROTTLE_MAX, THROTTLE_MIN};
use crate::config::{ADMIN_BIND_ADDR, ADMIN_PORT};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminState {
    pub mission_go: bool,
    pub throttle: i32,
}

impl Default for AdminState {
    fn default() -> Self {
        Self {
            mission_go: false,
            throttle: 0,
        }
    }
}

pub type SharedAdminState = Arc<Mutex<AdminState>>;

pub fn shared_state() -> SharedAdminState {
    Arc::new(Mutex::new(AdminState::default()))
}

/// Extract the first integer after the quoted `"value"` key, sign included.
fn parse_value(line: &str) -> Option<i32> {
    let idx = line.find("\"value\"")?;
    let rest = &line[idx + "\"value\"".len()..];
    let rest = rest.trim_start_matches(|c: char| c == ':' || c.is_whitespace());
    let mut end = 0;
    for (i, c) in rest.char_indices() {
        if c == '-' && i == 0 {
            end = i + 1;
        } else if c.is_ascii_digit() {
            end = i + 1;
        } else {
            break;
        }
    }
    rest[..end].parse().ok()
}

/// Process one request line and produce the response line.
///
/// Commands are recognized by quoted-token search in a fixed order, so a
/// request naming several commands resolves to the first match.
pub fn handle_line(line: &str, state: &Mutex<AdminState>) -> String {
    let mut st = state.lock().unwrap_or_else(|e| e.into_inner());

    if line.contains("\"status\"") {
        return format!(
            "{{\"type\":\"status\",\"go\":{},\"throttle\":{}}}\n",
            st.mission_go, st.throttle
        );
    }
    if line.contains("\"go\"") {
        st.mission_go = true;
        info!("admin: mission GO");
        return "{\"type\":\"ack\",\"cmd\":\"go\"}\n".to_string();
    }
    if line.contains("\"nogo\"") {
        st.mission_go = false;
        info!("admin: mission NOGO");
        return "{\"type\":\"ack\",\"cmd\":\"nogo\"}\n".to_string();
    }
    if line.contains("\"abort\"") {
        st.mission_go = false;
        st.throttle = 0;
        warn!("admin: ABORT");
        return "{\"type\":\"ack\",\"cmd\":\"abort\"}\n".to_string();
    }
    if line.contains("\"set_throttle\"") {
        let Some(value) = parse_value(line) else {
            return "{\"type\":\"error\",\"msg\":\"missing value\"}\n".to_string();
        };
        st.throttle = value.clamp(THROTTLE_MIN, THROTTLE_MAX);
        info!(throttle = st.throttle, "admin: set throttle");
        return format!(
            "{{\"type\":\"ack\",\"cmd\":\"set_throttle\",\"value\":{}}}\n",
            st.throttle
        );
    }

    "{\"type\":\"error\",\"msg\":\"unknown cmd\"}\n".to_string()
}

async fn serve_client(stream: TcpStream, state: SharedAdminState) {
    let peer = stream.peer_addr().ok();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let response = handle_line(&line, &state);
                if let Err(e) = write_half.write_all(response.as_bytes()).await {
                    warn!(?peer, error = %e, "admin write failed");
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(?peer, error = %e, "admin read failed");
                break;
            }
        }
    }
    info!(?peer, "admin client disconnected");
}

/// Accept-loop over an already-bound listener.
pub async fn serve_on(listener: TcpListener, state: SharedAdminState) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "admin client connected");
        let state = Arc::clone(&state);
        tokio::spawn(serve_client(stream, state));
    }
}

/// Run the admin server until the task is dropped. Binding failure is
/// reported to the caller; the rest of the system keeps running without
/// the admin interface.
pub async fn serve(addr: &str, state: SharedAdminState) -> std::io::Result<()> {
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr, error = %e, "admin server failed to bind");
            return Err(e);
        }
    };
    info!(addr, "admin server listening");
    serve_on(listener, state).await
}

pub fn default_addr() -> String {
    format!("{ADMIN_BIND_ADDR}:{ADMIN_PORT}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> Mutex<AdminState> {
        Mutex::new(AdminState::default())
    }

    #[test]
    fn test_status_reflects_state_without_mutation() {
        let st = state();
        assert_eq!(
            handle_line("{\"cmd\":\"status\"}", &st),
            "{\"type\":\"status\",\"go\":false,\"throttle\":0}\n"
        );
        // Repeated status never changes anything.
        assert_eq!(
            handle_line("{\"cmd\":\"status\"}", &st),
            "{\"type\":\"status\",\"go\":false,\"throttle\":0}\n"
        );
    }

    #[test]
    fn test_go_and_nogo() {
        let st = state();
        assert_eq!(
            handle_line("{\"cmd\":\"go\"}", &st),
            "{\"type\":\"ack\",\"cmd\":\"go\"}\n"
        );
        assert!(st.lock().unwrap().mission_go);

        // "nogo" contains "go" as a substring, but quoted-token matching
        // keeps the two apart.
        assert_eq!(
            handle_line("{\"cmd\":\"nogo\"}", &st),
            "{\"type\":\"ack\",\"cmd\":\"nogo\"}\n"
        );
        assert!(!st.lock().unwrap().mission_go);
    }

    #[test]
    fn test_set_throttle_clamps_high_and_low() {
        let st = state();
        assert_eq!(
            handle_line("{\"cmd\":\"set_throttle\",\"value\":150}", &st),
            "{\"type\":\"ack\",\"cmd\":\"set_throttle\",\"value\":100}\n"
        );
        assert_eq!(st.lock().unwrap().throttle, 100);

        assert_eq!(
            handle_line("{\"cmd\":\"set_throttle\",\"value\":-20}", &st),
            "{\"type\":\"ack\",\"cmd\":\"set_throttle\",\"value\":0}\n"
        );
        assert_eq!(st.lock().unwrap().throttle, 0);

        assert_eq!(
            handle_line("{\"cmd\":\"set_throttle\",\"value\":80}", &st),
            "{\"type\":\"ack\",\"cmd\":\"set_throttle\",\"value\":80}\n"
        );
    }

    #[test]
    fn test_set_throttle_missing_value() {
        let st = state();
        assert_eq!(
            handle_line("{\"cmd\":\"set_throttle\"}", &st),
            "{\"type\":\"error\",\"msg\":\"missing value\"}\n"
        );
    }

    #[test]
    fn test_abort_clears_go_and_throttle() {
        let st = state();
        handle_line("{\"cmd\":\"go\"}", &st);
        handle_line("{\"cmd\":\"set_throttle\",\"value\":90}", &st);

        assert_eq!(
            handle_line("{\"cmd\":\"abort\"}", &st),
            "{\"type\":\"ack\",\"cmd\":\"abort\"}\n"
        );
        let snapshot = *st.lock().unwrap();
        assert!(!snapshot.mission_go);
        assert_eq!(snapshot.throttle, 0);
    }

    #[test]
    fn test_unknown_command() {
        let st = state();
        assert_eq!(
            handle_line("{\"cmd\":\"launch\"}", &st),
            "{\"type\":\"error\",\"msg\":\"unknown cmd\"}\n"
        );
        assert_eq!(
            handle_line("garbage", &st),
            "{\"type\":\"error\",\"msg\":\"unknown cmd\"}\n"
        );
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let st = state();
        assert_eq!(
            handle_line("{\"value\": 70, \"cmd\": \"set_throttle\"}", &st),
            "{\"type\":\"ack\",\"cmd\":\"set_throttle\",\"value\":70}\n"
        );
    }
}

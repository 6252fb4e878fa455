//! End-to-end admin protocol tests over a real TCP socket.

use lvbus::admin::{self, SharedAdminState};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

async fn start_server() -> (String, SharedAdminState) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr").to_string();
    let state = admin::shared_state();
    let server_state = state.clone();
    tokio::spawn(async move {
        let _ = admin::serve_on(listener, server_state).await;
    });
    (addr, state)
}

async fn roundtrip(addr: &str, request: &str) -> String {
    let stream = TcpStream::connect(addr).await.expect("connect");
    let (read_half, mut write_half) = stream.into_split();
    write_half
        .write_all(format!("{request}\n").as_bytes())
        .await
        .expect("write request");

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    reader.read_line(&mut line).await.expect("read response");
    line
}

#[tokio::test]
async fn test_throttle_clamped_end_to_end() {
    let (addr, _state) = start_server().await;
    let response = roundtrip(&addr, "{\"cmd\":\"set_throttle\",\"value\":150}").await;
    assert_eq!(
        response,
        "{\"type\":\"ack\",\"cmd\":\"set_throttle\",\"value\":100}\n"
    );
}

#[tokio::test]
async fn test_go_status_abort_sequence() {
    let (addr, _state) = start_server().await;

    assert_eq!(
        roundtrip(&addr, "{\"cmd\":\"go\"}").await,
        "{\"type\":\"ack\",\"cmd\":\"go\"}\n"
    );
    assert_eq!(
        roundtrip(&addr, "{\"cmd\":\"set_throttle\",\"value\":85}").await,
        "{\"type\":\"ack\",\"cmd\":\"set_throttle\",\"value\":85}\n"
    );
    assert_eq!(
        roundtrip(&addr, "{\"cmd\":\"status\"}").await,
        "{\"type\":\"status\",\"go\":true,\"throttle\":85}\n"
    );

    assert_eq!(
        roundtrip(&addr, "{\"cmd\":\"abort\"}").await,
        "{\"type\":\"ack\",\"cmd\":\"abort\"}\n"
    );
    assert_eq!(
        roundtrip(&addr, "{\"cmd\":\"status\"}").await,
        "{\"type\":\"status\",\"go\":false,\"throttle\":0}\n"
    );
}

#[tokio::test]
async fn test_error_responses() {
    let (addr, _state) = start_server().await;

    assert_eq!(
        roundtrip(&addr, "{\"cmd\":\"set_throttle\"}").await,
        "{\"type\":\"error\",\"msg\":\"missing value\"}\n"
    );
    assert_eq!(
        roundtrip(&addr, "{\"cmd\":\"selfdestruct\"}").await,
        "{\"type\":\"error\",\"msg\":\"unknown cmd\"}\n"
    );
}

#[tokio::test]
async fn test_one_connection_many_requests() {
    let (addr, _state) = start_server().await;

    let stream = TcpStream::connect(&addr).await.expect("connect");
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let script = [
        ("{\"cmd\":\"nogo\"}", "{\"type\":\"ack\",\"cmd\":\"nogo\"}\n"),
        ("{\"cmd\":\"go\"}", "{\"type\":\"ack\",\"cmd\":\"go\"}\n"),
        (
            "{\"cmd\":\"status\"}",
            "{\"type\":\"status\",\"go\":true,\"throttle\":0}\n",
        ),
    ];
    for (request, expected) in script {
        write_half
            .write_all(format!("{request}\n").as_bytes())
            .await
            .expect("write");
        let mut line = String::new();
        reader.read_line(&mut line).await.expect("read");
        assert_eq!(line, expected);
    }
}

#[tokio::test]
async fn test_admin_state_is_not_the_command_channel_state() {
    let (addr, admin_state) = start_server().await;
    let mission_state = lvbus::MissionCommandState::new();

    roundtrip(&addr, "{\"cmd\":\"go\"}").await;
    roundtrip(&addr, "{\"cmd\":\"set_throttle\",\"value\":70}").await;

    // Admin side moved; the channel-side binding is untouched.
    assert!(admin_state.lock().unwrap().mission_go);
    assert!(!mission_state.mission_go());
    assert_eq!(mission_state.throttle(), 0);
}

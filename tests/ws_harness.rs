use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use sio_client::socket::client::{SocketConfig, SocketIoClient};
use sio_client::transport::ws::WebSocketTransport;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::time::timeout;

const JOIN_ACK: &str = "40{\"sid\":\"mock-session\"}";
const SERVER_EVENT: &str = "42[\"broadcast\",\"price-update\"]";
const ENGINE_PING: &str = "2mock-ping";
const EXPECTED_PONG: &str = "3mock-ping";
const EXPECTED_JOIN: &str = "40/";
const CLIENT_EVENT: &str = "42[\"greet\",\"from-client\"]";

#[derive(Debug)]
struct WsObserved {
    probe: String,
    upgrade: String,
    join: String,
    pong: String,
    event: String,
}

#[derive(Clone)]
struct ExchangeState {
    observed_tx: Arc<AsyncMutex<Option<oneshot::Sender<Result<WsObserved, String>>>>>,
}

#[derive(Clone)]
struct CloseState {
    observed_tx: Arc<AsyncMutex<Option<oneshot::Sender<Result<(), String>>>>>,
}

// The client under test is synchronous, so each test keeps the mock server on
// its own runtime and drives the client from the test thread.
#[test]
fn websocket_client_connects_joins_and_exchanges_events() {
    let rt = Runtime::new().expect("build mock server runtime");
    let (observed_tx, observed_rx) = oneshot::channel();
    let state = ExchangeState {
        observed_tx: Arc::new(AsyncMutex::new(Some(observed_tx))),
    };
    let app = Router::new()
        .route("/socket.io/", get(exchange_handler))
        .with_state(state);
    let (addr, shutdown_tx, server_task) = spawn_server(&rt, app);

    let broadcast_body = Arc::new(Mutex::new(Option::<String>::None));
    let seen = broadcast_body.clone();
    let mut client = SocketIoClient::websocket();
    client.on("broadcast", move |body| {
        *seen.lock().unwrap() = Some(body.to_string());
    });
    client
        .begin(SocketConfig::new("127.0.0.1", addr.port()))
        .expect("connect to the mock server");

    assert!(
        drive_until(&mut client, Duration::from_secs(2), |client| client
            .is_joined()),
        "client never joined the namespace"
    );
    assert!(client.emit("greet", "from-client"));
    assert!(
        drive_until(&mut client, Duration::from_secs(2), |client| {
            client.pending_packets() == 0 && broadcast_body.lock().unwrap().is_some()
        }),
        "client never finished the event exchange"
    );

    let observed = rt.block_on(async {
        timeout(Duration::from_secs(2), observed_rx)
            .await
            .expect("timed out waiting for mock server observations")
            .expect("observation channel closed")
            .expect("mock server protocol assertions failed")
    });
    assert_eq!(observed.probe, "2probe");
    assert_eq!(observed.upgrade, "5");
    assert_eq!(observed.join, EXPECTED_JOIN);
    assert_eq!(observed.pong, EXPECTED_PONG);
    assert_eq!(observed.event, CLIENT_EVENT);
    assert_eq!(
        broadcast_body.lock().unwrap().as_deref(),
        Some("price-update")
    );

    let _ = shutdown_tx.send(());
    rt.block_on(server_task)
        .expect("mock ws server task should join");
}

#[test]
fn server_close_tears_the_session_down() {
    let rt = Runtime::new().expect("build mock server runtime");
    let (observed_tx, observed_rx) = oneshot::channel();
    let state = CloseState {
        observed_tx: Arc::new(AsyncMutex::new(Some(observed_tx))),
    };
    let app = Router::new()
        .route("/socket.io/", get(close_handler))
        .with_state(state);
    let (addr, shutdown_tx, server_task) = spawn_server(&rt, app);

    let mut client = SocketIoClient::websocket();
    client
        .begin(SocketConfig::new("127.0.0.1", addr.port()))
        .expect("connect to the mock server");
    assert!(client.is_connected(), "transport should be up after begin");

    assert!(
        drive_until(&mut client, Duration::from_secs(2), |client| {
            !client.is_connected()
        }),
        "client never noticed the server close"
    );
    assert!(
        !client.is_joined(),
        "join flag should clear with the transport"
    );

    rt.block_on(async {
        timeout(Duration::from_secs(2), observed_rx)
            .await
            .expect("timed out waiting for mock server observations")
            .expect("observation channel closed")
            .expect("mock server protocol assertions failed")
    });

    let _ = shutdown_tx.send(());
    rt.block_on(server_task)
        .expect("mock ws server task should join");
}

fn drive_until(
    client: &mut SocketIoClient<WebSocketTransport>,
    deadline: Duration,
    mut done: impl FnMut(&mut SocketIoClient<WebSocketTransport>) -> bool,
) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        client.poll();
        if done(client) {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

async fn exchange_handler(
    State(state): State<ExchangeState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let observed_tx = state.observed_tx.clone();
    ws.on_upgrade(move |socket| async move {
        let result = run_exchange_protocol(socket).await;
        if let Some(tx) = observed_tx.lock().await.take() {
            let _ = tx.send(result);
        }
    })
}

async fn run_exchange_protocol(mut socket: WebSocket) -> Result<WsObserved, String> {
    let probe = recv_text(&mut socket).await?;
    let upgrade = recv_text(&mut socket).await?;
    let join = recv_text(&mut socket).await?;

    send_text(&mut socket, JOIN_ACK).await?;
    send_text(&mut socket, SERVER_EVENT).await?;
    send_text(&mut socket, ENGINE_PING).await?;

    // The pong echo and the emitted event can arrive in either order.
    let mut pong = None;
    let mut event = None;
    while pong.is_none() || event.is_none() {
        let frame = recv_text(&mut socket).await?;
        if frame.starts_with('3') {
            pong = Some(frame);
        } else if frame.starts_with("42") {
            event = Some(frame);
        } else {
            return Err(format!(
                "unexpected frame while waiting for the pong and the event: {frame}"
            ));
        }
    }
    let (Some(pong), Some(event)) = (pong, event) else {
        return Err("frame collection loop exited early".to_string());
    };

    Ok(WsObserved {
        probe,
        upgrade,
        join,
        pong,
        event,
    })
}

async fn close_handler(State(state): State<CloseState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let observed_tx = state.observed_tx.clone();
    ws.on_upgrade(move |socket| async move {
        let result = run_close_protocol(socket).await;
        if let Some(tx) = observed_tx.lock().await.take() {
            let _ = tx.send(result);
        }
    })
}

async fn run_close_protocol(mut socket: WebSocket) -> Result<(), String> {
    let probe = recv_text(&mut socket).await?;
    if probe != "2probe" {
        return Err(format!("expected the transport probe first, got {probe}"));
    }
    let upgrade = recv_text(&mut socket).await?;
    if upgrade != "5" {
        return Err(format!("expected the upgrade frame second, got {upgrade}"));
    }
    let join = recv_text(&mut socket).await?;
    if join != EXPECTED_JOIN {
        return Err(format!("expected the namespace join third, got {join}"));
    }

    send_text(&mut socket, JOIN_ACK).await?;
    socket
        .send(Message::Close(None))
        .await
        .map_err(|err| format!("failed to close the socket: {err}"))
}

async fn recv_text(socket: &mut WebSocket) -> Result<String, String> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_string()),
            Some(Ok(Message::Ping(payload))) => {
                socket
                    .send(Message::Pong(payload))
                    .await
                    .map_err(|err| format!("failed to send pong: {err}"))?;
            }
            Some(Ok(Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) => {
                return Err("websocket closed before expected frame".to_string());
            }
            Some(Ok(_)) => return Err("received unexpected non-text websocket frame".to_string()),
            Some(Err(err)) => return Err(format!("websocket receive error: {err}")),
            None => return Err("websocket stream ended unexpectedly".to_string()),
        }
    }
}

async fn send_text(socket: &mut WebSocket, frame: &str) -> Result<(), String> {
    socket
        .send(Message::Text(frame.to_string().into()))
        .await
        .map_err(|err| format!("failed to send {frame:?}: {err}"))
}

fn spawn_server(
    rt: &Runtime,
    app: Router,
) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let listener = rt.block_on(async {
        TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server listener")
    });
    let addr = listener
        .local_addr()
        .expect("read mock server listener address");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = rt.spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("mock server should run");
    });
    (addr, shutdown_tx, task)
}

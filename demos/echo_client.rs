//! Minimal plaintext session: join the default namespace, greet once, and
//! print every "broadcast" event the server pushes.
//!
//! Run against a local server with `cargo run --example echo_client`.

use std::thread;
use std::time::Duration;

use sio_client::socket::client::{SocketConfig, SocketIoClient};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut client = SocketIoClient::websocket();
    client.on("broadcast", |body| println!("broadcast: {body}"));

    client.begin(SocketConfig::new("127.0.0.1", 3000))?;

    let mut greeted = false;
    loop {
        client.poll();
        if client.is_joined() && !greeted {
            client.emit("greet", "hello from the tick loop");
            greeted = true;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

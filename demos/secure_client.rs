//! TLS session with an optional custom root CA.
//!
//! `cargo run --example secure_client -- <host> [port] [ca.pem]`
//! The raw packet callback prints everything the server sends, which makes
//! this handy for poking at an unfamiliar deployment.

use std::env;
use std::fs;
use std::thread;
use std::time::Duration;

use sio_client::socket::client::{SocketConfig, SocketIoClient};
use sio_client::transport::{TlsConfig, DEFAULT_TLS_PORT};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => DEFAULT_TLS_PORT,
    };
    let tls = match args.next() {
        Some(ca_path) => TlsConfig {
            root_ca_pem: Some(fs::read_to_string(ca_path)?),
            client_cert: None,
        },
        None => TlsConfig::default(),
    };

    let mut client = SocketIoClient::websocket();
    client.on_packet(|kind, payload| {
        println!("{kind:?}: {}", String::from_utf8_lossy(payload));
    });

    client.begin_secure(SocketConfig::new(host, port), tls)?;

    loop {
        client.poll();
        thread::sleep(Duration::from_millis(20));
    }
}

//! Registers a single "echo" procedure (program 0x2000_0001, version 1,
//! proc 1: doubles a `u32`) on a [`SyncServer`], calls it from a
//! [`SyncClient`] over a loopback TCP connection, and prints the result.
//!
//! Run with `cargo run --example echo`.

use std::net::TcpListener;
use std::sync::Arc;

use xdrpc::transport::{SyncClient, SyncServer};

const ECHO_PROG: u32 = 0x2000_0001;
const ECHO_VERS: u32 = 1;
const ECHO_DOUBLE: u32 = 1;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    let mut server = SyncServer::new();
    server.register(
        ECHO_PROG,
        ECHO_VERS,
        ECHO_DOUBLE,
        Box::new(|arg_bytes, max_depth| {
            let n: u32 = xdrpc::xdr::from_bytes_depth_checked(arg_bytes, max_depth)?;
            xdrpc::xdr::to_bytes(&(n * 2))
        }),
    );
    let server = Arc::new(server);
    std::thread::spawn(move || {
        if let Err(e) = server.run(&listener) {
            tracing::warn!("echo server exited: {e}");
        }
    });

    let mut client = SyncClient::connect(&addr.to_string(), &xdrpc::config::ClientConfig::default())?;
    let arg = 21u32;
    let result: u32 = client.invoke(ECHO_PROG, ECHO_VERS, ECHO_DOUBLE, &arg)?;
    println!("echo::double({arg}) = {result}");
    assert_eq!(result, arg * 2);
    Ok(())
}

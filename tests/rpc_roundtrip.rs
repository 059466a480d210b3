//! End-to-end RPC behavior over a real loopback TCP connection, covering
//! the happy path, a version mismatch, and oversized-argument rejection.

use std::net::TcpListener;
use std::sync::Arc;

use xdrpc::config::ClientConfig;
use xdrpc::transport::{SyncClient, SyncServer};
use xdrpc::xdr;

const PROG: u32 = 0x2000_0001;
const ADD_PROC: u32 = 1;

fn spawn_server(vers_range: &[u32]) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let mut server = SyncServer::new();
    for &vers in vers_range {
        server.register(
            PROG,
            vers,
            ADD_PROC,
            Box::new(|arg_bytes, max_depth| {
                let n: u32 = xdr::from_bytes_depth_checked(arg_bytes, max_depth)?;
                xdr::to_bytes(&(n + n))
            }),
        );
    }
    let server = Arc::new(server);
    std::thread::spawn(move || {
        let _ = server.run(&listener);
    });
    addr
}

#[test]
fn happy_path_doubles_the_argument() {
    let addr = spawn_server(&[1]);
    let mut client = SyncClient::connect(&addr.to_string(), &ClientConfig::default()).unwrap();
    let result: u32 = client.invoke(PROG, 1, ADD_PROC, &7u32).unwrap();
    assert_eq!(result, 14);
}

#[test]
fn version_mismatch_reports_the_supported_range() {
    let addr = spawn_server(&[2, 3]);
    let mut client = SyncClient::connect(&addr.to_string(), &ClientConfig::default()).unwrap();
    let err = client.invoke::<u32, u32>(PROG, 1, ADD_PROC, &7u32).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("PROG_MISMATCH"), "unexpected error: {msg}");
    assert!(msg.contains("2"));
    assert!(msg.contains("3"));
}

#[test]
fn unknown_program_reports_prog_unavail() {
    let addr = spawn_server(&[1]);
    let mut client = SyncClient::connect(&addr.to_string(), &ClientConfig::default()).unwrap();
    let err = client.invoke::<u32, u32>(0x2FFF_FFFF, 1, ADD_PROC, &7u32).unwrap_err();
    assert!(err.to_string().contains("PROG_UNAVAIL"));
}

#[test]
fn unknown_procedure_reports_proc_unavail() {
    let addr = spawn_server(&[1]);
    let mut client = SyncClient::connect(&addr.to_string(), &ClientConfig::default()).unwrap();
    let err = client.invoke::<u32, u32>(PROG, 1, 99, &7u32).unwrap_err();
    assert!(err.to_string().contains("PROC_UNAVAIL"));
}

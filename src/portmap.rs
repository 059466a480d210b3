//! rpcbind (RFC 5665, née "portmap") message shapes, `uaddr` parsing, and a
//! synchronous UDP client used by `crate::tcp`'s listener to register and
//! unregister itself. Grounded on `original_source/xdrpp/rpcbind.h`'s
//! `tcp_connect_rpc`/`rpcbind_register`/`parse_uaddr_port`/`make_uaddr`; the
//! teacher's own `portmap.rs` only described a fake portmapper *server* and
//! is not reused here — §4.H asks for a listener that can register with a
//! real rpcbind, which means a client, not a server stub.

#![allow(non_camel_case_types)]

use std::io::{Read, Write};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::rpc::{self, accept_body, reply_body, rpc_body};
use crate::xdr::XdrTraits;

pub const PROGRAM: u32 = 100000;
pub const VERSION: u32 = 2;
pub const IPPROTO_TCP: u32 = 6;
pub const IPPROTO_UDP: u32 = 17;

const PMAPPROC_SET: u32 = 1;
const PMAPPROC_UNSET: u32 = 2;
const PMAPPROC_GETPORT: u32 = 3;

const RPCBIND_PORT: u16 = 111;

/// `PMAPPROC_SET`/`UNSET`/`GETPORT`'s argument: (program, version,
/// transport protocol, port). On `GETPORT` the `port` field is ignored by
/// the server and the reply's `mapping.port` carries the answer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct mapping {
    pub prog: u32,
    pub vers: u32,
    pub prot: u32,
    pub port: u32,
}

impl XdrTraits for mapping {
    const TYPE_NAME: &'static str = "mapping";
    const FIXED_SIZE: Option<usize> = Some(16);

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        self.prog.marshal(out)?;
        self.vers.marshal(out)?;
        self.prot.marshal(out)?;
        self.port.marshal(out)
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        Ok(mapping {
            prog: u32::unmarshal(inp)?,
            vers: u32::unmarshal(inp)?,
            prot: u32::unmarshal(inp)?,
            port: u32::unmarshal(inp)?,
        })
    }
    fn depth(&self) -> usize {
        0
    }
    fn generate(gen: &mut crate::xdr::Generator) -> Self {
        mapping {
            prog: u32::generate(gen),
            vers: u32::generate(gen),
            prot: u32::generate(gen),
            port: u32::generate(gen),
        }
    }
}

/// Extracts the port number from an RFC 1833/5665 universal network
/// address of the form `host.phigh.plow`, where `port = phigh*256 + plow`.
pub fn parse_uaddr_port(uaddr: &str) -> Result<u16> {
    let mut parts = uaddr.rsplitn(3, '.');
    let plow: u16 = parts
        .next()
        .ok_or_else(|| Error::InvariantFailed(format!("malformed uaddr `{uaddr}`")))?
        .parse()
        .map_err(|_| Error::InvariantFailed(format!("malformed uaddr `{uaddr}`")))?;
    let phigh: u16 = parts
        .next()
        .ok_or_else(|| Error::InvariantFailed(format!("malformed uaddr `{uaddr}`")))?
        .parse()
        .map_err(|_| Error::InvariantFailed(format!("malformed uaddr `{uaddr}`")))?;
    Ok(phigh.wrapping_mul(256).wrapping_add(plow))
}

/// Builds a uaddr `host.phigh.plow` for `addr`.
pub fn make_uaddr(addr: SocketAddr) -> String {
    let port = addr.port();
    format!("{}.{}.{}", addr.ip(), port >> 8, port & 0xFF)
}

/// A synchronous rpcbind client over UDP, used only at listener bind/drop
/// time — not on the hot path, so a dedicated UDP round-trip per call
/// keeps this out of the reactor's way entirely.
pub struct RpcbindClient {
    sock: UdpSocket,
    next_xid: u32,
}

impl RpcbindClient {
    pub fn connect(host: &str) -> Result<Self> {
        let sock = UdpSocket::bind("0.0.0.0:0").map_err(|e| Error::system("UdpSocket::bind", e))?;
        sock.connect((host, RPCBIND_PORT))
            .map_err(|e| Error::system("UdpSocket::connect", e))?;
        sock.set_read_timeout(Some(Duration::from_secs(5)))
            .map_err(|e| Error::system("UdpSocket::set_read_timeout", e))?;
        Ok(RpcbindClient { sock, next_xid: 1 })
    }

    fn call(&mut self, proc_num: u32, arg: &mapping) -> Result<mapping> {
        let xid = self.next_xid;
        self.next_xid = self.next_xid.wrapping_add(1);
        let hdr = rpc::call_header(xid, PROGRAM, VERSION, proc_num);
        let mut buf = crate::xdr::to_bytes(&hdr)?;
        buf.extend(crate::xdr::to_bytes(arg)?);
        self.sock.send(&buf).map_err(|e| Error::system("UdpSocket::send", e))?;

        let mut recv_buf = [0u8; 1024];
        let n = self
            .sock
            .recv(&mut recv_buf)
            .map_err(|e| Error::system("UdpSocket::recv", e))?;
        let (reply, rest): (rpc::rpc_msg, usize) = crate::xdr::from_bytes_prefix(&recv_buf[..n])?;
        if reply.xid != xid {
            return Err(Error::CallError(format!(
                "rpcbind reply xid {} does not match call xid {xid}",
                reply.xid
            )));
        }
        match reply.body {
            rpc_body::Reply(reply_body::Accepted(accepted)) => match accepted.reply_data {
                accept_body::Success => {
                    mapping::unmarshal(&mut std::io::Cursor::new(&recv_buf[n - rest..n]))
                }
                other => Err(Error::CallError(format!("rpcbind call rejected: {other:?}"))),
            },
            rpc_body::Reply(reply_body::Denied(d)) => {
                Err(Error::CallError(format!("rpcbind call denied: {d:?}")))
            }
            rpc_body::Call(_) => Err(Error::CallError("rpcbind sent a CALL, not a REPLY".into())),
        }
    }

    /// `PMAPPROC_SET`: registers (program, version, TCP, port).
    pub fn set(&mut self, prog: u32, vers: u32, port: u16) -> Result<()> {
        self.call(PMAPPROC_SET, &mapping { prog, vers, prot: IPPROTO_TCP, port: port as u32 })?;
        Ok(())
    }

    /// `PMAPPROC_UNSET`: removes a registration for every protocol.
    pub fn unset(&mut self, prog: u32, vers: u32) -> Result<()> {
        self.call(PMAPPROC_UNSET, &mapping { prog, vers, prot: 0, port: 0 })?;
        Ok(())
    }

    /// `PMAPPROC_GETPORT`: asks where (program, version) over TCP listens.
    /// A `0` result means not registered.
    pub fn getport(&mut self, prog: u32, vers: u32) -> Result<u16> {
        let m = self.call(PMAPPROC_GETPORT, &mapping { prog, vers, prot: IPPROTO_TCP, port: 0 })?;
        Ok(m.port as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uaddr_round_trips_port() {
        let addr: SocketAddr = "10.0.0.1:2049".parse().unwrap();
        let uaddr = make_uaddr(addr);
        assert_eq!(parse_uaddr_port(&uaddr).unwrap(), 2049);
    }

    #[test]
    fn uaddr_handles_low_port() {
        assert_eq!(parse_uaddr_port("127.0.0.1.0.111").unwrap(), 111);
    }
}

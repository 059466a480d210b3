//! The ONC RPC (RFC 5531) message header types: `rpc_msg`, `call_body`,
//! `reply_body` and the accept/reject status unions. These are exactly the
//! kind of type the code generator (`crate::codegen`) would emit from an
//! `rpc_msg.x` input — hand-written here because this header is universal
//! to every RPC program rather than specific to one, the same way the
//! source keeps `rpc_msg.hh` as a single generated file shared by every
//! generated interface.
//!
//! Per §1, this type is consumed by the transport layer, not re-specified
//! beyond its wire shape: see `crate::transport` for the client/server code
//! that builds and interprets these headers.

#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use crate::error::Result;
use crate::xdr::XdrTraits;

pub const RPC_VERSION: u32 = 2;

/// Opaque authentication flavor carried in a call's credential/verifier.
/// Only `AUTH_NONE` is produced by this crate's own client (§1's
/// "AUTH_NONE in this codebase"), but the field is round-tripped generically
/// so a peer's credentials aren't silently discarded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum auth_flavor {
    AUTH_NONE = 0,
    AUTH_SYS = 1,
    AUTH_SHORT = 2,
    AUTH_DH = 3,
}

impl Default for auth_flavor {
    fn default() -> Self {
        auth_flavor::AUTH_NONE
    }
}

impl XdrTraits for auth_flavor {
    const TYPE_NAME: &'static str = "auth_flavor";
    const FIXED_SIZE: Option<usize> = Some(4);

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        (*self as u32).marshal(out)
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        let v = u32::unmarshal(inp)?;
        Ok(match v {
            1 => auth_flavor::AUTH_SYS,
            2 => auth_flavor::AUTH_SHORT,
            3 => auth_flavor::AUTH_DH,
            _ => auth_flavor::AUTH_NONE,
        })
    }
    fn depth(&self) -> usize {
        0
    }
    fn generate(_gen: &mut crate::xdr::Generator) -> Self {
        auth_flavor::AUTH_NONE
    }
}

/// `opaque_auth`: a flavor tag plus an opaque body, up to 400 bytes per
/// RFC 5531 section 8.2. This crate's own callers always send an empty
/// `AUTH_NONE` body; the bound exists to reject a malicious/garbled peer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct opaque_auth {
    pub flavor: auth_flavor,
    pub body: crate::xdr::Opaque<400>,
}

impl XdrTraits for opaque_auth {
    const TYPE_NAME: &'static str = "opaque_auth";

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        self.flavor.marshal(out)?;
        self.body.marshal(out)
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        Ok(opaque_auth {
            flavor: auth_flavor::unmarshal(inp)?,
            body: crate::xdr::Opaque::unmarshal(inp)?,
        })
    }
    fn depth(&self) -> usize {
        1
    }
    fn generate(gen: &mut crate::xdr::Generator) -> Self {
        opaque_auth {
            flavor: auth_flavor::generate(gen),
            body: crate::xdr::Opaque::generate(&mut gen.descend()),
        }
    }
}

/// Why a call was denied for authentication reasons (RFC 5531 section 7.2).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum auth_stat {
    #[default]
    AUTH_BADCRED = 1,
    AUTH_REJECTEDCRED = 2,
    AUTH_BADVERF = 3,
    AUTH_REJECTEDVERF = 4,
    AUTH_TOOWEAK = 5,
}

impl XdrTraits for auth_stat {
    const TYPE_NAME: &'static str = "auth_stat";
    const FIXED_SIZE: Option<usize> = Some(4);

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        (*self as u32).marshal(out)
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        let v = u32::unmarshal(inp)?;
        Ok(match v {
            2 => auth_stat::AUTH_REJECTEDCRED,
            3 => auth_stat::AUTH_BADVERF,
            4 => auth_stat::AUTH_REJECTEDVERF,
            5 => auth_stat::AUTH_TOOWEAK,
            _ => auth_stat::AUTH_BADCRED,
        })
    }
    fn depth(&self) -> usize {
        0
    }
    fn generate(_gen: &mut crate::xdr::Generator) -> Self {
        auth_stat::AUTH_BADCRED
    }
}

/// Why the server could not execute an accepted call (RFC 5531 section 7.1).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum accept_stat {
    #[default]
    SUCCESS = 0,
    PROG_UNAVAIL = 1,
    PROG_MISMATCH = 2,
    PROC_UNAVAIL = 3,
    GARBAGE_ARGS = 4,
    SYSTEM_ERR = 5,
}

impl accept_stat {
    fn from_u32(v: u32) -> Self {
        match v {
            1 => accept_stat::PROG_UNAVAIL,
            2 => accept_stat::PROG_MISMATCH,
            3 => accept_stat::PROC_UNAVAIL,
            4 => accept_stat::GARBAGE_ARGS,
            5 => accept_stat::SYSTEM_ERR,
            _ => accept_stat::SUCCESS,
        }
    }
}

/// The lowest/highest supported version numbers, carried on a
/// `PROG_MISMATCH`/`RPC_MISMATCH` reply.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct mismatch_info {
    pub low: u32,
    pub high: u32,
}

impl XdrTraits for mismatch_info {
    const TYPE_NAME: &'static str = "mismatch_info";
    const FIXED_SIZE: Option<usize> = Some(8);

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        self.low.marshal(out)?;
        self.high.marshal(out)
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        Ok(mismatch_info {
            low: u32::unmarshal(inp)?,
            high: u32::unmarshal(inp)?,
        })
    }
    fn depth(&self) -> usize {
        0
    }
    fn generate(gen: &mut crate::xdr::Generator) -> Self {
        mismatch_info {
            low: u32::generate(gen),
            high: u32::generate(gen),
        }
    }
}

/// Status plus payload of an accepted call: `SUCCESS`'s result bytes are
/// not part of this type (they follow in the stream, typed per-procedure);
/// only the non-`SUCCESS` arms carry a fixed payload here.
#[derive(Clone, Debug, PartialEq)]
pub enum accept_body {
    Success,
    ProgUnavail,
    ProgMismatch(mismatch_info),
    ProcUnavail,
    GarbageArgs,
    SystemErr,
}

impl Default for accept_body {
    fn default() -> Self {
        accept_body::Success
    }
}

impl accept_body {
    pub fn stat(&self) -> accept_stat {
        match self {
            accept_body::Success => accept_stat::SUCCESS,
            accept_body::ProgUnavail => accept_stat::PROG_UNAVAIL,
            accept_body::ProgMismatch(_) => accept_stat::PROG_MISMATCH,
            accept_body::ProcUnavail => accept_stat::PROC_UNAVAIL,
            accept_body::GarbageArgs => accept_stat::GARBAGE_ARGS,
            accept_body::SystemErr => accept_stat::SYSTEM_ERR,
        }
    }
}

impl XdrTraits for accept_body {
    const TYPE_NAME: &'static str = "accept_body";

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        (self.stat() as u32).marshal(out)?;
        if let accept_body::ProgMismatch(m) = self {
            m.marshal(out)?;
        }
        Ok(())
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        let stat = accept_stat::from_u32(u32::unmarshal(inp)?);
        Ok(match stat {
            accept_stat::SUCCESS => accept_body::Success,
            accept_stat::PROG_UNAVAIL => accept_body::ProgUnavail,
            accept_stat::PROG_MISMATCH => accept_body::ProgMismatch(mismatch_info::unmarshal(inp)?),
            accept_stat::PROC_UNAVAIL => accept_body::ProcUnavail,
            accept_stat::GARBAGE_ARGS => accept_body::GarbageArgs,
            accept_stat::SYSTEM_ERR => accept_body::SystemErr,
        })
    }
    fn depth(&self) -> usize {
        match self {
            accept_body::ProgMismatch(m) => 1 + m.depth(),
            _ => 0,
        }
    }
    fn generate(_gen: &mut crate::xdr::Generator) -> Self {
        accept_body::Success
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct accepted_reply {
    pub verf: opaque_auth,
    pub reply_data: accept_body,
}

impl Default for accepted_reply {
    fn default() -> Self {
        accepted_reply { verf: opaque_auth::default(), reply_data: accept_body::default() }
    }
}

impl XdrTraits for accepted_reply {
    const TYPE_NAME: &'static str = "accepted_reply";

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        self.verf.marshal(out)?;
        self.reply_data.marshal(out)
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        Ok(accepted_reply {
            verf: opaque_auth::unmarshal(inp)?,
            reply_data: accept_body::unmarshal(inp)?,
        })
    }
    fn depth(&self) -> usize {
        1 + self.verf.depth().max(self.reply_data.depth())
    }
    fn generate(gen: &mut crate::xdr::Generator) -> Self {
        accepted_reply {
            verf: opaque_auth::generate(&mut gen.descend()),
            reply_data: accept_body::generate(&mut gen.descend()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum rejected_reply {
    RpcMismatch(mismatch_info),
    AuthError(auth_stat),
}

impl Default for rejected_reply {
    fn default() -> Self {
        rejected_reply::RpcMismatch(mismatch_info::default())
    }
}

impl XdrTraits for rejected_reply {
    const TYPE_NAME: &'static str = "rejected_reply";

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        match self {
            rejected_reply::RpcMismatch(m) => {
                0u32.marshal(out)?;
                m.marshal(out)
            }
            rejected_reply::AuthError(a) => {
                1u32.marshal(out)?;
                a.marshal(out)
            }
        }
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        match u32::unmarshal(inp)? {
            0 => Ok(rejected_reply::RpcMismatch(mismatch_info::unmarshal(inp)?)),
            _ => Ok(rejected_reply::AuthError(auth_stat::unmarshal(inp)?)),
        }
    }
    fn depth(&self) -> usize {
        1
    }
    fn generate(_gen: &mut crate::xdr::Generator) -> Self {
        rejected_reply::RpcMismatch(mismatch_info::default())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum reply_body {
    Accepted(accepted_reply),
    Denied(rejected_reply),
}

impl Default for reply_body {
    fn default() -> Self {
        reply_body::Accepted(accepted_reply::default())
    }
}

impl XdrTraits for reply_body {
    const TYPE_NAME: &'static str = "reply_body";

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        match self {
            reply_body::Accepted(a) => {
                0u32.marshal(out)?;
                a.marshal(out)
            }
            reply_body::Denied(d) => {
                1u32.marshal(out)?;
                d.marshal(out)
            }
        }
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        match u32::unmarshal(inp)? {
            0 => Ok(reply_body::Accepted(accepted_reply::unmarshal(inp)?)),
            _ => Ok(reply_body::Denied(rejected_reply::unmarshal(inp)?)),
        }
    }
    fn depth(&self) -> usize {
        1 + match self {
            reply_body::Accepted(a) => a.depth(),
            reply_body::Denied(d) => d.depth(),
        }
    }
    fn generate(gen: &mut crate::xdr::Generator) -> Self {
        reply_body::Accepted(accepted_reply::generate(gen))
    }
}

/// The RPC call header, §6: xid, rpcvers, program, version, proc, cred, verf.
/// Procedure-specific arguments follow immediately after this header in the
/// same message and are marshaled/unmarshaled separately by the transport
/// layer, since their type varies per (program, version, proc).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct call_body {
    pub rpcvers: u32,
    pub prog: u32,
    pub vers: u32,
    pub proc: u32,
    pub cred: opaque_auth,
    pub verf: opaque_auth,
}

impl XdrTraits for call_body {
    const TYPE_NAME: &'static str = "call_body";

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        self.rpcvers.marshal(out)?;
        self.prog.marshal(out)?;
        self.vers.marshal(out)?;
        self.proc.marshal(out)?;
        self.cred.marshal(out)?;
        self.verf.marshal(out)
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        Ok(call_body {
            rpcvers: u32::unmarshal(inp)?,
            prog: u32::unmarshal(inp)?,
            vers: u32::unmarshal(inp)?,
            proc: u32::unmarshal(inp)?,
            cred: opaque_auth::unmarshal(inp)?,
            verf: opaque_auth::unmarshal(inp)?,
        })
    }
    fn depth(&self) -> usize {
        1 + self.cred.depth().max(self.verf.depth())
    }
    fn generate(gen: &mut crate::xdr::Generator) -> Self {
        call_body {
            rpcvers: RPC_VERSION,
            prog: u32::generate(gen),
            vers: u32::generate(gen),
            proc: u32::generate(gen),
            cred: opaque_auth::generate(&mut gen.descend()),
            verf: opaque_auth::generate(&mut gen.descend()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum rpc_body {
    Call(call_body),
    Reply(reply_body),
}

impl Default for rpc_body {
    fn default() -> Self {
        rpc_body::Call(call_body::default())
    }
}

impl XdrTraits for rpc_body {
    const TYPE_NAME: &'static str = "rpc_body";

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        match self {
            rpc_body::Call(c) => {
                0u32.marshal(out)?;
                c.marshal(out)
            }
            rpc_body::Reply(r) => {
                1u32.marshal(out)?;
                r.marshal(out)
            }
        }
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        match u32::unmarshal(inp)? {
            0 => Ok(rpc_body::Call(call_body::unmarshal(inp)?)),
            _ => Ok(rpc_body::Reply(reply_body::unmarshal(inp)?)),
        }
    }
    fn depth(&self) -> usize {
        1 + match self {
            rpc_body::Call(c) => c.depth(),
            rpc_body::Reply(r) => r.depth(),
        }
    }
    fn generate(gen: &mut crate::xdr::Generator) -> Self {
        rpc_body::Call(call_body::generate(gen))
    }
}

/// `rpc_msg`: xid plus the call/reply discriminated body. The xid is only
/// used by clients matching replies to calls and by servers detecting
/// retransmissions; it carries no sequencing guarantee (§6).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct rpc_msg {
    pub xid: u32,
    pub body: rpc_body,
}

impl XdrTraits for rpc_msg {
    const TYPE_NAME: &'static str = "rpc_msg";

    fn marshal<W: Write>(&self, out: &mut W) -> Result<()> {
        self.xid.marshal(out)?;
        self.body.marshal(out)
    }
    fn unmarshal<R: Read>(inp: &mut R) -> Result<Self> {
        Ok(rpc_msg { xid: u32::unmarshal(inp)?, body: rpc_body::unmarshal(inp)? })
    }
    fn depth(&self) -> usize {
        1 + self.body.depth()
    }
    fn generate(gen: &mut crate::xdr::Generator) -> Self {
        rpc_msg { xid: u32::generate(gen), body: rpc_body::generate(gen) }
    }
}

pub fn call_header(xid: u32, prog: u32, vers: u32, proc: u32) -> rpc_msg {
    rpc_msg {
        xid,
        body: rpc_body::Call(call_body {
            rpcvers: RPC_VERSION,
            prog,
            vers,
            proc,
            cred: opaque_auth::default(),
            verf: opaque_auth::default(),
        }),
    }
}

pub fn success_reply(xid: u32) -> rpc_msg {
    rpc_msg {
        xid,
        body: rpc_body::Reply(reply_body::Accepted(accepted_reply {
            verf: opaque_auth::default(),
            reply_data: accept_body::Success,
        })),
    }
}

pub fn accept_error_reply(xid: u32, stat: accept_stat) -> rpc_msg {
    let reply_data = match stat {
        accept_stat::SUCCESS => accept_body::Success,
        accept_stat::PROG_UNAVAIL => accept_body::ProgUnavail,
        accept_stat::PROG_MISMATCH => accept_body::ProgMismatch(mismatch_info::default()),
        accept_stat::PROC_UNAVAIL => accept_body::ProcUnavail,
        accept_stat::GARBAGE_ARGS => accept_body::GarbageArgs,
        accept_stat::SYSTEM_ERR => accept_body::SystemErr,
    };
    rpc_msg {
        xid,
        body: rpc_body::Reply(reply_body::Accepted(accepted_reply {
            verf: opaque_auth::default(),
            reply_data,
        })),
    }
}

pub fn prog_mismatch_reply(xid: u32, low: u32, high: u32) -> rpc_msg {
    rpc_msg {
        xid,
        body: rpc_body::Reply(reply_body::Accepted(accepted_reply {
            verf: opaque_auth::default(),
            reply_data: accept_body::ProgMismatch(mismatch_info { low, high }),
        })),
    }
}

pub fn rpc_vers_mismatch_reply(xid: u32) -> rpc_msg {
    rpc_msg {
        xid,
        body: rpc_body::Reply(reply_body::Denied(rejected_reply::RpcMismatch(mismatch_info {
            low: RPC_VERSION,
            high: RPC_VERSION,
        }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xdr::{from_bytes, to_bytes};

    #[test]
    fn call_header_round_trips() {
        let hdr = call_header(0xAB, 0x2000_0001, 1, 1);
        let bytes = to_bytes(&hdr).unwrap();
        let back: rpc_msg = from_bytes(&bytes).unwrap();
        assert_eq!(hdr, back);
    }

    #[test]
    fn prog_mismatch_carries_range() {
        let reply = prog_mismatch_reply(7, 2, 3);
        if let rpc_body::Reply(reply_body::Accepted(accepted_reply {
            reply_data: accept_body::ProgMismatch(m),
            ..
        })) = reply.body
        {
            assert_eq!((m.low, m.high), (2, 3));
        } else {
            panic!("expected PROG_MISMATCH accepted reply");
        }
    }

    #[test]
    fn s4_call_and_reply_wire_bytes() {
        // Scenario S4: uint32 arg 7, uint32 result 14, after record-mark and
        // header the call body is just the argument's 4 bytes.
        let arg: u32 = 7;
        assert_eq!(to_bytes(&arg).unwrap(), vec![0, 0, 0, 7]);
        let res: u32 = 14;
        assert_eq!(to_bytes(&res).unwrap(), vec![0, 0, 0, 14]);
    }
}

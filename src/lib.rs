#![cfg_attr(feature = "strict", deny(warnings))]

//! `xdrpc`: an RFC 4506 XDR codec and RFC 5531 ONC RPC toolchain — an IDL
//! compiler (parser + AST + code generator) plus a runtime (generic archive
//! framework, message framing, a single-threaded reactor, and RPC
//! transport) built on that codec.

pub mod ast;
pub mod codegen;
pub mod compile;
pub mod config;
pub mod error;
pub mod message;
pub mod parser;
pub mod portmap;
pub mod reactor;
pub mod rpc;
pub mod socket;
pub mod tcp;
pub mod transport;
pub mod xdr;

//! Ambient configuration (component L): the knobs a caller sets once at
//! bind/connect time rather than per-call. Mirrors the teacher's
//! `NFSTcpListener::bind`-style parameter conventions — a plain struct with
//! `Default` plus chainable `with_*` setters, not a builder type with its
//! own separate "build" step, since every field here already has a sensible
//! default and none of them are fallible to set.

use crate::socket::DEFAULT_MAX_MSG_LEN;

/// Settings shared by [`crate::transport::SyncServer`] and
/// [`crate::transport::AsyncServer`] connections, and by
/// [`crate::tcp::RpcTcpListener`].
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    /// Upper bound on one incoming message's payload size. Exceeding this
    /// closes the connection with [`crate::socket::Recv::TooLarge`].
    pub max_message_len: usize,
    /// Upper bound on nested container depth a generated struct/union's
    /// `depth()` may report before unmarshal rejects it outright. Grounded
    /// on `original_source/xdrpp/depth_checker.h`'s recursion guard.
    pub max_depth: usize,
    /// Whether a bound [`crate::tcp::RpcTcpListener`] registers itself with
    /// rpcbind on bind and unregisters on drop.
    pub register_with_rpcbind: bool,
    /// rpcbind host to contact when `register_with_rpcbind` is set.
    pub rpcbind_host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            max_message_len: DEFAULT_MAX_MSG_LEN,
            max_depth: 32,
            register_with_rpcbind: false,
            rpcbind_host: "localhost".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn with_max_message_len(mut self, len: usize) -> Self {
        self.max_message_len = len;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_rpcbind(mut self, host: impl Into<String>) -> Self {
        self.register_with_rpcbind = true;
        self.rpcbind_host = host.into();
        self
    }
}

/// Settings for [`crate::transport::SyncClient`]/a connecting
/// [`crate::socket::MessageSocket`].
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub max_message_len: usize,
    pub max_depth: usize,
    /// How long to wait for a synchronous call's reply before giving up.
    pub call_timeout: std::time::Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            max_message_len: DEFAULT_MAX_MSG_LEN,
            max_depth: 32,
            call_timeout: std::time::Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn with_max_message_len(mut self, len: usize) -> Self {
        self.max_message_len = len;
        self
    }

    pub fn with_call_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_defaults_rpcbind_off() {
        let cfg = ServerConfig::default();
        assert!(!cfg.register_with_rpcbind);
        assert_eq!(cfg.max_message_len, DEFAULT_MAX_MSG_LEN);
    }

    #[test]
    fn builder_setters_compose() {
        let cfg = ServerConfig::default().with_max_message_len(4096).with_rpcbind("rpcbind.local");
        assert_eq!(cfg.max_message_len, 4096);
        assert!(cfg.register_with_rpcbind);
        assert_eq!(cfg.rpcbind_host, "rpcbind.local");
    }
}

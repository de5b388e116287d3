//! Types for parsing causal cache configuration files.
//!
//! The top level config type is [`Config`].

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// The top level config type.
///
/// This type can be read and written to config files using the [`serde::Serialize`] and
/// [`serde::Deserialize`] implementations.
#[derive(Debug, Eq, PartialEq, Hash, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// The number of cache threads that should be spawned.
    pub threads: u32,
    /// The IP address on which the cache threads listen for connections.
    pub listen_ip: IpAddr,
    /// Thread `i` listens on port `port_base + i`.
    pub port_base: u16,
    /// The socket address of the key-value store that backs the cache.
    pub kvs_address: SocketAddr,
    /// Interval at which each thread reports its cached keys to the key-value store.
    #[serde(default = "default_report_period_secs")]
    pub report_period_secs: u64,
    /// Requests to the key-value store that are not answered within this time are
    /// considered as timed out.
    #[serde(default = "default_kvs_timeout_secs")]
    pub kvs_timeout_secs: u64,
}

fn default_report_period_secs() -> u64 {
    5
}

fn default_kvs_timeout_secs() -> u64 {
    10
}

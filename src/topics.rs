//! Addressing of cache threads.
//!
//! Every thread of a cache node listens on its own TCP port. Clients, peer caches, and the
//! key-value store reach the thread through the address returned by
//! [`CacheThread::listen_address`].

use crate::config::Config;
use eyre::{eyre, Context};
use std::net::SocketAddr;

/// Identifies a specific thread of a specific cache node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CacheThread {
    /// The ID of the cache node.
    pub node_id: String,
    /// The ID of the thread on the cache node.
    pub thread_id: u32,
}

impl CacheThread {
    /// Addresses the given thread on the given cache node.
    pub fn new(node_id: String, thread_id: u32) -> Self {
        Self { node_id, thread_id }
    }

    /// A cluster-wide unique name for this thread.
    ///
    /// Used as part of the metadata key under which the thread reports its cached keys.
    pub fn cache_id(&self) -> String {
        format!("{}:{}", self.node_id, self.thread_id)
    }

    /// The socket address on which this thread accepts connections.
    ///
    /// Thread `i` listens on port `port_base + i` of the configured `listen_ip`.
    pub fn listen_address(&self, config: &Config) -> eyre::Result<SocketAddr> {
        let offset = u16::try_from(self.thread_id).context("thread id does not fit a port")?;
        let port = config.port_base.checked_add(offset).ok_or_else(|| {
            eyre!(
                "port {} + {} is out of range for thread {}",
                config.port_base,
                offset,
                self.cache_id()
            )
        })?;
        Ok(SocketAddr::new(config.listen_ip, port))
    }
}

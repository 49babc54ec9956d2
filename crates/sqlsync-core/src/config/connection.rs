use serde::{Deserialize, Serialize};

use crate::migration::ConnectionId;

/// One configured database target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Identifier used to label results and select connections.
    pub id: ConnectionId,

    /// Database connection URL.
    pub url: String,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connect/acquire timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl ConnectionConfig {
    pub fn new(id: impl Into<ConnectionId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            pool_size: default_pool_size(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_pool_size() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

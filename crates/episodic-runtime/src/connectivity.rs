use std::time::Duration;

use tokio::net::TcpStream;

use episodic_core::config::NetworkConfig;

use crate::traits::Connectivity;

/// Reachability check by opening a TCP connection to a known host.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }
}

impl From<&NetworkConfig> for TcpProbe {
    fn from(config: &NetworkConfig) -> Self {
        Self::new(
            config.probe_addr.clone(),
            Duration::from_millis(config.probe_timeout_ms),
        )
    }
}

impl Connectivity for TcpProbe {
    async fn is_connected(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!(addr = %self.addr, error = %e, "Connectivity probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(addr = %self.addr, "Connectivity probe timed out");
                false
            }
        }
    }
}

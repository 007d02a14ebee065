use std::time::Duration;

/// Runtime settings for [`crate::network::Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on; port 0 picks an ephemeral port.
    pub bind_addr: String,
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Maximum number of simultaneously active connections.
    pub max_clients: usize,
    /// Silence after which a connection counts as lost. `None` disables the check.
    pub client_timeout: Option<Duration>,
    /// Messages that may wait for one client's writer before it is dropped.
    pub outbound_queue: usize,
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:12345".to_string(),
            tick_rate: 60,
            max_clients: 32,
            client_timeout: Some(Duration::from_secs(10)),
            outbound_queue: 256,
        }
    }
}

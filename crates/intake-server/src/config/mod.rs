use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub max_body_bytes: usize,
    /// Lifetime of a fast-path cache entry. Advisory only; nothing in the
    /// write pipeline reads the cache to make a correctness decision.
    pub cache_ttl: Duration,
    pub cors_allowed_origins: Vec<String>,
    pub redis_url: Option<String>,
    pub redis_prefix: String,
    /// Outbound message buffer per live connection. A connection whose
    /// buffer is full at broadcast time misses the event.
    pub ws_send_buffer: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 64 * 1024,
            cache_ttl: Duration::from_secs(3600),
            cors_allowed_origins: Vec::new(),
            redis_url: None,
            redis_prefix: String::new(),
            ws_send_buffer: 64,
        }
    }
}

//! Shared fixtures for docrelay integration tests

use async_trait::async_trait;
use docrelay::{RealtimeBridge, RealtimeConfig, StaticTokenProvider, TokenProvider};
use std::sync::Arc;
use std::time::Duration;

/// Bridge config with fast timers so tests finish quickly
pub fn fast_realtime_config(endpoint: String) -> RealtimeConfig {
    RealtimeConfig {
        endpoint,
        reconnect_delay: Duration::from_millis(100),
        max_reconnect_attempts: 5,
        heartbeat_interval: Duration::from_millis(150),
        connect_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

/// Bridge wired to a test server with the default fixed token
pub fn test_bridge(endpoint: String) -> RealtimeBridge {
    RealtimeBridge::new(
        fast_realtime_config(endpoint),
        Arc::new(StaticTokenProvider::new("secret-token")),
    )
}

/// Token provider for the no-session case
pub struct NoTokenProvider;

#[async_trait]
impl TokenProvider for NoTokenProvider {
    async fn access_token(&self) -> Option<String> {
        None
    }
}

/// Poll until `condition` holds or the deadline passes
pub async fn wait_until<F>(deadline: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

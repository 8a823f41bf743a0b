// Common test utilities for integration tests

use std::sync::Once;

use log::LevelFilter;
use tokio::sync::mpsc;

use amity::{ClientConfig, Notification, RealtimeClient};

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

/// Build a client pointed at a local backend that is not expected to be
/// reachable. Connection-free behavior (queuing, accessors, key
/// derivation) is what the integration tests exercise.
pub fn offline_client() -> (RealtimeClient, mpsc::Receiver<Notification>) {
    setup_logging();
    RealtimeClient::new(ClientConfig {
        api_base: "http://localhost:59999".to_string(),
        token: "integration-test-token".to_string(),
    })
}

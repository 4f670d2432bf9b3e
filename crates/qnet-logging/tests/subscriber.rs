//! Global subscriber installation

use qnet_logging::{LogConfig, LoggingError, SubscriberBuilder};

#[test]
fn test_second_init_is_rejected() {
    let first = SubscriberBuilder::new().with_config(LogConfig::testing()).init();
    assert!(first.is_ok());

    let second = SubscriberBuilder::new().with_config(LogConfig::testing()).init();
    assert!(matches!(second, Err(LoggingError::Init(_))));

    // no-op once a subscriber exists
    qnet_logging::init_testing();
    tracing::warn!(node = "S", "logging still works");
}

use std::sync::Once;

static INIT: Once = Once::new();

/// Sets up logging for tests.
///
/// Log output is captured by the test harness, so it only shows up for failing tests.
pub fn setup_test_environment() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing_core::Level::DEBUG)
            .with_test_writer()
            .with_target(true)
            .with_line_number(true)
            .init();
    });
}

use std::sync::Once;

static INIT: Once = Once::new();

/// Wires `tracing-subscriber`'s `fmt` layer once per test binary, the way
/// `examples/chanced-grill/tests` initializes logging for its integration
/// tests.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

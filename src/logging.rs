//! Thin `env_logger` init helper shared by the demo binary and tests.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the global logger once per process. Safe to call from
/// multiple threads/tests; later calls are no-ops.
pub fn init() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(cfg!(test)).try_init();
    });
}

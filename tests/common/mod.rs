// Common test utilities and helpers for the test suite

use std::time::Duration;

use futures::future::BoxFuture;
use hazardx::{GracePeriod, Harness, HarnessConfig};

/// Grace period short enough to keep leak tests fast.
#[allow(dead_code)]
pub const SHORT_GRACE: Duration = Duration::from_millis(25);

// Initialize tracing subscriber for tests (idempotent)
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .try_init()
            .ok();
    });
}

#[cfg(not(feature = "tracing"))]
pub fn init_tracing() {
    // No-op when tracing is disabled
}

pub fn tokio_spawner() -> impl Fn(BoxFuture<'static, ()>) {
    |fut| {
        tokio::spawn(fut);
    }
}

/// Tokio harness with default configuration.
#[allow(dead_code)]
pub fn harness() -> Harness<impl Fn(BoxFuture<'static, ()>)> {
    Harness::new(tokio_spawner())
}

/// Tokio harness with a short grace period.
#[allow(dead_code)]
pub fn quick_harness() -> Harness<impl Fn(BoxFuture<'static, ()>)> {
    Harness::with_config(
        tokio_spawner(),
        HarnessConfig::default().with_grace(GracePeriod::Fixed(SHORT_GRACE)),
    )
}

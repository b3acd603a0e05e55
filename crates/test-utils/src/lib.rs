pub mod builders;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Install the tracing subscriber once for the whole test binary.
///
/// Output goes through `with_test_writer()`, so the harness only shows it
/// for failing tests (or under `-- --nocapture`). Levels come from
/// `RUST_LOG`, defaulting to `info`; `RUST_LOG=jobdag=debug cargo test` is
/// the usual way to watch the scheduling decisions of a single test.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Bound a future to five seconds so a stuck scheduler event fails the
/// test instead of hanging the suite.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("future did not settle within 5 seconds")
}

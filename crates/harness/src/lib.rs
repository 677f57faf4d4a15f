pub mod db;
pub mod shared;

pub use db::{class_schema, project_schema, text_row, TestDb};
pub use shared::SharedDb;

/// Installs a test-friendly subscriber filtered by `TEMPORA_LOG`
/// (default `warn`). Safe to call from every test.
pub fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("TEMPORA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer().with_target(false))
        .try_init();
}

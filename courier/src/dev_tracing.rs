/// Development helper: install a `tracing` subscriber when `RUST_LOG` is set.
///
/// Tests and benches call `courier::dev_tracing::init_tracing()` to see the
/// dispatch loop's logging, e.g. `RUST_LOG=courier=debug`. No-op when
/// `RUST_LOG` is unset or a global subscriber already exists.
pub fn init_tracing() {
    if std::env::var_os("RUST_LOG").is_some() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_thread_names(true)
            .with_test_writer()
            .try_init();
    }
}

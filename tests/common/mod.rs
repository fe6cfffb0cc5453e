use tracing_subscriber::{EnvFilter, fmt};
use vtg::{
    config::{Config, Readiness, RuntimeOptions},
    executor::Runtime,
};

/// Route runtime events to the test output. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn options(num_workers: usize, readiness: Readiness) -> RuntimeOptions {
    init_tracing();
    RuntimeOptions::new()
        .num_workers(num_workers)
        .readiness(readiness)
}

pub fn runtime<C: Config>(num_workers: usize, readiness: Readiness) -> Runtime<C>
where
    C::Disposal: Default,
{
    Runtime::new(options(num_workers, readiness)).expect("runtime starts")
}

pub mod liveness;
pub mod matcher;
pub mod pipeline;
pub mod run_log;
pub mod scheduling;
pub mod scoring;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod throttle;
pub mod traits;

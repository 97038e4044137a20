
pub use packet_exchange::{TestPair, TICK};

/// Routes `log` output through env_logger for the current test. Safe to call
/// from every test.
pub fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

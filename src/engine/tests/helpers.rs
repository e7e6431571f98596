use std::path::Path;
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

use crate::engine::{Engine, EngineConfig};

/// Initialize tracing controlled by `RUST_LOG`. Safe to call repeatedly —
/// only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config whose threshold is large enough that nothing flushes on its own.
pub fn memtable_only_config() -> EngineConfig {
    init_tracing();
    EngineConfig {
        flush_threshold: 64 << 20,
        flush_workers: 2,
    }
}

/// Config that flushes after a handful of small cells.
pub fn tiny_buffer_config() -> EngineConfig {
    init_tracing();
    EngineConfig {
        flush_threshold: 256,
        flush_workers: 2,
    }
}

/// Opens an engine that will not flush unless asked to.
pub fn open(dir: &Path) -> Engine {
    Engine::open(dir, memtable_only_config()).expect("open")
}

/// Blocks until every scheduled flush has committed.
pub fn wait_for_flushes(engine: &Engine) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if engine.stats().expect("stats").flushing_tables == 0 {
            return;
        }
        assert!(Instant::now() < deadline, "flushes did not drain in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Schedules a flush and waits for it to commit.
pub fn flush_and_wait(engine: &Engine) {
    engine.flush().expect("flush");
    wait_for_flushes(engine);
}

/// Counts `<generation>.dat` files in an engine directory.
pub fn dat_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .expect("read_dir")
        .filter(|entry| {
            entry
                .as_ref()
                .expect("entry")
                .path()
                .extension()
                .map(|ext| ext == "dat")
                .unwrap_or(false)
        })
        .count()
}

/// Nanoseconds since epoch, shifted by `offset` seconds.
pub fn now_plus_secs(offset: i64) -> i64 {
    crate::engine::clock::wall_nanos() + offset * 1_000_000_000
}

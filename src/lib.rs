//! netmedic -- Asynchronous network-measurement core.
//!
//! This crate schedules, runs, and tracks the lifecycle of discrete network
//! tests against a single background event loop, and manages the connection
//! objects those tests use for I/O. Tests are submitted from any thread and
//! executed strictly one at a time, in order, with exactly-once completion
//! notification.

pub mod errors;
pub mod net;
pub mod nettests;
pub mod reactor;
pub mod record;
pub mod report;
pub mod runner;
pub mod settings;

pub use errors::{ConfigError, NetError, ValueError};
pub use record::Record;
pub use runner::Runner;
pub use settings::{Settings, SettingsEntry};

use anyhow::{Context, Result};

use nettests::TcpConnectTest;

/// Run one TCP reachability test on the global runner and wait for its
/// record.
///
/// Blocks the calling thread until the test completes; call
/// `Runner::global().join_()` afterwards to tear the background thread down.
pub fn run_tcp_connect(settings: Settings) -> Result<Record> {
    let runner = Runner::global();
    let (tx, rx) = std::sync::mpsc::channel();
    runner.run_test(TcpConnectTest::new(settings), move |test| {
        let _ = tx.send(test.record().clone());
    });
    rx.recv()
        .context("runner stopped before the test completed")
}

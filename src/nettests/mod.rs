//! The polymorphic unit of measurement work.

pub mod tcp_connect;

pub use tcp_connect::TcpConnectTest;

use std::rc::Rc;

use crate::errors::ConfigError;
use crate::reactor::Reactor;
use crate::record::Record;

/// One schedulable network test.
///
/// Implementations own their settings and their [`Record`] and are the only
/// writer of that record while running. `begin` performs the protocol
/// exchange cooperatively on the reactor thread; the runner awaits it, so
/// completion is signalled exactly once and never synchronously from the
/// submitting caller's point of view.
///
/// Network failures are measurement *data*: a variant captures them into the
/// record (conventionally as a `failure` string under `test_keys`) and
/// returns `Ok`. Only an unusable configuration may abort the test, and it
/// does so before any network work has started.
#[async_trait::async_trait(?Send)]
pub trait NetTest: Send {
    /// Test name, e.g. `tcp_connect`.
    fn name(&self) -> &str;

    /// Semantic version of the test implementation.
    fn version(&self) -> &str;

    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;

    /// Execute the measurement on the reactor thread.
    async fn begin(&mut self, reactor: Rc<dyn Reactor>) -> Result<(), ConfigError>;
}

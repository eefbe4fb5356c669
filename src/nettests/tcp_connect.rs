//! TCP reachability probe.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::errors::{ConfigError, NetError};
use crate::net::Connection;
use crate::nettests::NetTest;
use crate::reactor::Reactor;
use crate::record::Record;
use crate::settings::Settings;

/// Measures whether a single TCP connect to `host:port` succeeds.
///
/// Settings: `host` (default `localhost`), `port` (required),
/// `net/timeout`, `net/address_family`.
pub struct TcpConnectTest {
    settings: Settings,
    record: Record,
}

impl TcpConnectTest {
    pub const NAME: &'static str = "tcp_connect";
    pub const VERSION: &'static str = "0.0.1";

    pub fn new(settings: Settings) -> Self {
        TcpConnectTest {
            settings,
            record: Record::new(),
        }
    }
}

#[async_trait::async_trait(?Send)]
impl NetTest for TcpConnectTest {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> &str {
        Self::VERSION
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    async fn begin(&mut self, reactor: Rc<dyn Reactor>) -> Result<(), ConfigError> {
        let connection = Connection::connect(&reactor, &self.settings)?;
        self.record
            .set_test_key("target", connection.target().to_string());

        // Both slots hand their outcome to the same single-shot sender; they
        // are mutually exclusive, so only one of them ever finds it.
        let (tx, rx) = oneshot::channel::<Result<(), NetError>>();
        let sender = Rc::new(RefCell::new(Some(tx)));

        connection.on_connect({
            let sender = Rc::clone(&sender);
            move |_connection| {
                if let Some(tx) = sender.borrow_mut().take() {
                    let _ = tx.send(Ok(()));
                }
            }
        });
        connection.on_error({
            let sender = Rc::clone(&sender);
            move |err| {
                if let Some(tx) = sender.borrow_mut().take() {
                    let _ = tx.send(Err(err));
                }
            }
        });

        match rx.await {
            Ok(Ok(())) => {
                debug!(test = Self::NAME, "connection succeeded");
                self.record.set_test_key("connection", "success");
                self.record.set_test_key("failure", Value::Null);
            }
            Ok(Err(err)) => {
                debug!(test = Self::NAME, failure = err.failure_string(), "connection failed");
                self.record.set_test_key("connection", "failed");
                self.record.set_test_key("failure", err.failure_string());
            }
            Err(_) => {
                // reactor went away under us; nobody will read this record,
                // but leave it well-formed anyway
                self.record.set_test_key("connection", "failed");
                self.record.set_test_key("failure", "interrupted");
            }
        }
        Ok(())
    }
}

//! Connection state machine driven by a fake, always-failing reactor.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use futures::future::LocalBoxFuture;
use tokio::net::TcpStream;

use netmedic::errors::{ConfigError, NetError};
use netmedic::net::{Connection, ConnectionState, Target};
use netmedic::reactor::Reactor;
use netmedic::Settings;

/// A reactor whose dials always fail with a configurable error.
///
/// Spawned tasks are queued and only run when `drain` is called, so tests
/// control exactly when delivery happens.
struct RefusingReactor {
    failure: RefCell<NetError>,
    dials: Cell<usize>,
    spawns: Cell<usize>,
    last_target: RefCell<Option<Target>>,
    tasks: RefCell<Vec<LocalBoxFuture<'static, ()>>>,
}

impl Default for RefusingReactor {
    fn default() -> Self {
        RefusingReactor {
            failure: RefCell::new(NetError::ConnectionRefused),
            dials: Cell::new(0),
            spawns: Cell::new(0),
            last_target: RefCell::new(None),
            tasks: RefCell::new(Vec::new()),
        }
    }
}

impl RefusingReactor {
    /// Run everything spawned on the fake loop to completion, in order.
    fn drain(&self) {
        loop {
            let task = {
                let mut tasks = self.tasks.borrow_mut();
                if tasks.is_empty() {
                    break;
                }
                tasks.remove(0)
            };
            futures::executor::block_on(task);
        }
    }
}

impl Reactor for RefusingReactor {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        self.spawns.set(self.spawns.get() + 1);
        self.tasks.borrow_mut().push(task);
    }

    fn dial(
        &self,
        target: &Target,
        _timeout: Duration,
    ) -> LocalBoxFuture<'static, Result<TcpStream, NetError>> {
        self.dials.set(self.dials.get() + 1);
        *self.last_target.borrow_mut() = Some(target.clone());
        let failure = self.failure.borrow().clone();
        Box::pin(async move { Err(failure) })
    }

    fn stop(&self) {}
}

fn port_only_settings() -> Settings {
    let mut settings = Settings::new();
    settings.set("port", 80);
    settings
}

#[test]
fn error_slot_fires_exactly_once_connect_never() {
    let fake = Rc::new(RefusingReactor::default());
    let reactor: Rc<dyn Reactor> = fake.clone();

    let connection = Connection::connect(&reactor, &port_only_settings()).unwrap();
    assert_eq!(connection.state(), ConnectionState::Connecting);

    let connects = Rc::new(Cell::new(0u32));
    let errors = Rc::new(Cell::new(0u32));
    connection.on_connect({
        let connects = Rc::clone(&connects);
        move |_connection| connects.set(connects.get() + 1)
    });
    connection.on_error({
        let errors = Rc::clone(&errors);
        move |err| {
            assert_eq!(err, NetError::ConnectionRefused);
            errors.set(errors.get() + 1);
        }
    });

    fake.drain();

    assert_eq!(errors.get(), 1);
    assert_eq!(connects.get(), 0);
    assert_eq!(connection.state(), ConnectionState::Failed);
    assert_eq!(fake.dials.get(), 1);
}

#[test]
fn missing_port_fails_before_touching_the_reactor() {
    let fake = Rc::new(RefusingReactor::default());
    let reactor: Rc<dyn Reactor> = fake.clone();

    let err = Connection::connect(&reactor, &Settings::new()).unwrap_err();
    assert!(matches!(err, ConfigError::Missing(ref key) if key == "port"));
    assert_eq!(fake.dials.get(), 0);
    assert_eq!(fake.spawns.get(), 0);
}

#[test]
fn unset_host_dials_localhost() {
    let fake = Rc::new(RefusingReactor::default());
    let reactor: Rc<dyn Reactor> = fake.clone();

    let _connection = Connection::connect(&reactor, &port_only_settings()).unwrap();

    let target = fake.last_target.borrow().clone().unwrap();
    assert_eq!(target.host, "localhost");
    assert_eq!(target.port, 80);
}

#[test]
fn cancel_clears_slots_without_firing() {
    let fake = Rc::new(RefusingReactor::default());
    let reactor: Rc<dyn Reactor> = fake.clone();

    let connection = Connection::connect(&reactor, &port_only_settings()).unwrap();
    let errors = Rc::new(Cell::new(0u32));
    connection.on_error({
        let errors = Rc::clone(&errors);
        move |_err| errors.set(errors.get() + 1)
    });

    connection.cancel();
    connection.cancel(); // idempotent

    fake.drain();

    assert_eq!(errors.get(), 0);
    // the attempt itself still resolved; only the slots were empty
    assert_eq!(connection.state(), ConnectionState::Failed);
}

#[test]
fn timeout_is_a_distinct_failure_kind() {
    let fake = Rc::new(RefusingReactor::default());
    *fake.failure.borrow_mut() = NetError::Timeout;
    let reactor: Rc<dyn Reactor> = fake.clone();

    let connection = Connection::connect(&reactor, &port_only_settings()).unwrap();
    let seen = Rc::new(RefCell::new(None));
    connection.on_error({
        let seen = Rc::clone(&seen);
        move |err| *seen.borrow_mut() = Some(err)
    });

    fake.drain();

    let err = seen.borrow().clone().unwrap();
    assert_eq!(err, NetError::Timeout);
    assert_eq!(err.failure_string(), "generic_timeout_error");
}

#[test]
fn callback_may_hold_the_last_connection_handle() {
    let fake = Rc::new(RefusingReactor::default());
    let reactor: Rc<dyn Reactor> = fake.clone();

    let connection = Connection::connect(&reactor, &port_only_settings()).unwrap();
    let fired = Rc::new(Cell::new(false));
    connection.on_error({
        let captured = connection.clone();
        let fired = Rc::clone(&fired);
        move |_err| {
            // the closure owns a handle to the connection whose slot it sat
            // in; reading state here must not re-enter delivery
            assert_eq!(captured.state(), ConnectionState::Failed);
            drop(captured);
            fired.set(true);
        }
    });
    drop(connection);

    fake.drain();

    assert!(fired.get());
}

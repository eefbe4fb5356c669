//! Asynchronous outbound TCP connection with callback slots.
//!
//! A [`Connection`] starts dialing the moment it is constructed and reports
//! the outcome through one of two single-shot callback slots. Exactly one of
//! the two fires, exactly once, per attempt.
//!
//! The delivery path takes *both* slots out of the shared state and releases
//! the borrow before invoking the fired callback. A callback is therefore
//! free to hold (and drop) the last live handle to the connection itself
//! without creating a cycle or re-entering the state, and a second signal
//! from the I/O layer finds the slots already empty.

use std::cell::RefCell;
use std::rc::Rc;

use tokio::net::TcpStream;
use tracing::debug;

use crate::errors::{ConfigError, NetError};
use crate::net::{self, Target};
use crate::reactor::Reactor;
use crate::settings::Settings;

type ConnectSlot = Box<dyn FnOnce(Connection)>;
type ErrorSlot = Box<dyn FnOnce(NetError)>;

/// Observable state of a connection attempt.
///
/// Construction moves straight from idle into `Connecting`; the terminal
/// transition to `Connected` or `Failed` happens at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Failed,
}

struct Inner {
    target: Target,
    state: ConnectionState,
    on_connect: Option<ConnectSlot>,
    on_error: Option<ErrorSlot>,
    stream: Option<TcpStream>,
}

/// Handle to an outbound TCP connection attempt.
///
/// Handles are cheap clones of shared single-thread state. The dial task
/// spawned at construction keeps the state alive until the outcome is
/// delivered, so registered callbacks outlive every external handle if they
/// need to.
#[derive(Clone)]
pub struct Connection {
    inner: Rc<RefCell<Inner>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Connection")
            .field("target", &inner.target)
            .field("state", &inner.state)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Start an outbound connection attempt described by `settings`.
    ///
    /// Reads `host` (default `localhost`), `port` (required),
    /// `net/address_family` and `net/timeout`. A malformed target fails here,
    /// synchronously, before the reactor is touched at all.
    pub fn connect(reactor: &Rc<dyn Reactor>, settings: &Settings) -> Result<Connection, ConfigError> {
        let target = Target::from_settings(settings)?;
        let timeout = net::timeout_from_settings(settings)?;

        debug!(addr = %target, family = %target.family, "dialing");
        let dial = reactor.dial(&target, timeout);

        let inner = Rc::new(RefCell::new(Inner {
            target,
            state: ConnectionState::Connecting,
            on_connect: None,
            on_error: None,
            stream: None,
        }));

        let task_state = Rc::clone(&inner);
        reactor.spawn(Box::pin(async move {
            let outcome = dial.await;
            Connection::deliver(task_state, outcome);
        }));

        Ok(Connection { inner })
    }

    /// Register the on-connect callback, replacing any previous one.
    ///
    /// If the attempt has already resolved the callback will never fire;
    /// slots are single-shot and cleared at delivery time.
    pub fn on_connect(&self, callback: impl FnOnce(Connection) + 'static) {
        self.inner.borrow_mut().on_connect = Some(Box::new(callback));
    }

    /// Register the on-error callback, replacing any previous one.
    pub fn on_error(&self, callback: impl FnOnce(NetError) + 'static) {
        self.inner.borrow_mut().on_error = Some(Box::new(callback));
    }

    /// Clear both callback slots without firing them. Idempotent, and always
    /// legal regardless of state.
    pub fn cancel(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.on_connect = None;
        inner.on_error = None;
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.borrow().state
    }

    pub fn target(&self) -> Target {
        self.inner.borrow().target.clone()
    }

    /// Take ownership of the established stream, if any.
    ///
    /// Available from within or after the on-connect callback; I/O beyond
    /// establishment is up to the caller.
    pub fn take_stream(&self) -> Option<TcpStream> {
        self.inner.borrow_mut().stream.take()
    }

    fn deliver(inner: Rc<RefCell<Inner>>, outcome: Result<TcpStream, NetError>) {
        enum Fired {
            Connect(Option<ConnectSlot>),
            Error(Option<ErrorSlot>, NetError),
        }

        let fired = {
            let mut state = inner.borrow_mut();
            if state.state != ConnectionState::Connecting {
                // the underlying layer signalled twice; slots are already
                // cleared and the first outcome stands
                return;
            }
            // take-and-clear both slots before anything user-visible runs
            let on_connect = state.on_connect.take();
            let on_error = state.on_error.take();
            match outcome {
                Ok(stream) => {
                    state.state = ConnectionState::Connected;
                    state.stream = Some(stream);
                    debug!(addr = %state.target, "connected");
                    Fired::Connect(on_connect)
                }
                Err(err) => {
                    state.state = ConnectionState::Failed;
                    debug!(addr = %state.target, error = %err, "connect failed");
                    Fired::Error(on_error, err)
                }
            }
        };
        // borrow released: the callback may drop the last handle to us
        match fired {
            Fired::Connect(Some(callback)) => callback(Connection { inner }),
            Fired::Error(Some(callback), err) => callback(err),
            _ => {}
        }
    }
}

//! Process-wide test scheduler.
//!
//! A [`Runner`] owns at most one background thread. That thread owns a
//! [`TokioReactor`] and pumps a FIFO queue of submitted tests, dispatching
//! one test body at a time; every connection callback and every completion
//! callback fires there and nowhere else. Submissions, by contrast, may come
//! from any thread.

use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::nettests::NetTest;
use crate::reactor::{Reactor, TokioReactor};
use crate::record::DATE_FORMAT;

/// Completion callback; receives the finished test back, on the background
/// thread.
pub type TestDone = Box<dyn FnOnce(Box<dyn NetTest>) + Send + 'static>;

struct Submission {
    test: Box<dyn NetTest>,
    on_done: TestDone,
}

/// Live background execution context: the queue sender, the reactor's stop
/// token, the count of not-yet-dispatched entries, and the thread itself.
struct Active {
    tx: mpsc::UnboundedSender<Submission>,
    stop: CancellationToken,
    pending: Arc<AtomicUsize>,
    thread: thread::JoinHandle<()>,
}

impl Active {
    fn start() -> Active {
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let pending = Arc::new(AtomicUsize::new(0));
        let thread = {
            let stop = stop.clone();
            let pending = Arc::clone(&pending);
            thread::Builder::new()
                .name("netmedic-runner".into())
                .spawn(move || thread_main(rx, stop, pending))
                .expect("failed to spawn runner thread")
        };
        Active {
            tx,
            stop,
            pending,
            thread,
        }
    }

    /// The loop is gone or on its way out: either the receiver was dropped
    /// or a `break_loop_` has been requested.
    fn finished(&self) -> bool {
        self.tx.is_closed() || self.stop.is_cancelled()
    }
}

/// FIFO scheduler for [`NetTest`] executions.
#[derive(Default)]
pub struct Runner {
    state: Mutex<Option<Active>>,
}

static GLOBAL: OnceLock<Arc<Runner>> = OnceLock::new();

impl Runner {
    pub fn new() -> Runner {
        Runner::default()
    }

    /// The process-wide default instance, lazily created on first use and
    /// never recreated. Tear it down at controlled shutdown points with
    /// [`Runner::join_`].
    pub fn global() -> Arc<Runner> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Runner::new())))
    }

    /// Enqueue `test` and return immediately.
    ///
    /// Thread-safe. Starts the background thread on first use; after a
    /// `join_` or `break_loop_` the next submission starts a fresh thread
    /// and reactor (post-shutdown submissions restart rather than being
    /// rejected). Submission order is the dispatch order and the `on_done`
    /// order: entries are never reordered, and only one test body runs at a
    /// time.
    pub fn run_test(
        &self,
        test: impl NetTest + 'static,
        on_done: impl FnOnce(Box<dyn NetTest>) + Send + 'static,
    ) {
        let mut state = self.state.lock().expect("runner state poisoned");

        let needs_start = match state.as_ref() {
            None => true,
            Some(active) => active.finished(),
        };
        if needs_start {
            // a finished Active is already exiting on its own; detach it
            // rather than joining under the lock, which could deadlock with
            // an on_done callback that resubmits
            state.take();
            *state = Some(Active::start());
        }

        let active = state.as_ref().expect("runner just started");
        active.pending.fetch_add(1, Ordering::SeqCst);
        let submission = Submission {
            test: Box::new(test),
            on_done: Box::new(on_done),
        };
        // sending under the state lock fixes the queue order across threads
        if active.tx.send(submission).is_err() {
            active.pending.fetch_sub(1, Ordering::SeqCst);
            warn!("submission raced loop shutdown and was abandoned");
        }
    }

    /// True iff no submitted entry is still waiting in the queue. Says
    /// nothing about whether the currently-dispatched test has completed.
    pub fn empty(&self) -> bool {
        let state = self.state.lock().expect("runner state poisoned");
        match state.as_ref() {
            Some(active) => active.pending.load(Ordering::SeqCst) == 0,
            None => true,
        }
    }

    /// Drain the queue, wait for the in-flight test to finish, and stop the
    /// background thread.
    ///
    /// Idempotent, callable from any thread except the background thread
    /// itself: joining the loop from inside the loop is a programming error
    /// and panics.
    pub fn join_(&self) {
        let on_runner_thread = {
            let state = self.state.lock().expect("runner state poisoned");
            state
                .as_ref()
                .map(|active| active.thread.thread().id() == thread::current().id())
        };
        match on_runner_thread {
            None => return,
            Some(true) => panic!("join_ called from the runner's background thread"),
            Some(false) => {}
        }

        let active = self.state.lock().expect("runner state poisoned").take();
        let Some(active) = active else { return };
        // closing the channel lets the loop drain what is queued, then exit
        drop(active.tx);
        if active.thread.join().is_err() {
            panic!("runner background thread panicked");
        }
    }

    /// Ask the reactor to stop even if queued work remains.
    ///
    /// Entries still queued (and the in-flight test, if any) are abandoned:
    /// their `on_done` never fires and pending connections never transition.
    pub fn break_loop_(&self) {
        let state = self.state.lock().expect("runner state poisoned");
        if let Some(active) = state.as_ref() {
            active.stop.cancel();
        }
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        let active = match self.state.get_mut() {
            Ok(state) => state.take(),
            Err(_) => return,
        };
        let Some(active) = active else { return };
        if active.thread.thread().id() == thread::current().id() {
            return;
        }
        drop(active.tx);
        let _ = active.thread.join();
    }
}

fn thread_main(
    mut rx: mpsc::UnboundedReceiver<Submission>,
    stop: CancellationToken,
    pending: Arc<AtomicUsize>,
) {
    let reactor = Rc::new(TokioReactor::new(stop));
    let pump = {
        let reactor: Rc<dyn Reactor> = reactor.clone();
        async move {
            while let Some(Submission { mut test, on_done }) = rx.recv().await {
                pending.fetch_sub(1, Ordering::SeqCst);
                dispatch(Rc::clone(&reactor), test.as_mut()).await;
                on_done(test);
            }
        }
    };
    if let Err(err) = reactor.run_until_stopped(pump) {
        error!(error = %err, "failed to start reactor runtime");
    }
}

/// Run one test body to completion and stamp the record.
async fn dispatch(reactor: Rc<dyn Reactor>, test: &mut dyn NetTest) {
    let started_at = Utc::now();
    let clock = Instant::now();
    info!(test = test.name(), version = test.version(), "dispatching");

    test.record_mut().set(
        "measurement_start_time",
        started_at.format(DATE_FORMAT).to_string(),
    );

    if let Err(err) = test.begin(reactor).await {
        // configuration errors prevent the exchange from starting; network
        // errors never reach this point, the test records them itself
        warn!(test = test.name(), error = %err, "test could not start");
        test.record_mut().set("failure", err.to_string());
    }

    let runtime = clock.elapsed().as_secs_f64();
    let name = test.name().to_owned();
    let version = test.version().to_owned();
    let record = test.record_mut();
    record.set("test_runtime", runtime);
    record.fill_identity(&name, &version, started_at);
    info!(test = %name, runtime, "test finished");
}

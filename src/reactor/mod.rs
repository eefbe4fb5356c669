//! The cooperative event loop behind every test execution.
//!
//! All connection callbacks and test bodies run on a single thread that
//! drives a current-thread tokio runtime plus a [`LocalSet`]. The [`Reactor`]
//! trait is the narrow surface tests and connections consume, which keeps the
//! probe machinery loop-agnostic and lets tests substitute a fake loop.

use std::io;
use std::time::Duration;

use futures::future::LocalBoxFuture;
use tokio::net::TcpStream;
use tokio::task::LocalSet;
use tokio_util::sync::CancellationToken;

use crate::errors::NetError;
use crate::net::{self, Target};

/// What a test or connection may ask of the event loop.
///
/// Implementations are used strictly from the loop's own thread.
pub trait Reactor {
    /// Schedule a task to run on the loop.
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);

    /// Begin an outbound TCP dial toward `target`.
    ///
    /// The returned future resolves on the loop thread. Resolution and
    /// connect share the single `timeout` bound; expiry surfaces as
    /// [`NetError::Timeout`], distinct from other connect failures only in
    /// its kind.
    fn dial(
        &self,
        target: &Target,
        timeout: Duration,
    ) -> LocalBoxFuture<'static, Result<TcpStream, NetError>>;

    /// Ask the loop to stop even if work remains.
    fn stop(&self);
}

/// The production reactor: a current-thread tokio runtime driven until the
/// stop token fires or the main future completes.
pub struct TokioReactor {
    stop: CancellationToken,
}

impl TokioReactor {
    pub fn new(stop: CancellationToken) -> Self {
        TokioReactor { stop }
    }

    /// Drive `main` (and everything it spawns on the loop) to completion,
    /// or until [`Reactor::stop`] is called, whichever comes first.
    ///
    /// Must be called from the thread that owns this reactor; everything
    /// spawned runs there and nowhere else.
    pub fn run_until_stopped<F>(&self, main: F) -> io::Result<()>
    where
        F: std::future::Future<Output = ()> + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let local = LocalSet::new();
        let stop = self.stop.clone();
        local.block_on(&runtime, async move {
            tokio::select! {
                _ = stop.cancelled() => {
                    tracing::debug!("reactor stopped with work remaining");
                }
                _ = main => {}
            }
        });
        Ok(())
    }
}

impl Reactor for TokioReactor {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        tokio::task::spawn_local(task);
    }

    fn dial(
        &self,
        target: &Target,
        timeout: Duration,
    ) -> LocalBoxFuture<'static, Result<TcpStream, NetError>> {
        let target = target.clone();
        Box::pin(async move {
            let attempt = async {
                let addr = net::resolve(&target).await?;
                TcpStream::connect(addr).await.map_err(NetError::from)
            };
            match tokio::time::timeout(timeout, attempt).await {
                Ok(outcome) => outcome,
                Err(_) => Err(NetError::Timeout),
            }
        })
    }

    fn stop(&self) {
        self.stop.cancel();
    }
}

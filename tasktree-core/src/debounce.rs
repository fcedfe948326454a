//! Debounced pipeline scheduling.
//!
//! File-change notifications arrive in bursts (an editor save can fire
//! several events). [`DebouncedRunner`] collects triggers until the settle
//! window passes with no new ones, then runs its job once with every path
//! seen. A job is awaited in the loop itself, so runs never overlap; triggers
//! that arrive mid-run are held in the channel and coalesced into the next
//! run.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Pending-trigger bookkeeping for one settle period.
#[derive(Debug)]
struct DebounceState {
    debounce: Duration,
    max_wait: Duration,
    first_event: Option<Instant>,
    last_event: Option<Instant>,
    paths: BTreeSet<PathBuf>,
    triggers: usize,
}

impl DebounceState {
    fn new(debounce: Duration, max_wait: Duration) -> Self {
        Self {
            debounce,
            max_wait: max_wait.max(debounce),
            first_event: None,
            last_event: None,
            paths: BTreeSet::new(),
            triggers: 0,
        }
    }

    fn record(&mut self, path: Option<PathBuf>) {
        let now = Instant::now();
        self.last_event = Some(now);
        self.first_event.get_or_insert(now);
        self.triggers += 1;
        if let Some(path) = path {
            self.paths.insert(path);
        }
    }

    fn is_dirty(&self) -> bool {
        self.triggers > 0
    }

    /// Settle deadline, capped so a constant stream of events still runs.
    fn next_deadline(&self) -> Option<Instant> {
        let last = self.last_event? + self.debounce;
        let forced = self.first_event? + self.max_wait;
        Some(last.min(forced))
    }

    fn take(&mut self) -> (Vec<PathBuf>, usize) {
        let triggers = self.triggers;
        self.first_event = None;
        self.last_event = None;
        self.triggers = 0;
        (std::mem::take(&mut self.paths).into_iter().collect(), triggers)
    }
}

/// Handle to a background debounce loop.
pub struct DebouncedRunner {
    tx: mpsc::UnboundedSender<Option<PathBuf>>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl DebouncedRunner {
    /// Spawn the loop on the current runtime.
    ///
    /// `job` receives the changed paths of one settle period (possibly empty
    /// for bare triggers) and a token that is cancelled on shutdown.
    pub fn spawn<F, Fut>(debounce: Duration, job: F) -> Self
    where
        F: Fn(Vec<PathBuf>, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn_with_max_wait(debounce, debounce * 10, job)
    }

    /// Like [`spawn`](Self::spawn), with an explicit upper bound on how long
    /// a continuous burst can postpone a run.
    pub fn spawn_with_max_wait<F, Fut>(debounce: Duration, max_wait: Duration, job: F) -> Self
    where
        F: Fn(Vec<PathBuf>, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            DebounceState::new(debounce, max_wait),
            rx,
            cancel.clone(),
            job,
        ));
        Self { tx, cancel, handle }
    }

    /// Record a change to `path`.
    pub fn trigger(&self, path: impl Into<PathBuf>) {
        let _ = self.tx.send(Some(path.into()));
    }

    /// Record a change with no particular path.
    pub fn trigger_all(&self) {
        let _ = self.tx.send(None);
    }

    /// Token cancelled when the runner shuts down.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the loop. A run in progress sees its token cancelled and is
    /// awaited; pending triggers are dropped.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        drop(self.tx);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Debounce loop panicked");
        }
    }

    /// Stop accepting triggers, run once more if any are pending, then stop.
    pub async fn flush(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Debounce loop panicked");
        }
    }
}

async fn run_loop<F, Fut>(
    mut state: DebounceState,
    mut rx: mpsc::UnboundedReceiver<Option<PathBuf>>,
    cancel: CancellationToken,
    job: F,
) where
    F: Fn(Vec<PathBuf>, CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut open = true;
    loop {
        let deadline = state.next_deadline();

        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            msg = rx.recv(), if open => match msg {
                Some(path) => state.record(path),
                None => {
                    open = false;
                    if !state.is_dirty() {
                        break;
                    }
                }
            },

            () = async {
                if let Some(deadline) = deadline {
                    time::sleep_until(deadline).await;
                }
            }, if state.is_dirty() && (deadline.is_some() || !open) => {
                let (paths, triggers) = state.take();
                tracing::debug!(triggers, paths = paths.len(), "Debounce settled, running job");
                job(paths, cancel.child_token()).await;
                if !open {
                    break;
                }
            }
        }
    }
    tracing::debug!("Debounce loop stopped");
}

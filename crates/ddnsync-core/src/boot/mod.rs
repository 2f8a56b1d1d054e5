//! Control loop
//!
//! [`Boot`] owns the single background task that runs reconciliation cycles
//! on a fixed interval.
//!
//! ## States
//!
//! ```text
//!            start()                      stop()
//! Stopped ─────────────▶ Running ─────────────────▶ Stopped
//!    ▲                      │
//!    └──── reset(): reload config, drop domains, stop, start again
//! ```
//!
//! All transitions happen under one async mutex, so at most one loop task
//! exists at any time no matter how start/stop/reset calls interleave.
//! Cycles run inside the loop task, outside that mutex.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::cancel::{self, CancelToken, Canceller};
use crate::config::ConfigStore;
use crate::engine::{CycleReport, DdnsEngine, Domains};
use crate::error::{Error, Result};

/// How long `stop` waits for the loop task before aborting it
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Control loop handle; clones share the same loop
#[derive(Clone)]
pub struct Boot {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<ConfigStore>,
    engine: Arc<DdnsEngine>,
    state: Mutex<BootState>,
    status: Arc<std::sync::Mutex<Status>>,
    generation: AtomicU64,
}

#[derive(Default)]
struct BootState {
    /// Lazily built aggregate; `None` until the first start after a reset
    domains: Option<Arc<Mutex<Domains>>>,
    running: Option<LoopHandle>,
}

struct LoopHandle {
    canceller: Canceller,
    task: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct Status {
    last_report: Option<CycleReport>,
    last_error: Option<String>,
}

impl Boot {
    pub fn new(config: Arc<ConfigStore>, engine: Arc<DdnsEngine>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                engine,
                state: Mutex::new(BootState::default()),
                status: Arc::new(std::sync::Mutex::new(Status::default())),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Start (or restart) the control loop
    ///
    /// A closed or invalid configuration leaves the loop stopped and is not
    /// an error. The first cycle runs immediately, then one per interval.
    pub async fn start(&self) -> Result<()> {
        let config = self.inner.config.snapshot();
        if config.closed {
            info!("DDNS is closed, control loop stays idle");
            return Ok(());
        }
        if !config.is_valid() {
            info!("No address family enabled or no domains configured, control loop stays idle");
            return Ok(());
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.inner.state.lock().await;
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            debug!("Start superseded by a newer start, skipping");
            return Ok(());
        }

        let domains = match &state.domains {
            Some(domains) => domains.clone(),
            None => {
                let domains = Arc::new(Mutex::new(self.inner.engine.load_domains(&config).await));
                state.domains = Some(domains.clone());
                domains
            }
        };

        stop_loop(&mut state).await;

        let interval = config.interval();
        let (canceller, token) = cancel::pair();
        let task = tokio::spawn(run_loop(
            self.inner.config.clone(),
            self.inner.engine.clone(),
            self.inner.status.clone(),
            domains,
            interval,
            token,
        ));
        state.running = Some(LoopHandle { canceller, task });

        info!("Control loop started (interval {:?})", interval);
        Ok(())
    }

    /// Stop the control loop, abandoning an in-flight cycle
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        if stop_loop(&mut state).await {
            info!("Control loop stopped");
        }
    }

    /// Reload the configuration and restart from scratch
    ///
    /// The domain aggregate is rebuilt on the next start. A closed
    /// configuration leaves the loop stopped.
    pub async fn reset(&self) -> Result<()> {
        self.inner.config.reload()?;

        {
            let mut state = self.inner.state.lock().await;
            state.domains = None;
            stop_loop(&mut state).await;
        }

        if self.inner.config.snapshot().closed {
            info!("DDNS is closed, control loop stays idle");
            return Ok(());
        }
        self.start().await
    }

    /// Whether a loop task is alive
    pub async fn is_running(&self) -> bool {
        let state = self.inner.state.lock().await;
        state
            .running
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Report of the last completed cycle
    pub fn last_report(&self) -> Option<CycleReport> {
        self.status().last_report.clone()
    }

    /// Error of the last completed cycle, cleared by a successful one
    pub fn last_error(&self) -> Option<String> {
        self.status().last_error.clone()
    }

    fn status(&self) -> std::sync::MutexGuard<'_, Status> {
        self.inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Boot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Boot")
            .field("generation", &self.inner.generation.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Cancel and join the running loop; returns whether one was running
async fn stop_loop(state: &mut BootState) -> bool {
    let Some(mut handle) = state.running.take() else {
        return false;
    };

    handle.canceller.cancel();
    if tokio::time::timeout(STOP_GRACE, &mut handle.task)
        .await
        .is_err()
    {
        warn!("Control loop did not stop within {:?}, aborting", STOP_GRACE);
        handle.task.abort();
    }
    true
}

async fn run_loop(
    config: Arc<ConfigStore>,
    engine: Arc<DdnsEngine>,
    status: Arc<std::sync::Mutex<Status>>,
    domains: Arc<Mutex<Domains>>,
    interval: Duration,
    cancel: CancelToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let snapshot = config.snapshot();
        if snapshot.closed {
            debug!("DDNS closed, skipping cycle");
            continue;
        }

        let mut aggregate = domains.lock().await;
        let result = cancel
            .guard(engine.update(&mut aggregate, &snapshot, &cancel))
            .await;

        let last_error = match result {
            Ok(()) => None,
            Err(Error::Cancelled) => {
                debug!("Reconciliation cycle cancelled");
                break;
            }
            Err(e) => {
                error!("Reconciliation cycle finished with errors: {}", e);
                Some(e.to_string())
            }
        };

        let mut slot = status.lock().unwrap_or_else(PoisonError::into_inner);
        if aggregate.last_report.is_some() {
            slot.last_report = aggregate.last_report.clone();
        }
        slot.last_error = last_error;
    }

    debug!("Control loop exited");
}

//! Background thread driving [`CacheRegistry::sweep_all`].

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::CacheRegistry;
use crate::error::SweepError;

const THREAD_NAME: &str = "lapse-sweeper";

/// Stand-in for "never" when a delay does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Handle to a running periodic sweeper.
///
/// Dropping the handle stops the sweeper and waits for the thread to exit.
/// A sweep already in progress always runs to completion.
pub struct SweepHandle {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

pub(super) fn spawn(
    registry: CacheRegistry,
    initial_delay: Duration,
    period: Duration,
) -> Result<SweepHandle, SweepError> {
    if period.is_zero() {
        return Err(SweepError::InvalidPeriod);
    }

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    let thread = thread::Builder::new()
        .name(THREAD_NAME.to_string())
        .spawn(move || run(registry, shutdown_rx, initial_delay, period))?;

    log::info!(
        "periodic sweep started: initial delay {:?}, period {:?}",
        initial_delay,
        period
    );

    Ok(SweepHandle {
        shutdown: Some(shutdown_tx),
        thread: Some(thread),
    })
}

fn run(registry: CacheRegistry, shutdown: Receiver<()>, initial_delay: Duration, period: Duration) {
    // `None` once the handle was detached: keep going until the process exits.
    let mut shutdown = Some(shutdown);
    let mut next_run = deadline(Instant::now(), initial_delay);

    loop {
        let wait = next_run.saturating_duration_since(Instant::now());
        let detached = match &shutdown {
            Some(rx) => match rx.recv_timeout(wait) {
                Ok(()) => break,
                Err(RecvTimeoutError::Timeout) => false,
                Err(RecvTimeoutError::Disconnected) => true,
            },
            None => {
                thread::sleep(wait);
                false
            }
        };
        if detached {
            shutdown = None;
            continue;
        }

        let started = Instant::now();
        let removed = registry.sweep_all();
        log::debug!(
            "periodic sweep removed {} expired entries in {:?}",
            removed,
            started.elapsed()
        );
        next_run = deadline(started, period);
    }

    log::info!("periodic sweep stopped");
}

fn deadline(from: Instant, after: Duration) -> Instant {
    from.checked_add(after)
        .or_else(|| from.checked_add(FAR_FUTURE))
        .unwrap_or(from)
}

impl SweepHandle {
    /// Stops the sweeper and waits for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    /// Lets the sweeper run for the rest of the process lifetime.
    pub fn detach(mut self) {
        // Dropping the sender without sending tells the thread it is detached.
        self.shutdown.take();
        self.thread.take();
    }

    /// `true` until the sweeper thread has exited.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn shutdown_and_join(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            if let Err(e) = thread.join() {
                log::error!("sweeper thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

impl std::fmt::Debug for SweepHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepHandle")
            .field("running", &self.is_running())
            .finish()
    }
}

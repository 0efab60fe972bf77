//! Periodic transmission of the command table with a missed-update watchdog.
//!
//! Every tick writes one update frame. A failed write counts as a missed
//! cycle; once `missed_updates_allowed` consecutive cycles are missed the table
//! is reset to its initial values and the scheduler reports `Faulted` until a
//! write goes through again. Ticks keep firing throughout.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::command::CommandTable;
use crate::error::Result;
use crate::frame::build_update_frame;

/// Writer half of the port, shared with `Connection::send`.
pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
    /// Watchdog fired; commands hold their initial values until a write succeeds.
    Faulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    /// Consecutive failed ticks.
    pub missed: u32,
    pub ticks: u64,
    pub failures: u64,
    pub resets: u64,
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        Self {
            state: SchedulerState::Stopped,
            missed: 0,
            ticks: 0,
            failures: 0,
            resets: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Sent,
    Missed(u32),
    /// The miss that hit the threshold; the table has been reset.
    Reset,
    /// Write failed after `stop()` was requested; not counted.
    Discarded,
}

struct Shared {
    table: Arc<CommandTable>,
    writer: SharedWriter,
    missed_allowed: u32,
    status: Mutex<SchedulerStatus>,
    cancelled: AtomicBool,
}

impl Shared {
    fn status(&self) -> MutexGuard<'_, SchedulerStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut w = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        w.write_all(bytes)?;
        w.flush()
    }

    fn tick(&self) -> TickOutcome {
        let frame = build_update_frame(&self.table.snapshot());
        trace!(frame = frame.trim_end(), "tick");
        let res = self.write(frame.as_bytes());

        let mut st = self.status();
        st.ticks += 1;
        match res {
            Ok(()) => {
                if st.state == SchedulerState::Faulted {
                    info!(after = st.missed, "link recovered, resuming updates");
                }
                st.missed = 0;
                st.state = SchedulerState::Running;
                TickOutcome::Sent
            }
            Err(_) if self.cancelled.load(Ordering::Acquire) => TickOutcome::Discarded,
            Err(e) => {
                st.failures += 1;
                st.missed = st.missed.saturating_add(1);
                if st.missed == self.missed_allowed {
                    self.table.reset_all();
                    st.resets += 1;
                    st.state = SchedulerState::Faulted;
                    warn!(
                        missed = st.missed,
                        error = %e,
                        "missed update threshold reached, commands reset to initial values"
                    );
                    TickOutcome::Reset
                } else {
                    warn!(
                        missed = st.missed,
                        allowed = self.missed_allowed,
                        error = %e,
                        "update write failed"
                    );
                    TickOutcome::Missed(st.missed)
                }
            }
        }
    }
}

pub struct UpdateScheduler {
    shared: Arc<Shared>,
    period: Duration,
    worker: Option<(Sender<()>, JoinHandle<()>)>,
}

impl UpdateScheduler {
    pub fn new(
        table: Arc<CommandTable>,
        writer: SharedWriter,
        period: Duration,
        missed_allowed: u32,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                table,
                writer,
                missed_allowed,
                status: Mutex::new(SchedulerStatus::default()),
                cancelled: AtomicBool::new(false),
            }),
            period,
            worker: None,
        }
    }

    /// Begin ticking every `period`. No-op if already started.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        self.shared.cancelled.store(false, Ordering::Release);
        self.shared.status().state = SchedulerState::Running;

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let shared = self.shared.clone();
        let period = self.period;
        let handle = thread::Builder::new()
            .name("arduino-tx".into())
            .spawn(move || {
                let mut next = Instant::now();
                loop {
                    shared.tick();
                    next += period;
                    let now = Instant::now();
                    if next <= now {
                        let slots = ((now - next).as_nanos() / period.as_nanos().max(1)) as u32 + 1;
                        debug!(skipped = slots, "tick overran its period");
                        next += period * slots;
                    }
                    match stop_rx.recv_timeout(next.saturating_duration_since(Instant::now())) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            });
        let handle = match handle {
            Ok(h) => h,
            Err(e) => {
                self.shared.status().state = SchedulerState::Stopped;
                return Err(e.into());
            }
        };
        debug!(period_ms = self.period.as_millis() as u64, "update scheduler started");
        self.worker = Some((stop_tx, handle));
        Ok(())
    }

    /// Cancel the timer and wait for the tick thread. Idempotent.
    pub fn stop(&mut self) {
        self.shared.cancelled.store(true, Ordering::Release);
        if let Some((stop_tx, handle)) = self.worker.take() {
            let _ = stop_tx.send(());
            if handle.join().is_err() {
                warn!("update thread panicked");
            }
            debug!("update scheduler stopped");
        }
        self.shared.status().state = SchedulerState::Stopped;
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.status().state
    }

    pub fn status(&self) -> SchedulerStatus {
        *self.shared.status()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one cycle on the caller's thread.
    pub(crate) fn tick(&self) -> TickOutcome {
        self.shared.tick()
    }
}

impl Drop for UpdateScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::command::CommandTable;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::frame::{
    FrameDecoder, MISSED_UPDATES_ALLOWED, UPDATE_RATE, build_init_frame, build_update_frame,
};
use crate::listener::{Listener, ListenerRegistry};
use crate::port::{SerialTransport, Transport};
use crate::scheduler::{SchedulerStatus, SharedWriter, UpdateScheduler};

const READ_CHUNK: usize = 256;
const IDLE_BACKOFF: Duration = Duration::from_millis(10);
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);

enum Lifecycle {
    Idle,
    Open(Link),
    Closed,
}

/// Everything that exists only while the port is open.
struct Link {
    writer: SharedWriter,
    scheduler: UpdateScheduler,
    reader_stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl Link {
    fn shutdown(mut self) {
        self.scheduler.stop();
        self.reader_stop.store(true, Ordering::Release);
        if let Some(handle) = self.reader.take() {
            // close() from inside a listener runs on the reader thread itself
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("reader thread panicked");
            }
        }
    }
}

/// A single serial connection to an Arduino.
///
/// Register commands, then [`open`](Self::open). From then on every command is
/// sent `update_frequency` times per second and inbound strings are handed to
/// the registered listeners. All methods take `&self`, so the connection can be
/// shared behind an `Arc`.
pub struct Connection {
    config: Config,
    transport: Box<dyn Transport>,
    table: Arc<CommandTable>,
    listeners: Arc<ListenerRegistry>,
    lifecycle: Mutex<Lifecycle>,
}

impl Connection {
    pub fn new(config: Config, transport: impl Transport + 'static) -> Self {
        Self {
            config,
            transport: Box::new(transport),
            table: Arc::new(CommandTable::new()),
            listeners: Arc::new(ListenerRegistry::new()),
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Connection over the host's serial ports.
    pub fn with_serial(config: Config) -> Self {
        Self::new(config, SerialTransport)
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ports(&self) -> Result<Vec<String>> {
        self.transport.ports()
    }

    /// Open the port, give the board time to reboot, then start reading and
    /// transmitting. Blocks for the configured reset delay.
    pub fn open(&self) -> Result<()> {
        let mut lc = self.lifecycle();
        match *lc {
            Lifecycle::Idle => {}
            Lifecycle::Open(_) => return Err(Error::AlreadyOpen),
            Lifecycle::Closed => return Err(Error::MethodOrder("open() after close()")),
        }

        let line = self.config.line();
        let duplex = self.transport.open(line)?;
        info!(port = %line.port_name, baud = %line.baud_rate, "connection opened");
        self.warn_if_line_too_slow();

        let delay = self.config.reset_delay();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "waiting for board reset");
            thread::sleep(delay);
        }

        let writer: SharedWriter = Arc::new(Mutex::new(duplex.writer));
        self.send_init(&writer)?;

        let reader_stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let listeners = self.listeners.clone();
            let stop = reader_stop.clone();
            thread::Builder::new()
                .name("arduino-rx".into())
                .spawn(move || read_loop(duplex.reader, listeners, stop))?
        };

        let mut scheduler = UpdateScheduler::new(
            self.table.clone(),
            writer.clone(),
            self.config.update_period(),
            self.config.missed_updates_allowed(),
        );
        if let Err(e) = scheduler.start() {
            reader_stop.store(true, Ordering::Release);
            let _ = reader.join();
            return Err(e);
        }
        *lc = Lifecycle::Open(Link {
            writer,
            scheduler,
            reader_stop,
            reader: Some(reader),
        });
        info!(
            commands = self.table.len(),
            frequency = self.config.update_frequency(),
            "transmitting"
        );
        Ok(())
    }

    /// Tell the board our update rate, watchdog threshold and every command's
    /// initial value before the first update frame.
    fn send_init(&self, writer: &SharedWriter) -> Result<()> {
        let mut frames = vec![
            build_init_frame(UPDATE_RATE, self.config.update_frequency() as i32),
            build_init_frame(
                MISSED_UPDATES_ALLOWED,
                self.config.missed_updates_allowed() as i32,
            ),
        ];
        frames.extend(
            self.table
                .initial_snapshot()
                .iter()
                .map(|(name, value)| build_init_frame(name, *value)),
        );

        let mut w = writer.lock().unwrap_or_else(PoisonError::into_inner);
        for f in &frames {
            debug!(frame = f.trim_end(), "init");
            w.write_all(f.as_bytes())
                .and_then(|_| w.flush())
                .map_err(|e| Error::connection(self.config.port_name(), e))?;
        }
        Ok(())
    }

    fn warn_if_line_too_slow(&self) {
        let line = self.config.line();
        let bytes = build_update_frame(&self.table.snapshot()).len() as f64;
        let airtime = bytes * line.bits_per_byte() as f64 / line.baud_rate.value() as f64;
        let period = self.config.update_period().as_secs_f64();
        if airtime > period {
            warn!(
                airtime_ms = (airtime * 1000.0) as u64,
                period_ms = (period * 1000.0) as u64,
                "update frame takes longer to send than the update period"
            );
        }
    }

    /// Only allowed before [`open`](Self::open): the board is told every
    /// command's initial value as part of opening.
    pub fn register_command(&self, name: &str, initial: i32) -> Result<()> {
        let lc = self.lifecycle();
        if !matches!(*lc, Lifecycle::Idle) {
            return Err(Error::MethodOrder("register_command() after open()"));
        }
        self.table.register(name, initial)
    }

    /// Takes effect on the next tick.
    pub fn update_command(&self, name: &str, value: i32) -> Result<()> {
        let lc = self.lifecycle();
        match *lc {
            Lifecycle::Open(_) => self.table.update(name, value),
            Lifecycle::Idle => Err(Error::MethodOrder("update_command() before open()")),
            Lifecycle::Closed => Err(Error::MethodOrder("update_command() after close()")),
        }
    }

    /// Write `text` to the board as-is, between update frames.
    pub fn send(&self, text: &str) -> Result<()> {
        let lc = self.lifecycle();
        let Lifecycle::Open(link) = &*lc else {
            return Err(Error::MethodOrder("send() while not open"));
        };
        let mut w = link.writer.lock().unwrap_or_else(PoisonError::into_inner);
        w.write_all(text.as_bytes())
            .and_then(|_| w.flush())
            .map_err(|e| Error::connection(self.config.port_name(), e))
    }

    /// Listeners run on the reader thread, in registration order.
    pub fn register_listener(&self, listener: impl Listener + 'static) {
        self.listeners.register(Arc::new(listener));
    }

    /// Stop transmitting and reading and release the port. Safe to call any
    /// number of times, including before `open()`.
    pub fn close(&self) {
        let link = {
            let mut lc = self.lifecycle();
            match std::mem::replace(&mut *lc, Lifecycle::Closed) {
                Lifecycle::Open(link) => link,
                other => {
                    *lc = other;
                    return;
                }
            }
        };
        link.shutdown();
        info!(port = self.config.port_name(), "connection closed");
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.lifecycle(), Lifecycle::Open(_))
    }

    /// `None` unless open.
    pub fn scheduler_status(&self) -> Option<SchedulerStatus> {
        match &*self.lifecycle() {
            Lifecycle::Open(link) => Some(link.scheduler.status()),
            _ => None,
        }
    }

    pub fn command_value(&self, name: &str) -> Option<i32> {
        self.table.value(name)
    }

    /// Current `(name, value)` pairs in registration order.
    pub fn snapshot(&self) -> Vec<(String, i32)> {
        self.table.snapshot()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_loop(
    mut reader: Box<dyn Read + Send>,
    listeners: Arc<ListenerRegistry>,
    stop: Arc<AtomicBool>,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; READ_CHUNK];
    debug!("reader started");
    while !stop.load(Ordering::Acquire) {
        match reader.read(&mut buf) {
            Ok(0) => thread::sleep(IDLE_BACKOFF),
            Ok(n) => {
                trace!(bytes = n, "read");
                for msg in decoder.feed(&buf[..n]) {
                    match msg {
                        Ok(msg) => {
                            debug!(message = %msg, "received");
                            listeners.dispatch(&msg);
                        }
                        Err(e) => warn!(error = %e, "discarding inbound data"),
                    }
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                warn!(error = %e, "serial read failed");
                thread::sleep(READ_ERROR_BACKOFF);
            }
        }
    }
    debug!(pending = decoder.pending(), "reader stopped");
}

//! Duplex SDLC service
//!
//! Owns the serial connection and runs two threads:
//! - the reader pulls bytes, assembles frames and hands each raw frame to the
//!   registered [`ServiceEvents`] handler
//! - the writer drains the bounded outbound queue onto the port
//!
//! [`SdlcService::write`] is the only producer entry point. Shutdown drops a
//! signal sender so every waiting thread wakes at once, then blocks until
//! both threads have counted down.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use super::pool::{WriteBuffer, WritePool, WRITE_BUFFER_SIZE};
use crate::audit::{AuditAction, AuditRecord};
use crate::config::SdlcConfig;
use crate::context::SdlcContext;
use crate::metrics::Counter;
use crate::protocol::{
    lock, to_hex, ConnectionEvents, ConnectionState, FrameAssembler, PortOpener, ProtocolError,
    RetryGuard, SerialConnection, SystemPortOpener,
};

/// Bytes requested per read
const READ_CHUNK_SIZE: usize = 256;

/// Threads that must count down before `stop` returns
const SERVICE_THREADS: usize = 2;

/// Service callbacks, one per event
pub trait ServiceEvents: Send + Sync {
    /// Transport or assembler failure
    fn on_error(&self, _err: &ProtocolError) {}
    /// Reader thread exited
    fn on_terminate(&self) {}
    /// One raw (still escaped) frame, in arrival order
    fn on_read_message(&self, _frame: &[u8]) {}
}

/// Ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopServiceEvents;

impl ServiceEvents for NoopServiceEvents {}

/// Replaceable handler, cloned out before each call so a callback may swap it
struct HandlerSlot(RwLock<Arc<dyn ServiceEvents>>);

impl HandlerSlot {
    fn get(&self) -> Arc<dyn ServiceEvents> {
        let guard = self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*guard)
    }

    fn set(&self, handler: Arc<dyn ServiceEvents>) {
        *self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = handler;
    }
}

/// Feeds link events into metrics, audit and the service handler
struct LinkEvents {
    context: SdlcContext,
    handler: Arc<HandlerSlot>,
}

impl ConnectionEvents for LinkEvents {
    fn on_connect(&self) {
        self.context.metrics.incr(Counter::Connects);
    }

    fn on_disconnect(&self) {
        self.context.metrics.incr(Counter::Disconnects);
    }

    fn on_error(&self, err: &ProtocolError) {
        self.context
            .audit
            .record(AuditRecord::now(AuditAction::Error, err.to_string()));
        self.handler.get().on_error(err);
    }

    fn on_wrote(&self, data: &[u8]) {
        self.context
            .audit
            .record(AuditRecord::now(AuditAction::Write, to_hex(data)));
    }

    fn on_read(&self, data: &[u8]) {
        self.context
            .audit
            .record(AuditRecord::now(AuditAction::Read, to_hex(data)));
    }
}

struct Shared {
    config: SdlcConfig,
    context: SdlcContext,
    connection: SerialConnection,
    pool: WritePool,
    queue_tx: Sender<WriteBuffer>,
    queue_rx: Receiver<WriteBuffer>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    handler: Arc<HandlerSlot>,
    started: AtomicBool,
    terminating: AtomicBool,
    countdown: AtomicUsize,
    done_lock: Mutex<()>,
    done: Condvar,
}

impl Shared {
    fn shutdown_signaled(&self) -> bool {
        self.terminating.load(Ordering::Acquire)
            || matches!(self.shutdown_rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    fn count_down(&self) {
        if self.countdown.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = lock(&self.done_lock);
            self.done.notify_all();
        }
    }

    fn drain_queue(&self) -> usize {
        let mut drained = 0;
        while let Ok(buffer) = self.queue_rx.try_recv() {
            self.pool.release(buffer);
            drained += 1;
        }
        drained
    }

    fn reader_loop(&self) {
        let mut assembler = FrameAssembler::with_capacity(self.config.assembler_capacity);
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let reconnect_interval = self.config.reconnect_interval();
        let metrics = &self.context.metrics;

        tracing::debug!("SDLC reader started");
        while !self.shutdown_signaled() {
            if !self.connection.connect() {
                match self.shutdown_rx.recv_timeout(reconnect_interval) {
                    Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) | Ok(()) => continue,
                }
            }

            let n = self.connection.read(&mut chunk);
            if n == 0 {
                continue;
            }
            metrics.incr(Counter::Reads);
            metrics.add(Counter::ReadBytes, n as u64, chrono::Utc::now());

            if let Err(e) = assembler.push(&chunk[..n]) {
                tracing::warn!(error = %e, pending = assembler.len(), "SDLC assembler overflow, discarding pending bytes");
                metrics.incr(Counter::AssemblerOverflows);
                assembler.clear();
                self.handler.get().on_error(&e.into());
                continue;
            }

            let handler = self.handler.get();
            while let Some(frame) = assembler.pop() {
                metrics.incr(Counter::Pops);
                tracing::debug!(frame = %to_hex(frame), "SDLC frame");
                handler.on_read_message(frame);
            }
        }

        self.connection.disconnect();
        self.count_down();
        tracing::debug!("SDLC reader stopped");
        self.handler.get().on_terminate();
    }

    fn writer_loop(&self) {
        tracing::debug!("SDLC writer started");
        loop {
            let next = crossbeam::select! {
                recv(self.queue_rx) -> msg => msg.ok(),
                recv(self.shutdown_rx) -> _ => None,
            };

            match next {
                // Termination wins over queued writes
                Some(buffer) if self.shutdown_signaled() => {
                    self.pool.release(buffer);
                    break;
                }
                Some(buffer) => self.write_one(buffer),
                None => break,
            }
        }

        self.terminating.store(true, Ordering::Release);
        let dropped = self.drain_queue();
        if dropped > 0 {
            tracing::debug!(dropped, "SDLC writer released queued buffers");
        }
        self.count_down();
        tracing::debug!("SDLC writer stopped");
    }

    fn write_one(&self, buffer: WriteBuffer) {
        let len = buffer.len();
        self.record(Counter::WritesDequeued, Counter::WritesDequeuedBytes, len);

        match self.connection.write(buffer.as_slice()) {
            Ok(()) => self.record(Counter::WritesSucceeded, Counter::WritesSucceededBytes, len),
            Err(e) => {
                tracing::debug!(error = %e, len, "SDLC write dropped");
                self.record(Counter::WritesFailed, Counter::WritesFailedBytes, len);
            }
        }

        self.pool.release(buffer);
    }

    /// Count one message and its bytes
    fn record(&self, count: Counter, bytes: Counter, len: usize) {
        let at = chrono::Utc::now();
        self.context.metrics.add(count, 1, at);
        self.context.metrics.add(bytes, len as u64, at);
    }

    fn enqueue(&self, data: &[u8]) {
        if data.len() > WRITE_BUFFER_SIZE {
            tracing::warn!(
                len = data.len(),
                capacity = WRITE_BUFFER_SIZE,
                "SDLC write omitted, payload too large"
            );
            self.record(Counter::WritesOmitted, Counter::WritesOmittedBytes, data.len());
            return;
        }

        let mut buffer = self.pool.acquire();
        if let Err(e) = buffer.fill(data) {
            tracing::warn!(error = %e, "SDLC write omitted");
            self.pool.release(buffer);
            self.record(Counter::WritesOmitted, Counter::WritesOmittedBytes, data.len());
            return;
        }

        match self.queue_tx.try_send(buffer) {
            Ok(()) => {
                self.record(Counter::WritesEnqueued, Counter::WritesEnqueuedBytes, data.len());
                // Raced with stop after its final drain
                if self.terminating.load(Ordering::Acquire) {
                    self.drain_queue();
                }
            }
            Err(TrySendError::Full(buffer)) | Err(TrySendError::Disconnected(buffer)) => {
                self.pool.release(buffer);
                tracing::warn!(len = data.len(), "SDLC write queue full, message dropped");
                self.record(Counter::WritesQueueFull, Counter::WritesQueueFullBytes, data.len());
            }
        }
    }
}

/// SDLC link service
pub struct SdlcService {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl SdlcService {
    /// Service over `opener`; no thread runs until [`start`](Self::start)
    pub fn new(config: SdlcConfig, context: SdlcContext, opener: Arc<dyn PortOpener>) -> Self {
        let noop: Arc<dyn ServiceEvents> = Arc::new(NoopServiceEvents);
        let handler = Arc::new(HandlerSlot(RwLock::new(noop)));
        let events = Arc::new(LinkEvents {
            context: context.clone(),
            handler: Arc::clone(&handler),
        });

        let connection = SerialConnection::new(
            config.serial.clone(),
            config.read_timeout(),
            RetryGuard::new(config.retry_every),
            opener,
            events,
        );

        let capacity = config.write_queue_capacity.max(1);
        let (queue_tx, queue_rx) = channel::bounded(capacity);
        let (shutdown_tx, shutdown_rx) = channel::bounded(0);

        Self {
            shared: Arc::new(Shared {
                config,
                context,
                connection,
                pool: WritePool::new(capacity + 2),
                queue_tx,
                queue_rx,
                shutdown_tx: Mutex::new(Some(shutdown_tx)),
                shutdown_rx,
                handler,
                started: AtomicBool::new(false),
                terminating: AtomicBool::new(false),
                countdown: AtomicUsize::new(0),
                done_lock: Mutex::new(()),
                done: Condvar::new(),
            }),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Service on a real serial port
    pub fn with_system_port(config: SdlcConfig, context: SdlcContext) -> Self {
        Self::new(config, context, Arc::new(SystemPortOpener))
    }

    /// Spawn the reader and writer threads.
    ///
    /// A disabled configuration logs and returns without starting. A stopped
    /// service cannot be restarted.
    pub fn start(&self) -> Result<(), ProtocolError> {
        let shared = &self.shared;
        if !shared.config.enabled {
            tracing::info!("SDLC service disabled by configuration");
            return Ok(());
        }
        if shared.terminating.load(Ordering::Acquire) {
            return Err(ProtocolError::ServiceNotRunning);
        }
        if shared.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        shared.countdown.store(SERVICE_THREADS, Ordering::Release);

        let reader_shared = Arc::clone(shared);
        let reader = match thread::Builder::new()
            .name("sdlc-reader".to_string())
            .spawn(move || reader_shared.reader_loop())
        {
            Ok(handle) => handle,
            Err(e) => {
                shared.started.store(false, Ordering::Release);
                return Err(e.into());
            }
        };

        let writer_shared = Arc::clone(shared);
        let writer = thread::Builder::new()
            .name("sdlc-writer".to_string())
            .spawn(move || writer_shared.writer_loop());

        let mut threads = lock(&self.threads);
        threads.push(reader);
        match writer {
            Ok(handle) => threads.push(handle),
            Err(e) => {
                // Writer never ran; count down on its behalf
                shared.count_down();
                return Err(e.into());
            }
        }

        tracing::info!(port = %shared.config.serial.port_name, "SDLC service started");
        Ok(())
    }

    /// Signal termination and block until both threads have exited
    pub fn stop(&self) {
        let shared = &self.shared;
        shared.terminating.store(true, Ordering::Release);
        // Dropping the sender wakes every waiter
        lock(&shared.shutdown_tx).take();

        if shared.started.load(Ordering::Acquire) {
            let mut guard = lock(&shared.done_lock);
            while shared.countdown.load(Ordering::Acquire) > 0 {
                guard = shared
                    .done
                    .wait(guard)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
        }

        let handles: Vec<_> = lock(&self.threads).drain(..).collect();
        let was_running = !handles.is_empty();
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("SDLC service thread panicked");
            }
        }

        shared.drain_queue();
        if was_running {
            tracing::info!("SDLC service stopped");
        }
    }

    /// Queue `data` for the writer.
    ///
    /// A no-op once terminating. Oversized payloads and a full queue drop the
    /// message; both are logged and counted.
    pub fn write(&self, data: &[u8]) {
        let shared = &self.shared;
        if shared.terminating.load(Ordering::Acquire) {
            return;
        }

        shared.enqueue(data);
    }

    /// Register the message handler, replacing the previous one
    pub fn set_handler(&self, handler: Arc<dyn ServiceEvents>) {
        self.shared.handler.set(handler);
    }

    /// True between a successful `start` and `stop`
    pub fn is_running(&self) -> bool {
        self.shared.started.load(Ordering::Acquire) && !self.shared.terminating.load(Ordering::Acquire)
    }

    /// Current serial link state
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.connection.state()
    }

    /// Messages waiting for the writer
    pub fn queue_len(&self) -> usize {
        self.shared.queue_rx.len()
    }

    /// Write buffer pool
    pub fn pool(&self) -> &WritePool {
        &self.shared.pool
    }

    /// Settings the service was built with
    pub fn config(&self) -> &SdlcConfig {
        &self.shared.config
    }

    /// Metrics and audit sinks
    pub fn context(&self) -> &SdlcContext {
        &self.shared.context
    }
}

impl Drop for SdlcService {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::protocol::SerialStream;
    use std::time::Duration;

    /// Opener that never finds a port
    struct NoPort;

    impl PortOpener for NoPort {
        fn open(
            &self,
            _settings: &crate::config::SerialSettings,
            _timeout: Duration,
        ) -> Result<Box<dyn SerialStream>, ProtocolError> {
            Err(ProtocolError::SerialError("no port".into()))
        }
    }

    fn service(metrics: Arc<Metrics>) -> SdlcService {
        let config = SdlcConfig {
            reconnect_interval_ms: 10,
            ..Default::default()
        };
        let context = SdlcContext::new(metrics, Arc::new(crate::audit::MemoryAudit::new()));
        SdlcService::new(config, context, Arc::new(NoPort))
    }

    #[test]
    fn test_queue_full_drops_newest() {
        let metrics = Arc::new(Metrics::new());
        let service = service(metrics.clone());

        for n in 0..6u8 {
            service.write(&[0x02, n, 0x03]);
        }

        assert_eq!(service.queue_len(), 5);
        assert_eq!(service.pool().in_use(), 5);
        assert_eq!(metrics.get(Counter::WritesEnqueued), 5);
        assert_eq!(metrics.get(Counter::WritesEnqueuedBytes), 15);
        assert_eq!(metrics.get(Counter::WritesQueueFull), 1);
        assert_eq!(metrics.get(Counter::WritesQueueFullBytes), 3);
    }

    #[test]
    fn test_oversized_write_omitted() {
        let metrics = Arc::new(Metrics::new());
        let service = service(metrics.clone());

        service.write(&[0u8; WRITE_BUFFER_SIZE + 1]);
        assert_eq!(service.queue_len(), 0);
        assert_eq!(service.pool().in_use(), 0);
        assert_eq!(metrics.get(Counter::WritesOmitted), 1);
        assert_eq!(
            metrics.get(Counter::WritesOmittedBytes),
            WRITE_BUFFER_SIZE as u64 + 1
        );
    }

    #[test]
    fn test_enqueue_racing_stop_is_released() {
        let metrics = Arc::new(Metrics::new());
        let service = service(metrics.clone());
        service.stop();

        // A write that passed its terminating check before stop drained
        service.shared.enqueue(&[0x02, 0x10, 0x03]);
        assert_eq!(service.queue_len(), 0);
        assert_eq!(service.pool().in_use(), 0);
    }

    #[test]
    fn test_writer_skips_queue_once_shutdown_signaled() {
        let metrics = Arc::new(Metrics::new());
        let service = service(metrics.clone());
        for n in 0..3u8 {
            service.write(&[0x02, n, 0x03]);
        }

        let shared = &service.shared;
        shared.countdown.store(1, Ordering::Release);
        lock(&shared.shutdown_tx).take();
        shared.writer_loop();

        assert_eq!(metrics.get(Counter::WritesDequeued), 0);
        assert_eq!(metrics.get(Counter::WritesDequeuedBytes), 0);
        assert_eq!(service.queue_len(), 0);
        assert_eq!(service.pool().in_use(), 0);
        assert_eq!(shared.countdown.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_stop_without_start_releases_queue() {
        let metrics = Arc::new(Metrics::new());
        let service = service(metrics.clone());
        service.write(&[1, 2, 3]);

        service.stop();
        assert_eq!(service.queue_len(), 0);
        assert_eq!(service.pool().in_use(), 0);

        service.write(&[1, 2, 3]);
        assert_eq!(service.queue_len(), 0);
        assert_eq!(metrics.get(Counter::WritesEnqueued), 1);
        assert!(matches!(service.start(), Err(ProtocolError::ServiceNotRunning)));
    }

    #[test]
    fn test_start_stop_without_port() {
        let metrics = Arc::new(Metrics::new());
        let service = service(metrics);

        service.start().unwrap();
        assert!(service.is_running());
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(service.connection_state(), ConnectionState::Disconnected);

        service.stop();
        assert!(!service.is_running());
    }

    #[test]
    fn test_disabled_service_does_not_start() {
        let config = SdlcConfig {
            enabled: false,
            ..Default::default()
        };
        let service = SdlcService::new(config, SdlcContext::default(), Arc::new(NoPort));
        service.start().unwrap();
        assert!(!service.is_running());
        service.stop();
    }
}

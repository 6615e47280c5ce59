//! Polling executor
//!
//! Periodically asks the BIU for its static status and keeps the latest
//! answer as a shared snapshot. The loop is paced by a [`Metronome`]; the
//! unit of work is [`Executor::tick`], which takes the current instant so it
//! can be driven without a wall clock.

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::context::SdlcContext;
use crate::metrics::Counter;
use crate::protocol::{
    lock, to_hex, Identifier, ProtocolError, RequestEncoder, ResponseDecoder, StaticStatus,
};
use crate::service::{SdlcService, ServiceEvents};

/// Fixed-period click generator.
///
/// A real metronome keeps its rhythm after an overrun and waits for
/// the next beat; a non-real one fires at once and restarts the rhythm.
#[derive(Debug, Clone)]
pub struct Metronome {
    cycle: Duration,
    is_real: bool,
    start_on: Instant,
    clicks: u64,
}

impl Metronome {
    /// Metronome ticking every `cycle`, starting now
    pub fn new(cycle: Duration, is_real: bool) -> Self {
        Self {
            cycle,
            is_real,
            start_on: Instant::now(),
            clicks: 0,
        }
    }

    /// Restart the rhythm at `now`
    pub fn start(&mut self, now: Instant) {
        self.clicks = 0;
        self.start_on = now;
    }

    /// Clicks since the last restart
    pub fn clicks(&self) -> u64 {
        self.clicks
    }

    /// Beat period
    pub fn cycle(&self) -> Duration {
        self.cycle
    }

    /// Count a click at `now` and return how long to wait for the next beat
    pub fn next_wait(&mut self, now: Instant) -> Duration {
        self.clicks += 1;
        let elapsed = now.saturating_duration_since(self.start_on);

        if elapsed < self.cycle {
            self.start_on += self.cycle;
            return self.cycle - elapsed;
        }

        if self.is_real && !self.cycle.is_zero() {
            let beats = (elapsed.as_nanos() / self.cycle.as_nanos()) as u32;
            let next_beat = self.start_on + self.cycle * (beats + 1);
            self.start_on = next_beat;
            return next_beat.saturating_duration_since(now);
        }

        self.start_on = now;
        Duration::ZERO
    }

    /// Sleep until the next beat
    pub fn await_click(&mut self) -> Duration {
        let wait = self.next_wait(Instant::now());
        if !wait.is_zero() {
            thread::sleep(wait);
        }
        wait
    }
}

/// Decodes frames delivered by the service and keeps the latest static status
pub struct StatusHandler {
    context: SdlcContext,
    decoder: Mutex<ResponseDecoder>,
    snapshot: Arc<RwLock<Option<StaticStatus>>>,
}

impl StatusHandler {
    fn new(context: SdlcContext) -> Self {
        Self {
            context,
            decoder: Mutex::new(ResponseDecoder::new()),
            snapshot: Arc::new(RwLock::new(None)),
        }
    }

    /// Latest decoded static status
    pub fn static_status(&self) -> Option<StaticStatus> {
        *self.snapshot.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn decode_failed(&self, frame: &[u8], err: &ProtocolError) {
        tracing::debug!(error = %err, frame = %to_hex(frame), "SDLC frame rejected");
        let metrics = &self.context.metrics;
        metrics.incr(Counter::DecodeErrors);
        metrics.add(Counter::DecodeErrorBytes, frame.len() as u64, chrono::Utc::now());
    }
}

impl ServiceEvents for StatusHandler {
    fn on_error(&self, err: &ProtocolError) {
        tracing::debug!(error = %err, "SDLC service error");
    }

    fn on_terminate(&self) {
        tracing::info!("SDLC reader terminated");
    }

    fn on_read_message(&self, frame: &[u8]) {
        let mut decoder = lock(&self.decoder);
        if let Err(e) = decoder.init(frame) {
            self.decode_failed(frame, &e);
            return;
        }

        match decoder.identifier() {
            Identifier::StaticStatusResponse => match decoder.static_status() {
                Ok(status) => {
                    self.context.metrics.incr(Counter::StaticStatusResponses);
                    tracing::debug!(biu = status.biu.0, mode = %status.mode, "SDLC static status");
                    *self
                        .snapshot
                        .write()
                        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(status);
                }
                Err(e) => self.decode_failed(frame, &e),
            },
            id if id.is_unknown() => {
                tracing::warn!(identifier = %id, frame = %to_hex(frame), "SDLC unknown identifier");
                self.context.metrics.incr(Counter::UnknownIdentifiers);
            }
            _ => {}
        }
    }
}

/// Static status poller bound to one service
pub struct Executor {
    service: Arc<SdlcService>,
    handler: Arc<StatusHandler>,
    encoder: RequestEncoder,
    request_every: Duration,
    cycle: Duration,
    last_request: Option<Instant>,
}

impl Executor {
    /// Executor over a service; reads its interval settings from the service config
    pub fn new(service: Arc<SdlcService>) -> Self {
        let config = service.config();
        let request_every = config.static_request_every();
        let cycle = config.executor_cycle();
        let handler = Arc::new(StatusHandler::new(service.context().clone()));

        Self {
            service,
            handler,
            encoder: RequestEncoder::new(),
            request_every,
            cycle,
            last_request: None,
        }
    }

    /// Handler to register with the service; [`Executor::start`] does this
    pub fn handler(&self) -> Arc<StatusHandler> {
        Arc::clone(&self.handler)
    }

    /// Latest decoded static status
    pub fn static_status(&self) -> Option<StaticStatus> {
        self.handler.static_status()
    }

    /// One unit of work. Returns `true` when a static status request was sent.
    pub fn tick(&mut self, now: Instant) -> bool {
        let due = self
            .last_request
            .map_or(true, |last| now.saturating_duration_since(last) >= self.request_every);
        if !due {
            return false;
        }

        self.service.context().metrics.incr(Counter::StaticStatusRequests);
        match self.encoder.static_status() {
            Ok(frame) => self.service.write(frame),
            Err(e) => tracing::error!(error = %e, "SDLC static status request encode failed"),
        }
        self.last_request = Some(now);
        true
    }

    /// Register with the service and run the polling loop on its own thread
    pub fn start(mut self) -> Result<ExecutorHandle, ProtocolError> {
        if !self.service.is_running() {
            return Err(ProtocolError::ServiceNotRunning);
        }

        self.service.set_handler(self.handler());
        let handler = Arc::clone(&self.handler);
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);

        let thread = thread::Builder::new()
            .name("sdlc-executor".to_string())
            .spawn(move || {
                let mut metronome = Metronome::new(self.cycle, false);
                metronome.start(Instant::now());
                tracing::debug!(cycle_ms = self.cycle.as_millis() as u64, "SDLC executor started");

                loop {
                    self.tick(Instant::now());
                    let wait = metronome.next_wait(Instant::now());
                    match shutdown_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) | Ok(()) => {}
                    }
                }
                tracing::debug!(clicks = metronome.clicks(), "SDLC executor stopped");
            })?;

        Ok(ExecutorHandle {
            thread: Some(thread),
            shutdown_tx: Some(shutdown_tx),
            handler,
        })
    }
}

/// Running executor; stops on drop
pub struct ExecutorHandle {
    thread: Option<JoinHandle<()>>,
    shutdown_tx: Option<Sender<()>>,
    handler: Arc<StatusHandler>,
}

impl ExecutorHandle {
    /// Latest decoded static status
    pub fn static_status(&self) -> Option<StaticStatus> {
        self.handler.static_status()
    }

    /// Signal the loop and wait for it to exit
    pub fn stop(&mut self) {
        self.shutdown_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("SDLC executor thread panicked");
            }
        }
    }
}

impl Drop for ExecutorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAudit;
    use crate::config::{SdlcConfig, SerialSettings};
    use crate::metrics::Metrics;
    use crate::protocol::{from_hex, BiuFlags, PortOpener, SerialStream};

    struct NoPort;

    impl PortOpener for NoPort {
        fn open(
            &self,
            _settings: &SerialSettings,
            _timeout: Duration,
        ) -> Result<Box<dyn SerialStream>, ProtocolError> {
            Err(ProtocolError::SerialError("no port".into()))
        }
    }

    fn executor() -> (Executor, Arc<SdlcService>, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        let context = SdlcContext::new(metrics.clone(), Arc::new(MemoryAudit::new()));
        let service = Arc::new(SdlcService::new(SdlcConfig::default(), context, Arc::new(NoPort)));
        (Executor::new(service.clone()), service, metrics)
    }

    #[test]
    fn test_metronome_non_real_restarts_after_overrun() {
        let t0 = Instant::now();
        let cycle = Duration::from_millis(100);
        let mut metronome = Metronome::new(cycle, false);
        metronome.start(t0);

        assert_eq!(metronome.next_wait(t0 + Duration::from_millis(30)), Duration::from_millis(70));
        // Beat two ends at 200ms; 350ms overran it
        assert_eq!(metronome.next_wait(t0 + Duration::from_millis(350)), Duration::ZERO);
        assert_eq!(metronome.next_wait(t0 + Duration::from_millis(360)), Duration::from_millis(90));
        assert_eq!(metronome.clicks(), 3);
    }

    #[test]
    fn test_metronome_real_keeps_rhythm() {
        let t0 = Instant::now();
        let cycle = Duration::from_millis(100);
        let mut metronome = Metronome::new(cycle, true);
        metronome.start(t0);

        // 240ms into the beat: wait for the 300ms mark
        assert_eq!(metronome.next_wait(t0 + Duration::from_millis(240)), Duration::from_millis(60));
        assert_eq!(metronome.next_wait(t0 + Duration::from_millis(310)), Duration::from_millis(90));
    }

    #[test]
    fn test_tick_requests_on_interval() {
        let (mut executor, service, metrics) = executor();
        let t0 = Instant::now();

        assert!(executor.tick(t0));
        assert!(!executor.tick(t0 + Duration::from_secs(5)));
        assert!(executor.tick(t0 + Duration::from_secs(10)));

        assert_eq!(metrics.get(Counter::StaticStatusRequests), 2);
        assert_eq!(service.queue_len(), 2);
    }

    #[test]
    fn test_static_status_response_updates_snapshot() {
        let (executor, _service, metrics) = executor();
        let handler = executor.handler();
        assert_eq!(executor.static_status(), None);

        let frame = from_hex("02400f017d2208070605047d237d22017d2383245e03").unwrap();
        handler.on_read_message(&frame);

        let status = executor.static_status().expect("Should hold snapshot");
        assert_eq!(status.biu, BiuFlags(0x0F));
        assert_eq!(status.serial, 0x0102_0304_0506_0708);
        assert_eq!(metrics.get(Counter::StaticStatusResponses), 1);
    }

    #[test]
    fn test_bad_and_unknown_frames_counted() {
        let (executor, _service, metrics) = executor();
        let handler = executor.handler();

        let corrupt = from_hex("02400f017d2208070605047d237d22017d2383245f03").unwrap();
        handler.on_read_message(&corrupt);
        assert_eq!(metrics.get(Counter::DecodeErrors), 1);
        assert_eq!(metrics.get(Counter::DecodeErrorBytes), corrupt.len() as u64);

        handler.on_read_message(&from_hex("0277019ce003").unwrap());
        assert_eq!(metrics.get(Counter::UnknownIdentifiers), 1);

        // Known but unhandled
        handler.on_read_message(&from_hex("024f12328e03").unwrap());
        assert_eq!(metrics.get(Counter::DecodeErrors), 1);
        assert_eq!(executor.static_status(), None);
    }

    #[test]
    fn test_start_requires_running_service() {
        let (executor, _service, _metrics) = executor();
        assert!(matches!(executor.start(), Err(ProtocolError::ServiceNotRunning)));
    }
}

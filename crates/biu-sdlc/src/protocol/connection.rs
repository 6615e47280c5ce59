//! Connection management
//!
//! Handles the serial link lifecycle: paced reconnects, bounded reads,
//! drained writes and an idempotent disconnect that either the reader or
//! the writer may trigger.

use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{PortOpener, ProtocolError, RetryGuard, SerialStream};
use crate::config::SerialSettings;

/// Link callbacks, one per event
pub trait ConnectionEvents: Send + Sync {
    /// Port opened
    fn on_connect(&self) {}
    /// Port closed by reader or writer
    fn on_disconnect(&self) {}
    /// Open, read or write failure
    fn on_error(&self, _err: &ProtocolError) {}
    /// Bytes written and drained
    fn on_wrote(&self, _data: &[u8]) {}
    /// Bytes received
    fn on_read(&self, _data: &[u8]) {}
}

/// Ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConnectionEvents;

impl ConnectionEvents for NoopConnectionEvents {}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Port open in progress
    Connecting,
    /// Connected and ready
    Connected,
}

/// Lock ignoring poison; the guarded handles stay usable after a panic elsewhere
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Serial link with separate reader and writer handles
pub struct SerialConnection {
    settings: SerialSettings,
    read_timeout: Duration,
    opener: Arc<dyn PortOpener>,
    events: Arc<dyn ConnectionEvents>,
    retry: Mutex<RetryGuard>,
    /// Held across handle install and teardown; taken before `reader`/`writer`
    link: Mutex<()>,
    reader: Mutex<Option<Box<dyn SerialStream>>>,
    writer: Mutex<Option<Box<dyn SerialStream>>>,
    connected: AtomicBool,
    connecting: AtomicBool,
}

impl SerialConnection {
    /// Disconnected link; nothing is opened until [`connect`](Self::connect)
    pub fn new(
        settings: SerialSettings,
        read_timeout: Duration,
        retry: RetryGuard,
        opener: Arc<dyn PortOpener>,
        events: Arc<dyn ConnectionEvents>,
    ) -> Self {
        Self {
            settings,
            read_timeout,
            opener,
            events,
            retry: Mutex::new(retry),
            link: Mutex::new(()),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            connected: AtomicBool::new(false),
            connecting: AtomicBool::new(false),
        }
    }

    /// Port parameters
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    /// Current link state
    pub fn state(&self) -> ConnectionState {
        if self.connected.load(Ordering::Acquire) {
            ConnectionState::Connected
        } else if self.connecting.load(Ordering::Acquire) {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Both handles are open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Ensure the port is open.
    ///
    /// Returns `true` when already connected. Otherwise the retry guard
    /// decides whether this call may open the port; a declined or failed
    /// attempt returns `false`.
    pub fn connect(&self) -> bool {
        if self.is_connected() {
            return true;
        }

        let link = lock(&self.link);
        if self.is_connected() {
            return true;
        }

        let mut retry = lock(&self.retry);
        if !retry.should_retry() {
            return false;
        }

        self.connecting.store(true, Ordering::Release);
        let result = self.open_split();
        self.connecting.store(false, Ordering::Release);

        match result {
            Ok((reader, writer)) => {
                *lock(&self.reader) = Some(reader);
                *lock(&self.writer) = Some(writer);
                self.connected.store(true, Ordering::Release);
                retry.reset();
                drop(retry);
                drop(link);

                tracing::info!(port = %self.settings.port_name, baud = self.settings.baud_rate, "SDLC port connected");
                self.events.on_connect();
                true
            }
            Err(e) => {
                drop(retry);
                drop(link);
                tracing::debug!(port = %self.settings.port_name, error = %e, "SDLC connect failed");
                self.events.on_error(&e);
                false
            }
        }
    }

    fn open_split(&self) -> Result<(Box<dyn SerialStream>, Box<dyn SerialStream>), ProtocolError> {
        let mut reader = self.opener.open(&self.settings, self.read_timeout)?;
        reader.set_timeout(self.read_timeout)?;
        let writer = reader.try_clone_stream()?;
        Ok((reader, writer))
    }

    /// Read available bytes into `buf`.
    ///
    /// Timeouts and end-of-stream yield 0. Any other failure disconnects,
    /// reports the error and yields 0.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let Some(result) = lock(&self.reader).as_mut().map(|stream| {
            stream
                .set_timeout(self.read_timeout)
                .and_then(|_| stream.read(buf))
        }) else {
            return 0;
        };

        match result {
            Ok(0) => 0,
            Ok(n) => {
                self.events.on_read(&buf[..n]);
                n
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                0
            }
            Err(e) => {
                tracing::error!(error = %e, "SDLC read failed");
                self.disconnect();
                self.events.on_error(&e.into());
                0
            }
        }
    }

    /// Write all of `data` and drain it to the device
    pub fn write(&self, data: &[u8]) -> Result<(), ProtocolError> {
        let result = lock(&self.writer)
            .as_mut()
            .map(|stream| stream.write_all(data).and_then(|_| stream.flush()));

        let Some(result) = result else {
            let err = ProtocolError::NotConnected;
            self.events.on_error(&err);
            return Err(err);
        };

        match result {
            Ok(()) => {
                self.events.on_wrote(data);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, len = data.len(), "SDLC write failed");
                self.disconnect();
                let err = ProtocolError::from(e);
                self.events.on_error(&err);
                Err(err)
            }
        }
    }

    /// Close both handles. Only the call that observes the connected state
    /// reports the disconnect.
    pub fn disconnect(&self) {
        let link = lock(&self.link);
        if self
            .connected
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        lock(&self.writer).take();
        lock(&self.reader).take();
        drop(link);

        tracing::info!(port = %self.settings.port_name, "SDLC port disconnected");
        self.events.on_disconnect();
    }
}

impl Drop for SerialConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// In-memory port: scripted read results, captured writes
    #[derive(Clone, Default)]
    struct ScriptedPort {
        reads: Arc<Mutex<VecDeque<io::Result<Vec<u8>>>>>,
        written: Arc<Mutex<Vec<u8>>>,
        fail_writes: Arc<AtomicBool>,
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match lock(&self.reads).pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
            }
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
            }
            lock(&self.written).extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialStream for ScriptedPort {
        fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
            Ok(())
        }

        fn try_clone_stream(&self) -> io::Result<Box<dyn SerialStream>> {
            Ok(Box::new(self.clone()))
        }
    }

    struct ScriptedOpener {
        port: ScriptedPort,
        fail: AtomicBool,
        opens: AtomicUsize,
    }

    impl PortOpener for ScriptedOpener {
        fn open(
            &self,
            _settings: &SerialSettings,
            _timeout: Duration,
        ) -> Result<Box<dyn SerialStream>, ProtocolError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProtocolError::SerialError("no such port".into()));
            }
            Ok(Box::new(self.port.clone()))
        }
    }

    #[derive(Default)]
    struct Recorder {
        connects: AtomicUsize,
        disconnects: AtomicUsize,
        errors: AtomicUsize,
        reads: AtomicUsize,
        writes: AtomicUsize,
    }

    impl ConnectionEvents for Recorder {
        fn on_connect(&self) {
            self.connects.fetch_add(1, Ordering::SeqCst);
        }
        fn on_disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        fn on_error(&self, _err: &ProtocolError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        fn on_wrote(&self, _data: &[u8]) {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        fn on_read(&self, _data: &[u8]) {
            self.reads.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn setup(fail: bool, retry_every: u32) -> (SerialConnection, Arc<ScriptedOpener>, Arc<Recorder>) {
        let opener = Arc::new(ScriptedOpener {
            port: ScriptedPort::default(),
            fail: AtomicBool::new(fail),
            opens: AtomicUsize::new(0),
        });
        let events = Arc::new(Recorder::default());
        let conn = SerialConnection::new(
            SerialSettings::default(),
            Duration::from_millis(10),
            RetryGuard::new(retry_every),
            opener.clone(),
            events.clone(),
        );
        (conn, opener, events)
    }

    #[test]
    fn test_connect_read_write() {
        let (conn, opener, events) = setup(false, 3);
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        assert!(conn.connect());
        assert!(conn.connect());
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 1);
        assert_eq!(events.connects.load(Ordering::SeqCst), 1);

        lock(&opener.port.reads).push_back(Ok(vec![0x02, 0x10]));
        let mut buf = [0u8; 16];
        assert_eq!(conn.read(&mut buf), 2);
        assert_eq!(&buf[..2], &[0x02, 0x10]);
        // Timeout is not an error
        assert_eq!(conn.read(&mut buf), 0);
        assert!(conn.is_connected());

        conn.write(&[0x02, 0x10, 0xF3, 0xC1, 0x03]).unwrap();
        assert_eq!(*lock(&opener.port.written), vec![0x02, 0x10, 0xF3, 0xC1, 0x03]);
        assert_eq!(events.reads.load(Ordering::SeqCst), 1);
        assert_eq!(events.writes.load(Ordering::SeqCst), 1);
        assert_eq!(events.errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_connect_paced_by_retry_guard() {
        let (conn, opener, events) = setup(true, 3);

        for _ in 0..4 {
            assert!(!conn.connect());
        }
        // Calls 1 and 4 attempt an open
        assert_eq!(opener.opens.load(Ordering::SeqCst), 2);
        assert_eq!(events.errors.load(Ordering::SeqCst), 2);

        opener.fail.store(false, Ordering::SeqCst);
        assert!(!conn.connect());
        assert!(!conn.connect());
        assert!(conn.connect());
    }

    #[test]
    fn test_read_error_disconnects_once() {
        let (conn, opener, events) = setup(false, 1);
        assert!(conn.connect());

        lock(&opener.port.reads).push_back(Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")));
        let mut buf = [0u8; 16];
        assert_eq!(conn.read(&mut buf), 0);
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        conn.disconnect();
        conn.disconnect();
        assert_eq!(events.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(events.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disconnect_overlapping_connect_leaves_usable_link() {
        let (conn, opener, events) = setup(false, 1);
        assert!(conn.connect());

        std::thread::scope(|s| {
            // Stall the teardown after the connected flag is cleared
            let writer = lock(&conn.writer);
            let disconnecting = s.spawn(|| conn.disconnect());
            while conn.is_connected() {
                std::thread::yield_now();
            }

            let reconnecting = s.spawn(|| conn.connect());
            std::thread::sleep(Duration::from_millis(20));
            drop(writer);

            disconnecting.join().unwrap();
            assert!(reconnecting.join().unwrap());
        });

        assert_eq!(conn.state(), ConnectionState::Connected);
        assert!(lock(&conn.reader).is_some());
        assert!(lock(&conn.writer).is_some());
        assert_eq!(events.connects.load(Ordering::SeqCst), 2);
        assert_eq!(events.disconnects.load(Ordering::SeqCst), 1);

        lock(&opener.port.reads).push_back(Ok(vec![0x02, 0x4F]));
        let mut buf = [0u8; 8];
        assert_eq!(conn.read(&mut buf), 2);
        conn.write(&[0x02, 0x10, 0xF3, 0xC1, 0x03]).unwrap();
    }

    #[test]
    fn test_write_without_port_reports_not_connected() {
        let (conn, _opener, events) = setup(false, 3);
        assert!(matches!(conn.write(&[1, 2, 3]), Err(ProtocolError::NotConnected)));
        assert_eq!(events.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_write_error_disconnects() {
        let (conn, opener, events) = setup(false, 1);
        assert!(conn.connect());

        opener.port.fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(conn.write(&[1]), Err(ProtocolError::IoError(_))));
        assert!(!conn.is_connected());
        assert_eq!(events.disconnects.load(Ordering::SeqCst), 1);

        // Reconnects on the next call since the guard was reset on connect
        opener.port.fail_writes.store(false, Ordering::SeqCst);
        assert!(conn.connect());
        assert_eq!(events.connects.load(Ordering::SeqCst), 2);
    }
}

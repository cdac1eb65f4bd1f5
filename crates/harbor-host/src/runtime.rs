//! Tokio side of the host
//!
//! The tao event loop owns the main thread and never blocks on the runtime,
//! so bridge workers and signal forwarding run on the runtime's own worker
//! threads. Everything the event loop needs from them arrives through a sink,
//! which in production wraps an `EventLoopProxy`.

use anyhow::{Context, Result};
use ext_ipc::{BridgeEvent, ClipboardProvider, PortBridge, SessionProvider};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::debug;

/// Bridge events are few and small
const EVENT_QUEUE_CAPACITY: usize = 64;

/// Bridge workers and signal forwarding
const WORKER_THREADS: usize = 2;

/// User events delivered to the tao event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Bridge(BridgeEvent),
    Quit,
}

/// Build the runtime the host keeps for its whole life
pub fn build_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(WORKER_THREADS)
        .thread_name("harbor-rt")
        .enable_all()
        .build()
        .context("creating tokio runtime")
}

/// Start the port bridge on `rt` and forward its events into `sink`.
///
/// `sink` returns `false` once the event loop is gone, which ends forwarding.
pub fn start_bridge<S>(
    rt: &Runtime,
    session: Arc<dyn SessionProvider>,
    clipboard: Arc<dyn ClipboardProvider>,
    sink: S,
) -> PortBridge
where
    S: Fn(HostEvent) -> bool + Send + 'static,
{
    let _guard = rt.enter();
    let (events_tx, mut events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let bridge = PortBridge::spawn(session, clipboard, events_tx);

    rt.spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if !sink(HostEvent::Bridge(event)) {
                debug!(?event, "Event loop closed, dropping bridge event");
                break;
            }
        }
    });
    bridge
}

/// Turn the first completion of `signal` into [`HostEvent::Quit`]
pub fn forward_quit_signal<F, S>(rt: &Runtime, signal: F, sink: S)
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
    S: Fn(HostEvent) -> bool + Send + 'static,
{
    rt.spawn(async move {
        match signal.await {
            Ok(()) => {
                if !sink(HostEvent::Quit) {
                    debug!("Event loop closed, dropping quit signal");
                }
            }
            Err(e) => debug!(error = %e, "Quit signal unavailable"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use ext_ipc::{BridgeCommand, IpcError};
    use std::sync::mpsc as std_mpsc;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MemorySession {
        value: Mutex<Option<String>>,
    }

    impl SessionProvider for MemorySession {
        fn load(&self) -> Result<Option<String>, IpcError> {
            Ok(self.value.lock().unwrap().clone())
        }

        fn store(&self, session: &str) -> Result<(), IpcError> {
            *self.value.lock().unwrap() = Some(session.to_string());
            Ok(())
        }
    }

    /// Succeeds unless the text is "deny"
    struct TestClipboard;

    impl ClipboardProvider for TestClipboard {
        fn write_text(&self, text: &str) -> Result<(), IpcError> {
            if text == "deny" {
                return Err(IpcError::clipboard("access denied"));
            }
            Ok(())
        }
    }

    fn channel_sink() -> (
        impl Fn(HostEvent) -> bool + Send + 'static,
        std_mpsc::Receiver<HostEvent>,
    ) {
        let (tx, rx) = std_mpsc::channel();
        (move |event| tx.send(event).is_ok(), rx)
    }

    // The event loop thread never enters the runtime, so neither does this test
    #[test]
    fn test_bridge_runs_without_block_on() {
        let rt = build_runtime().unwrap();
        let session = Arc::new(MemorySession::default());
        let (sink, events) = channel_sink();
        let bridge = start_bridge(&rt, session.clone(), Arc::new(TestClipboard), sink);

        bridge
            .dispatch(BridgeCommand::StoreSession("abc123".to_string()))
            .unwrap();
        bridge
            .dispatch(BridgeCommand::WriteToClipboard("hello".to_string()))
            .unwrap();
        bridge
            .dispatch(BridgeCommand::WriteToClipboard("deny".to_string()))
            .unwrap();

        let timeout = Duration::from_secs(5);
        assert_eq!(
            events.recv_timeout(timeout).unwrap(),
            HostEvent::Bridge(BridgeEvent::ClipboardSuccess)
        );
        assert_eq!(
            events.recv_timeout(timeout).unwrap(),
            HostEvent::Bridge(BridgeEvent::ClipboardFailure)
        );
        assert!(events.recv_timeout(Duration::from_millis(100)).is_err());

        for _ in 0..500 {
            if session.value.lock().unwrap().is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(session.load().unwrap().as_deref(), Some("abc123"));
        assert_eq!(bridge.init_payload().session.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_closed_event_loop_stops_forwarding() {
        let rt = build_runtime().unwrap();
        let (sink, events) = channel_sink();
        drop(events);
        let bridge = start_bridge(
            &rt,
            Arc::new(MemorySession::default()),
            Arc::new(TestClipboard),
            sink,
        );

        // The first write's event finds the loop gone, the next one stops the
        // clipboard worker, and after that the bridge reports it has shut down
        let mut outcome = Ok(());
        for _ in 0..100 {
            outcome = bridge.dispatch(BridgeCommand::WriteToClipboard("hello".to_string()));
            if outcome.is_err() {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(matches!(outcome, Err(IpcError::ChannelSend { .. })));
    }

    #[test]
    fn test_quit_signal_forwarded() {
        let rt = build_runtime().unwrap();
        let (sink, events) = channel_sink();
        forward_quit_signal(&rt, async { Ok(()) }, sink);
        assert_eq!(
            events.recv_timeout(Duration::from_secs(5)).unwrap(),
            HostEvent::Quit
        );
    }

    #[test]
    fn test_failed_quit_signal_sends_nothing() {
        let rt = build_runtime().unwrap();
        let (sink, events) = channel_sink();
        forward_quit_signal(
            &rt,
            async { Err(std::io::Error::other("no signal handler")) },
            sink,
        );
        assert!(events.recv_timeout(Duration::from_millis(200)).is_err());
    }
}

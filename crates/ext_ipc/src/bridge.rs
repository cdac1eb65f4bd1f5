//! PortBridge - relays renderer commands to the host capability providers
//!
//! Each provider gets its own worker task fed by an unbounded queue, so
//! `dispatch` never blocks the caller. The clipboard worker awaits every
//! write before taking the next one, which keeps clipboard events in the
//! same order as the commands that caused them.

use crate::{
    parse_message, BridgeCommand, BridgeEvent, ClipboardProvider, InitPayload, IpcError,
    SessionProvider,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Handle to the running bridge workers. Cheap to clone.
#[derive(Clone)]
pub struct PortBridge {
    session: Arc<dyn SessionProvider>,
    session_tx: mpsc::UnboundedSender<String>,
    clipboard_tx: mpsc::UnboundedSender<String>,
}

impl PortBridge {
    /// Start the workers on the current tokio runtime.
    /// Clipboard outcomes are delivered on `events_tx`.
    pub fn spawn(
        session: Arc<dyn SessionProvider>,
        clipboard: Arc<dyn ClipboardProvider>,
        events_tx: mpsc::Sender<BridgeEvent>,
    ) -> Self {
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (clipboard_tx, clipboard_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_session_worker(session.clone(), session_rx));
        tokio::spawn(run_clipboard_worker(clipboard, clipboard_rx, events_tx));

        Self {
            session,
            session_tx,
            clipboard_tx,
        }
    }

    /// Current session for the renderer's initial handoff.
    /// A store that cannot be read is treated as having no session.
    pub fn init_payload(&self) -> InitPayload {
        match self.session.load() {
            Ok(session) => InitPayload { session },
            Err(e) => {
                warn!(error = %e, "Failed to read stored session");
                InitPayload::default()
            }
        }
    }

    /// Queue a command for its provider
    pub fn dispatch(&self, cmd: BridgeCommand) -> Result<(), IpcError> {
        debug!(port = cmd.port(), "Bridge command");
        match cmd {
            BridgeCommand::StoreSession(session) => self
                .session_tx
                .send(session)
                .map_err(|_| IpcError::channel_send("session worker stopped")),
            BridgeCommand::WriteToClipboard(text) => self
                .clipboard_tx
                .send(text)
                .map_err(|_| IpcError::channel_send("clipboard worker stopped")),
        }
    }

    /// Parse and dispatch a raw renderer message
    pub fn handle_message(&self, body: &str) -> Result<(), IpcError> {
        let cmd = parse_message(body)?;
        self.dispatch(cmd)
    }
}

async fn run_session_worker(
    provider: Arc<dyn SessionProvider>,
    mut rx: mpsc::UnboundedReceiver<String>,
) {
    while let Some(session) = rx.recv().await {
        let provider = provider.clone();
        let outcome = tokio::task::spawn_blocking(move || provider.store(&session)).await;
        match outcome {
            Ok(Ok(())) => debug!("Session stored"),
            Ok(Err(e)) => warn!(error = %e, "Failed to store session"),
            Err(e) => warn!(error = %e, "Session store task failed"),
        }
    }
    debug!("Session worker stopped");
}

async fn run_clipboard_worker(
    provider: Arc<dyn ClipboardProvider>,
    mut rx: mpsc::UnboundedReceiver<String>,
    events_tx: mpsc::Sender<BridgeEvent>,
) {
    while let Some(text) = rx.recv().await {
        let provider = provider.clone();
        let text_len = text.len();
        let outcome = tokio::task::spawn_blocking(move || provider.write_text(&text)).await;

        let event = match outcome {
            Ok(Ok(())) => {
                debug!(text_len, "Clipboard write succeeded");
                BridgeEvent::ClipboardSuccess
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Clipboard write failed");
                BridgeEvent::ClipboardFailure
            }
            Err(e) => {
                warn!(error = %e, "Clipboard task failed");
                BridgeEvent::ClipboardFailure
            }
        };

        if events_tx.send(event).await.is_err() {
            debug!("Bridge event receiver closed");
            break;
        }
    }
    debug!("Clipboard worker stopped");
}

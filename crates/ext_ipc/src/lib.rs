use serde::{Deserialize, Serialize};

pub mod bridge;
pub use bridge::*;

// ============================================================================
// Error Types (7000+ range - ext_window uses 6000)
// ============================================================================

/// Error codes for port bridge operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IpcErrorCode {
    /// Channel send error
    ChannelSend = 7000,
    /// Message from the renderer is not part of the port vocabulary
    InvalidMessage = 7001,
    /// Session store failed
    SessionStore = 7002,
    /// Clipboard provider failed
    Clipboard = 7003,
    /// Payload could not be serialized
    Serialization = 7004,
}

/// Custom error type for port bridge operations
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("[{code}] Channel send error: {message}")]
    ChannelSend { code: u32, message: String },

    #[error("[{code}] Invalid message: {message}")]
    InvalidMessage { code: u32, message: String },

    #[error("[{code}] Session store error: {message}")]
    SessionStore { code: u32, message: String },

    #[error("[{code}] Clipboard error: {message}")]
    Clipboard { code: u32, message: String },

    #[error("[{code}] Serialization error: {message}")]
    Serialization { code: u32, message: String },
}

impl IpcError {
    pub fn channel_send(message: impl Into<String>) -> Self {
        Self::ChannelSend {
            code: IpcErrorCode::ChannelSend as u32,
            message: message.into(),
        }
    }

    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::InvalidMessage {
            code: IpcErrorCode::InvalidMessage as u32,
            message: message.into(),
        }
    }

    pub fn session_store(message: impl Into<String>) -> Self {
        Self::SessionStore {
            code: IpcErrorCode::SessionStore as u32,
            message: message.into(),
        }
    }

    pub fn clipboard(message: impl Into<String>) -> Self {
        Self::Clipboard {
            code: IpcErrorCode::Clipboard as u32,
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            code: IpcErrorCode::Serialization as u32,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

// ============================================================================
// Data Types
// ============================================================================

/// Command sent from the renderer to the host
///
/// Wire form: `{"port": "storeSession", "value": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "port", content = "value", rename_all = "camelCase")]
pub enum BridgeCommand {
    StoreSession(String),
    WriteToClipboard(String),
}

impl BridgeCommand {
    pub fn port(&self) -> &'static str {
        match self {
            Self::StoreSession(_) => "storeSession",
            Self::WriteToClipboard(_) => "writeToClipboard",
        }
    }
}

/// Event sent from the host to the renderer
///
/// Wire form: `{"port": "clipboardSuccess"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "port", rename_all = "camelCase")]
pub enum BridgeEvent {
    ClipboardSuccess,
    ClipboardFailure,
}

/// Flags handed to the UI runtime before any page script runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitPayload {
    pub session: Option<String>,
}

/// Decode a renderer message into a command.
/// Anything outside the two known ports is rejected.
pub fn parse_message(body: &str) -> Result<BridgeCommand, IpcError> {
    serde_json::from_str(body).map_err(|e| IpcError::invalid_message(e.to_string()))
}

// ============================================================================
// Host Capability Providers
// ============================================================================

/// Durable owner of the session token
pub trait SessionProvider: Send + Sync + 'static {
    fn load(&self) -> Result<Option<String>, IpcError>;
    fn store(&self, session: &str) -> Result<(), IpcError>;
}

/// Writes text to the platform clipboard
pub trait ClipboardProvider: Send + Sync + 'static {
    fn write_text(&self, text: &str) -> Result<(), IpcError>;
}

// ============================================================================
// Renderer Scripts
// ============================================================================

const PRELOAD_JS: &str = include_str!("preload.js");
const FLAGS_PLACEHOLDER: &str = "__HARBOR_FLAGS__";

/// Initialization script exposing `window.harbor` with the payload embedded
pub fn preload_script(payload: &InitPayload) -> Result<String, IpcError> {
    let flags = serde_json::to_string(payload)?;
    Ok(PRELOAD_JS.replace(FLAGS_PLACEHOLDER, &flags))
}

/// Script that delivers `event` to the renderer's port subscribers
pub fn dispatch_script(event: BridgeEvent) -> Result<String, IpcError> {
    let message = serde_json::to_string(&event)?;
    Ok(format!(
        "window.__harbor_dispatch && window.__harbor_dispatch({});",
        message
    ))
}

// ============================================================================
// Tests
// ============================================================================

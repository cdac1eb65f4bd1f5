//! Clipboard capability for the port bridge

use ext_ipc::{ClipboardProvider, IpcError};
use tracing::debug;

/// Error codes for clipboard operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ClipboardErrorCode {
    /// Platform clipboard could not be opened
    Unavailable = 2100,
    /// Platform refused the write
    WriteFailed = 2101,
}

#[derive(Debug, thiserror::Error)]
pub enum ClipboardError {
    #[error("[{code}] Clipboard unavailable: {message}")]
    Unavailable { code: u32, message: String },

    #[error("[{code}] Clipboard write failed: {message}")]
    WriteFailed { code: u32, message: String },
}

impl ClipboardError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            code: ClipboardErrorCode::Unavailable as u32,
            message: message.into(),
        }
    }

    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            code: ClipboardErrorCode::WriteFailed as u32,
            message: message.into(),
        }
    }
}

impl From<ClipboardError> for IpcError {
    fn from(e: ClipboardError) -> Self {
        IpcError::clipboard(e.to_string())
    }
}

/// The platform clipboard, opened fresh for every write
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl SystemClipboard {
    pub fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        debug!(text_len = text.len(), "clipboard.set_text");
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| ClipboardError::unavailable(e.to_string()))?;
        clipboard
            .set_text(text)
            .map_err(|e| ClipboardError::write_failed(e.to_string()))
    }
}

impl ClipboardProvider for SystemClipboard {
    fn write_text(&self, text: &str) -> Result<(), IpcError> {
        self.set_text(text)?;
        Ok(())
    }
}
